use std::{env, time::Duration};

use secrecy::{ExposeSecret, SecretString};

/// Placeholder key shipped in sample env files; treated the same as no key.
pub const PLACEHOLDER_STRIPE_KEY: &str = "sk_test_51234567890abcdef";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Test,
    Production,
}

impl AppEnv {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" => AppEnv::Development,
            "test" => AppEnv::Test,
            _ => AppEnv::Production,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: Option<SecretString>,
    pub publishable_key: Option<String>,
    pub webhook_secret: Option<SecretString>,
    pub api_base: String,
}

impl StripeConfig {
    /// No usable secret key: payment intents are answered in demo mode.
    pub fn is_demo(&self) -> bool {
        match &self.secret_key {
            None => true,
            Some(key) => {
                let key = key.expose_secret();
                key.is_empty() || key == PLACEHOLDER_STRIPE_KEY
            }
        }
    }

    pub fn uses_test_keys(&self) -> bool {
        self.secret_key
            .as_ref()
            .is_some_and(|key| key.expose_secret().starts_with("sk_test_"))
    }
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from_name: String,
}

impl SmtpConfig {
    pub fn is_configured(&self) -> bool {
        self.username.as_deref().is_some_and(|u| !u.is_empty())
            && self
                .password
                .as_ref()
                .is_some_and(|p| !p.expose_secret().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub min_amount_cents: i64,
    pub max_amount_cents: i64,
    pub allowed_currencies: Vec<String>,
    pub rate_limit_window: Duration,
    pub rate_limit_max_requests: u32,
    pub require_secure_connection: bool,
    pub allowed_origins: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            min_amount_cents: 100,
            max_amount_cents: 1_000_000,
            allowed_currencies: vec!["usd".to_string()],
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max_requests: 5,
            require_secure_connection: true,
            allowed_origins: vec!["localhost".to_string(), "127.0.0.1".to_string()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub env: AppEnv,
    pub base_url: String,
    pub stripe: StripeConfig,
    pub smtp: SmtpConfig,
    pub security: SecurityConfig,
    /// Email + amount + time-window matching when no payment intent id is known.
    pub fuzzy_order_match: bool,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let env_name = env::var("APP_ENV")
            .or_else(|_| env::var("NODE_ENV"))
            .unwrap_or_else(|_| "production".to_string());
        let base_url =
            env::var("APP_BASE_URL").unwrap_or_else(|_| format!("http://localhost:{port}"));

        let stripe = StripeConfig {
            secret_key: non_empty("STRIPE_SECRET_KEY").map(SecretString::from),
            publishable_key: non_empty("STRIPE_PUBLISHABLE_KEY")
                .or_else(|| non_empty("NEXT_PUBLIC_STRIPE_PUBLISHABLE_KEY")),
            webhook_secret: non_empty("STRIPE_WEBHOOK_SECRET").map(SecretString::from),
            api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
        };

        let smtp = SmtpConfig {
            host: env::var("SMTP_HOST").unwrap_or_else(|_| "smtp.gmail.com".to_string()),
            port: env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(587),
            username: non_empty("SMTP_USER"),
            password: non_empty("SMTP_PASS").map(SecretString::from),
            from_name: env::var("MAIL_FROM_NAME").unwrap_or_else(|_| "DVIT GOLF".to_string()),
        };

        let mut security = SecurityConfig::default();
        if let Some(max) = parse_var::<u32>("RATE_LIMIT_MAX_REQUESTS") {
            security.rate_limit_max_requests = max.max(1);
        }
        if let Some(secs) = parse_var::<u64>("RATE_LIMIT_WINDOW_SECS") {
            security.rate_limit_window = Duration::from_secs(secs.max(1));
        }
        if let Some(flag) = parse_flag("REQUIRE_SECURE_CONNECTION") {
            security.require_secure_connection = flag;
        }
        if let Some(origins) = non_empty("ALLOWED_ORIGINS") {
            security.allowed_origins = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }

        Ok(Self {
            port,
            database_url,
            host,
            env: AppEnv::parse(&env_name),
            base_url,
            stripe,
            smtp,
            security,
            fuzzy_order_match: parse_flag("FUZZY_ORDER_MATCH").unwrap_or(true),
        })
    }

    /// Error responses carry internal details only in development.
    pub fn expose_error_details(&self) -> bool {
        self.env == AppEnv::Development
    }

    pub fn is_production(&self) -> bool {
        self.env == AppEnv::Production
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn parse_flag(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}
