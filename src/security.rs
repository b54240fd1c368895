//! Request hardening for the payment endpoints: transport and header checks,
//! client identification for rate limiting, and log redaction.

use axum::http::{HeaderMap, header};
use serde_json::Value;
use url::Url;

use crate::config::{AppConfig, SecurityConfig};

const REDACTED: &str = "[REDACTED]";
const SENSITIVE_KEYS: [&str; 7] = [
    "password",
    "token",
    "secret",
    "key",
    "authorization",
    "cookie",
    "session",
];

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// HTTPS behind a proxy, or a local host during development.
pub fn is_connection_secure(headers: &HeaderMap, config: &SecurityConfig) -> bool {
    if !config.require_secure_connection {
        return true;
    }
    if header_str(headers, "x-forwarded-proto")
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
    {
        return true;
    }
    header_str(headers, header::HOST.as_str())
        .map(|host| host.rsplit_once(':').map_or(host, |(name, _)| name))
        .is_some_and(|host| host == "localhost" || host == "127.0.0.1")
}

pub fn validate_request_headers(
    headers: &HeaderMap,
    config: &SecurityConfig,
    production: bool,
) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    if !header_str(headers, header::CONTENT_TYPE.as_str())
        .is_some_and(|ct| ct.contains("application/json"))
    {
        errors.push("Invalid Content-Type".to_string());
    }

    if header_str(headers, header::USER_AGENT.as_str()).is_none_or(str::is_empty) {
        errors.push("Missing User-Agent".to_string());
    }

    if let Some(origin) = header_str(headers, header::ORIGIN.as_str()) {
        match Url::parse(origin) {
            Ok(url) => {
                let allowed = url
                    .host_str()
                    .is_some_and(|host| config.allowed_origins.iter().any(|o| o == host));
                if production && !allowed {
                    errors.push("Origin not allowed".to_string());
                }
            }
            Err(_) => errors.push("Invalid Origin format".to_string()),
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Rate-limit key: first `X-Forwarded-For` hop, then `X-Real-IP`.
pub fn client_identifier(headers: &HeaderMap) -> String {
    let forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty());
    let ip = forwarded
        .or_else(|| header_str(headers, "x-real-ip").filter(|ip| !ip.is_empty()))
        .unwrap_or("unknown");
    format!("client:{ip}")
}

pub fn request_id(headers: &HeaderMap) -> String {
    header_str(headers, "x-request-id").unwrap_or("-").to_string()
}

/// Replaces values under sensitive keys, recursing into nested objects and arrays.
pub fn sanitize_for_logging(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    let lowered = key.to_ascii_lowercase();
                    if SENSITIVE_KEYS.contains(&lowered.as_str()) {
                        (key, Value::String(REDACTED.to_string()))
                    } else {
                        (key, sanitize_for_logging(value))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_for_logging).collect()),
        other => other,
    }
}

/// Startup checks on payment-related configuration; each entry is logged as a warning.
pub fn configuration_warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    if config.stripe.is_demo() {
        warnings.push("Stripe secret key not configured, payment intents run in demo mode".into());
    }
    if config.is_production() && config.stripe.uses_test_keys() {
        warnings.push("Stripe test keys are in use in production".into());
    }
    match config.stripe.publishable_key.as_deref() {
        None => warnings.push("Stripe publishable key not configured".into()),
        Some(key) if config.is_production() && key.starts_with("pk_test_") => {
            warnings.push("Stripe publishable key is a test key in production".into());
        }
        Some(_) => {}
    }
    if config.stripe.webhook_secret.is_none() {
        warnings.push("Stripe webhook secret not configured, webhooks will be rejected".into());
    }
    if !config.smtp.is_configured() {
        warnings.push("SMTP credentials not configured, confirmation emails are disabled".into());
    }
    if config.is_production() && !config.security.require_secure_connection {
        warnings.push("Secure connection enforcement is disabled in production".into());
    }
    warnings
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;
    use serde_json::json;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn secure_connection_rules() {
        let config = SecurityConfig::default();
        assert!(is_connection_secure(&headers(&[("x-forwarded-proto", "https")]), &config));
        assert!(is_connection_secure(&headers(&[("host", "localhost:3000")]), &config));
        assert!(!is_connection_secure(&headers(&[("host", "shop.example.com")]), &config));

        let relaxed = SecurityConfig {
            require_secure_connection: false,
            ..SecurityConfig::default()
        };
        assert!(is_connection_secure(&HeaderMap::new(), &relaxed));
    }

    #[test]
    fn header_validation() {
        let config = SecurityConfig::default();
        let good = headers(&[
            ("content-type", "application/json; charset=utf-8"),
            ("user-agent", "test"),
            ("origin", "http://localhost:3000"),
        ]);
        assert!(validate_request_headers(&good, &config, true).is_ok());

        let foreign = headers(&[
            ("content-type", "application/json"),
            ("user-agent", "test"),
            ("origin", "https://evil.example"),
        ]);
        assert!(validate_request_headers(&foreign, &config, false).is_ok());
        assert_eq!(
            validate_request_headers(&foreign, &config, true),
            Err(vec!["Origin not allowed".to_string()])
        );

        let errors = validate_request_headers(&headers(&[("origin", "not a url")]), &config, false)
            .expect_err("invalid");
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn client_identifier_precedence() {
        assert_eq!(
            client_identifier(&headers(&[
                ("x-forwarded-for", "203.0.113.7, 10.0.0.1"),
                ("x-real-ip", "10.0.0.2")
            ])),
            "client:203.0.113.7"
        );
        assert_eq!(
            client_identifier(&headers(&[("x-real-ip", "10.0.0.2")])),
            "client:10.0.0.2"
        );
        assert_eq!(client_identifier(&HeaderMap::new()), "client:unknown");
    }

    #[test]
    fn warns_about_stripe_keys() {
        let mut config = crate::testing::config("whsec_test");
        let warnings = configuration_warnings(&config);
        assert!(warnings.iter().any(|w| w.contains("demo mode")));
        assert!(warnings.contains(&"Stripe publishable key not configured".to_string()));

        config.env = crate::config::AppEnv::Production;
        config.stripe.publishable_key = Some("pk_test_123".into());
        let warnings = configuration_warnings(&config);
        assert!(warnings.contains(&"Stripe publishable key is a test key in production".to_string()));
        assert!(!warnings.iter().any(|w| w.contains("webhook secret")));
    }

    #[test]
    fn redacts_nested_sensitive_keys() {
        let cleaned = sanitize_for_logging(json!({
            "customerEmail": "ada@example.com",
            "token": "abc",
            "nested": {"Secret": "s", "items": [{"password": "p"}]}
        }));
        assert_eq!(cleaned["customerEmail"], "ada@example.com");
        assert_eq!(cleaned["token"], REDACTED);
        assert_eq!(cleaned["nested"]["Secret"], REDACTED);
        assert_eq!(cleaned["nested"]["items"][0]["password"], REDACTED);
    }
}
