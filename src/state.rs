use std::sync::Arc;

use crate::{
    config::AppConfig,
    email::Mailer,
    error::AppError,
    payments::PaymentGateway,
    rate_limit::{InMemoryRateLimiter, RateLimiter},
    store::{AuditStore, EmailLogStore, OrderStore, StoreError},
};

/// Collaborators shared by every handler. `payments` is `None` in demo mode
/// and `mailer` is `None` when SMTP is not configured.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orders: Arc<dyn OrderStore>,
    pub email_logs: Arc<dyn EmailLogStore>,
    pub audit: Arc<dyn AuditStore>,
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub mailer: Option<Arc<dyn Mailer>>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    /// State backed by one store for orders, email logs and audit events,
    /// with the in-memory rate limiter sized from `config`.
    pub fn new<S>(config: AppConfig, store: Arc<S>) -> Self
    where
        S: OrderStore + EmailLogStore + AuditStore + 'static,
    {
        let rate_limiter = Arc::new(InMemoryRateLimiter::new(
            config.security.rate_limit_max_requests,
            config.security.rate_limit_window,
        ));
        Self {
            config: Arc::new(config),
            orders: store.clone(),
            email_logs: store.clone(),
            audit: store,
            payments: None,
            mailer: None,
            rate_limiter,
        }
    }

    pub fn with_payments(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.payments = Some(gateway);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<dyn RateLimiter>) -> Self {
        self.rate_limiter = limiter;
        self
    }

    /// Maps a store failure to a 500 carrying `message`, with the cause
    /// attached only when the environment exposes error details.
    pub fn persistence_error(&self, message: &str) -> impl FnOnce(StoreError) -> AppError + use<> {
        let message = message.to_string();
        let expose = self.config.expose_error_details();
        move |err| {
            tracing::error!(error = %err, "{message}");
            AppError::Persistence {
                message,
                detail: expose.then(|| err.to_string()),
            }
        }
    }
}
