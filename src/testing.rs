//! In-process fakes for the outbound seams. Only the tests build these; the
//! server binary always wires the real Stripe and SMTP clients.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use secrecy::SecretString;

use crate::{
    config::{AppConfig, AppEnv, SecurityConfig, SmtpConfig, StripeConfig},
    email::{EmailError, Mailer, OutgoingEmail},
    payments::{CreateIntent, PaymentError, PaymentGateway, PaymentIntent},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Configuration for a test environment: demo Stripe, no SMTP, plain HTTP
/// allowed and `webhook_secret` as the webhook signing secret.
pub fn config(webhook_secret: &str) -> AppConfig {
    AppConfig {
        database_url: String::new(),
        host: "127.0.0.1".to_string(),
        port: 0,
        env: AppEnv::Test,
        base_url: "http://localhost".to_string(),
        stripe: StripeConfig {
            secret_key: None,
            publishable_key: None,
            webhook_secret: Some(SecretString::from(webhook_secret.to_string())),
            api_base: "http://127.0.0.1:0".to_string(),
        },
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 25,
            username: None,
            password: None,
            from_name: "DVIT GOLF".to_string(),
        },
        security: SecurityConfig {
            require_secure_connection: false,
            ..SecurityConfig::default()
        },
        fuzzy_order_match: true,
    }
}

/// Mailer that keeps every message instead of delivering it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    failing: Mutex<bool>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every later `send` fails with a delivery error while set.
    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        if *lock(&self.failing) {
            return Err(EmailError::Delivery("mailbox unavailable".to_string()));
        }
        lock(&self.sent).push(email);
        Ok(())
    }
}

/// Gateway answering with sequential `pi_test_N` intents.
#[derive(Default)]
pub struct FakePaymentGateway {
    calls: Mutex<Vec<CreateIntent>>,
    next_error: Mutex<Option<PaymentError>>,
}

impl FakePaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next call fails with `err`; later calls succeed again.
    pub fn fail_next(&self, err: PaymentError) {
        *lock(&self.next_error) = Some(err);
    }

    pub fn calls(&self) -> Vec<CreateIntent> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl PaymentGateway for FakePaymentGateway {
    async fn create_payment_intent(
        &self,
        params: CreateIntent,
    ) -> Result<PaymentIntent, PaymentError> {
        if let Some(err) = lock(&self.next_error).take() {
            return Err(err);
        }
        let mut calls = lock(&self.calls);
        calls.push(params.clone());
        let id = format!("pi_test_{}", calls.len());
        Ok(PaymentIntent {
            client_secret: format!("{id}_secret"),
            id,
            amount: params.amount,
            currency: params.currency,
        })
    }
}
