use std::collections::BTreeMap;

use async_trait::async_trait;
use axum::http::StatusCode;
use thiserror::Error;

pub mod stripe;

pub use stripe::StripeClient;

/// Parameters for a new payment intent. `amount` is in minor units.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIntent {
    pub amount: i64,
    pub currency: String,
    pub receipt_email: Option<String>,
    pub description: String,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("card error: {0}")]
    Card(String),

    #[error("provider rate limit: {0}")]
    RateLimited(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("payment provider error: {0}")]
    Other(String),
}

impl PaymentError {
    pub fn status(&self) -> StatusCode {
        match self {
            PaymentError::Card(_) | PaymentError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PaymentError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            PaymentError::Unavailable(_) | PaymentError::Transport(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            PaymentError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to the shopper; provider detail stays in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            PaymentError::Card(_) => {
                "There is a problem with the card details, please check and try again"
            }
            PaymentError::RateLimited(_) => "Too many requests, please try again later",
            PaymentError::InvalidRequest(_) => {
                "Invalid payment request, please check the order details"
            }
            PaymentError::Unavailable(_) | PaymentError::Transport(_) => {
                "Payment service is temporarily unavailable, please try again later"
            }
            PaymentError::Other(_) => "Failed to create payment intent, please try again",
        }
    }
}

/// Outbound payment provider. `None` in `AppState` means demo mode.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment_intent(&self, params: CreateIntent)
    -> Result<PaymentIntent, PaymentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_map_to_http_status() {
        assert_eq!(PaymentError::Card("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            PaymentError::RateLimited("x".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            PaymentError::InvalidRequest("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PaymentError::Transport("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            PaymentError::Unavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            PaymentError::Other("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
