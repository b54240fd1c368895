use std::collections::HashMap;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::payments::{CreateIntent, PaymentError, PaymentGateway, PaymentIntent};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp, in seconds.
pub const WEBHOOK_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    id: String,
    client_secret: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    message: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: String,
}

impl StripeClient {
    pub fn new(secret_key: SecretString, api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            secret_key,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_payment_intent(
        &self,
        params: CreateIntent,
    ) -> Result<PaymentIntent, PaymentError> {
        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), params.amount.to_string()),
            ("currency".into(), params.currency.to_ascii_lowercase()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
            ("description".into(), params.description),
        ];
        if let Some(email) = params.receipt_email {
            form.push(("receipt_email".into(), email));
        }
        form.extend(
            params
                .metadata
                .into_iter()
                .map(|(key, value)| (format!("metadata[{key}]"), value)),
        );

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .basic_auth(self.secret_key.expose_secret(), None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| PaymentError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status.as_u16(), &body));
        }

        let intent: PaymentIntentResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Other(format!("failed to parse Stripe response: {e}")))?;

        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
            amount: intent.amount,
            currency: intent.currency,
        })
    }
}

fn classify_error(status: u16, body: &str) -> PaymentError {
    let (kind, message) = match serde_json::from_str::<StripeErrorEnvelope>(body) {
        Ok(envelope) => (
            envelope.error.kind.unwrap_or_default(),
            envelope.error.message.unwrap_or_else(|| body.to_string()),
        ),
        Err(_) => (String::new(), body.to_string()),
    };

    match (status, kind.as_str()) {
        (429, _) | (_, "rate_limit_error") => PaymentError::RateLimited(message),
        (_, "card_error") => PaymentError::Card(message),
        (_, "invalid_request_error") => PaymentError::InvalidRequest(message),
        (_, "api_error") => PaymentError::Unavailable(message),
        (500.., _) => PaymentError::Unavailable(message),
        _ => PaymentError::Other(message),
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,

    #[error("timestamp outside tolerance")]
    Expired,

    #[error("no matching v1 signature")]
    Mismatch,
}

/// Verifies a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=..]`) against
/// the raw request body. Any `v1` entry may match.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        if let Some(t) = part.trim().strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(sig) = part.trim().strip_prefix("v1=") {
            candidates.push(sig);
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    let issued: i64 = timestamp.parse().map_err(|_| SignatureError::Malformed)?;
    if (now - issued).abs() > WEBHOOK_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    let matched = candidates.iter().any(|candidate| {
        candidate.len() == expected.len() && bool::from(expected.as_bytes().ct_eq(candidate.as_bytes()))
    });
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Webhook envelope; `data.object` is parsed per event type.
#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
pub(crate) fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::{Form, Router, http::StatusCode, routing::post};

    use super::*;

    const SECRET: &str = "whsec_test";

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"type":"payment_intent.succeeded"}"#;
        let header = sign_payload(body, SECRET, 1_700_000_000);
        assert_eq!(
            verify_webhook_signature(body, &header, SECRET, 1_700_000_100),
            Ok(())
        );
    }

    #[test]
    fn any_v1_entry_may_match() {
        let body = b"{}";
        let signed = sign_payload(body, SECRET, 1_700_000_000);
        let good = signed.split("v1=").nth(1).expect("v1");
        let header = format!("t=1700000000,v1={},v1={good}", "0".repeat(64));
        assert!(verify_webhook_signature(body, &header, SECRET, 1_700_000_000).is_ok());
    }

    #[test]
    fn rejects_tampered_body_and_stale_timestamp() {
        let header = sign_payload(b"{}", SECRET, 1_700_000_000);
        assert_eq!(
            verify_webhook_signature(b"{ }", &header, SECRET, 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            verify_webhook_signature(b"{}", &header, SECRET, 1_700_000_301),
            Err(SignatureError::Expired)
        );
        assert_eq!(
            verify_webhook_signature(b"{}", "v1=abc", SECRET, 0),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn error_classification() {
        let card = r#"{"error":{"type":"card_error","message":"declined"}}"#;
        assert!(matches!(classify_error(402, card), PaymentError::Card(m) if m == "declined"));
        assert!(matches!(classify_error(429, "{}"), PaymentError::RateLimited(_)));
        assert!(matches!(
            classify_error(400, r#"{"error":{"type":"invalid_request_error"}}"#),
            PaymentError::InvalidRequest(_)
        ));
        assert!(matches!(classify_error(502, "bad gateway"), PaymentError::Unavailable(_)));
        assert!(matches!(classify_error(401, "nope"), PaymentError::Other(_)));
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn creates_intent_with_form_encoded_metadata() {
        let router = Router::new().route(
            "/v1/payment_intents",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(form.get("amount").map(String::as_str), Some("29999"));
                assert_eq!(
                    form.get("automatic_payment_methods[enabled]").map(String::as_str),
                    Some("true")
                );
                assert_eq!(
                    form.get("metadata[orderId]").map(String::as_str),
                    Some("order-1")
                );
                axum::Json(serde_json::json!({
                    "id": "pi_123",
                    "client_secret": "pi_123_secret",
                    "amount": 29999,
                    "currency": "usd"
                }))
            }),
        );
        let base = serve(router).await;
        let client = StripeClient::new(SecretString::from("sk_test_live_like"), base);

        let intent = client
            .create_payment_intent(CreateIntent {
                amount: 29999,
                currency: "usd".into(),
                receipt_email: Some("ada@example.com".into()),
                description: "Modular putter".into(),
                metadata: BTreeMap::from([("orderId".to_string(), "order-1".to_string())]),
            })
            .await
            .expect("intent");
        assert_eq!(intent.id, "pi_123");
        assert_eq!(intent.client_secret, "pi_123_secret");
    }

    #[tokio::test]
    async fn maps_provider_error_response() {
        let router = Router::new().route(
            "/v1/payment_intents",
            post(|| async {
                (
                    StatusCode::PAYMENT_REQUIRED,
                    axum::Json(serde_json::json!({
                        "error": {"type": "card_error", "message": "Your card was declined."}
                    })),
                )
            }),
        );
        let base = serve(router).await;
        let client = StripeClient::new(SecretString::from("sk_test_x"), base);

        let err = client
            .create_payment_intent(CreateIntent {
                amount: 100,
                currency: "usd".into(),
                receipt_email: None,
                description: "x".into(),
                metadata: BTreeMap::new(),
            })
            .await
            .expect_err("card error");
        assert!(matches!(err, PaymentError::Card(_)));
    }
}
