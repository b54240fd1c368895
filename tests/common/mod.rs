#![allow(dead_code)]

use std::{
    io,
    sync::{Arc, Mutex},
};

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{HeaderMap, Request, StatusCode, header},
};
use hmac::{Hmac, Mac};
use putter_shop_api::{
    config::AppConfig,
    routes,
    state::AppState,
    store::MemoryStore,
    testing::{self, FakePaymentGateway, RecordingMailer},
};
use serde_json::{Value, json};
use sha2::Sha256;
use tower::ServiceExt;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub gateway: Arc<FakePaymentGateway>,
}

impl TestApp {
    /// Memory store, recording mailer and fake Stripe gateway.
    pub fn new() -> Self {
        Self::build(testing::config(WEBHOOK_SECRET), true)
    }

    /// No payment gateway: payment intents are answered in demo mode.
    pub fn demo() -> Self {
        Self::build(testing::config(WEBHOOK_SECRET), false)
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self::build(config, true)
    }

    fn build(config: AppConfig, live_payments: bool) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let gateway = Arc::new(FakePaymentGateway::new());

        let mut state = AppState::new(config, store.clone()).with_mailer(mailer.clone());
        if live_payments {
            state = state.with_payments(gateway.clone());
        }

        Self {
            router: routes::app(state),
            store,
            mailer,
            gateway,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    pub async fn post_json(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        let request = json_request(uri)
            .body(Body::from(body.to_string()))
            .expect("request");
        let (status, _, body) = self.send(request).await;
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri).body(Body::empty()).expect("request");
        let (status, _, body) = self.send(request).await;
        (status, body)
    }

    /// Posts `event` to the webhook endpoint with a valid signature.
    pub async fn post_webhook(&self, event: &Value) -> (StatusCode, Value) {
        let payload = event.to_string();
        let signature = sign(payload.as_bytes(), WEBHOOK_SECRET, chrono::Utc::now().timestamp());
        let request = Request::post("/api/webhooks/stripe")
            .header(header::CONTENT_TYPE, "application/json")
            .header("stripe-signature", signature)
            .body(Body::from(payload))
            .expect("request");
        let (status, _, body) = self.send(request).await;
        (status, body)
    }
}

/// Builder with the headers a browser checkout sends.
pub fn json_request(uri: &str) -> axum::http::request::Builder {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "Mozilla/5.0 (test)")
        .header("x-forwarded-for", "203.0.113.7")
}

pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac key");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

pub fn order_data(email: &str) -> Value {
    json!({
        "customerName": "Ada Lovelace",
        "customerEmail": email,
        "customerPhone": "+1 555 0100",
        "shippingAddress": {
            "address": "1 Fairway Dr",
            "city": "Scottsdale",
            "state": "AZ",
            "zipCode": "85251",
            "country": "US"
        },
        "faceDeck": {"name": "Copper"},
        "weightSystem": "Balanced 350g"
    })
}

pub fn save_request(payment_intent_id: &str, email: &str, amount: f64) -> Value {
    json!({
        "paymentIntentId": payment_intent_id,
        "orderData": order_data(email),
        "totalAmount": amount,
        "currency": "usd"
    })
}

pub fn confirm_request(order_id: &str, email: &str, amount: f64) -> Value {
    json!({
        "customerName": "Ada Lovelace",
        "customerEmail": email,
        "orderId": order_id,
        "totalPrice": amount,
        "faceDeck": "Copper",
        "weightSystem": "Balanced 350g"
    })
}

pub fn intent_event(event_type: &str, payment_intent_id: &str, metadata: Value) -> Value {
    json!({
        "id": format!("evt_{}", uuid::Uuid::new_v4().simple()),
        "type": event_type,
        "data": {
            "object": {
                "id": payment_intent_id,
                "object": "payment_intent",
                "metadata": metadata
            }
        }
    })
}

/// Collects formatted log lines for the current thread's subscriber.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let sink = self.clone();
        tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || sink.clone())
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().expect("log buffer")).into_owned()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
