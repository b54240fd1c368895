mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{LogCapture, TestApp, WEBHOOK_SECRET, json_request, order_data};
use putter_shop_api::{payments::PaymentError, testing};
use serde_json::json;

#[tokio::test]
async fn demo_mode_returns_stand_in_intent() {
    let app = TestApp::demo();
    let (status, body) = app
        .post_json(
            "/api/create-payment-intent",
            &json!({"amount": 299.99, "orderData": order_data("ada@example.com")}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["demoMode"], true);
    assert!(body["paymentIntentId"].as_str().unwrap().starts_with("pi_demo_"));
    assert!(app.gateway.calls().is_empty());
}

#[tokio::test]
async fn live_intent_carries_order_id_in_metadata() {
    let app = TestApp::new();
    let (status, body) = app
        .post_json(
            "/api/create-payment-intent",
            &json!({"amount": 299.99, "currency": "USD", "orderData": order_data("ada@example.com")}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paymentIntentId"], "pi_test_1");
    assert_eq!(body["clientSecret"], "pi_test_1_secret");
    assert_eq!(body["currency"], "usd");

    let calls = app.gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].amount, 29999);
    assert_eq!(calls[0].receipt_email.as_deref(), Some("ada@example.com"));
    assert_eq!(calls[0].metadata["orderId"], body["orderId"].as_str().unwrap());
    assert_eq!(calls[0].metadata["city"], "Scottsdale");
}

#[tokio::test]
async fn amount_validation_rejects_before_calling_stripe() {
    let app = TestApp::new();

    let (status, body) = app
        .post_json(
            "/api/create-payment-intent",
            &json!({"amount": 19.999, "orderData": order_data("ada@example.com")}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "Payment amount cannot have more than 2 decimal places"
    );
    assert_eq!(body["success"], false);

    let (status, body) = app
        .post_json(
            "/api/create-payment-intent",
            &json!({"amount": 0, "orderData": order_data("ada@example.com")}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Payment amount must be greater than 0");

    let (status, body) = app
        .post_json("/api/create-payment-intent", &json!({"amount": 19.99}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Order data is required");

    assert!(app.gateway.calls().is_empty());
}

#[tokio::test]
async fn unsupported_currency_is_rejected() {
    let app = TestApp::new();
    let (status, body) = app
        .post_json(
            "/api/create-payment-intent",
            &json!({"amount": 50, "currency": "eur", "orderData": order_data("ada@example.com")}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Currency eur is not supported");
}

#[tokio::test]
async fn malformed_body_is_logged_with_request_id() {
    let logs = LogCapture::default();
    let _guard = tracing::subscriber::set_default(logs.subscriber());
    let app = TestApp::new();
    let request = json_request("/api/create-payment-intent")
        .header("x-request-id", "req-42")
        .body(Body::from("{\"amount\": 50,"))
        .unwrap();

    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(
        body["error"]
            .as_str()
            .is_some_and(|e| e.starts_with("Invalid request body")),
        "{body}"
    );
    assert!(app.gateway.calls().is_empty());

    let output = logs.contents();
    let line = output
        .lines()
        .find(|line| line.contains("payment intent body rejected"))
        .expect("rejection logged");
    assert!(line.contains("WARN"), "{line}");
    assert!(line.contains("request_id=req-42"), "{line}");
}

#[tokio::test]
async fn requests_without_user_agent_are_rejected() {
    let app = TestApp::new();
    let request = Request::post("/api/create-payment-intent")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({"amount": 50, "orderData": order_data("ada@example.com")}).to_string(),
        ))
        .unwrap();

    let (status, headers, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request format");
    assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
}

#[tokio::test]
async fn sixth_request_in_window_is_rate_limited() {
    let app = TestApp::demo();
    let payload = json!({"amount": 25, "orderData": order_data("ada@example.com")});

    for _ in 0..5 {
        let (status, _) = app.post_json("/api/create-payment-intent", &payload).await;
        assert_eq!(status, StatusCode::OK);
    }

    let request = json_request("/api/create-payment-intent")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, headers, body) = app.send(request).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["allowed"], false);
    assert!(body["resetTime"].is_string());
    assert!(headers.contains_key(header::RETRY_AFTER));

    // Other clients keep their own window.
    let other = Request::post("/api/create-payment-intent")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "Mozilla/5.0 (test)")
        .header("x-forwarded-for", "198.51.100.9")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, _, _) = app.send(other).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn plain_http_is_refused_when_secure_connection_required() {
    let mut config = testing::config(WEBHOOK_SECRET);
    config.security.require_secure_connection = true;
    let app = TestApp::with_config(config);
    let payload = json!({"amount": 25, "orderData": order_data("ada@example.com")});

    let request = json_request("/api/create-payment-intent")
        .header(header::HOST, "shop.example.com")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, _, body) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Secure connection required");

    let request = json_request("/api/create-payment-intent")
        .header(header::HOST, "shop.example.com")
        .header("x-forwarded-proto", "https")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, _, _) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn provider_errors_map_to_public_messages() {
    let app = TestApp::new();
    let payload = json!({"amount": 25, "orderData": order_data("ada@example.com")});

    app.gateway
        .fail_next(PaymentError::Card("card_declined".to_string()));
    let (status, body) = app.post_json("/api/create-payment-intent", &payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["error"],
        "There is a problem with the card details, please check and try again"
    );

    app.gateway
        .fail_next(PaymentError::Unavailable("api down".to_string()));
    let (status, _) = app.post_json("/api/create-payment-intent", &payload).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = app.post_json("/api/create-payment-intent", &payload).await;
    assert_eq!(status, StatusCode::OK);
}
