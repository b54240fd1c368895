use std::sync::Arc;

use axum::{
    body::Bytes,
    http::{HeaderMap, HeaderValue},
};
use hmac::{Hmac, Mac};
use putter_shop_api::{
    db::{create_pool, run_migrations},
    dto::{
        emails::EmailSentQuery,
        orders::{ConfirmOrderRequest, PaymentIntentQuery, SaveOrderRequest},
        payments::OrderData,
    },
    models::OrderStatus,
    services::{email_service, order_service, webhook_service},
    state::AppState,
    store::PgStore,
    testing::{self, RecordingMailer},
};
use rust_decimal::Decimal;
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

const WEBHOOK_SECRET: &str = "whsec_flow";

// Integration flow against Postgres: save -> save again -> confirm -> webhook -> email status.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn save_confirm_and_webhook_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let mailer = Arc::new(RecordingMailer::new());
    let state = setup_state(&database_url).await?.with_mailer(mailer.clone());
    let payment_intent_id = format!("pi_flow_{}", Uuid::new_v4().simple());
    let order_id = Uuid::new_v4();

    // Save, then save again with the same intent
    let first = order_service::save_order(&state, "flow", save_request(&payment_intent_id, order_id))
        .await?;
    assert_eq!(first.order_id, order_id);
    assert_eq!(first.duplicate, None);

    let second = order_service::save_order(&state, "flow", save_request(&payment_intent_id, order_id))
        .await?;
    assert_eq!(second.order_id, order_id);
    assert_eq!(second.duplicate, Some(true));

    let detail = order_service::order_by_payment_intent(
        &state,
        PaymentIntentQuery {
            payment_intent_id: Some(payment_intent_id.clone()),
        },
    )
    .await?;
    assert_eq!(detail.order.items.len(), 1);
    assert_eq!(detail.order.total_amount, Decimal::new(29999, 2));

    // Confirm resolves to the saved order and sends exactly one email
    for _ in 0..2 {
        let confirmed = order_service::confirm_order(&state, confirm_request(&payment_intent_id)).await?;
        assert_eq!(confirmed.db_order_id, Some(order_id));
        assert_eq!(confirmed.duplicate, Some(true));
    }
    assert_eq!(mailer.sent().len(), 1);

    // Webhook moves the order to paid
    let event = json!({
        "id": "evt_flow",
        "type": "payment_intent.succeeded",
        "data": {"object": {"id": payment_intent_id, "metadata": {"orderId": order_id}}}
    })
    .to_string();
    let ack = webhook_service::handle_stripe_webhook(&state, &signed_headers(&event), Bytes::from(event))
        .await?;
    assert!(ack.received);

    let check = order_service::check_order(
        &state,
        PaymentIntentQuery {
            payment_intent_id: Some(payment_intent_id.clone()),
        },
    )
    .await?;
    assert_eq!(check.order_id, Some(order_id));
    assert_eq!(check.status, Some(OrderStatus::Paid));

    let email = email_service::confirmation_status(
        &state,
        EmailSentQuery {
            order_id: Some(order_id.to_string()),
            email: Some("ada@example.com".into()),
        },
    )
    .await?;
    assert!(email.email_sent);

    // Concurrent saves and confirms for a fresh intent land on one row
    let race_intent = format!("pi_race_{}", Uuid::new_v4().simple());
    let mut tasks = Vec::new();
    for attempt in 0..8 {
        let state = state.clone();
        let race_intent = race_intent.clone();
        tasks.push(tokio::spawn(async move {
            if attempt % 2 == 0 {
                let mut request = save_request(&race_intent, Uuid::new_v4());
                request.order_id = None;
                if let Some(data) = request.order_data.as_mut() {
                    data.customer_email = Some("grace@example.com".into());
                }
                request.total_amount = Some(Decimal::new(18950, 2));
                order_service::save_order(&state, "flow", request)
                    .await
                    .map(|saved| saved.order_id.to_string())
                    .map_err(|err| err.to_string())
            } else {
                let mut request = confirm_request(&race_intent);
                request.customer_email = Some("grace@example.com".into());
                request.total_price = Some(Decimal::new(18950, 2));
                order_service::confirm_order(&state, request)
                    .await
                    .map(|confirmed| {
                        confirmed
                            .db_order_id
                            .map(|id| id.to_string())
                            .or(confirmed.order_id)
                            .unwrap_or_default()
                    })
                    .map_err(|err| err.to_string())
            }
        }));
    }

    let mut race_ids = std::collections::HashSet::new();
    for task in tasks {
        let id = task.await?.map_err(anyhow::Error::msg)?;
        race_ids.insert(id);
    }
    assert_eq!(race_ids.len(), 1);

    let raced = order_service::check_order(
        &state,
        PaymentIntentQuery {
            payment_intent_id: Some(race_intent),
        },
    )
    .await?;
    let raced_id = raced.order_id.map(|id| id.to_string());
    assert_eq!(race_ids.into_iter().next(), raced_id);

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;

    // Clean tables between runs
    sqlx::query("TRUNCATE TABLE order_items, orders, email_logs, audit_logs CASCADE")
        .execute(&pool)
        .await?;

    Ok(AppState::new(
        testing::config(WEBHOOK_SECRET),
        Arc::new(PgStore::new(pool)),
    ))
}

fn save_request(payment_intent_id: &str, order_id: Uuid) -> SaveOrderRequest {
    SaveOrderRequest {
        payment_intent_id: Some(payment_intent_id.to_string()),
        order_id: Some(order_id),
        order_data: Some(OrderData {
            customer_name: Some("Ada Lovelace".into()),
            customer_email: Some("ada@example.com".into()),
            face_deck: Some(json!({"name": "Copper"})),
            weight_system: Some(json!("Balanced 350g")),
            ..OrderData::default()
        }),
        shipping_address: None,
        billing_address: None,
        total_amount: Some(Decimal::new(29999, 2)),
        currency: Some("usd".into()),
    }
}

fn confirm_request(payment_intent_id: &str) -> ConfirmOrderRequest {
    ConfirmOrderRequest {
        customer_name: Some("Ada Lovelace".into()),
        customer_email: Some("ada@example.com".into()),
        order_id: Some("web-flow".into()),
        total_price: Some(Decimal::new(29999, 2)),
        order_date: None,
        order_items: None,
        face_deck: Some("Copper".into()),
        weight_system: Some("Balanced 350g".into()),
        payment_intent_id: Some(payment_intent_id.to_string()),
        skip_order_creation: false,
    }
}

fn signed_headers(payload: &str) -> HeaderMap {
    let timestamp = chrono::Utc::now().timestamp();
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("hmac key");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload.as_bytes());
    let signature = format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()));

    let mut headers = HeaderMap::new();
    headers.insert(
        "stripe-signature",
        HeaderValue::from_str(&signature).expect("header value"),
    );
    headers
}
