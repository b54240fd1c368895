//! Stripe webhook processing: verify, then move the order to the status the
//! payment intent event implies.
//!
//! Events are applied in arrival order; a late `payment_failed` after
//! `succeeded` will overwrite `paid`.

use axum::{body::Bytes, http::HeaderMap};
use secrecy::ExposeSecret;
use uuid::Uuid;

use crate::{
    dto::payments::WebhookAck,
    error::{AppError, AppResult},
    models::{Order, OrderStatus},
    payments::stripe::{PaymentIntentObject, StripeEvent, verify_webhook_signature},
    state::AppState,
    store::StoreResult,
};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Order status a payment intent event maps to; `None` for events we ignore.
pub fn status_for_event(event_type: &str) -> Option<OrderStatus> {
    match event_type {
        "payment_intent.succeeded" => Some(OrderStatus::Paid),
        "payment_intent.payment_failed" => Some(OrderStatus::PaymentFailed),
        "payment_intent.canceled" => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

pub async fn handle_stripe_webhook(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
) -> AppResult<WebhookAck> {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        tracing::error!("missing stripe signature");
        return Err(AppError::validation("Missing signature"));
    };

    let Some(secret) = state.config.stripe.webhook_secret.as_ref() else {
        tracing::error!("webhook secret not configured");
        return Err(AppError::validation("Invalid signature"));
    };

    let now = chrono::Utc::now().timestamp();
    if let Err(err) = verify_webhook_signature(&body, signature, secret.expose_secret(), now) {
        tracing::error!(error = %err, "webhook signature verification failed");
        return Err(AppError::validation("Invalid signature"));
    }

    let event: StripeEvent = serde_json::from_slice(&body).map_err(|err| {
        tracing::error!(error = %err, "webhook payload is not a stripe event");
        AppError::validation("Invalid payload")
    })?;
    tracing::info!(event_type = %event.event_type, event_id = ?event.id, "stripe webhook received");

    let Some(status) = status_for_event(&event.event_type) else {
        tracing::info!(event_type = %event.event_type, "unhandled event type");
        return Ok(WebhookAck { received: true });
    };

    let intent: PaymentIntentObject = match serde_json::from_value(event.data.object) {
        Ok(intent) => intent,
        Err(err) => {
            tracing::error!(error = %err, "payment intent object could not be parsed");
            return Ok(WebhookAck { received: true });
        }
    };

    let Some(order_ref) = intent.metadata.get("orderId").filter(|id| !id.is_empty()) else {
        tracing::error!(payment_intent_id = %intent.id, "payment intent has no orderId metadata");
        return Ok(WebhookAck { received: true });
    };

    match apply_status(state, order_ref, &intent.id, status).await {
        Ok(Some(order)) => {
            tracing::info!(order_id = %order.id, status = %order.status, "order status updated");
        }
        Ok(None) => {
            tracing::warn!(
                order_ref = %order_ref,
                payment_intent_id = %intent.id,
                "no order found for payment intent event"
            );
        }
        Err(err) => {
            tracing::error!(error = %err, order_ref = %order_ref, "failed to update order status");
        }
    }

    Ok(WebhookAck { received: true })
}

/// Locate the order by its id, falling back to the intent id when the
/// metadata reference is not a known order id.
async fn apply_status(
    state: &AppState,
    order_ref: &str,
    payment_intent_id: &str,
    status: OrderStatus,
) -> StoreResult<Option<Order>> {
    if let Ok(id) = order_ref.parse::<Uuid>()
        && let Some(order) = state
            .orders
            .update_status(id, status, Some(payment_intent_id))
            .await?
    {
        return Ok(Some(order));
    }

    state
        .orders
        .update_status_by_payment_intent(payment_intent_id, status)
        .await
}
