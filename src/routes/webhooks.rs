use axum::{Router, body::Bytes, extract::State, http::HeaderMap, routing::post};

use crate::{
    dto::payments::WebhookAck, error::AppResult, extract::Json, response::ErrorBody,
    services::webhook_service, state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/stripe", post(stripe_webhook))
}

#[utoipa::path(
    post,
    path = "/api/webhooks/stripe",
    params(("stripe-signature" = String, Header, description = "Stripe webhook signature")),
    request_body(content = String, description = "Raw Stripe event JSON", content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature", body = ErrorBody)
    ),
    tag = "Webhooks"
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<WebhookAck>> {
    let ack = webhook_service::handle_stripe_webhook(&state, &headers, body).await?;
    Ok(Json(ack))
}
