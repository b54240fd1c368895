use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};

use crate::{
    dto::payments::{CreatePaymentIntentRequest, CreatePaymentIntentResponse},
    error::AppResult,
    extract::Json,
    response::ErrorBody,
    services::payment_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/create-payment-intent", post(create_payment_intent))
}

/// The body is read raw so transport, header and rate-limit checks run
/// before it is parsed.
#[utoipa::path(
    post,
    path = "/api/create-payment-intent",
    request_body = CreatePaymentIntentRequest,
    responses(
        (status = 200, description = "Payment intent created, or demo mode response", body = CreatePaymentIntentResponse),
        (status = 400, description = "Insecure connection, bad headers or invalid payload", body = ErrorBody),
        (status = 429, description = "Rate limit exceeded", body = ErrorBody),
        (status = 503, description = "Payment provider unavailable", body = ErrorBody)
    ),
    tag = "Payments"
)]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<CreatePaymentIntentResponse>> {
    let response = payment_service::create_payment_intent(&state, &headers, body).await?;
    Ok(Json(response))
}
