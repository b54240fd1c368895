use axum::{Router, extract::State, routing::get};

use crate::{
    dto::emails::{EmailSentQuery, EmailSentResponse},
    error::AppResult,
    extract::{Json, Query},
    response::ErrorBody,
    services::email_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new().route("/emails/order-confirmation", get(order_confirmation_status))
}

#[utoipa::path(
    get,
    path = "/api/emails/order-confirmation",
    params(EmailSentQuery),
    responses(
        (status = 200, description = "Whether the confirmation email was sent", body = EmailSentResponse),
        (status = 400, description = "Missing orderId or email", body = ErrorBody)
    ),
    tag = "Emails"
)]
pub async fn order_confirmation_status(
    State(state): State<AppState>,
    Query(query): Query<EmailSentQuery>,
) -> AppResult<Json<EmailSentResponse>> {
    let response = email_service::confirmation_status(&state, query).await?;
    Ok(Json(response))
}
