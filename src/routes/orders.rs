use axum::{
    Router,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};

use crate::{
    dto::orders::{
        ConfirmOrderRequest, ConfirmOrderResponse, OrderCheckResponse, OrderDetailResponse,
        OrderList, PaymentIntentQuery, SaveOrderRequest, SaveOrderResponse,
    },
    error::AppResult,
    extract::{Json, Query},
    response::ErrorBody,
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/save-order", post(save_order))
        .route("/confirm-order", post(confirm_order))
        .route("/orders", get(list_orders))
        .route("/orders/check", get(check_order))
        .route("/orders/by-payment-intent", get(order_by_payment_intent))
}

#[utoipa::path(
    post,
    path = "/api/save-order",
    request_body = SaveOrderRequest,
    params(("x-client-id" = Option<String>, Header, description = "Client identifier for auditing")),
    responses(
        (status = 200, description = "Order saved, or the existing order for this payment intent", body = SaveOrderResponse),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 500, description = "Database failure", body = ErrorBody)
    ),
    tag = "Orders"
)]
pub async fn save_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SaveOrderRequest>,
) -> AppResult<Json<SaveOrderResponse>> {
    let client_id = headers
        .get("x-client-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or("unknown");
    let response = order_service::save_order(&state, client_id, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    post,
    path = "/api/confirm-order",
    request_body = ConfirmOrderRequest,
    responses(
        (status = 200, description = "Order confirmed", body = ConfirmOrderResponse),
        (status = 400, description = "Validation failed", body = ErrorBody),
        (status = 500, description = "Database failure, or email failure in email-only mode", body = ErrorBody)
    ),
    tag = "Orders"
)]
pub async fn confirm_order(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmOrderRequest>,
) -> AppResult<Json<ConfirmOrderResponse>> {
    let response = order_service::confirm_order(&state, payload).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/orders/check",
    params(PaymentIntentQuery),
    responses(
        (status = 200, description = "Whether an order exists for the payment intent", body = OrderCheckResponse),
        (status = 400, description = "Missing payment intent id", body = ErrorBody)
    ),
    tag = "Orders"
)]
pub async fn check_order(
    State(state): State<AppState>,
    Query(query): Query<PaymentIntentQuery>,
) -> AppResult<Json<OrderCheckResponse>> {
    let response = order_service::check_order(&state, query).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/orders/by-payment-intent",
    params(PaymentIntentQuery),
    responses(
        (status = 200, description = "Order with its items", body = OrderDetailResponse),
        (status = 400, description = "Missing payment intent id", body = ErrorBody),
        (status = 404, description = "No order for the payment intent", body = ErrorBody)
    ),
    tag = "Orders"
)]
pub async fn order_by_payment_intent(
    State(state): State<AppState>,
    Query(query): Query<PaymentIntentQuery>,
) -> AppResult<Json<OrderDetailResponse>> {
    let response = order_service::order_by_payment_intent(&state, query).await?;
    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders, newest first", body = OrderList),
        (status = 400, description = "Invalid filter", body = ErrorBody)
    ),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> AppResult<Json<OrderList>> {
    let response = order_service::list_orders(&state, query).await?;
    Ok(Json(response))
}
