use axum::{
    Json, Router,
    http::{HeaderName, Method, StatusCode, Uri, header},
    routing::get,
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
};

use crate::{response::ErrorBody, state::AppState};

pub mod doc;
pub mod emails;
pub mod health;
pub mod orders;
pub mod params;
pub mod payments;
pub mod webhooks;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .merge(payments::router())
        .merge(orders::router())
        .merge(webhooks::router())
        .merge(emails::router())
}

/// Full application: `/health`, `/api/*`, `/docs`, with body limit and CORS.
/// Tracing and request-id layers are added by the binary.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("stripe-signature"),
            HeaderName::from_static("x-client-id"),
            HeaderName::from_static("x-request-id"),
        ]);

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", create_api_router())
        .merge(doc::scalar_docs())
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(cors)
        .with_state(state)
}

async fn not_found(uri: Uri) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody::new(format!("Not Found: {}", uri.path()))),
    )
}
