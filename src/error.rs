use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{payments::PaymentError, response::ErrorBody};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Too many requests, please try again later")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("{0}")]
    NotFound(String),

    /// Database failure; `detail` is only populated in development.
    #[error("{message}")]
    Persistence {
        message: String,
        detail: Option<String>,
    },

    #[error("{message}")]
    Email {
        message: String,
        detail: Option<String>,
    },

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Payment(err) => err.status(),
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Persistence { .. } | AppError::Email { .. } | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(format!("Invalid query: {}", rejection.body_text()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = match &self {
            AppError::Payment(err) => ErrorBody::new(err.public_message()),
            _ => ErrorBody::new(self.to_string()),
        };

        let mut retry_after = None;
        match &self {
            AppError::RateLimited { reset_at } => {
                body.allowed = Some(false);
                body.reset_time = Some(*reset_at);
                let secs = (*reset_at - Utc::now()).num_seconds().max(1);
                retry_after = Some(secs);
            }
            AppError::Persistence { detail, .. } | AppError::Email { detail, .. } => {
                body.details = detail.clone();
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal error");
            }
            _ => {}
        }

        let mut response = (status, axum::Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        );
        headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
        if let Some(secs) = retry_after
            && let Ok(value) = HeaderValue::from_str(&secs.to_string())
        {
            headers.insert(header::RETRY_AFTER, value);
        }
        response
    }
}

pub type AppResult<T> = Result<T, AppError>;
