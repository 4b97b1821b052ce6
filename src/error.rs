use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

/// Failures talking to the upstream provider. Always recovered by the gateways.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("upstream returned {status}: {message}")] Api { status: u16, message: String },
    #[error("decode error: {0}")] Decode(String),
}

/// Errors surfaced to HTTP callers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("a processing run is already in progress")]
    Busy,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Busy => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!("❌ Internal failure: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        Self::InvalidRequest(rejection.body_text())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self { Self::Internal(e.to_string()) }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self { Self::Internal(e.to_string()) }
}

/// Result of a call that may have degraded to a local fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Success(T),
    Degraded { data: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn into_data(self) -> T {
        match self {
            Self::Success(data) | Self::Degraded { data, .. } => data,
        }
    }

    pub fn is_degraded(&self) -> bool { matches!(self, Self::Degraded { .. }) }
}
