use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::upstream::UpstreamError;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing configuration: {0}")]
    ConfigurationMissing(&'static str),

    /// Rejected request payload
    #[error("{0}")]
    Validation(String),

    #[error("AI service error: {0}")]
    Upstream(#[from] UpstreamError),
}

pub type Result<T> = std::result::Result<T, GateError>;

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = match &self {
            GateError::Validation(_) => StatusCode::BAD_REQUEST,
            GateError::Upstream(_) | GateError::ConfigurationMissing(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GateError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}
