//! REST error surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

use crate::ops::OpError;

/// An error rendered as a JSON body with the matching status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Invalid input; 400.
    #[error("{0}")]
    BadRequest(String),

    /// Token refresh failed; 401.
    #[error("{0}")]
    Unauthenticated(String),

    /// Upstream failure; 500.
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Unauthenticated(message) => (StatusCode::UNAUTHORIZED, message),
            Self::Internal(message) => {
                tracing::error!(error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<OpError> for ApiError {
    fn from(error: OpError) -> Self {
        match error {
            OpError::InvalidInput(message) => Self::BadRequest(message),
            OpError::Token(error) => Self::Unauthenticated(error.to_string()),
            OpError::Imap(error) => Self::Internal(error.to_string()),
            OpError::Graph(error) => Self::Internal(error.to_string()),
        }
    }
}

impl From<protocol_detect::DetectError> for ApiError {
    fn from(error: protocol_detect::DetectError) -> Self {
        match error {
            protocol_detect::DetectError::MissingField(_)
            | protocol_detect::DetectError::UnsupportedProvider(_) => {
                Self::BadRequest(error.to_string())
            }
            protocol_detect::DetectError::Refresh(_) => Self::Unauthenticated(error.to_string()),
        }
    }
}

impl From<token_provider::TokenProviderError> for ApiError {
    fn from(error: token_provider::TokenProviderError) -> Self {
        Self::Unauthenticated(error.to_string())
    }
}
