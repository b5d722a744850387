//! HTTP error mapping
//!
//! Every failure leaves the gateway as `{ "error": "<message>" }` with a
//! status that says whose fault it was.

use axum::extract::rejection::BytesRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use prompt_relay::RelayError;
use relay_config::Environment;
use serde::Serialize;

/// Error body shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Content type must be {0}")]
    ContentType(String),

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Too many requests, please try again later")]
    RateLimited { retry_after_secs: u64 },

    #[error("{message}")]
    Relay {
        #[source]
        source: RelayError,
        message: String,
    },
}

impl ApiError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        ApiError::InvalidRequest(message.into())
    }

    /// Wrap a relay failure, choosing the caller-visible message for `environment`
    pub fn from_relay(source: RelayError, environment: Environment) -> Self {
        let message = source.public_message(environment);
        ApiError::Relay { source, message }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest(_) | ApiError::ContentType(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Relay { source, .. } if source.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Relay { source, .. } if source.is_upstream_fault() => StatusCode::BAD_GATEWAY,
            ApiError::Relay { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Body buffering failures, including the configured size limit
impl From<BytesRejection> for ApiError {
    fn from(rejection: BytesRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::InvalidRequest(rejection.body_text())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            ApiError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let mut response = (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response();

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}
