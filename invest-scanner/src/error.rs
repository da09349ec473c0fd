//! Error types for the scanner HTTP API.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::data::ProviderError;
use crate::screener::ScanError;

/// Scanner API errors.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Market data provider failure
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Request validation, configuration and service-level failures
    #[error(transparent)]
    Service(#[from] invest_common::Error),
}

impl ApiError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Service(invest_common::Error::InvalidInput(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Service(invest_common::Error::NotFound(message.into()))
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Provider(e) => match e {
                ProviderError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
                ProviderError::DataNotAvailable(_) => (StatusCode::NOT_FOUND, "DATA_NOT_AVAILABLE"),
                ProviderError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "PROVIDER_TIMEOUT"),
                ProviderError::RateLimited { .. } => {
                    (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_RATE_LIMITED")
                }
                ProviderError::Unavailable(_) => (StatusCode::BAD_GATEWAY, "PROVIDER_UNAVAILABLE"),
                _ => (StatusCode::BAD_GATEWAY, "PROVIDER_ERROR"),
            },
            ApiError::Service(e) => (
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
                e.code(),
            ),
        }
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::CandidatesUnavailable(_) => {
                Self::Service(invest_common::Error::Unavailable(err.to_string()))
            }
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

/// Error body returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::warn!(code, error = %self, "Request failed");
        }

        let body = serde_json::json!({
            "success": false,
            "error": ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ApiError::invalid("days must be greater than 0");
        assert_eq!(err.to_string(), "Invalid input: days must be greater than 0");

        let err = ApiError::from(ProviderError::Upstream("No data found".into()));
        assert_eq!(err.to_string(), "Upstream error: No data found");
    }

    #[test]
    fn test_error_into_response() {
        let response = ApiError::invalid("bad").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::not_found("/nope").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError::from(ProviderError::Unavailable("exit 1".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = ApiError::from(ProviderError::Malformed("volume".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = ApiError::from(ProviderError::Timeout("60s".into())).into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_service_errors_keep_context_status() {
        let err = invest_common::Error::Config("unsupported market 'LSE'".into())
            .with_context("building scan request");
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_scan_error_maps_to_unavailable() {
        let err = ApiError::from(ScanError::CandidatesUnavailable(ProviderError::Network(
            "reset".into(),
        )));
        assert_eq!(err.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
