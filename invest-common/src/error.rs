//! Error types shared by the stock-invest services.

use thiserror::Error;

/// Result type alias using the shared error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for service plumbing (config, startup, IO).
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input or request
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream market data source failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Service temporarily unavailable
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// Other error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an error with additional context.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) => 400,
            Self::Upstream(_) => 502,
            Self::Unavailable(_) => 503,
            Self::Timeout => 504,
            Self::WithContext { source, .. } => source.status_code(),
            _ => 500,
        }
    }

    /// Stable machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_REQUEST",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Unavailable(_) => "SERVICE_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::WithContext { source, .. } => source.code(),
            _ => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(Error::NotFound("test".into()).status_code(), 404);
        assert_eq!(Error::InvalidInput("test".into()).status_code(), 400);
        assert_eq!(Error::Upstream("test".into()).status_code(), 502);
        assert_eq!(Error::Unavailable("test".into()).status_code(), 503);
        assert_eq!(Error::Timeout.status_code(), 504);
        assert_eq!(Error::Internal("test".into()).status_code(), 500);
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::Upstream("scanner down".into());
        let with_ctx = err.with_context("fetching candidates");
        assert!(matches!(with_ctx, Error::WithContext { .. }));
        assert_eq!(with_ctx.status_code(), 502);
        assert_eq!(with_ctx.code(), "UPSTREAM_ERROR");
        assert_eq!(
            with_ctx.to_string(),
            "fetching candidates: Upstream error: scanner down"
        );
    }
}
