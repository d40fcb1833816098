//! Custom error types for the seamless-stt-server.
//!
//! This module provides a centralized error handling system using the `thiserror` crate
//! to define structured, typed errors with clear messages and proper error conversion.
//! Lower layers (model loading, generation, decoding) keep their own error enums and
//! convert into [`AppError`] at the request boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::io;
use thiserror::Error;

use crate::model::{DecodeError, FeatureError, GenerationError, LoadError};

/// Primary error type for the application, covering all possible error cases.
#[derive(Debug, Error)]
pub enum AppError {
    /// Uploaded file name has no allowed audio extension.
    #[error("Invalid file format. Allowed: {0}")]
    InvalidFile(String),

    /// Target language display name is not in the catalog.
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// Malformed request (missing field, unreadable multipart body).
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Upload exceeds the configured size cap.
    #[error("File too large: {size} bytes (max: {limit} bytes)")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Request body was cut off by the transport-level body limit.
    #[error("Request body exceeds the {limit} byte limit")]
    BodyTooLarge { limit: usize },

    /// The model has not been loaded and loading failed.
    #[error("Failed to load model. Please try again later.")]
    ModelUnavailable(#[source] LoadError),

    /// Audio could not be decoded or resampled.
    #[error("Audio preprocessing failed: {0}")]
    PreprocessingFailed(String),

    /// Feature extraction or the model's generation routine failed.
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Generated tokens could not be turned into text.
    #[error("Decoding failed: {0}")]
    DecodeFailed(#[from] DecodeError),

    /// Errors from invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Errors from the underlying IO system.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal server errors.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error maps to.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidFile(_)
            | AppError::UnsupportedLanguage(_)
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge { .. } | AppError::BodyTooLarge { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            AppError::ModelUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short, stable label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidFile(_) => "invalid_file",
            AppError::UnsupportedLanguage(_) => "unsupported_language",
            AppError::Validation(_) => "validation",
            AppError::PayloadTooLarge { .. } | AppError::BodyTooLarge { .. } => {
                "payload_too_large"
            }
            AppError::ModelUnavailable(_) => "model_unavailable",
            AppError::PreprocessingFailed(_) => "preprocessing_failed",
            AppError::GenerationFailed(_) => "generation_failed",
            AppError::DecodeFailed(_) => "decode_failed",
            AppError::Configuration(_) => "configuration",
            AppError::Io(_) => "io",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        AppError::GenerationFailed(err.to_string())
    }
}

impl From<FeatureError> for AppError {
    fn from(err: FeatureError) -> Self {
        AppError::GenerationFailed(err.to_string())
    }
}

/// Implementation to convert AppError into an HTTP response for Axum.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "detail": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results with AppError.
pub type Result<T> = std::result::Result<T, AppError>;

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add static context to the error.
    fn with_static_context(self, context: &'static str) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_static_context(self, context: &'static str) -> Result<T> {
        self.map_err(|e| AppError::Internal(format!("{}: {}", context, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_bad_request() {
        assert_eq!(
            AppError::InvalidFile("wav".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::UnsupportedLanguage("Klingon".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn model_unavailable_is_service_unavailable() {
        let err = AppError::ModelUnavailable(LoadError::Exhausted(vec!["cpu/simple: boom".into()]));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        // Client only sees the short message, not the load details.
        assert!(!err.to_string().contains("boom"));
    }

    #[test]
    fn pipeline_failures_are_internal() {
        assert_eq!(
            AppError::PreprocessingFailed("probe".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::from(GenerationError::Inference("run".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn decode_failures_are_internal() {
        let err = AppError::from(DecodeError::InvalidTokenId(-1));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "decode_failed");

        let err = AppError::from(FeatureError::TooShort {
            samples: 480,
            required: 560,
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.kind(), "generation_failed");
    }

    #[test]
    fn payload_too_large_reports_limit() {
        let err = AppError::PayloadTooLarge { size: 11, limit: 10 };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(err.to_string().contains("max: 10"));
    }

    #[test]
    fn with_static_context_wraps_as_internal() {
        let res: std::result::Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::Other, "disk"));
        let err = res.with_static_context("write temp file").unwrap_err();
        assert!(matches!(err, AppError::Internal(ref m) if m.contains("write temp file: disk")));
    }
}
