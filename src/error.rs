//! Domain-specific error types for wa-review

use thiserror::Error;

/// Main error type for the review engine
#[derive(Error, Debug)]
pub enum WaReviewError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Taxonomy unavailable: {message}")]
    TaxonomyUnavailable { message: String },

    #[error("Review API error during {operation}: {message}")]
    ReviewApi { operation: String, message: String },

    #[error("Text generation error: {message}")]
    Generation { message: String },

    #[error("Artifact error: {message}")]
    Artifact { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Cannot {action}: {reason}")]
    InvalidTransition { action: String, reason: String },

    #[error("Pagination limit hit for pillar {pillar_id} after {pages} pages")]
    PaginationLimit { pillar_id: String, pages: usize },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WaReviewError {
    pub fn review_api(operation: impl Into<String>, message: impl Into<String>) -> Self {
        WaReviewError::ReviewApi {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn transition(action: impl Into<String>, reason: impl Into<String>) -> Self {
        WaReviewError::InvalidTransition {
            action: action.into(),
            reason: reason.into(),
        }
    }
}

impl From<anyhow::Error> for WaReviewError {
    fn from(err: anyhow::Error) -> Self {
        WaReviewError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for WaReviewError {
    fn from(err: serde_json::Error) -> Self {
        WaReviewError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<csv::Error> for WaReviewError {
    fn from(err: csv::Error) -> Self {
        WaReviewError::TaxonomyUnavailable {
            message: format!("CSV parse failed: {}", err),
        }
    }
}

impl From<reqwest::Error> for WaReviewError {
    fn from(err: reqwest::Error) -> Self {
        WaReviewError::ReviewApi {
            operation: "http".to_string(),
            message: format!("HTTP request failed: {}", err),
        }
    }
}

impl From<std::io::Error> for WaReviewError {
    fn from(err: std::io::Error) -> Self {
        WaReviewError::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

impl From<base64::DecodeError> for WaReviewError {
    fn from(err: base64::DecodeError) -> Self {
        WaReviewError::Serialization {
            message: format!("Report payload is not valid base64: {}", err),
        }
    }
}

/// Result type alias for review engine operations
pub type Result<T> = std::result::Result<T, WaReviewError>;
