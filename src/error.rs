//! Error types for the validation pipeline.
//!
//! Only `Input` and `DocumentUnavailable` abort a request. Everything the
//! scorer or the result stores raise is absorbed further up and turned into
//! a best-effort verdict.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    /// Entered quantity missing or not a finite number, or another
    /// required request field absent.
    #[error("Invalid input: {0}")]
    Input(String),

    /// The document text could not be produced (read failure, unsupported
    /// format, scanned PDF without an OCR provider).
    #[error("Document unavailable: {0}")]
    DocumentUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ValidationError {
    /// Whether this error means the request must be rejected rather than
    /// degraded into a verdict.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Input(_) | Self::DocumentUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classes() {
        assert!(ValidationError::Input("x".into()).is_fatal());
        assert!(ValidationError::DocumentUnavailable("x".into()).is_fatal());
        assert!(!ValidationError::Config("x".into()).is_fatal());
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert!(!ValidationError::from(io).is_fatal());
    }

    #[test]
    fn test_display_carries_message() {
        let err = ValidationError::DocumentUnavailable("blob missing".into());
        assert_eq!(err.to_string(), "Document unavailable: blob missing");
    }
}
