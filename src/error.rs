//! Error handling and custom error types
//!
//! Provides unified error handling across the bridge using thiserror. The
//! first four variants are the resizer's own failure kinds; every call that
//! fails returns exactly one of them so callers can tell rejection apart from
//! a broken image.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("File size {size} bytes exceeds the limit of {limit} bytes")]
    SizeLimitExceeded { size: u64, limit: u64 },

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Invariant violated: {0}")]
    Invariant(String),
}

impl Error {
    /// True for the kinds raised before any pixel work starts.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedFormat(_) | Error::SizeLimitExceeded { .. } | Error::InvalidRequest(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_limit_message() {
        let err = Error::SizeLimitExceeded {
            size: 2048,
            limit: 1024,
        };
        assert_eq!(
            err.to_string(),
            "File size 2048 bytes exceeds the limit of 1024 bytes"
        );
    }

    #[test]
    fn test_rejection_kinds() {
        assert!(Error::UnsupportedFormat("text/html".to_string()).is_rejection());
        assert!(Error::SizeLimitExceeded { size: 2, limit: 1 }.is_rejection());
        assert!(!Error::Decode("truncated".to_string()).is_rejection());
        assert!(!Error::Encode("writer closed".to_string()).is_rejection());
    }
}
