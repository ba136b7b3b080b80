//! Error types for the shared wire contract
//!
//! Wire payloads are short comma-separated lines; every way such a line can
//! fail to parse gets its own variant so callers can log precise causes.

use thiserror::Error;

/// Errors raised while decoding a wire payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("empty payload")]
    Empty,

    #[error("missing field `{field}` in `{payload}`")]
    MissingField {
        field: &'static str,
        payload: String,
    },

    #[error("unexpected trailing fields in `{0}`")]
    TrailingFields(String),

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid transaction id: {0}")]
    InvalidTransactionId(String),

    #[error("invalid cache flag: {0}")]
    InvalidCacheFlag(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_display() {
        let err = WireError::MissingField {
            field: "price",
            payload: "ABC".to_string(),
        };
        assert_eq!(err.to_string(), "missing field `price` in `ABC`");
    }

    #[test]
    fn test_invalid_timestamp_display() {
        let err = WireError::InvalidTimestamp("not-a-number".to_string());
        assert!(err.to_string().contains("not-a-number"));
    }
}
