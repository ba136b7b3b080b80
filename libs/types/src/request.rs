//! Inbound quote-request values and their wire encoding
//!
//! A `QuoteRequest` arrives as one comma-separated line in a broker message
//! body:
//!
//! ```text
//! <stock>,<user_id>,<transaction_id>,<allow_cache>
//! ```
//!
//! The correlation id is not part of the body; it rides the broker message
//! properties and is attached after parsing.

use serde::{Deserialize, Serialize};

use crate::errors::WireError;
use crate::quote::field_count_error;

/// One client request for a quote, consumed exactly once by a resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    /// Ticker symbol, un-normalized length
    pub stock: String,
    /// Requesting user
    pub user_id: String,
    /// Uniquely identifies the request for this user
    pub transaction_id: u64,
    /// When false the caller demands a fresh quote even on a cache hit
    pub allow_cache: bool,
    /// Opaque id propagated from the broker message onto the broadcast
    pub correlation_id: String,
}

impl QuoteRequest {
    const FIELD_NAMES: [&'static str; 4] = ["stock", "user_id", "transaction_id", "allow_cache"];

    /// Parse a request body. The correlation id starts empty; attach it with
    /// [`QuoteRequest::with_correlation_id`] once the broker envelope is read.
    pub fn from_csv(line: &str) -> Result<Self, WireError> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(WireError::Empty);
        }

        let parts: Vec<&str> = line.split(',').collect();
        let [stock, user_id, transaction_id, allow_cache] = parts.as_slice() else {
            return Err(field_count_error(&parts, &Self::FIELD_NAMES, line));
        };

        if stock.is_empty() {
            return Err(WireError::MissingField {
                field: "stock",
                payload: line.to_string(),
            });
        }

        let transaction_id: u64 = transaction_id
            .parse()
            .map_err(|_| WireError::InvalidTransactionId(transaction_id.to_string()))?;

        let allow_cache: bool = allow_cache
            .parse()
            .map_err(|_| WireError::InvalidCacheFlag(allow_cache.to_string()))?;

        Ok(Self {
            stock: stock.to_string(),
            user_id: user_id.to_string(),
            transaction_id,
            allow_cache,
            correlation_id: String::new(),
        })
    }

    /// Serialize to the wire body.
    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{}",
            self.stock, self.user_id, self.transaction_id, self.allow_cache
        )
    }

    /// Attach the correlation id carried by the broker envelope.
    pub fn with_correlation_id(self, correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_body() {
        let request = QuoteRequest::from_csv("ABC,u1,42,true").unwrap();
        assert_eq!(request.stock, "ABC");
        assert_eq!(request.user_id, "u1");
        assert_eq!(request.transaction_id, 42);
        assert!(request.allow_cache);
        assert!(request.correlation_id.is_empty());
    }

    #[test]
    fn test_cache_bypass_flag() {
        let request = QuoteRequest::from_csv("ABC,u1,42,false").unwrap();
        assert!(!request.allow_cache);
    }

    #[test]
    fn test_invalid_cache_flag_rejected() {
        let err = QuoteRequest::from_csv("ABC,u1,42,yes").unwrap_err();
        assert_eq!(err, WireError::InvalidCacheFlag("yes".to_string()));
    }

    #[test]
    fn test_missing_fields_rejected() {
        let err = QuoteRequest::from_csv("ABC,u1").unwrap_err();
        assert_eq!(
            err,
            WireError::MissingField {
                field: "transaction_id",
                payload: "ABC,u1".to_string(),
            }
        );
    }

    #[test]
    fn test_correlation_id_attaches_after_parse() {
        let request = QuoteRequest::from_csv("ABC,u1,42,true")
            .unwrap()
            .with_correlation_id("corr-123");
        assert_eq!(request.correlation_id, "corr-123");
    }

    #[test]
    fn test_to_csv_round_trip() {
        let request = QuoteRequest::from_csv("LONGSYMBOL,u2,7,false").unwrap();
        assert_eq!(request.to_csv(), "LONGSYMBOL,u2,7,false");
    }
}
