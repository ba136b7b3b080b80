//! Error taxonomy for the quote manager
//!
//! Module-specific errors live next to the code that raises them; this
//! top-level enum aggregates them for the task and loop boundaries. A
//! variant here either aborts one request's task or, for broker-level
//! faults, the process.

use thiserror::Error;

use crate::cache::CacheError;
use crate::legacy::LegacyError;
use crate::publisher::PublishError;
use crate::resolver::ResolveError;
use types::WireError;

/// Top-level service error.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("legacy quote server error: {0}")]
    Legacy(#[from] LegacyError),

    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("malformed request payload: {0}")]
    MalformedRequest(#[from] WireError),

    #[error("request body is not valid UTF-8")]
    NonUtf8Body,

    #[error("broker consumer for {queue} closed")]
    ConsumerClosed { queue: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_error_wraps_as_malformed_request() {
        let err: ServiceError = WireError::Empty.into();
        assert!(matches!(err, ServiceError::MalformedRequest(_)));
        assert!(err.to_string().contains("malformed request payload"));
    }

    #[test]
    fn test_consumer_closed_names_the_queue() {
        let err = ServiceError::ConsumerClosed {
            queue: "quote_req".to_string(),
        };
        assert!(err.to_string().contains("quote_req"));
    }
}
