//! Quote resolution: cache first, then the legacy server
//!
//! Resolution decides the `cached` vs `fresh` outcome for one request. The
//! cache refill after a fresh fetch runs detached so a slow or failing
//! cache write can never delay the broadcast.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{self, CacheError, QuoteCache};
use crate::legacy::{LegacyError, QuoteFetcher};
use types::{Quote, QuoteRequest};

/// Where a resolved quote came from. Rendered into the broadcast routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Served from the local cache
    Cached,
    /// Fetched live from the legacy quote server
    Fresh,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Cached => "cached",
            Origin::Fresh => "fresh",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while resolving one request.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("cache lookup failed: {0}")]
    Cache(#[from] CacheError),

    #[error("legacy fetch failed: {0}")]
    Fetch(#[from] LegacyError),
}

/// Orchestrates cache lookup, legacy fetch, and cache refill for one
/// request at a time. Handles are injected by the composition root.
pub struct QuoteResolver {
    cache: Arc<dyn QuoteCache>,
    fetcher: Arc<dyn QuoteFetcher>,
}

impl QuoteResolver {
    pub fn new(cache: Arc<dyn QuoteCache>, fetcher: Arc<dyn QuoteFetcher>) -> Self {
        Self { cache, fetcher }
    }

    /// Resolve `request` to a quote and its origin tag.
    ///
    /// A cache hit is only honored when the request allows it; the returned
    /// quote always carries the request's transaction id, even when the
    /// cached payload predates the request.
    pub async fn resolve(&self, request: &QuoteRequest) -> Result<(Quote, Origin), ResolveError> {
        if let Some(cached) = self.cache.get(&request.stock).await? {
            if request.allow_cache {
                return Ok((
                    cached.with_transaction_id(request.transaction_id),
                    Origin::Cached,
                ));
            }
            debug!(stock = %request.stock, "Cache hit bypassed on request");
        }

        info!(
            stock = %request.stock,
            transaction_id = request.transaction_id,
            "Fetching fresh quote"
        );
        let quote = self
            .fetcher
            .fetch(&request.stock, &request.user_id, request.transaction_id)
            .await?;

        cache::spawn_refill(Arc::clone(&self.cache), quote.clone());
        Ok((quote, Origin::Fresh))
    }
}
