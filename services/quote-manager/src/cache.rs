//! Cache store for resolved quotes
//!
//! Keys are truncated to the legacy server's three-character symbol width,
//! so two symbols sharing a prefix share one entry — a property of the
//! legacy protocol, not a defect. TTLs are jittered per write so replicas
//! that warmed the same key at the same time do not expire it in lockstep
//! and stampede the quote server together.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};

use types::{Quote, WireError};

/// Symbol width of the legacy quote server's internal tables.
pub const LEGACY_SYMBOL_WIDTH: usize = 3;

/// Errors raised by the cache store. A miss is not an error.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache store fault: {0}")]
    Store(#[from] redis::RedisError),

    #[error("corrupt cache entry at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: WireError,
    },
}

/// Expiration policy for cached quotes.
///
/// Every write gets `base_ttl - jitter - age` seconds to live, with the
/// jitter drawn uniformly from `[0, backoff_ttl)`.
#[derive(Debug, Clone, Copy)]
pub struct TtlPolicy {
    pub base_ttl_secs: i64,
    pub backoff_ttl_secs: i64,
}

impl TtlPolicy {
    /// Lifetime for an entry of the given age under the given jitter draw.
    /// May be non-positive for a quote that is already stale.
    pub fn entry_ttl(&self, jitter_secs: i64, age_secs: i64) -> i64 {
        self.base_ttl_secs - jitter_secs - age_secs
    }

    /// Lifetime to hand to the store, or `None` when the entry would be
    /// expired on arrival and must not be written at all.
    pub fn store_ttl(&self, jitter_secs: i64, age_secs: i64) -> Option<u64> {
        let ttl = self.entry_ttl(jitter_secs, age_secs);
        (ttl > 0).then_some(ttl as u64)
    }

    /// Uniform draw over `[0, backoff_ttl)`.
    pub fn draw_jitter(&self) -> i64 {
        if self.backoff_ttl_secs > 0 {
            rand::rng().random_range(0..self.backoff_ttl_secs)
        } else {
            0
        }
    }
}

/// Key for a stock's cache entry: namespace prefix plus the symbol cut to
/// the legacy width.
pub fn quote_key(prefix: &str, stock: &str) -> String {
    let short: String = stock.chars().take(LEGACY_SYMBOL_WIDTH).collect();
    format!("{}quotes:{}", prefix, short)
}

/// Typed get/set over the shared quote cache.
#[async_trait]
pub trait QuoteCache: Send + Sync {
    /// Look up the entry for `stock`'s truncated key. `Ok(None)` is the
    /// normal miss branch; `Err` is a store fault.
    async fn get(&self, stock: &str) -> Result<Option<Quote>, CacheError>;

    /// Write `quote` under its truncated key with a jittered TTL.
    async fn put(&self, quote: &Quote) -> Result<(), CacheError>;
}

/// Redis-backed cache over a multiplexed auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisQuoteCache {
    conn: ConnectionManager,
    key_prefix: String,
    policy: TtlPolicy,
}

impl RedisQuoteCache {
    pub fn new(conn: ConnectionManager, key_prefix: String, policy: TtlPolicy) -> Self {
        Self {
            conn,
            key_prefix,
            policy,
        }
    }
}

#[async_trait]
impl QuoteCache for RedisQuoteCache {
    async fn get(&self, stock: &str) -> Result<Option<Quote>, CacheError> {
        let key = quote_key(&self.key_prefix, stock);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await?;
        match raw {
            None => {
                debug!(key = %key, "Cache miss");
                Ok(None)
            }
            Some(raw) => {
                let quote = Quote::from_csv(&raw).map_err(|source| CacheError::Corrupt {
                    key: key.clone(),
                    source,
                })?;
                debug!(key = %key, stock = %quote.stock, "Cache hit");
                Ok(Some(quote))
            }
        }
    }

    async fn put(&self, quote: &Quote) -> Result<(), CacheError> {
        let key = quote_key(&self.key_prefix, &quote.stock);
        let age_secs = quote.age_seconds(Utc::now());
        let Some(ttl) = self.policy.store_ttl(self.policy.draw_jitter(), age_secs) else {
            // The quote is older than any lifetime the policy would grant.
            // Writing it anyway could only resurrect an expired entry.
            debug!(key = %key, age_secs, "Skipping cache write for already-stale quote");
            return Ok(());
        };
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(&key, quote.to_csv(), ttl).await?;
        debug!(key = %key, ttl, "Cached quote");
        Ok(())
    }
}

/// Detached cache refill. Never blocks or fails the quote-serving path;
/// a write fault is logged and forgotten.
pub fn spawn_refill(cache: Arc<dyn QuoteCache>, quote: Quote) {
    tokio::spawn(async move {
        if let Err(err) = cache.put(&quote).await {
            warn!(stock = %quote.stock, error = %err, "Background cache refill failed");
        }
    });
}
