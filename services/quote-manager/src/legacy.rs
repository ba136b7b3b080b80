//! Line-oriented TCP client for the legacy quote server
//!
//! One request per connection: `"<stock>,<user_id>\n"` out, one
//! comma-separated response line back. The server has no retry or
//! backpressure signaling of its own, so the client owns the timeout
//! policy: every read deadline is the configured base plus a backoff that
//! doubles after each timeout, and the whole fetch aborts once the next
//! deadline would cross an absolute ceiling. Connections are never reused
//! across attempts or requests.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use types::{Quote, WireError};

/// Hard upper bound on a read deadline. An upstream outage worse than this
/// is an operational emergency, not a retryable condition.
pub const DEADLINE_CEILING: Duration = Duration::from_secs(5);

/// Errors raised by a legacy fetch. Only a deadline timeout is retried, and
/// only inside the client; everything surfacing here aborts the request.
#[derive(Debug, thiserror::Error)]
pub enum LegacyError {
    #[error("i/o error talking to the quote server: {0}")]
    Io(#[from] std::io::Error),

    #[error("quote server closed the connection before responding")]
    EmptyResponse,

    #[error(
        "gave up after {attempts} attempts: next read deadline {next_deadline:?} exceeds {ceiling:?}"
    )]
    RetryCeiling {
        attempts: u32,
        next_deadline: Duration,
        ceiling: Duration,
    },

    #[error("unparseable quote server response: {0}")]
    Malformed(#[from] WireError),
}

/// Timeout tuning for the fetch loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Floor of every read deadline
    pub base_retry_timeout: Duration,
    /// Backoff added to the first deadline, doubled after every timeout
    pub initial_backoff: Duration,
    /// Absolute bound a computed deadline may never cross
    pub deadline_ceiling: Duration,
}

impl RetryPolicy {
    pub fn new(base_retry_timeout: Duration, initial_backoff: Duration) -> Self {
        Self {
            base_retry_timeout,
            initial_backoff,
            deadline_ceiling: DEADLINE_CEILING,
        }
    }
}

/// Timeout/backoff state machine for a single fetch.
#[derive(Debug, Clone)]
pub struct BackoffSchedule {
    policy: RetryPolicy,
    backoff: Duration,
    attempt: u32,
}

impl BackoffSchedule {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            backoff: policy.initial_backoff,
            attempt: 1,
        }
    }

    /// Attempt counter, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Read deadline for the current attempt.
    pub fn read_deadline(&self) -> Duration {
        self.policy.base_retry_timeout + self.backoff
    }

    /// Double the backoff after a timeout. Fails when the deadline of the
    /// attempt that would follow crosses the ceiling.
    pub fn advance(&mut self) -> Result<(), LegacyError> {
        let next_backoff = self.backoff * 2;
        let next_deadline = self.policy.base_retry_timeout + next_backoff;
        if next_deadline > self.policy.deadline_ceiling {
            return Err(LegacyError::RetryCeiling {
                attempts: self.attempt,
                next_deadline,
                ceiling: self.policy.deadline_ceiling,
            });
        }
        self.backoff = next_backoff;
        self.attempt += 1;
        Ok(())
    }
}

/// Source of fresh quotes. The resolver depends on this seam so tests can
/// substitute a scripted implementation.
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    /// Retrieve a quote for `stock` as observed for `user_id`, stamped with
    /// the caller's `transaction_id`. Never returns a partial quote.
    async fn fetch(
        &self,
        stock: &str,
        user_id: &str,
        transaction_id: u64,
    ) -> Result<Quote, LegacyError>;
}

/// TCP client bound to the fixed, pre-resolved upstream address.
pub struct LegacyQuoteClient {
    addr: SocketAddr,
    policy: RetryPolicy,
}

impl LegacyQuoteClient {
    pub fn new(addr: SocketAddr, policy: RetryPolicy) -> Self {
        Self { addr, policy }
    }

    /// One attempt: fresh connection, request line, read to `\n` under the
    /// deadline. `Ok(None)` means the deadline elapsed.
    async fn attempt(&self, request_line: &str, deadline: Duration) -> Result<Option<String>, LegacyError> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(request_line.as_bytes()).await?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        match timeout(deadline, reader.read_line(&mut response)).await {
            Err(_elapsed) => Ok(None),
            Ok(Ok(0)) => Err(LegacyError::EmptyResponse),
            Ok(Ok(_)) => Ok(Some(response)),
            Ok(Err(err)) => Err(err.into()),
        }
    }
}

#[async_trait]
impl QuoteFetcher for LegacyQuoteClient {
    async fn fetch(
        &self,
        stock: &str,
        user_id: &str,
        transaction_id: u64,
    ) -> Result<Quote, LegacyError> {
        let request_line = format!("{},{}\n", stock, user_id);
        let mut schedule = BackoffSchedule::new(self.policy);

        let response = loop {
            let deadline = schedule.read_deadline();
            match self.attempt(&request_line, deadline).await? {
                Some(line) => break line,
                None => {
                    warn!(
                        stock,
                        attempt = schedule.attempt(),
                        deadline_ms = deadline.as_millis() as u64,
                        "Quote server read deadline elapsed"
                    );
                    schedule.advance()?;
                }
            }
        };

        // The server knows nothing about transactions; stamp the caller's id
        // onto the line before parsing so the quote carries it.
        let stamped = format!("{},{}", response.trim_end(), transaction_id);
        let quote = Quote::from_csv(&stamped)?;
        debug!(
            stock = %quote.stock,
            price = %quote.price,
            attempt = schedule.attempt(),
            "Quote server responded"
        );
        Ok(quote)
    }
}
