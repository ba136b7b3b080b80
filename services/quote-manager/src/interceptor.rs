//! Fleet cache replication by intercepting peers' fresh broadcasts
//!
//! Every instance broadcasts the quotes it fetched live; every instance
//! listens for everyone's fresh broadcasts and writes the foreign ones
//! into its own cache. One instance's cache miss thus becomes, after a
//! single legacy-server round trip, a warm entry on the whole fleet with
//! no peer-to-peer traffic. Self-originated broadcasts are filtered out,
//! and nothing a peer sends can abort this loop — a hostile or buggy
//! instance only pollutes the log.

use std::sync::Arc;

use futures::StreamExt;
use lapin::options::{BasicConsumeOptions, QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::Channel;
use tracing::{debug, info, warn};

use crate::cache::{self, QuoteCache};
use crate::error::ServiceError;
use crate::publisher::IDENTITY_HEADER;
use types::{Quote, WireError};

/// Binding pattern matching every instance's fresh broadcasts.
pub const FRESH_BROADCASTS: &str = "*.fresh";

/// Reasons an intercepted broadcast gets discarded. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum InterceptError {
    #[error("broadcast carries no origin identity header")]
    MissingOrigin,

    #[error("broadcast body is not valid UTF-8")]
    NonUtf8Body,

    #[error("broadcast body does not parse as a quote: {0}")]
    Malformed(#[from] WireError),
}

/// Lifetime consumer of peers' fresh broadcasts.
pub struct BroadcastInterceptor {
    channel: Channel,
    exchange: String,
    instance_id: String,
    cache: Arc<dyn QuoteCache>,
}

impl BroadcastInterceptor {
    pub fn new(
        channel: Channel,
        exchange: String,
        instance_id: String,
        cache: Arc<dyn QuoteCache>,
    ) -> Self {
        Self {
            channel,
            exchange,
            instance_id,
            cache,
        }
    }

    /// Declare the private subscription and absorb foreign quotes until the
    /// broker stream ends (fatal to the process).
    pub async fn run(self) -> Result<(), ServiceError> {
        let queue_name = format!("quote-manager.intercept.{}", self.instance_id);
        let declare = QueueDeclareOptions {
            durable: true,
            auto_delete: true,
            ..QueueDeclareOptions::default()
        };
        let queue = self
            .channel
            .queue_declare(&queue_name, declare, FieldTable::default())
            .await?;

        self.channel
            .queue_bind(
                queue.name().as_str(),
                &self.exchange,
                FRESH_BROADCASTS,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        // Interception is best-effort cache warming; auto-ack keeps the
        // broker from ever redelivering a broadcast we mishandled.
        let consume = BasicConsumeOptions {
            no_ack: true,
            ..BasicConsumeOptions::default()
        };
        let mut consumer = self
            .channel
            .basic_consume(queue.name().as_str(), "", consume, FieldTable::default())
            .await?;

        info!(
            instance_id = %self.instance_id,
            pattern = FRESH_BROADCASTS,
            "Intercepting quotes from other instances"
        );

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;
            let origin = header_string(delivery.properties.headers(), IDENTITY_HEADER);
            match intercepted_quote(&self.instance_id, origin.as_deref(), &delivery.data) {
                Ok(Some(quote)) => {
                    debug!(
                        stock = %quote.stock,
                        origin = origin.as_deref().unwrap_or_default(),
                        "Absorbing intercepted quote"
                    );
                    cache::spawn_refill(Arc::clone(&self.cache), quote);
                }
                // Our own broadcast coming back around.
                Ok(None) => {}
                Err(err) => {
                    warn!(error = %err, "Discarding malformed broadcast");
                }
            }
        }

        Err(ServiceError::ConsumerClosed { queue: queue_name })
    }
}

/// Decide what to absorb from one broadcast: `None` for a self-originated
/// message, a parsed quote for a foreign one. Errors are the caller's cue
/// to log and drop.
pub fn intercepted_quote(
    own_id: &str,
    origin: Option<&str>,
    body: &[u8],
) -> Result<Option<Quote>, InterceptError> {
    let origin = origin.ok_or(InterceptError::MissingOrigin)?;
    if origin == own_id {
        return Ok(None);
    }
    let body = std::str::from_utf8(body).map_err(|_| InterceptError::NonUtf8Body)?;
    Ok(Some(Quote::from_csv(body)?))
}

/// String value of a header, if present and string-typed.
fn header_string(headers: &Option<FieldTable>, name: &str) -> Option<String> {
    let table = headers.as_ref()?;
    table.inner().iter().find_map(|(key, value)| {
        if key.as_str() != name {
            return None;
        }
        match value {
            AMQPValue::LongString(s) => Some(s.to_string()),
            _ => None,
        }
    })
}
