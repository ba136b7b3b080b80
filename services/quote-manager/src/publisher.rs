//! Topic-exchange publication of resolved quotes
//!
//! Every resolution is broadcast, routed by stock and origin so consumers
//! can subscribe to exactly the freshness they care about. There is no
//! acknowledgment path back from consumers; the publisher only waits for
//! the broker itself to accept the message, which is what the intake's
//! ack-after-publish ordering depends on.

use lapin::options::{BasicPublishOptions, ConfirmSelectOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable, ShortString};
use lapin::{BasicProperties, Channel};
use tracing::info;

use crate::resolver::Origin;
use types::Quote;

/// Header carrying the publishing instance's identity on every broadcast.
pub const IDENTITY_HEADER: &str = "service_id";

/// Errors raised while broadcasting a resolved quote.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("broker publish failed: {0}")]
    Broker(#[from] lapin::Error),

    #[error("broker refused broadcast routed to {routing_key}")]
    Refused { routing_key: String },
}

/// Routing key for a resolved quote: `"<stock>.<origin>"`.
pub fn routing_key(stock: &str, origin: Origin) -> String {
    format!("{}.{}", stock, origin.as_str())
}

/// Publisher handle over a confirm-mode channel on the shared exchange.
pub struct QuoteBroadcaster {
    channel: Channel,
    exchange: String,
    instance_id: String,
}

impl QuoteBroadcaster {
    /// Wrap `channel`, switching it into confirm mode so `publish` can
    /// report broker acceptance.
    pub async fn new(
        channel: Channel,
        exchange: String,
        instance_id: String,
    ) -> Result<Self, PublishError> {
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        Ok(Self {
            channel,
            exchange,
            instance_id,
        })
    }

    /// Broadcast `quote`, returning once the broker has accepted it.
    pub async fn publish(
        &self,
        quote: &Quote,
        origin: Origin,
        correlation_id: &str,
    ) -> Result<(), PublishError> {
        let routing_key = routing_key(&quote.stock, origin);

        let mut headers = FieldTable::default();
        headers.insert(
            ShortString::from(IDENTITY_HEADER),
            AMQPValue::LongString(self.instance_id.as_str().into()),
        );
        headers.insert(
            ShortString::from("transaction_id"),
            AMQPValue::LongLongInt(quote.transaction_id as i64),
        );
        headers.insert(
            ShortString::from("user_id"),
            AMQPValue::LongString(quote.user_id.as_str().into()),
        );
        let properties = BasicProperties::default()
            .with_content_type("text/plain".into())
            .with_correlation_id(correlation_id.into())
            .with_headers(headers);

        let confirmation = self
            .channel
            .basic_publish(
                &self.exchange,
                &routing_key,
                BasicPublishOptions::default(),
                quote.to_csv().as_bytes(),
                properties,
            )
            .await?
            .await?;

        if let Confirmation::Nack(_) = confirmation {
            return Err(PublishError::Refused { routing_key });
        }

        info!(
            routing_key = %routing_key,
            transaction_id = quote.transaction_id,
            price = %quote.price,
            correlation_id,
            "Broadcast published"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_key_encodes_stock_and_origin() {
        assert_eq!(routing_key("ABC", Origin::Fresh), "ABC.fresh");
        assert_eq!(routing_key("ABC", Origin::Cached), "ABC.cached");
    }

    #[test]
    fn test_routing_key_keeps_untruncated_stock() {
        // Only cache keys truncate; routing keys carry the full symbol.
        assert_eq!(routing_key("LONGSYMBOL", Origin::Fresh), "LONGSYMBOL.fresh");
    }
}
