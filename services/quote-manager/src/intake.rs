//! Inbound quote-request consumption
//!
//! Every delivery spawns its own resolve-and-publish task; nothing orders
//! or serializes concurrent requests, including requests for the same
//! stock. Delivery is at-least-once: the ack is the task's final step,
//! after the broker confirmed the broadcast, so a crash in between causes
//! a redelivery and a duplicate broadcast rather than a lost quote.

use std::sync::Arc;

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicRejectOptions};
use lapin::types::FieldTable;
use lapin::Channel;
use tracing::{error, info, warn};

use crate::error::ServiceError;
use crate::publisher::QuoteBroadcaster;
use crate::resolver::QuoteResolver;
use types::QuoteRequest;

/// Consumer loop over the shared request queue.
pub struct RequestIntake {
    channel: Channel,
    queue: String,
    resolver: Arc<QuoteResolver>,
    broadcaster: Arc<QuoteBroadcaster>,
}

impl RequestIntake {
    pub fn new(
        channel: Channel,
        queue: String,
        resolver: Arc<QuoteResolver>,
        broadcaster: Arc<QuoteBroadcaster>,
    ) -> Self {
        Self {
            channel,
            queue,
            resolver,
            broadcaster,
        }
    }

    /// Consume until the broker stream ends. A closed stream means the
    /// connection is gone, which is fatal to the process.
    pub async fn run(self) -> Result<(), ServiceError> {
        let mut consumer = self
            .channel
            .basic_consume(
                &self.queue,
                "quote-manager",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue = %self.queue, "Monitoring quote requests");

        while let Some(delivery) = consumer.next().await {
            let delivery = delivery?;
            let resolver = Arc::clone(&self.resolver);
            let broadcaster = Arc::clone(&self.broadcaster);
            tokio::spawn(async move {
                if let Err(err) = handle_delivery(resolver, broadcaster, delivery).await {
                    error!(error = %err, "Quote request aborted");
                }
            });
        }

        Err(ServiceError::ConsumerClosed { queue: self.queue })
    }
}

/// Resolve one delivery and broadcast the result. The ack is issued last;
/// any earlier failure leaves the delivery unacknowledged for redelivery.
async fn handle_delivery(
    resolver: Arc<QuoteResolver>,
    broadcaster: Arc<QuoteBroadcaster>,
    delivery: Delivery,
) -> Result<(), ServiceError> {
    let correlation_id = delivery
        .properties
        .correlation_id()
        .as_ref()
        .map(|id| id.as_str().to_string());

    let request = match parse_request(&delivery.data, correlation_id.as_deref()) {
        Ok(request) => request,
        Err(err) => {
            // An unparseable body would redeliver forever; drop it from the queue.
            warn!(error = %err, "Rejecting malformed quote request");
            delivery
                .reject(BasicRejectOptions { requeue: false })
                .await?;
            return Err(err);
        }
    };

    info!(
        stock = %request.stock,
        transaction_id = request.transaction_id,
        correlation_id = %request.correlation_id,
        "Quote request received"
    );

    let (quote, origin) = resolver.resolve(&request).await?;
    broadcaster
        .publish(&quote, origin, &request.correlation_id)
        .await?;

    delivery.ack(BasicAckOptions::default()).await?;
    Ok(())
}

/// Decode a delivery body and attach the envelope's correlation id.
fn parse_request(body: &[u8], correlation_id: Option<&str>) -> Result<QuoteRequest, ServiceError> {
    let body = std::str::from_utf8(body).map_err(|_| ServiceError::NonUtf8Body)?;
    let request = QuoteRequest::from_csv(body)?;
    Ok(request.with_correlation_id(correlation_id.unwrap_or_default()))
}
