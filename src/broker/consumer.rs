//! Message consumer on the bound queue

use crate::config::{AckMode, BindingSettings};
use crate::traits::{Acknowledger, DeliveryStream};
use crate::{BridgeError, BridgeResult, InboundMessage};
use async_trait::async_trait;
use futures::StreamExt;
use lapin::acker::Acker;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicConsumeOptions, BasicQosOptions, BasicRejectOptions};
use lapin::types::FieldTable;
use lapin::{Channel, Consumer};
use tracing::{debug, info};

/// Subscription on the bound queue
///
/// Yields deliveries in broker order. In `AckMode::OnReceipt` the subscription
/// is opened with `no_ack`, so the broker forgets each message as soon as it
/// is pushed.
pub struct AmqpConsumer {
    consumer: Consumer,
    queue: String,
    ack_mode: AckMode,
}

impl AmqpConsumer {
    /// Register a consumer on `queue`
    pub async fn subscribe(
        channel: &Channel,
        queue: &str,
        consumer_tag: &str,
        binding: &BindingSettings,
    ) -> BridgeResult<Self> {
        if binding.prefetch > 0 {
            channel
                .basic_qos(binding.prefetch, BasicQosOptions::default())
                .await
                .map_err(|e| BridgeError::connectivity_with_source("Failed to set prefetch", e))?;
        }

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                consume_options(binding),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                BridgeError::connectivity_with_source(
                    format!("Failed to register consumer on queue {}", queue),
                    e,
                )
            })?;

        info!(
            queue = %queue,
            consumer_tag = %consumer_tag,
            ack_mode = ?binding.ack_mode,
            "Consumer subscribed"
        );

        Ok(Self {
            consumer,
            queue: queue.to_string(),
            ack_mode: binding.ack_mode,
        })
    }

    fn to_inbound(&self, delivery: Delivery) -> InboundMessage {
        let Delivery {
            delivery_tag,
            data,
            acker,
            ..
        } = delivery;

        inbound_message(self.ack_mode, delivery_tag, data, AmqpAcker(acker))
    }
}

/// Consume options for the binding; the broker acks on push in `OnReceipt` mode
pub(crate) fn consume_options(binding: &BindingSettings) -> BasicConsumeOptions {
    BasicConsumeOptions {
        no_ack: binding.ack_mode == AckMode::OnReceipt,
        ..BasicConsumeOptions::default()
    }
}

/// Attach the settlement handle only when the pipeline owns the ack
fn inbound_message<A: Acknowledger + 'static>(
    ack_mode: AckMode,
    delivery_tag: u64,
    data: Vec<u8>,
    acker: A,
) -> InboundMessage {
    match ack_mode {
        AckMode::OnReceipt => InboundMessage::auto_acked(delivery_tag, data),
        AckMode::AfterDelivery => InboundMessage::with_acker(delivery_tag, data, Box::new(acker)),
    }
}

#[async_trait]
impl DeliveryStream for AmqpConsumer {
    async fn next_delivery(&mut self) -> Option<BridgeResult<InboundMessage>> {
        match self.consumer.next().await? {
            Ok(delivery) => {
                debug!(
                    queue = %self.queue,
                    delivery_tag = delivery.delivery_tag,
                    bytes = delivery.data.len(),
                    "Delivery received"
                );
                Some(Ok(self.to_inbound(delivery)))
            }
            Err(e) => Some(Err(BridgeError::connectivity_with_source(
                format!("Consumer on queue {} failed", self.queue),
                e,
            ))),
        }
    }
}

/// Settles a manually-acked delivery
struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> BridgeResult<()> {
        self.0.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> BridgeResult<()> {
        self.0.reject(BasicRejectOptions { requeue }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopAcker;

    #[async_trait]
    impl Acknowledger for NoopAcker {
        async fn ack(&self) -> BridgeResult<()> {
            Ok(())
        }

        async fn reject(&self, _requeue: bool) -> BridgeResult<()> {
            Ok(())
        }
    }

    fn binding(ack_mode: AckMode) -> BindingSettings {
        BindingSettings {
            ack_mode,
            ..BindingSettings::default()
        }
    }

    #[test]
    fn test_on_receipt_consumes_without_acks() {
        let options = consume_options(&binding(AckMode::OnReceipt));
        assert!(options.no_ack);
        assert!(!options.exclusive);

        let message = inbound_message(AckMode::OnReceipt, 7, b"{}".to_vec(), NoopAcker);
        assert_eq!(message.delivery_tag(), 7);
        assert_eq!(message.payload(), b"{}");
        assert!(!message.needs_settlement());
    }

    #[test]
    fn test_after_delivery_keeps_acker() {
        let options = consume_options(&binding(AckMode::AfterDelivery));
        assert!(!options.no_ack);

        let message = inbound_message(AckMode::AfterDelivery, 8, b"{}".to_vec(), NoopAcker);
        assert_eq!(message.delivery_tag(), 8);
        assert!(message.needs_settlement());
    }

    #[test]
    fn test_default_binding_is_at_most_once() {
        assert!(consume_options(&BindingSettings::default()).no_ack);
    }
}
