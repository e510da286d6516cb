//! Queue declaration and binding
//!
//! The binding is a fixed startup contract: one queue, one exchange, one
//! routing key. Declaring is idempotent as long as the arguments match what
//! already exists on the broker; a mismatch is a startup failure.

use crate::config::BindingSettings;
use crate::{BridgeError, BridgeResult};
use lapin::options::{QueueBindOptions, QueueDeclareOptions};
use lapin::types::{AMQPValue, FieldTable};
use lapin::Channel;
use tracing::info;

/// Declare the queue and bind it to the configured exchange
///
/// Returns the queue name to subscribe to.
pub async fn declare_and_bind(channel: &Channel, binding: &BindingSettings) -> BridgeResult<String> {
    let queue = channel
        .queue_declare(
            &binding.queue,
            declare_options(binding),
            queue_arguments(binding),
        )
        .await
        .map_err(|e| {
            BridgeError::connectivity_with_source(
                format!("Failed to declare queue {}", binding.queue),
                e,
            )
        })?;

    info!(
        queue = %binding.queue,
        ready = queue.message_count(),
        consumers = queue.consumer_count(),
        "Queue declared"
    );

    channel
        .queue_bind(
            &binding.queue,
            &binding.exchange,
            &binding.routing_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| {
            BridgeError::connectivity_with_source(
                format!(
                    "Failed to bind queue {} to {} with key {}",
                    binding.queue, binding.exchange, binding.routing_key
                ),
                e,
            )
        })?;

    info!(
        queue = %binding.queue,
        exchange = %binding.exchange,
        routing_key = %binding.routing_key,
        "Queue bound"
    );

    Ok(binding.queue.clone())
}

fn declare_options(binding: &BindingSettings) -> QueueDeclareOptions {
    QueueDeclareOptions {
        durable: binding.durable,
        exclusive: false,
        auto_delete: false,
        ..QueueDeclareOptions::default()
    }
}

/// Arguments sent with the queue declaration
pub(crate) fn queue_arguments(binding: &BindingSettings) -> FieldTable {
    let mut arguments = FieldTable::default();
    if let Some(exchange) = &binding.dead_letter_exchange {
        arguments.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(exchange.as_str().into()),
        );
    }
    arguments
}
