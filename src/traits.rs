//! Seams between the pipeline and its collaborators.
//!
//! The pipeline only talks to the broker and the sink through these traits:
//! - `DeliveryStream`: yields broker deliveries one at a time
//! - `Acknowledger`: settles a delivery when acks are deferred
//! - `Forwarder`: hands one record to the sink
//!
//! Production implementations live in `broker` and `forwarder`; tests plug in
//! in-memory fakes.

use crate::{BridgeResult, DeliveryOutcome, ForwardRecord, InboundMessage};
use async_trait::async_trait;
use std::sync::Arc;

/// Source of broker deliveries
///
/// # Example
///
/// ```rust
/// use sensor_bridge::{BridgeResult, DeliveryStream, InboundMessage};
/// use async_trait::async_trait;
/// use std::collections::VecDeque;
///
/// struct Replay(VecDeque<Vec<u8>>);
///
/// #[async_trait]
/// impl DeliveryStream for Replay {
///     async fn next_delivery(&mut self) -> Option<BridgeResult<InboundMessage>> {
///         self.0
///             .pop_front()
///             .map(|payload| Ok(InboundMessage::auto_acked(0, payload)))
///     }
/// }
/// ```
#[async_trait]
pub trait DeliveryStream: Send {
    /// Wait for the next delivery
    ///
    /// Suspends until the broker pushes a message. Returns `None` once the
    /// subscription is closed and `Some(Err(_))` if the channel failed.
    async fn next_delivery(&mut self) -> Option<BridgeResult<InboundMessage>>;
}

/// Settlement handle for a delivery consumed with manual acks
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Positively acknowledge the delivery
    async fn ack(&self) -> BridgeResult<()>;

    /// Reject the delivery
    ///
    /// With `requeue == false` the broker drops it, or routes it to the queue's
    /// dead-letter exchange if one is configured.
    async fn reject(&self, requeue: bool) -> BridgeResult<()>;
}

/// Delivers transformed readings to the downstream sink
///
/// Implementations make exactly one attempt per call, bounded in time, and
/// report the result as a value rather than an error.
#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Forward a single record
    async fn forward(&self, record: &ForwardRecord) -> DeliveryOutcome;
}

#[async_trait]
impl<T: Forwarder + ?Sized> Forwarder for Arc<T> {
    async fn forward(&self, record: &ForwardRecord) -> DeliveryOutcome {
        (**self).forward(record).await
    }
}
