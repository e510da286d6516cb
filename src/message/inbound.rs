//! InboundMessage - one delivery received from the broker

use crate::traits::Acknowledger;
use std::fmt;

/// A single broker delivery handed to the pipeline
pub struct InboundMessage {
    /// Broker-assigned delivery tag
    pub(crate) delivery_tag: u64,
    /// Raw payload bytes
    pub(crate) payload: Vec<u8>,
    /// Settlement handle; `None` when the broker acknowledged on receipt
    pub(crate) acker: Option<Box<dyn Acknowledger>>,
}

impl InboundMessage {
    /// A delivery the broker already considers acknowledged
    pub fn auto_acked(delivery_tag: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            delivery_tag,
            payload: payload.into(),
            acker: None,
        }
    }

    /// A delivery that must be settled by the pipeline
    pub fn with_acker(
        delivery_tag: u64,
        payload: impl Into<Vec<u8>>,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            delivery_tag,
            payload: payload.into(),
            acker: Some(acker),
        }
    }

    pub fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Check if the pipeline is responsible for acknowledging this delivery
    pub fn needs_settlement(&self) -> bool {
        self.acker.is_some()
    }
}

impl fmt::Debug for InboundMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundMessage")
            .field("delivery_tag", &self.delivery_tag)
            .field("payload_len", &self.payload.len())
            .field("needs_settlement", &self.needs_settlement())
            .finish()
    }
}
