//! Data model of the bridge.
//!
//! Readings flow through these shapes:
//! - `InboundMessage`: one broker delivery, raw bytes plus its settlement handle
//! - `SensorReading`: what the sensor published, decoded from the payload
//! - `ForwardRecord`: what the sink receives, only built from a validated reading
//! - `DeliveryOutcome`: how the sink answered a single forward

mod inbound;
mod outcome;
mod reading;

pub use inbound::InboundMessage;
pub use outcome::{DeliveryOutcome, ProcessOutcome};
pub use reading::{ForwardRecord, SensorReading};
