//! # Sensor Bridge
//!
//! Relays sensor readings from an AMQP queue to an HTTP ingestion API.
//!
//! Each delivery on the bound queue is decoded into a [`SensorReading`],
//! validated, and POSTed to the sink as a [`ForwardRecord`]. The sink's answer
//! is classified into a [`DeliveryOutcome`], logged, and discarded. One bad
//! message never stops the stream.
//!
//! ## Overview
//!
//! - **Broker**: connection, topology binding and subscription (`lapin`)
//! - **Transform**: JSON decoding and validation ([`transform()`])
//! - **Forwarder**: one time-bounded HTTP POST per reading ([`HttpForwarder`])
//! - **Pipeline**: per-delivery isolation, optional retry, ack settlement ([`Pipeline`])
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sensor_bridge::{BridgeConfig, BridgeResult, BridgeRuntime};
//!
//! #[tokio::main]
//! async fn main() -> BridgeResult<()> {
//!     let config = BridgeConfig::from_env()?;
//!     let runtime = BridgeRuntime::new(config).await?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Delivery guarantees
//!
//! By default deliveries are acknowledged on receipt and each reading is
//! forwarded once (at-most-once). Setting `binding.ack_mode = "after_delivery"`
//! defers the ack until the sink accepts the reading and rejects failures
//! towards the queue's dead-letter exchange; `retry.max_retries` adds bounded
//! retries with backoff for transient sink failures.

pub mod broker;
mod config;
mod error;
mod forwarder;
mod message;
mod metrics;
mod retry;
mod runtime;
pub mod transform;
mod traits;

// Re-export public API
pub use config::{
    AckMode, BindingSettings, BridgeConfig, BrokerSettings, ProcessingSettings, RetrySettings,
    SinkSettings,
};
pub use error::{BridgeError, BridgeResult, ValidationError};
pub use forwarder::HttpForwarder;
pub use message::{DeliveryOutcome, ForwardRecord, InboundMessage, ProcessOutcome, SensorReading};
pub use metrics::BridgeMetrics;
pub use runtime::{BridgeRuntime, Pipeline, PipelineStats};
pub use traits::{Acknowledger, DeliveryStream, Forwarder};
pub use transform::transform;

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
