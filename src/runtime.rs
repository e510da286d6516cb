//! Runtime for the bridge process.
//!
//! - `Pipeline`: the per-delivery transform/forward loop with failure isolation
//! - `BridgeRuntime`: process lifecycle around it
//!
//! The runtime handles:
//! - Configuration validation and tracing setup
//! - Broker connection, topology binding and subscription
//! - Signal-driven shutdown

mod bridge_runtime;
mod pipeline;

pub use bridge_runtime::BridgeRuntime;
pub use pipeline::{Pipeline, PipelineStats};
