//! AMQP broker plumbing.
//!
//! This module owns everything that talks to the broker:
//! - `BrokerConnection`: connection bootstrapping with fail-fast semantics
//! - `topology`: queue declaration and exchange binding, run once at startup
//! - `AmqpConsumer`: the subscription, exposed as a `DeliveryStream`

mod connection;
mod consumer;
pub mod topology;

pub use connection::BrokerConnection;
pub use consumer::AmqpConsumer;
