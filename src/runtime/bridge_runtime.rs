//! Bridge Runtime for Broker → HTTP sink relaying
//!
//! Opens the broker connection, binds the queue, subscribes, and drives the
//! pipeline until a shutdown signal arrives.

use crate::broker::{topology, AmqpConsumer, BrokerConnection};
use crate::runtime::{Pipeline, PipelineStats};
use crate::{BridgeConfig, BridgeMetrics, BridgeResult, HttpForwarder};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Runtime for the bridge process
///
/// Create with `BridgeRuntime::new()` and run with `.run().await`.
/// Construction fails fast: an invalid configuration or an unreachable broker
/// is returned as an error before any message is consumed.
pub struct BridgeRuntime {
    config: BridgeConfig,
    connection: BrokerConnection,
    metrics: BridgeMetrics,
    shutdown: CancellationToken,
}

impl BridgeRuntime {
    /// Create a new bridge runtime
    pub async fn new(config: BridgeConfig) -> BridgeResult<Self> {
        Self::init_tracing(&config);

        config.validate()?;

        info!("Initializing Bridge Runtime");
        info!(
            bridge = %config.bridge_name,
            broker = %config.broker.host,
            sink = %config.sink.url,
            "Configuration loaded"
        );

        let connection = BrokerConnection::connect(&config.broker).await?;
        let metrics = BridgeMetrics::new(&config.bridge_name, &config.binding.queue);

        Ok(Self {
            config,
            connection,
            metrics,
            shutdown: CancellationToken::new(),
        })
    }

    /// Token that stops the runtime when cancelled
    ///
    /// Cancelled automatically on Ctrl-C (and SIGTERM on Unix).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Bind, subscribe and process deliveries until shutdown
    pub async fn run(self) -> BridgeResult<PipelineStats> {
        info!("Starting Bridge Runtime");

        self.setup_shutdown_handler();

        let channel = self.connection.open_channel().await?;
        let queue = topology::declare_and_bind(&channel, &self.config.binding).await?;

        let consumer_tag = format!("{}-{}", self.config.bridge_name, std::process::id());
        let consumer =
            AmqpConsumer::subscribe(&channel, &queue, &consumer_tag, &self.config.binding).await?;

        let forwarder = HttpForwarder::new(&self.config.sink)?;
        let pipeline = Pipeline::with_metrics(forwarder, &self.config, self.metrics.clone());

        info!(queue = %queue, sink = %self.config.sink.url, "Waiting for sensor readings");
        self.metrics.set_health(true);

        let result = pipeline.run(consumer, self.shutdown.clone()).await;

        self.metrics.set_health(false);
        if let Err(e) = self.connection.close().await {
            error!(error = %e, "Error closing broker connection");
        }
        info!("Bridge Runtime stopped");

        result
    }

    /// Setup shutdown signal handler
    fn setup_shutdown_handler(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = wait_for_signal() => {}
            }
            info!("Received shutdown signal");
            shutdown.cancel();
        });
    }

    /// Initialize tracing/logging
    fn init_tracing(config: &BridgeConfig) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.processing.log_level));

        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .ok(); // Ignore if already initialized
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix; never resolves if no handler can be installed
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(e) => {
            error!(error = %e, "Failed to install SIGTERM handler");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
