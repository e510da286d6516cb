//! Pipeline driver: consume → transform → forward, one delivery at a time
//!
//! Each delivery is processed in its own task. A failure or panic in one task
//! is logged and counted, and the loop moves on to the next delivery.

use crate::metrics::{BridgeMetrics, ProcessingTimer};
use crate::retry::RetryStrategy;
use crate::traits::Acknowledger;
use crate::transform::{payload_excerpt, transform};
use crate::{
    BridgeConfig, BridgeResult, DeliveryOutcome, DeliveryStream, ForwardRecord, Forwarder,
    InboundMessage, ProcessOutcome,
};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Counters accumulated over a pipeline run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Deliveries taken from the broker
    pub received: u64,
    /// Readings the sink accepted
    pub delivered: u64,
    /// Readings the sink answered with a non-2xx status
    pub rejected: u64,
    /// Readings whose final attempt never got an answer
    pub transport_failed: u64,
    /// Deliveries dropped before forwarding
    pub invalid: u64,
    /// Deliveries whose processing panicked
    pub panicked: u64,
    /// Extra forward attempts made by the retry policy
    pub retried: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    received: AtomicU64,
    delivered: AtomicU64,
    rejected: AtomicU64,
    transport_failed: AtomicU64,
    invalid: AtomicU64,
    panicked: AtomicU64,
    retried: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            received: self.received.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            transport_failed: self.transport_failed.load(Ordering::Relaxed),
            invalid: self.invalid.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}

/// Wires a delivery stream to a forwarder
///
/// The forwarder is an owned, injected resource: production passes an
/// [`crate::HttpForwarder`], tests pass fakes.
pub struct Pipeline<F: Forwarder + 'static> {
    worker: Arc<Worker<F>>,
    slots: Arc<Semaphore>,
    workers: usize,
}

/// Per-delivery processing shared by all in-flight tasks
struct Worker<F> {
    forwarder: F,
    retry_strategy: RetryStrategy,
    metrics: BridgeMetrics,
    stats: StatsCounters,
    excerpt_limit: usize,
}

impl<F: Forwarder + 'static> Pipeline<F> {
    /// Create a pipeline for the given forwarder
    pub fn new(forwarder: F, config: &BridgeConfig) -> Self {
        let metrics = BridgeMetrics::new(&config.bridge_name, &config.binding.queue);
        Self::with_metrics(forwarder, config, metrics)
    }

    /// Create a pipeline reporting to an existing metrics collector
    pub fn with_metrics(forwarder: F, config: &BridgeConfig, metrics: BridgeMetrics) -> Self {
        let workers = config.processing.workers.max(1);

        Self {
            worker: Arc::new(Worker {
                forwarder,
                retry_strategy: RetryStrategy::from_settings(&config.retry),
                metrics,
                stats: StatsCounters::default(),
                excerpt_limit: config.processing.payload_excerpt,
            }),
            slots: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Run one payload through transform and forward
    ///
    /// No acknowledgment happens here; see [`Pipeline::run`].
    pub async fn process(&self, raw: &[u8]) -> ProcessOutcome {
        self.worker.process(raw).await
    }

    /// Counters accumulated so far
    pub fn stats(&self) -> PipelineStats {
        self.worker.stats.snapshot()
    }

    /// Consume deliveries until the stream ends or `shutdown` is cancelled
    ///
    /// At most `processing.workers` deliveries are processed at once; with a
    /// single worker, deliveries are processed in the order received.
    ///
    /// On shutdown, in-flight deliveries are abandoned. When the stream ends by
    /// itself, in-flight deliveries are finished before returning.
    ///
    /// # Errors
    ///
    /// Returns the stream's error if the subscription fails. Per-message
    /// failures never surface here.
    pub async fn run<S: DeliveryStream>(
        &self,
        mut stream: S,
        shutdown: CancellationToken,
    ) -> BridgeResult<PipelineStats> {
        info!(workers = self.workers, "Entering main processing loop");

        let tracker = TaskTracker::new();
        let mut result = Ok(());

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&self.slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = stream.next_delivery() => match next {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        error!(stage = "consume", error = %e, "Delivery stream failed");
                        result = Err(e);
                        break;
                    }
                    None => {
                        info!("Delivery stream closed");
                        break;
                    }
                },
            };

            StatsCounters::bump(&self.worker.stats.received);
            self.worker.metrics.record_received();

            let worker = Arc::clone(&self.worker);
            let span = info_span!("delivery", tag = message.delivery_tag());
            tracker.spawn(
                async move {
                    let _permit = permit;
                    worker.handle_isolated(message).await;
                }
                .instrument(span),
            );
        }

        tracker.close();
        if shutdown.is_cancelled() {
            info!(
                inflight = tracker.len(),
                "Shutdown requested, abandoning in-flight deliveries"
            );
        } else {
            tracker.wait().await;
        }

        let stats = self.stats();
        info!(?stats, "Processing loop stopped");
        result.map(|_| stats)
    }
}

impl<F: Forwarder> Worker<F> {
    /// Process a delivery, containing any panic to this delivery
    ///
    /// The settlement handle is held outside the unwind boundary, so a
    /// panicked delivery is still rejected instead of staying unacked.
    async fn handle_isolated(&self, mut message: InboundMessage) {
        let acker = message.acker.take();
        let handled = AssertUnwindSafe(self.handle(message.payload()))
            .catch_unwind()
            .await;

        let delivered = match handled {
            Ok(outcome) => outcome.is_delivered(),
            Err(panic) => {
                StatsCounters::bump(&self.stats.panicked);
                self.metrics.record_panic();
                error!(
                    stage = "process",
                    panic = %panic_message(panic.as_ref()),
                    "Delivery processing panicked, continuing with next delivery"
                );
                false
            }
        };

        if let Some(acker) = acker {
            self.settle(acker.as_ref(), delivered).await;
        }
    }

    async fn handle(&self, raw: &[u8]) -> ProcessOutcome {
        let _timer = ProcessingTimer::start(self.metrics.clone());
        self.process(raw).await
    }

    async fn process(&self, raw: &[u8]) -> ProcessOutcome {
        let record = match transform(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    stage = e.stage(),
                    error = %e,
                    payload = %payload_excerpt(raw, self.excerpt_limit),
                    "Dropping invalid payload"
                );
                StatsCounters::bump(&self.stats.invalid);
                self.metrics.record_invalid(e.stage());
                return ProcessOutcome::Invalid(e);
            }
        };

        let outcome = self.forward_with_retry(&record).await;
        self.observe(&record, &outcome);
        ProcessOutcome::Forwarded(outcome)
    }

    /// Forward once, then retry transient outcomes while the strategy allows
    async fn forward_with_retry(&self, record: &ForwardRecord) -> DeliveryOutcome {
        let mut attempt = 0;

        loop {
            let outcome = self.forwarder.forward(record).await;

            if !outcome.is_retryable() || !self.retry_strategy.should_retry(attempt) {
                return outcome;
            }

            attempt += 1;
            StatsCounters::bump(&self.stats.retried);
            self.metrics.record_retry();

            let backoff = self.retry_strategy.calculate_backoff(attempt);
            warn!(
                stage = "forward",
                attempt,
                ?backoff,
                outcome = outcome.kind(),
                device_id = record.device_id(),
                "Retrying forward"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    fn observe(&self, record: &ForwardRecord, outcome: &DeliveryOutcome) {
        self.metrics.record_outcome(outcome.kind());

        match outcome {
            DeliveryOutcome::Delivered { status } => {
                StatsCounters::bump(&self.stats.delivered);
                info!(status, device_id = record.device_id(), "Reading delivered");
            }
            DeliveryOutcome::Rejected { status, body } => {
                StatsCounters::bump(&self.stats.rejected);
                error!(
                    stage = "forward",
                    status,
                    body = %body,
                    device_id = record.device_id(),
                    "Sink rejected reading"
                );
            }
            DeliveryOutcome::TransportFailed { cause } => {
                StatsCounters::bump(&self.stats.transport_failed);
                error!(
                    stage = "forward",
                    cause = %cause,
                    device_id = record.device_id(),
                    "Sink unreachable"
                );
            }
        }
    }

    /// Ack delivered readings, reject everything else without requeue
    async fn settle(&self, acker: &dyn Acknowledger, delivered: bool) {
        let settled = if delivered {
            acker.ack().await
        } else {
            acker.reject(false).await
        };

        match settled {
            Ok(()) => debug!(delivered, "Delivery settled"),
            Err(e) => error!(stage = "ack", error = %e, "Failed to settle delivery"),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrokerSettings, SinkSettings};
    use crate::ValidationError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedForwarder {
        outcomes: Mutex<Vec<DeliveryOutcome>>,
        calls: AtomicU64,
    }

    impl ScriptedForwarder {
        fn new(mut outcomes: Vec<DeliveryOutcome>) -> Self {
            outcomes.reverse();
            Self {
                outcomes: Mutex::new(outcomes),
                calls: AtomicU64::new(0),
            }
        }
    }

    #[async_trait]
    impl Forwarder for ScriptedForwarder {
        async fn forward(&self, _record: &ForwardRecord) -> DeliveryOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcomes
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(DeliveryOutcome::Delivered { status: 200 })
        }
    }

    fn config(max_retries: u32) -> BridgeConfig {
        let mut config = BridgeConfig {
            bridge_name: "test-bridge".to_string(),
            broker: BrokerSettings::new("localhost", "guest", "guest"),
            binding: Default::default(),
            sink: SinkSettings::new("http://localhost:8082/naranjas/"),
            retry: Default::default(),
            processing: Default::default(),
        };
        config.retry.max_retries = max_retries;
        config.retry.retry_backoff_ms = 1;
        config.retry.max_backoff_ms = 5;
        config
    }

    const VALID: &[u8] = br#"{"peso":1.5,"tamano":"M","color":"orange","esp32_fk":"dev-1"}"#;

    #[tokio::test]
    async fn test_invalid_payload_is_not_forwarded() {
        let pipeline = Pipeline::new(ScriptedForwarder::new(vec![]), &config(0));

        let outcome = pipeline
            .process(br#"{"peso":1.5,"tamano":"M","color":"orange","esp32_fk":""}"#)
            .await;

        assert_eq!(outcome, ProcessOutcome::Invalid(ValidationError::MissingIdentifier));
        assert_eq!(pipeline.worker.forwarder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.stats().invalid, 1);
    }

    #[tokio::test]
    async fn test_no_retry_by_default() {
        let forwarder = ScriptedForwarder::new(vec![DeliveryOutcome::TransportFailed {
            cause: "connection refused".to_string(),
        }]);
        let pipeline = Pipeline::new(forwarder, &config(0));

        let outcome = pipeline.process(VALID).await;

        assert!(matches!(
            outcome,
            ProcessOutcome::Forwarded(DeliveryOutcome::TransportFailed { .. })
        ));
        assert_eq!(pipeline.worker.forwarder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.stats().transport_failed, 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let forwarder = ScriptedForwarder::new(vec![
            DeliveryOutcome::TransportFailed {
                cause: "timeout".to_string(),
            },
            DeliveryOutcome::Rejected {
                status: 503,
                body: "busy".to_string(),
            },
            DeliveryOutcome::Delivered { status: 201 },
        ]);
        let pipeline = Pipeline::new(forwarder, &config(3));

        let outcome = pipeline.process(VALID).await;

        assert_eq!(
            outcome,
            ProcessOutcome::Forwarded(DeliveryOutcome::Delivered { status: 201 })
        );
        assert_eq!(pipeline.worker.forwarder.calls.load(Ordering::SeqCst), 3);
        let stats = pipeline.stats();
        assert_eq!(stats.retried, 2);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn test_permanent_rejection_is_not_retried() {
        let forwarder = ScriptedForwarder::new(vec![DeliveryOutcome::Rejected {
            status: 422,
            body: "bad esp32_fk".to_string(),
        }]);
        let pipeline = Pipeline::new(forwarder, &config(3));

        let outcome = pipeline.process(VALID).await;

        assert_eq!(
            outcome,
            ProcessOutcome::Forwarded(DeliveryOutcome::Rejected {
                status: 422,
                body: "bad esp32_fk".to_string(),
            })
        );
        assert_eq!(pipeline.worker.forwarder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let failures = (0..10)
            .map(|_| DeliveryOutcome::TransportFailed {
                cause: "connection refused".to_string(),
            })
            .collect();
        let pipeline = Pipeline::new(ScriptedForwarder::new(failures), &config(2));

        let outcome = pipeline.process(VALID).await;

        assert!(matches!(
            outcome,
            ProcessOutcome::Forwarded(DeliveryOutcome::TransportFailed { .. })
        ));
        assert_eq!(pipeline.worker.forwarder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(pipeline.stats().retried, 2);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(boxed.as_ref()), "kaboom");

        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "non-string panic payload");
    }
}
