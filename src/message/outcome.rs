//! Per-message results observed by the pipeline

use crate::ValidationError;

/// How the sink answered one forward attempt
///
/// Observed (logged, metered, used for acknowledgment) and then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The sink answered with a 2xx status
    Delivered { status: u16 },
    /// The sink answered with any other status
    Rejected { status: u16, body: String },
    /// The request never completed (DNS, connection refused, timeout)
    TransportFailed { cause: String },
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered { .. })
    }

    /// Whether another attempt could plausibly succeed
    ///
    /// Transport failures, server errors, 408 and 429 are transient; other
    /// rejections would be rejected again.
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryOutcome::Delivered { .. } => false,
            DeliveryOutcome::Rejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            DeliveryOutcome::TransportFailed { .. } => true,
        }
    }

    /// Short label for logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered { .. } => "delivered",
            DeliveryOutcome::Rejected { .. } => "rejected",
            DeliveryOutcome::TransportFailed { .. } => "transport_failed",
        }
    }
}

/// What happened to one broker delivery
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The payload never became a forward record; no request was issued
    Invalid(ValidationError),
    /// The record was forwarded; final outcome after any retries
    Forwarded(DeliveryOutcome),
}

impl ProcessOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ProcessOutcome::Forwarded(outcome) if outcome.is_delivered())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(!DeliveryOutcome::Delivered { status: 201 }.is_retryable());

        let rejected = |status| DeliveryOutcome::Rejected {
            status,
            body: String::new(),
        };
        assert!(!rejected(400).is_retryable());
        assert!(!rejected(422).is_retryable());
        assert!(rejected(408).is_retryable());
        assert!(rejected(429).is_retryable());
        assert!(rejected(503).is_retryable());

        assert!(DeliveryOutcome::TransportFailed {
            cause: "connection refused".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn test_process_outcome_delivered() {
        assert!(ProcessOutcome::Forwarded(DeliveryOutcome::Delivered { status: 200 }).is_delivered());
        assert!(!ProcessOutcome::Invalid(ValidationError::MissingIdentifier).is_delivered());
        assert!(!ProcessOutcome::Forwarded(DeliveryOutcome::TransportFailed {
            cause: "timeout".to_string()
        })
        .is_delivered());
    }
}
