//! Transport metrics for observability
//!
//! Every per-event failure ends up in exactly one of these counters, which is
//! what makes dropped work observable.

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::ContractError;

/// Metrics for a single transport
#[derive(Debug, Default)]
pub struct TransportMetrics {
    /// Jobs accepted by the dispatch queue
    submitted: AtomicU64,
    /// Jobs sent successfully
    sent: AtomicU64,
    /// Sends failed with a lost/missing connection
    connection_unavailable: AtomicU64,
    /// Sends rejected by the destination
    send_failures: AtomicU64,
    /// Jobs rejected because the queue was full
    saturated: AtomicU64,
    /// Events whose routing key could not be computed
    resolution_failures: AtomicU64,
    /// Anything else (closed queue, io)
    other_failures: AtomicU64,
}

impl TransportMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failure under its kind
    pub fn record_failure(&self, error: &ContractError) {
        let counter = match error {
            ContractError::ConnectionUnavailable { .. } => &self.connection_unavailable,
            ContractError::SendFailure { .. } => &self.send_failures,
            ContractError::QueueSaturated { .. } => &self.saturated,
            ContractError::DestinationResolution { .. } => &self.resolution_failures,
            _ => &self.other_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn saturated(&self) -> u64 {
        self.saturated.load(Ordering::Relaxed)
    }

    /// Total reported failures of any kind
    pub fn failure_count(&self) -> u64 {
        let s = self.snapshot();
        s.connection_unavailable
            + s.send_failures
            + s.saturated
            + s.resolution_failures
            + s.other_failures
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            connection_unavailable: self.connection_unavailable.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            saturated: self.saturated.load(Ordering::Relaxed),
            resolution_failures: self.resolution_failures.load(Ordering::Relaxed),
            other_failures: self.other_failures.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of transport metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub sent: u64,
    pub connection_unavailable: u64,
    pub send_failures: u64,
    pub saturated: u64,
    pub resolution_failures: u64,
    pub other_failures: u64,
}

impl MetricsSnapshot {
    /// Jobs that reached a worker and failed there
    pub fn send_errors(&self) -> u64 {
        self.connection_unavailable + self.send_failures
    }

    /// Events that never became a job
    pub fn rejected(&self) -> u64 {
        self.saturated + self.resolution_failures + self.other_failures
    }
}
