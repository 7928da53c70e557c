//! TransportHandle - binds a transport to its metrics and dispatch queue

use std::sync::Arc;
use tracing::{debug, error, instrument, warn};

use contracts::{ConnectionState, ContractError, Event, Transport};

use crate::metrics::{MetricsSnapshot, TransportMetrics};
use crate::queue::{DispatchQueue, SendJob};

/// Handle to a connected transport
pub struct TransportHandle {
    transport: Arc<dyn Transport>,
    /// Shared with every job submitted for this transport
    metrics: Arc<TransportMetrics>,
    /// Possibly shared with other transports
    queue: Arc<DispatchQueue>,
}

impl TransportHandle {
    pub fn new(transport: Arc<dyn Transport>, queue: Arc<DispatchQueue>) -> Self {
        Self {
            transport,
            metrics: Arc::new(TransportMetrics::new()),
            queue,
        }
    }

    /// Get transport name
    pub fn name(&self) -> &str {
        self.transport.name()
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn queue(&self) -> &Arc<DispatchQueue> {
        &self.queue
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<TransportMetrics> {
        &self.metrics
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Resolve the destination and enqueue one send job (non-blocking)
    ///
    /// # Errors
    /// `DestinationResolution`, `QueueSaturated` or `QueueClosed`; nothing is
    /// recorded, see [`Self::try_publish`].
    pub fn publish(&self, event: &Event) -> Result<(), ContractError> {
        let destination = self.transport.resolve_destination(event)?;
        let job = SendJob::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.metrics),
            destination,
            event.clone(),
        );
        self.queue.submit(job)?;

        self.metrics.inc_submitted();
        observability::record_job_submitted(self.name());
        Ok(())
    }

    /// Publish, recording and logging any failure
    ///
    /// Returns true if the job was enqueued, false if the event was dropped
    pub fn try_publish(&self, event: &Event) -> bool {
        match self.publish(event) {
            Ok(()) => true,
            Err(e) => {
                self.metrics.record_failure(&e);
                observability::record_job_rejected(self.name(), e.kind());
                match e {
                    ContractError::QueueSaturated { .. } => warn!(
                        transport = %self.name(),
                        timestamp = event.timestamp,
                        error = %e,
                        "Queue full, event dropped"
                    ),
                    _ => error!(
                        transport = %self.name(),
                        timestamp = event.timestamp,
                        error = %e,
                        "Event not dispatched"
                    ),
                }
                false
            }
        }
    }

    /// Disconnect and release the transport; queue teardown is the caller's job
    #[instrument(name = "transport_handle_close", skip(self), fields(transport = %self.name()))]
    pub async fn close(&self) {
        if let Err(e) = self.transport.disconnect().await {
            error!(transport = %self.name(), error = %e, "Disconnect failed");
        }
        if let Err(e) = self.transport.shutdown().await {
            error!(transport = %self.name(), error = %e, "Shutdown failed");
        }
        debug!(transport = %self.name(), "TransportHandle closed");
    }
}
