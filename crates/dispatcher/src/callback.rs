//! SinkCallback - fans event batches out to every configured transport

use std::collections::HashSet;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use contracts::{
    ContractError, Event, OutputBlueprint, StreamDefinition, TransportDescriptor,
};

use crate::error::DispatcherError;
use crate::handle::TransportHandle;
use crate::metrics::MetricsSnapshot;
use crate::pool::PoolRegistry;
use crate::registry::TransportRegistry;

/// Builder for creating a SinkCallback
pub struct SinkCallbackBuilder {
    stream: StreamDefinition,
    descriptors: Vec<TransportDescriptor>,
    registry: TransportRegistry,
    share_pools: bool,
}

impl SinkCallbackBuilder {
    pub fn new(stream: StreamDefinition, descriptors: Vec<TransportDescriptor>) -> Self {
        Self {
            stream,
            descriptors,
            registry: TransportRegistry::with_builtins(),
            share_pools: false,
        }
    }

    /// Use `registry` instead of the built-in transports
    pub fn with_registry(mut self, registry: TransportRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Share one queue between transports with equal pool settings
    pub fn with_shared_pools(mut self, share: bool) -> Self {
        self.share_pools = share;
        self
    }

    /// Create, connect and bind every transport
    ///
    /// Fails on the first transport that cannot be created or connected;
    /// transports connected before it are closed again.
    #[instrument(
        name = "sink_callback_build",
        skip(self),
        fields(stream = %self.stream.id, transports = self.descriptors.len())
    )]
    pub async fn build(self) -> Result<SinkCallback, DispatcherError> {
        check_unique_names(&self.descriptors)?;

        let pools = PoolRegistry::new();
        let mut handles = Vec::with_capacity(self.descriptors.len());

        for descriptor in &self.descriptors {
            match self.open(&pools, descriptor).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!(transport = %descriptor.name, error = %e, "Transport initialization failed, rolling back");
                    for handle in &handles {
                        handle.close().await;
                    }
                    pools.shutdown_all().await;
                    return Err(e);
                }
            }
        }

        info!(
            stream = %self.stream.id,
            transports = handles.len(),
            pools = pools.len(),
            "Sink callback ready"
        );

        Ok(SinkCallback {
            stream: self.stream,
            handles,
            pools,
        })
    }

    #[instrument(
        name = "sink_callback_open_transport",
        skip(self, pools, descriptor),
        fields(transport = %descriptor.name, transport_type = %descriptor.transport_type)
    )]
    async fn open(
        &self,
        pools: &PoolRegistry,
        descriptor: &TransportDescriptor,
    ) -> Result<TransportHandle, DispatcherError> {
        let transport = self.registry.create(descriptor, &self.stream)?;

        let queue = if self.share_pools {
            pools.get_or_create(descriptor.pool)?
        } else {
            pools.create_dedicated(&descriptor.name, descriptor.pool)?
        };

        if let Err(e) = transport.connect().await {
            // Release whatever a partial connect acquired
            if let Err(close_err) = transport.disconnect().await {
                warn!(transport = %descriptor.name, error = %close_err, "Disconnect after failed connect failed");
            }
            if let Err(close_err) = transport.shutdown().await {
                warn!(transport = %descriptor.name, error = %close_err, "Shutdown after failed connect failed");
            }
            return Err(e.into());
        }
        debug!(transport = %descriptor.name, state = %transport.state(), pool = %queue.label(), "Transport connected");

        Ok(TransportHandle::new(transport, queue))
    }
}

fn check_unique_names(descriptors: &[TransportDescriptor]) -> Result<(), DispatcherError> {
    let mut seen = HashSet::new();
    for descriptor in descriptors {
        if !seen.insert(descriptor.name.as_str()) {
            return Err(ContractError::configuration(
                "transports.name",
                format!("duplicate transport name '{}'", descriptor.name),
            )
            .into());
        }
    }
    Ok(())
}

/// Fan-out coordinator between the pipeline and the transports
pub struct SinkCallback {
    stream: StreamDefinition,
    handles: Vec<TransportHandle>,
    pools: PoolRegistry,
}

impl SinkCallback {
    pub fn stream(&self) -> &StreamDefinition {
        &self.stream
    }

    pub fn transport_count(&self) -> usize {
        self.handles.len()
    }

    /// Number of distinct dispatch queues
    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn handles(&self) -> &[TransportHandle] {
        &self.handles
    }

    /// Get metrics for all transports
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.snapshot()))
            .collect()
    }

    /// Submit one send job per (event, transport) pair
    ///
    /// Never blocks and never fails: rejected events are counted in
    /// [`Self::metrics`] and logged. An empty batch is a no-op.
    pub fn receive(&self, events: &[Event]) {
        if events.is_empty() {
            return;
        }
        observability::record_batch_received(&self.stream.id, events.len());

        for handle in &self.handles {
            let rejected = events.iter().filter(|e| !handle.try_publish(e)).count();
            if rejected > 0 {
                warn!(
                    transport = %handle.name(),
                    rejected,
                    batch = events.len(),
                    "Batch partially dispatched"
                );
            }
        }
    }

    /// Consume batches until the channel closes, then shut down
    #[instrument(name = "sink_callback_run", skip(self, rx), fields(stream = %self.stream.id))]
    pub async fn run(self, mut rx: mpsc::Receiver<Vec<Event>>) {
        info!(transports = self.handles.len(), "Sink callback started");

        let mut batch_count: u64 = 0;
        let mut event_count: u64 = 0;

        while let Some(batch) = rx.recv().await {
            batch_count += 1;
            event_count += batch.len() as u64;
            self.receive(&batch);

            if batch_count % 100 == 0 {
                debug!(batches = batch_count, events = event_count, "Sink callback progress");
            }
        }

        info!(
            batches = batch_count,
            events = event_count,
            "Sink callback input closed, shutting down"
        );
        self.shutdown().await;
    }

    /// Spawn [`Self::run`] as a background task
    pub fn spawn(self, rx: mpsc::Receiver<Vec<Event>>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(rx).await;
        })
    }

    /// Drain every queue, then disconnect and shut down every transport
    #[instrument(name = "sink_callback_shutdown", skip(self), fields(stream = %self.stream.id))]
    pub async fn shutdown(&self) {
        self.pools.shutdown_all().await;
        for handle in &self.handles {
            handle.close().await;
        }
        info!("Sink callback shutdown complete");
    }
}

/// Convenience function to create a sink callback from a blueprint
#[instrument(name = "sink_callback_create", skip(blueprint), fields(stream = %blueprint.stream.id))]
pub async fn create_sink_callback(blueprint: &OutputBlueprint) -> Result<SinkCallback, DispatcherError> {
    SinkCallbackBuilder::new(blueprint.stream.clone(), blueprint.transports.clone())
        .with_shared_pools(blueprint.share_pools)
        .build()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use contracts::{Attribute, AttributeType, ConnectionState, PoolSettings, Transport};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn stream() -> StreamDefinition {
        StreamDefinition::new("StockStream", vec![Attribute::new("symbol", AttributeType::String)])
    }

    fn batch(n: i64) -> Vec<Event> {
        (0..n).map(|ts| Event::new(ts, vec!["IBM".into()])).collect()
    }

    /// Registry whose "mock" type hands out pre-built transports by name
    fn mock_registry(mocks: &[Arc<MockTransport>]) -> TransportRegistry {
        let by_name: HashMap<String, Arc<MockTransport>> = mocks
            .iter()
            .map(|m| (m.name().to_string(), Arc::clone(m)))
            .collect();

        let mut registry = TransportRegistry::new();
        registry.register("mock", move |descriptor, _| {
            let mock = by_name
                .get(&descriptor.name)
                .cloned()
                .ok_or_else(|| ContractError::configuration("name", "no such mock"))?;
            Ok(mock as Arc<dyn Transport>)
        });
        registry
    }

    fn descriptors(names: &[&str], pool: PoolSettings) -> Vec<TransportDescriptor> {
        names
            .iter()
            .map(|n| TransportDescriptor::new(*n, "mock").with_pool(pool))
            .collect()
    }

    #[tokio::test]
    async fn test_every_transport_gets_every_event() {
        let mocks: Vec<_> = ["a", "b"].iter().map(|n| Arc::new(MockTransport::new(n))).collect();
        let callback = SinkCallbackBuilder::new(stream(), descriptors(&["a", "b"], PoolSettings::new(1, 2, 16)))
            .with_registry(mock_registry(&mocks))
            .build()
            .await
            .unwrap();
        assert_eq!(callback.pool_count(), 2);

        callback.receive(&batch(5));
        callback.shutdown().await;

        for mock in &mocks {
            assert_eq!(mock.sent_timestamps().len(), 5);
            assert_eq!(mock.shutdowns(), 1);
        }
        for (_, snapshot) in callback.metrics() {
            assert_eq!(snapshot.submitted, 5);
            assert_eq!(snapshot.sent, 5);
        }
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let mock = Arc::new(MockTransport::new("a"));
        let callback = SinkCallbackBuilder::new(stream(), descriptors(&["a"], PoolSettings::new(1, 1, 4)))
            .with_registry(mock_registry(&[Arc::clone(&mock)]))
            .build()
            .await
            .unwrap();

        callback.receive(&[]);
        callback.shutdown().await;

        assert_eq!(mock.attempts(), 0);
        let metrics = callback.metrics();
        assert_eq!(metrics[0].1, MetricsSnapshot::default());
    }

    #[tokio::test]
    async fn test_saturation_isolated_per_transport() {
        let names = ["a", "b", "c"];
        let mocks: Vec<_> = names.iter().map(|n| Arc::new(MockTransport::new(n))).collect();
        let callback = SinkCallbackBuilder::new(stream(), descriptors(&names, PoolSettings::new(1, 1, 2)))
            .with_registry(mock_registry(&mocks))
            .build()
            .await
            .unwrap();

        callback.receive(&batch(5));

        for (_, s) in callback.metrics() {
            assert_eq!(s.submitted, 2);
            assert_eq!(s.saturated, 3);
        }

        callback.shutdown().await;
        for mock in &mocks {
            assert_eq!(mock.sent_timestamps(), vec![0, 1]);
        }
    }

    #[tokio::test]
    async fn test_failing_transport_does_not_affect_others() {
        let down = Arc::new(MockTransport::new("down").failing_with_connection_loss());
        let up = Arc::new(MockTransport::new("up"));
        let callback = SinkCallbackBuilder::new(stream(), descriptors(&["down", "up"], PoolSettings::new(1, 1, 8)))
            .with_registry(mock_registry(&[Arc::clone(&down), Arc::clone(&up)]))
            .build()
            .await
            .unwrap();

        callback.receive(&batch(3));
        callback.shutdown().await;

        assert_eq!(down.attempts(), 3);
        assert_eq!(up.sent_timestamps(), vec![0, 1, 2]);
        let metrics: HashMap<_, _> = callback.metrics().into_iter().collect();
        assert_eq!(metrics["down"].connection_unavailable, 3);
        assert_eq!(metrics["up"].send_errors(), 0);
    }

    #[tokio::test]
    async fn test_connect_failure_rolls_back() {
        let ok = Arc::new(MockTransport::new("ok"));
        let bad = Arc::new(MockTransport::new("bad").refusing_connect());
        let result = SinkCallbackBuilder::new(stream(), descriptors(&["ok", "bad"], PoolSettings::new(1, 1, 4)))
            .with_registry(mock_registry(&[Arc::clone(&ok), Arc::clone(&bad)]))
            .build()
            .await;

        let err = result.err().unwrap();
        assert!(matches!(
            err.contract_error(),
            Some(ContractError::ConnectionUnavailable { .. })
        ));
        assert_eq!(ok.shutdowns(), 1);
        assert_eq!(ok.state(), ConnectionState::Disconnected);
        assert_eq!(bad.connects(), 1);
        assert_eq!(bad.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_rejected_sends_counted() {
        let picky = Arc::new(MockTransport::new("picky").rejecting_sends());
        let callback = SinkCallbackBuilder::new(stream(), descriptors(&["picky"], PoolSettings::new(1, 2, 16)))
            .with_registry(mock_registry(&[Arc::clone(&picky)]))
            .build()
            .await
            .unwrap();
        assert_eq!(picky.connects(), 1);

        callback.receive(&batch(4));
        callback.shutdown().await;

        assert_eq!(picky.attempts(), 4);
        assert!(picky.sent_timestamps().is_empty());
        let snapshot = &callback.metrics()[0].1;
        assert_eq!(snapshot.submitted, 4);
        assert_eq!(snapshot.send_failures, 4);
        assert_eq!(snapshot.sent, 0);
    }

    #[tokio::test]
    async fn test_shared_pools() {
        let mocks: Vec<_> = ["a", "b"].iter().map(|n| Arc::new(MockTransport::new(n))).collect();
        let callback = SinkCallbackBuilder::new(stream(), descriptors(&["a", "b"], PoolSettings::new(1, 1, 4)))
            .with_registry(mock_registry(&mocks))
            .with_shared_pools(true)
            .build()
            .await
            .unwrap();

        assert_eq!(callback.pool_count(), 1);
        callback.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected() {
        let result = SinkCallbackBuilder::new(stream(), descriptors(&["a", "a"], PoolSettings::new(1, 1, 4)))
            .with_registry(mock_registry(&[]))
            .build()
            .await;
        let err = result.err().unwrap();
        assert!(err.contract_error().is_some_and(ContractError::is_configuration));
    }

    #[tokio::test]
    async fn test_run_drains_channel() {
        let mock = Arc::new(MockTransport::new("a"));
        let callback = SinkCallbackBuilder::new(stream(), descriptors(&["a"], PoolSettings::new(1, 2, 64)))
            .with_registry(mock_registry(&[Arc::clone(&mock)]))
            .build()
            .await
            .unwrap();

        let (tx, rx) = mpsc::channel(4);
        let task = callback.spawn(rx);
        for _ in 0..3 {
            tx.send(batch(4)).await.unwrap();
        }
        drop(tx);
        task.await.unwrap();

        assert_eq!(mock.sent_timestamps().len(), 12);
        assert_eq!(mock.shutdowns(), 1);
    }

    #[tokio::test]
    async fn test_create_from_blueprint() {
        let blueprint = OutputBlueprint {
            version: Default::default(),
            stream: stream(),
            share_pools: false,
            transports: vec![TransportDescriptor::new("console", "log").with_pool(PoolSettings::new(1, 1, 8))],
        };

        let callback = create_sink_callback(&blueprint).await.unwrap();
        assert_eq!(callback.transport_count(), 1);
        callback.receive(&batch(2));
        callback.shutdown().await;
        assert_eq!(callback.metrics()[0].1.sent, 2);
    }
}
