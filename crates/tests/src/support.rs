//! In-memory transport used by the end-to-end scenarios.
//!
//! Behaviour is driven by descriptor params, so scenarios stay declarative:
//! `delay_ms`, `fail`, `refuse_connect`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use contracts::{
    ConnectionState, ContractError, DestinationKey, Event, StreamDefinition, Transport,
    TransportDescriptor,
};
use dispatcher::transports::ConnectionCell;
use dispatcher::{RoutingTemplate, TransportRegistry};

pub struct RecordingTransport {
    name: String,
    routing: RoutingTemplate,
    state: ConnectionCell,
    delay: Duration,
    fail_sends: bool,
    refuse_connect: bool,
    attempts: AtomicUsize,
    shutdowns: AtomicUsize,
    sent: Mutex<Vec<(String, i64)>>,
}

impl RecordingTransport {
    fn from_descriptor(
        descriptor: &TransportDescriptor,
        stream: &StreamDefinition,
    ) -> Result<Self, ContractError> {
        let routing = match descriptor.routing_key.as_deref() {
            Some(expression) => RoutingTemplate::compile(expression, stream)?,
            None => RoutingTemplate::fixed(&descriptor.name),
        };
        let flag = |key: &str| descriptor.params.get(key).is_some_and(|v| v == "true");

        Ok(Self {
            name: descriptor.name.clone(),
            routing,
            state: ConnectionCell::new(),
            delay: Duration::from_millis(
                descriptor
                    .params
                    .get("delay_ms")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
            ),
            fail_sends: flag("fail"),
            refuse_connect: flag("refuse_connect"),
            attempts: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// `(destination, timestamp)` of every successful send
    pub fn sent(&self) -> Vec<(String, i64)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_timestamps(&self) -> Vec<i64> {
        self.sent().into_iter().map(|(_, ts)| ts).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport_type(&self) -> &str {
        "recording"
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn resolve_destination(&self, event: &Event) -> Result<DestinationKey, ContractError> {
        self.routing.resolve(&self.name, event)
    }

    async fn connect(&self) -> Result<(), ContractError> {
        if self.refuse_connect {
            return Err(ContractError::connection_unavailable(&self.name, "connection refused"));
        }
        self.state.set(ConnectionState::Connected);
        Ok(())
    }

    async fn send(&self, destination: &DestinationKey, event: &Event) -> Result<(), ContractError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_sends {
            return Err(ContractError::send_failure(&self.name, "rejected by peer"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_string(), event.timestamp));
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ContractError> {
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ContractError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Every transport the "recording" factory created, by name
#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<HashMap<String, Arc<RecordingTransport>>>>);

impl Recorded {
    pub fn get(&self, name: &str) -> Arc<RecordingTransport> {
        let transports = self.0.lock().unwrap();
        Arc::clone(
            transports
                .get(name)
                .unwrap_or_else(|| panic!("no recording transport named '{name}'")),
        )
    }
}

/// Built-in registry plus a "recording" type
pub fn recording_registry() -> (TransportRegistry, Recorded) {
    let recorded = Recorded::default();
    let sink = recorded.clone();

    let mut registry = TransportRegistry::with_builtins();
    registry.register("recording", move |descriptor, stream| {
        let transport = Arc::new(RecordingTransport::from_descriptor(descriptor, stream)?);
        sink.0
            .lock()
            .unwrap()
            .insert(descriptor.name.clone(), Arc::clone(&transport));
        Ok(transport as Arc<dyn Transport>)
    });

    (registry, recorded)
}
