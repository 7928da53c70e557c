//! LogTransport - logs event summaries via tracing

use async_trait::async_trait;
use contracts::{
    ConnectionState, ContractError, DestinationKey, Event, StreamDefinition, Transport,
    TransportDescriptor,
};
use tracing::{debug, info, instrument};

use super::ConnectionCell;
use crate::routing::RoutingTemplate;

/// Transport that logs each event for debugging; always reachable
pub struct LogTransport {
    name: String,
    stream: String,
    routing: RoutingTemplate,
    state: ConnectionCell,
}

impl LogTransport {
    pub fn new(name: impl Into<String>, stream: &StreamDefinition, routing: RoutingTemplate) -> Self {
        Self {
            name: name.into(),
            stream: stream.id.clone(),
            routing,
            state: ConnectionCell::new(),
        }
    }

    /// Create from a descriptor (for the registry)
    pub fn from_descriptor(
        descriptor: &TransportDescriptor,
        stream: &StreamDefinition,
    ) -> Result<Self, ContractError> {
        let routing = super::routing_for(descriptor, stream)?;
        Ok(Self::new(&descriptor.name, stream, routing))
    }
}

#[async_trait]
impl Transport for LogTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport_type(&self) -> &str {
        "log"
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn resolve_destination(&self, event: &Event) -> Result<DestinationKey, ContractError> {
        self.routing.resolve(&self.name, event)
    }

    async fn connect(&self) -> Result<(), ContractError> {
        self.state.set(ConnectionState::Connected);
        debug!(transport = %self.name, routing_key = %self.routing.expression(), "LogTransport ready");
        Ok(())
    }

    #[instrument(
        name = "log_transport_send",
        skip(self, event),
        fields(transport = %self.name, destination = %destination)
    )]
    async fn send(&self, destination: &DestinationKey, event: &Event) -> Result<(), ContractError> {
        let data: Vec<String> = event.data().iter().map(ToString::to_string).collect();
        info!(
            transport = %self.name,
            stream = %self.stream,
            destination = %destination,
            timestamp = event.timestamp,
            data = ?data,
            "Event published"
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ContractError> {
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    #[instrument(name = "log_transport_shutdown", skip(self))]
    async fn shutdown(&self) -> Result<(), ContractError> {
        self.state.set(ConnectionState::Disconnected);
        info!(transport = %self.name, "LogTransport closed");
        Ok(())
    }
}
