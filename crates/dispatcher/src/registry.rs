//! TransportRegistry - explicit map from transport type name to factory

use std::collections::HashMap;
use std::sync::Arc;

use contracts::{ContractError, StreamDefinition, Transport, TransportDescriptor};
use tracing::{debug, instrument};

use crate::error::DispatcherError;
use crate::transports::{FileTransport, LogTransport, NetworkTransport};

/// Builds a transport from its descriptor and the stream it publishes
pub type TransportFactory = Box<
    dyn Fn(&TransportDescriptor, &StreamDefinition) -> Result<Arc<dyn Transport>, ContractError>
        + Send
        + Sync,
>;

/// Registered transport types
pub struct TransportRegistry {
    factories: HashMap<String, TransportFactory>,
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TransportRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with `log`, `file` and `network`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("log", |descriptor, stream| {
            Ok(Arc::new(LogTransport::from_descriptor(descriptor, stream)?))
        });
        registry.register("file", |descriptor, stream| {
            Ok(Arc::new(FileTransport::from_descriptor(descriptor, stream)?))
        });
        registry.register("network", |descriptor, stream| {
            Ok(Arc::new(NetworkTransport::from_descriptor(descriptor, stream)?))
        });
        registry
    }

    /// Register (or replace) the factory for `transport_type`
    pub fn register<F>(&mut self, transport_type: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&TransportDescriptor, &StreamDefinition) -> Result<Arc<dyn Transport>, ContractError>
            + Send
            + Sync
            + 'static,
    {
        let transport_type = transport_type.into();
        debug!(transport_type = %transport_type, "Transport type registered");
        self.factories.insert(transport_type, Box::new(factory));
        self
    }

    pub fn contains(&self, transport_type: &str) -> bool {
        self.factories.contains_key(transport_type)
    }

    /// Registered type names, sorted
    pub fn types(&self) -> Vec<&str> {
        let mut types: Vec<_> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Create the transport described by `descriptor`
    #[instrument(
        name = "transport_registry_create",
        skip(self, descriptor, stream),
        fields(transport = %descriptor.name, transport_type = %descriptor.transport_type)
    )]
    pub fn create(
        &self,
        descriptor: &TransportDescriptor,
        stream: &StreamDefinition,
    ) -> Result<Arc<dyn Transport>, DispatcherError> {
        let factory = self.factories.get(&descriptor.transport_type).ok_or_else(|| {
            DispatcherError::UnknownTransportType {
                name: descriptor.name.clone(),
                transport_type: descriptor.transport_type.clone(),
                registered: self.types().join(", "),
            }
        })?;

        factory(descriptor, stream)
            .map_err(|e| DispatcherError::transport_creation(&descriptor.name, e))
    }
}
