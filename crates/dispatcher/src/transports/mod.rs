//! Built-in transport implementations
//!
//! Contains LogTransport, FileTransport, and NetworkTransport.

mod codec;
mod file;
mod log;
mod network;
mod state;

use contracts::{ContractError, StreamDefinition, TransportDescriptor};

use crate::properties::{parse_properties, Properties};
use crate::routing::RoutingTemplate;

pub use self::codec::{EventCodec, WireFormat};
pub use self::file::{FileTransport, FileTransportConfig};
pub use self::log::LogTransport;
pub use self::network::{NetworkTransport, NetworkTransportConfig, Protocol};
pub use self::state::ConnectionCell;

/// Routing template of a descriptor; the transport name when none is given
pub fn routing_for(
    descriptor: &TransportDescriptor,
    stream: &StreamDefinition,
) -> Result<RoutingTemplate, ContractError> {
    match descriptor.routing_key.as_deref() {
        Some(expression) => RoutingTemplate::compile(expression, stream).map_err(|e| match e {
            ContractError::Configuration { message, .. } => ContractError::configuration(
                format!("transports[{}].routing_key", descriptor.name),
                message,
            ),
            other => other,
        }),
        None => Ok(RoutingTemplate::fixed(&descriptor.name)),
    }
}

pub fn properties_for(descriptor: &TransportDescriptor) -> Properties {
    descriptor
        .properties
        .as_deref()
        .map(parse_properties)
        .unwrap_or_default()
}
