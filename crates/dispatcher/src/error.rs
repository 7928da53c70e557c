//! Dispatcher error types

use thiserror::Error;

/// Dispatcher-specific errors, all raised while building the fan-out
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// No factory registered for the requested transport type
    #[error("unknown transport type '{transport_type}' for transport '{name}' (registered: {registered})")]
    UnknownTransportType {
        name: String,
        transport_type: String,
        registered: String,
    },

    /// Transport creation error
    #[error("failed to create transport '{name}': {source}")]
    TransportCreation {
        name: String,
        #[source]
        source: contracts::ContractError,
    },

    /// Dispatch pools need a running tokio runtime
    #[error("dispatch pool requires a tokio runtime: {0}")]
    Runtime(String),

    /// Contract error (connection failure at startup, invalid settings)
    #[error("dispatcher error: {0}")]
    Contract(#[from] contracts::ContractError),
}

impl DispatcherError {
    /// Create a transport creation error
    pub fn transport_creation(name: impl Into<String>, source: contracts::ContractError) -> Self {
        Self::TransportCreation {
            name: name.into(),
            source,
        }
    }

    /// The underlying contract error, if any
    pub fn contract_error(&self) -> Option<&contracts::ContractError> {
        match self {
            Self::TransportCreation { source, .. } => Some(source),
            Self::Contract(e) => Some(e),
            _ => None,
        }
    }
}
