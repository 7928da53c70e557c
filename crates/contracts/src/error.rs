//! Layered error definitions
//!
//! Categorized by lifecycle stage: config (fatal at startup) / connection /
//! send / backpressure.

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Missing or invalid configuration, surfaced before any event flows
    #[error("configuration error at '{field}': {message}")]
    Configuration { field: String, message: String },

    // ===== Transport Errors =====
    /// Connection lost or never established (transient)
    #[error("transport '{transport}' connection unavailable: {message}")]
    ConnectionUnavailable { transport: String, message: String },

    /// Rejected by the destination while connected (transient)
    #[error("transport '{transport}' send failure: {message}")]
    SendFailure { transport: String, message: String },

    /// Routing key could not be computed for an event
    #[error("transport '{transport}' destination resolution failed: {message}")]
    DestinationResolution { transport: String, message: String },

    // ===== Dispatch Errors =====
    /// Bounded dispatch queue is full (backpressure signal)
    #[error("dispatch queue saturated for transport '{transport}' (capacity {capacity})")]
    QueueSaturated { transport: String, capacity: usize },

    /// Dispatch queue already shut down
    #[error("dispatch queue closed for transport '{transport}'")]
    QueueClosed { transport: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration error
    pub fn configuration(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create connection unavailable error
    pub fn connection_unavailable(
        transport: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::ConnectionUnavailable {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Create send failure error
    pub fn send_failure(transport: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SendFailure {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Create destination resolution error
    pub fn destination_resolution(
        transport: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DestinationResolution {
            transport: transport.into(),
            message: message.into(),
        }
    }

    /// Whether the failure may clear up on its own (connection, send, backpressure)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionUnavailable { .. }
                | Self::SendFailure { .. }
                | Self::QueueSaturated { .. }
        )
    }

    /// Whether the failure is a startup-time configuration problem
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ConfigParse { .. } | Self::Configuration { .. })
    }

    /// Short label used for metric dimensions
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConfigParse { .. } => "config_parse",
            Self::Configuration { .. } => "configuration",
            Self::ConnectionUnavailable { .. } => "connection_unavailable",
            Self::SendFailure { .. } => "send_failure",
            Self::DestinationResolution { .. } => "destination_resolution",
            Self::QueueSaturated { .. } => "queue_saturated",
            Self::QueueClosed { .. } => "queue_closed",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}
