//! Transport trait - Dispatcher output interface
//!
//! Capability set every concrete destination (broker client, file, log, ...)
//! must satisfy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ContractError, DestinationKey, Event};

/// Per-transport connection state machine
///
/// `Disconnected -> Connecting -> Connected -> Disconnected (on failure)`.
/// Owned by the transport; the dispatcher only observes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Output transport trait
///
/// Implementations are shared as `Arc<dyn Transport>` between the fan-out
/// coordinator and every dispatch worker, so all methods take `&self` and
/// `send` must tolerate concurrent calls.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Registered type name
    fn transport_type(&self) -> &str;

    /// Current connection state
    fn state(&self) -> ConnectionState;

    /// Compute the routing target for an event
    ///
    /// Pure: no I/O and no state change.
    fn resolve_destination(&self, event: &Event) -> Result<DestinationKey, ContractError>;

    /// Establish the underlying connection
    ///
    /// No-op when already connected.
    ///
    /// # Errors
    /// `ConnectionUnavailable` if the destination cannot be reached
    async fn connect(&self) -> Result<(), ContractError>;

    /// Serialize and transmit one event
    ///
    /// # Errors
    /// `ConnectionUnavailable` when the connection is lost, `SendFailure`
    /// when the destination rejects the event
    async fn send(&self, destination: &DestinationKey, event: &Event)
        -> Result<(), ContractError>;

    /// Release the connection; safe to call repeatedly or before `connect`
    async fn disconnect(&self) -> Result<(), ContractError>;

    /// Release every owned resource; safe to call repeatedly
    async fn shutdown(&self) -> Result<(), ContractError>;
}
