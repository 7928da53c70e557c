//! # Dispatcher
//!
//! Event output fan-out.
//!
//! Responsibilities:
//! - Fan each event batch out to every configured transport
//! - Bound send work per transport with a dispatch queue and worker pool
//! - Isolate slow or failing transports from the pipeline and from each other

pub mod callback;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod pool;
pub mod properties;
pub mod queue;
pub mod registry;
pub mod routing;
pub mod transports;

#[cfg(test)]
mod testing;

pub use callback::{create_sink_callback, SinkCallback, SinkCallbackBuilder};
pub use contracts::{Event, Transport};
pub use error::DispatcherError;
pub use handle::TransportHandle;
pub use metrics::{MetricsSnapshot, TransportMetrics};
pub use pool::PoolRegistry;
pub use properties::{parse_properties, Properties};
pub use queue::{DispatchQueue, QueueStats, SendJob};
pub use registry::{TransportFactory, TransportRegistry};
pub use routing::RoutingTemplate;
pub use transports::{FileTransport, LogTransport, NetworkTransport};
