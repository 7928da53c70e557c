//! # Contracts
//!
//! Frozen interface contracts, defining inter-module data structures and traits.
//! All business crates can only depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Events carry a logical timestamp (epoch milliseconds) assigned upstream
//! - Batch boundaries are kept for fan-out, not for downstream ordering

mod blueprint;
mod destination;
mod error;
mod event;
mod transport;

pub use blueprint::*;
pub use destination::DestinationKey;
pub use error::*;
pub use event::*;
pub use transport::{ConnectionState, Transport};
