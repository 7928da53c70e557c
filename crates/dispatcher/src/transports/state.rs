//! Lock-free connection state cell shared by the built-in transports

use std::sync::atomic::{AtomicU8, Ordering};

use contracts::ConnectionState;

#[derive(Debug, Default)]
pub struct ConnectionCell(AtomicU8);

impl ConnectionCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> ConnectionState {
        match self.0.load(Ordering::Acquire) {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    pub fn set(&self, state: ConnectionState) {
        let raw = match state {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        };
        self.0.store(raw, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.get() == ConnectionState::Connected
    }
}
