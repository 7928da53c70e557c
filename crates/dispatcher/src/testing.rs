//! Mock transport shared by the dispatcher unit tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use contracts::{ConnectionState, ContractError, DestinationKey, Event, Transport};

use crate::transports::ConnectionCell;

#[derive(Debug, Clone, Copy)]
enum Failure {
    ConnectionLoss,
    Rejected,
}

pub(crate) struct MockTransport {
    name: String,
    state: ConnectionCell,
    delay: Duration,
    failure: Option<Failure>,
    refuse_connect: bool,
    unroutable: HashSet<i64>,
    attempts: AtomicU64,
    connects: AtomicU64,
    shutdowns: AtomicU64,
    sent: Mutex<Vec<(DestinationKey, i64)>>,
}

impl MockTransport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: ConnectionCell::new(),
            delay: Duration::ZERO,
            failure: None,
            refuse_connect: false,
            unroutable: HashSet::new(),
            attempts: AtomicU64::new(0),
            connects: AtomicU64::new(0),
            shutdowns: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_with_connection_loss(mut self) -> Self {
        self.failure = Some(Failure::ConnectionLoss);
        self
    }

    pub fn rejecting_sends(mut self) -> Self {
        self.failure = Some(Failure::Rejected);
        self
    }

    pub fn refusing_connect(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    /// Events with this timestamp fail destination resolution
    pub fn unroutable(mut self, timestamp: i64) -> Self {
        self.unroutable.insert(timestamp);
        self
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> u64 {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn sent_timestamps(&self) -> Vec<i64> {
        self.sent.lock().unwrap().iter().map(|(_, ts)| *ts).collect()
    }

    pub fn sent_destinations(&self) -> Vec<DestinationKey> {
        self.sent.lock().unwrap().iter().map(|(key, _)| key.clone()).collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport_type(&self) -> &str {
        "mock"
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn resolve_destination(&self, event: &Event) -> Result<DestinationKey, ContractError> {
        if self.unroutable.contains(&event.timestamp) {
            return Err(ContractError::destination_resolution(&self.name, "unroutable"));
        }
        Ok(DestinationKey::from(format!("{}-topic", self.name)))
    }

    async fn connect(&self) -> Result<(), ContractError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connect {
            return Err(ContractError::connection_unavailable(&self.name, "refused"));
        }
        self.state.set(ConnectionState::Connected);
        Ok(())
    }

    async fn send(&self, destination: &DestinationKey, event: &Event) -> Result<(), ContractError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match self.failure {
            Some(Failure::ConnectionLoss) => {
                Err(ContractError::connection_unavailable(&self.name, "broker down"))
            }
            Some(Failure::Rejected) => Err(ContractError::send_failure(&self.name, "rejected")),
            None => {
                self.sent
                    .lock()
                    .unwrap()
                    .push((destination.clone(), event.timestamp));
                Ok(())
            }
        }
    }

    async fn disconnect(&self) -> Result<(), ContractError> {
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ContractError> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }
}
