//! PoolRegistry - owns every dispatch queue of a sink callback
//!
//! Queues are either dedicated to one transport or shared between transports
//! whose `PoolSettings` are equal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::PoolSettings;
use tracing::{debug, instrument};

use crate::error::DispatcherError;
use crate::queue::DispatchQueue;

#[derive(Default)]
struct Pools {
    shared: HashMap<PoolSettings, Arc<DispatchQueue>>,
    dedicated: Vec<Arc<DispatchQueue>>,
}

#[derive(Default)]
pub struct PoolRegistry {
    pools: Mutex<Pools>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the shared queue for `settings`, creating it on first use
    pub fn get_or_create(&self, settings: PoolSettings) -> Result<Arc<DispatchQueue>, DispatcherError> {
        let mut pools = self.lock();
        if let Some(queue) = pools.shared.get(&settings) {
            return Ok(Arc::clone(queue));
        }

        let queue = Arc::new(DispatchQueue::new(settings)?);
        pools.shared.insert(settings, Arc::clone(&queue));
        debug!(pool = %settings, shared = pools.shared.len(), "Shared dispatch pool registered");
        Ok(queue)
    }

    /// Create a queue owned by a single transport
    pub fn create_dedicated(
        &self,
        owner: &str,
        settings: PoolSettings,
    ) -> Result<Arc<DispatchQueue>, DispatcherError> {
        let queue = Arc::new(DispatchQueue::named(owner.to_string(), settings)?);
        self.lock().dedicated.push(Arc::clone(&queue));
        debug!(pool = %owner, settings = %settings, "Dedicated dispatch pool registered");
        Ok(queue)
    }

    /// Number of distinct queues
    pub fn len(&self) -> usize {
        let pools = self.lock();
        pools.shared.len() + pools.dedicated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain and stop every queue; the registry is empty afterwards
    #[instrument(name = "pool_registry_shutdown", skip(self))]
    pub async fn shutdown_all(&self) {
        let queues: Vec<_> = {
            let mut pools = self.lock();
            let shared = pools.shared.drain().map(|(_, queue)| queue).collect::<Vec<_>>();
            shared.into_iter().chain(pools.dedicated.drain(..)).collect()
        };

        for queue in queues {
            queue.shutdown().await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pools> {
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
