//! DispatchQueue - bounded job queue plus a supervised worker pool
//!
//! Submission never blocks: a full queue rejects the job with
//! `QueueSaturated`. Jobs are dequeued in submission order, but with more
//! than one worker their completion order is unspecified.
//!
//! Workers above `min_workers` are spawned on demand (backlog larger than the
//! idle worker count) up to `max_workers`, and retire after `keep_alive` idle.
//! Shutdown closes the queue and drains jobs that were already accepted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender, TrySendError};
use contracts::{ContractError, DestinationKey, Event, PoolSettings, Transport};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, trace};

use crate::error::DispatcherError;
use crate::metrics::TransportMetrics;

/// One (transport, event) pair awaiting execution
pub struct SendJob {
    transport: Arc<dyn Transport>,
    metrics: Arc<TransportMetrics>,
    destination: DestinationKey,
    event: Event,
}

impl SendJob {
    pub fn new(
        transport: Arc<dyn Transport>,
        metrics: Arc<TransportMetrics>,
        destination: DestinationKey,
        event: Event,
    ) -> Self {
        Self {
            transport,
            metrics,
            destination,
            event,
        }
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn destination(&self) -> &DestinationKey {
        &self.destination
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    /// Send once; failures are reported and the job is discarded
    async fn execute(self) {
        let name = self.transport.name();
        match self.transport.send(&self.destination, &self.event).await {
            Ok(()) => {
                self.metrics.inc_sent();
                observability::record_send_result(name, "success");
            }
            Err(e) => {
                self.metrics.record_failure(&e);
                observability::record_send_result(name, e.kind());
                error!(
                    transport = %name,
                    destination = %self.destination,
                    timestamp = self.event.timestamp,
                    error = %e,
                    "Send failed, event discarded"
                );
            }
        }
    }
}

/// Point-in-time view of a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    pub queued: usize,
    pub capacity: usize,
    pub live_workers: usize,
    pub idle_workers: usize,
}

#[derive(Debug, Default)]
struct WorkerCounts {
    live: AtomicUsize,
    idle: AtomicUsize,
}

impl WorkerCounts {
    /// Claim a worker slot if fewer than `max` are live; the new worker counts as idle
    fn try_reserve(&self, max: usize) -> bool {
        let reserved = self
            .live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
            .is_ok();
        if reserved {
            self.idle.fetch_add(1, Ordering::SeqCst);
        }
        reserved
    }

    fn try_release(&self, min: usize) -> bool {
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n > min).then(|| n - 1))
            .is_ok()
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn idle(&self) -> usize {
        self.idle.load(Ordering::SeqCst)
    }
}

/// Bounded FIFO of send jobs served by an elastic set of worker tasks
pub struct DispatchQueue {
    label: String,
    settings: PoolSettings,
    tx: Sender<SendJob>,
    rx: Receiver<SendJob>,
    counts: Arc<WorkerCounts>,
    tasks: Mutex<JoinSet<()>>,
    runtime: Handle,
    next_worker_id: AtomicUsize,
}

impl DispatchQueue {
    /// Create the queue and spawn `min_workers` workers on the current runtime
    pub fn new(settings: PoolSettings) -> Result<Self, DispatcherError> {
        Self::named(settings.to_string(), settings)
    }

    /// Like [`Self::new`], labelled for logs and metrics
    #[instrument(name = "dispatch_queue_new", skip(label, settings), fields(pool = %label, settings = %settings))]
    pub fn named(label: String, settings: PoolSettings) -> Result<Self, DispatcherError> {
        settings.check()?;
        let runtime = Handle::try_current().map_err(|e| DispatcherError::Runtime(e.to_string()))?;
        let (tx, rx) = bounded(settings.queue_capacity);

        let queue = Self {
            label,
            settings,
            tx,
            rx,
            counts: Arc::new(WorkerCounts::default()),
            tasks: Mutex::new(JoinSet::new()),
            runtime,
            next_worker_id: AtomicUsize::new(0),
        };

        for _ in 0..settings.min_workers {
            queue.try_spawn_worker();
        }

        debug!(pool = %queue.label, workers = queue.counts.live(), "Dispatch queue created");
        Ok(queue)
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Label used in logs and metrics
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Enqueue a job for asynchronous execution (non-blocking)
    ///
    /// # Errors
    /// `QueueSaturated` when the queue is at capacity, `QueueClosed` after
    /// shutdown. The rejected job is dropped; reporting is the caller's job.
    pub fn submit(&self, job: SendJob) -> Result<(), ContractError> {
        match self.tx.try_send(job) {
            Ok(()) => {
                self.ensure_worker();
                observability::record_queue_depth(&self.label, self.tx.len());
                Ok(())
            }
            Err(TrySendError::Full(job)) => Err(ContractError::QueueSaturated {
                transport: job.transport_name().to_string(),
                capacity: self.settings.queue_capacity,
            }),
            Err(TrySendError::Closed(job)) => Err(ContractError::QueueClosed {
                transport: job.transport_name().to_string(),
            }),
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            queued: self.tx.len(),
            capacity: self.settings.queue_capacity,
            live_workers: self.counts.live(),
            idle_workers: self.counts.idle(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Close the queue, let workers drain accepted jobs, and wait for them
    #[instrument(name = "dispatch_queue_shutdown", skip(self), fields(pool = %self.label))]
    pub async fn shutdown(&self) {
        self.tx.close();

        // Only reachable with min_workers = 0: accepted jobs but nobody to run them
        if !self.rx.is_empty() && self.counts.live() == 0 {
            self.try_spawn_worker();
        }

        let mut tasks = std::mem::take(&mut *self.lock_tasks());
        debug!(queued = self.rx.len(), workers = tasks.len(), "Draining dispatch queue");

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(pool = %self.label, error = ?e, "Dispatch worker panicked");
            }
        }
        debug!(pool = %self.label, "Dispatch queue shutdown complete");
    }

    fn ensure_worker(&self) {
        if self.tx.len() > self.counts.idle() {
            self.try_spawn_worker();
        }
    }

    fn try_spawn_worker(&self) -> bool {
        if !self.counts.try_reserve(self.settings.max_workers) {
            return false;
        }

        let worker = Worker {
            id: self.next_worker_id.fetch_add(1, Ordering::Relaxed),
            pool: self.label.clone(),
            rx: self.rx.clone(),
            counts: Arc::clone(&self.counts),
            min_workers: self.settings.min_workers,
            max_workers: self.settings.max_workers,
            keep_alive: self.settings.keep_alive(),
            slot: Slot::Idle,
        };

        let mut tasks = self.lock_tasks();
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                error!(pool = %self.label, error = ?e, "Dispatch worker panicked");
            }
        }
        tasks.spawn_on(worker.run(), &self.runtime);
        drop(tasks);

        observability::record_pool_workers(&self.label, self.counts.live());
        true
    }

    fn lock_tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Idle,
    Busy,
    Retired,
}

struct Worker {
    id: usize,
    pool: String,
    rx: Receiver<SendJob>,
    counts: Arc<WorkerCounts>,
    min_workers: usize,
    max_workers: usize,
    keep_alive: Duration,
    slot: Slot,
}

impl Worker {
    async fn run(mut self) {
        trace!(pool = %self.pool, worker = self.id, "Dispatch worker started");

        while let Some(job) = self.next_job().await {
            self.set_slot(Slot::Busy);
            job.execute().await;
            self.set_slot(Slot::Idle);
        }

        trace!(pool = %self.pool, worker = self.id, slot = ?self.slot, "Dispatch worker stopped");
    }

    /// Next job, or `None` once the queue is closed and drained or this worker retired
    async fn next_job(&mut self) -> Option<SendJob> {
        loop {
            if self.counts.live() <= self.min_workers {
                return self.rx.recv().await.ok();
            }

            match tokio::time::timeout(self.keep_alive, self.rx.recv()).await {
                Ok(job) => return job.ok(),
                Err(_) => {
                    if self.try_retire() {
                        debug!(pool = %self.pool, worker = self.id, "Idle dispatch worker retired");
                        return None;
                    }
                }
            }
        }
    }

    fn try_retire(&mut self) -> bool {
        // Leave the idle count first so a concurrent submit sees the gap
        self.counts.idle.fetch_sub(1, Ordering::SeqCst);
        if !self.counts.try_release(self.min_workers) {
            self.counts.idle.fetch_add(1, Ordering::SeqCst);
            return false;
        }

        // A job may have landed between the timeout and the release
        if !self.rx.is_empty() && self.counts.try_reserve(self.max_workers) {
            return false;
        }

        self.slot = Slot::Retired;
        true
    }

    fn set_slot(&mut self, slot: Slot) {
        match (self.slot, slot) {
            (Slot::Idle, Slot::Busy) => {
                self.counts.idle.fetch_sub(1, Ordering::SeqCst);
            }
            (Slot::Busy, Slot::Idle) => {
                self.counts.idle.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        self.slot = slot;
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        match self.slot {
            Slot::Idle => {
                self.counts.idle.fetch_sub(1, Ordering::SeqCst);
                self.counts.live.fetch_sub(1, Ordering::SeqCst);
            }
            // Transport panicked mid-send
            Slot::Busy => {
                self.counts.live.fetch_sub(1, Ordering::SeqCst);
            }
            Slot::Retired => {}
        }
    }
}
