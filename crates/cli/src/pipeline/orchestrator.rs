//! Pipeline orchestrator - reads events and feeds the sink callback.

use std::future::Future;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{Event, OutputBlueprint};
use dispatcher::SinkCallback;
use tracing::{debug, info, warn};

use super::source::{EventDecoder, EventSource};
use super::PipelineStats;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The output configuration
    pub blueprint: OutputBlueprint,

    /// JSON-lines input (None = stdin)
    pub input: Option<PathBuf>,

    /// Events per batch handed to the fan-out
    pub batch_size: usize,

    /// Maximum number of events to read (None = unlimited)
    pub max_events: Option<u64>,

    /// Input timeout (None = no timeout)
    pub timeout: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Why the input loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    EndOfInput,
    MaxEvents,
    Timeout,
    Signal,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run until the input ends, a limit is hit or `shutdown` resolves
    ///
    /// Queued sends are drained before returning in every case.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        info!(
            stream = %blueprint.stream.id,
            transports = blueprint.transports.len(),
            share_pools = blueprint.share_pools,
            "Opening transports..."
        );

        let callback = dispatcher::create_sink_callback(blueprint)
            .await
            .context("Failed to open transports")?;

        info!(
            transports = callback.transport_count(),
            pools = callback.pool_count(),
            "Sink callback ready"
        );

        let source = match EventSource::open(
            self.config.input.as_deref(),
            EventDecoder::new(blueprint.stream.clone()),
        )
        .await
        {
            Ok(source) => source,
            Err(e) => {
                callback.shutdown().await;
                return Err(e).context("Failed to open event input");
            }
        };

        self.drive(callback, source, shutdown, start_time).await
    }

    /// Feed `source` into `callback` until a stop condition, then drain
    async fn drive(
        &self,
        callback: SinkCallback,
        mut source: EventSource,
        shutdown: impl Future<Output = ()>,
        start_time: Instant,
    ) -> Result<PipelineStats> {
        let mut stats = PipelineStats {
            active_transports: callback.transport_count(),
            active_pools: callback.pool_count(),
            ..Default::default()
        };

        let mut batch: Vec<Event> = Vec::with_capacity(self.config.batch_size.max(1));
        let outcome = {
            let timeout = async {
                match self.config.timeout {
                    Some(limit) => tokio::time::sleep(limit).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                result = self.feed(&callback, &mut source, &mut batch, &mut stats) => result,
                _ = timeout => Ok(StopReason::Timeout),
                _ = shutdown => Ok(StopReason::Signal),
            }
        };

        // Events read before a timeout or signal still go out
        if !batch.is_empty() {
            debug!(events = batch.len(), "Flushing partial batch");
            dispatch(&callback, &mut batch, &mut stats);
        }

        // Drain even when the input failed, then report the input error
        info!("Draining dispatch queues...");
        callback.shutdown().await;

        for (name, snapshot) in callback.metrics() {
            stats.record_transport(&name, &snapshot);
        }
        stats.lines_read = source.line_no();
        stats.duration = start_time.elapsed();

        let reason = outcome?;
        match reason {
            StopReason::EndOfInput => info!("Input exhausted"),
            StopReason::MaxEvents => info!(events = stats.events_read, "Reached max events limit"),
            StopReason::Timeout => warn!(
                timeout_secs = self.config.timeout.map(|t| t.as_secs()),
                "Input timed out"
            ),
            StopReason::Signal => warn!("Stopped by shutdown signal"),
        }

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            events_per_sec = format!("{:.2}", stats.throughput()),
            "Pipeline shutdown complete"
        );

        Ok(stats)
    }

    /// Read events and hand them to the callback in batches
    async fn feed(
        &self,
        callback: &SinkCallback,
        source: &mut EventSource,
        batch: &mut Vec<Event>,
        stats: &mut PipelineStats,
    ) -> Result<StopReason> {
        let batch_size = self.config.batch_size.max(1);

        let reason = loop {
            if let Some(max) = self.config.max_events {
                if stats.events_read >= max {
                    break StopReason::MaxEvents;
                }
            }

            let next = match source.next_event().await {
                Ok(next) => next,
                Err(e) => {
                    // Events already read still go out
                    dispatch(callback, batch, stats);
                    return Err(e).context("Failed to read event input");
                }
            };

            match next {
                Some(event) => {
                    stats.events_read += 1;
                    batch.push(event);
                    if batch.len() >= batch_size {
                        dispatch(callback, batch, stats);
                    }
                }
                None => break StopReason::EndOfInput,
            }
        };

        dispatch(callback, batch, stats);
        Ok(reason)
    }
}

fn dispatch(callback: &SinkCallback, batch: &mut Vec<Event>, stats: &mut PipelineStats) {
    if batch.is_empty() {
        return;
    }
    let started = Instant::now();
    callback.receive(batch);
    let latency_us = started.elapsed().as_secs_f64() * 1_000_000.0;
    stats.dispatch.record_batch(batch.len(), latency_us);
    batch.clear();
}
