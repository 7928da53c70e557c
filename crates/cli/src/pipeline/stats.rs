//! Pipeline statistics and metrics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::{DispatchStatsAggregator, TransportTotals};

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Events decoded from the input
    pub events_read: u64,

    /// Input lines consumed (including blanks and comments)
    pub lines_read: usize,

    /// Total duration of the pipeline run
    pub duration: Duration,

    /// Number of configured transports
    pub active_transports: usize,

    /// Number of distinct dispatch queues
    pub active_pools: usize,

    /// Batch and per-transport aggregates
    pub dispatch: DispatchStatsAggregator,
}

impl PipelineStats {
    /// Events per second read from the input
    pub fn throughput(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.events_read as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Record the final counters of one transport
    pub fn record_transport(&mut self, name: &str, snapshot: &MetricsSnapshot) {
        self.dispatch.set_transport(name, totals_from(snapshot));
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                    Fan-out Statistics                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Lines read: {}", self.lines_read);
        println!("   ├─ Events read: {}", self.events_read);
        println!("   ├─ Events/s: {:.2}", self.throughput());
        println!("   ├─ Transports: {}", self.active_transports);
        println!("   └─ Dispatch pools: {}", self.active_pools);

        let summary = self.dispatch.summary();

        println!("\n📈 Batches");
        println!("   ├─ Count: {}", summary.total_batches);
        println!("   ├─ Size: {}", summary.batch_size);
        println!("   └─ Receive latency (us): {}", summary.receive_latency_us);

        if !summary.transports.is_empty() {
            println!("\n📤 Transports");
            let last = summary.transports.len() - 1;
            for (i, (name, t)) in summary.transports.iter().enumerate() {
                let prefix = if i == last { "└─" } else { "├─" };
                println!(
                    "   {} {}: sent {}/{} ({:.2}%), send errors {}, rejected {}",
                    prefix,
                    name,
                    t.sent,
                    t.submitted + t.rejected,
                    t.delivery_rate(),
                    t.send_errors,
                    t.rejected
                );
            }
        }

        println!();
    }
}

fn totals_from(snapshot: &MetricsSnapshot) -> TransportTotals {
    TransportTotals {
        submitted: snapshot.submitted,
        sent: snapshot.sent,
        send_errors: snapshot.send_errors(),
        rejected: snapshot.rejected(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throughput() {
        let stats = PipelineStats {
            events_read: 500,
            duration: Duration::from_secs(2),
            ..Default::default()
        };
        assert!((stats.throughput() - 250.0).abs() < 1e-10);
        assert_eq!(PipelineStats::default().throughput(), 0.0);
    }

    #[test]
    fn test_record_transport_converts_snapshot() {
        let snapshot = MetricsSnapshot {
            submitted: 2,
            sent: 1,
            connection_unavailable: 1,
            saturated: 3,
            ..Default::default()
        };

        let mut stats = PipelineStats::default();
        stats.record_transport("kafka", &snapshot);

        let totals = stats.dispatch.transports["kafka"];
        assert_eq!(totals.submitted, 2);
        assert_eq!(totals.sent, 1);
        assert_eq!(totals.send_errors, snapshot.send_errors());
        assert_eq!(totals.rejected, snapshot.rejected());
    }
}
