//! Run statistics.

use std::time::Duration;

use dispatcher::MetricsSnapshot;
use observability::ReadoutStatsAggregator;
use readout_engine::{RunStats, RunSummary};

/// Statistics from one simulation run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    /// Engine counters
    pub run: RunStats,

    /// Timing summary computed at run start
    pub summary: Option<RunSummary>,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Per-sink counters
    pub sink_metrics: Vec<(String, MetricsSnapshot)>,

    /// Event statistics
    pub readout: ReadoutStatsAggregator,
}

impl PipelineStats {
    /// Simulated beam bunches per wall-clock second
    pub fn steps_per_second(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.run.steps as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                      Run Statistics                          ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Bunches simulated: {}", self.run.steps);
        println!("   ├─ Bunches/s: {:.2}", self.steps_per_second());
        println!("   ├─ Events written: {}", self.run.events);
        println!("   ├─ Elements written: {}", self.run.elements);
        println!("   ├─ Batches evicted: {}", self.run.batches_evicted);
        println!("   └─ Triggers still queued: {}", self.run.pending_triggers);

        if let Some(summary) = &self.summary {
            println!("\nTiming");
            println!(
                "   ├─ Critical stream: {}",
                summary
                    .critical_stream
                    .as_ref()
                    .map_or("(none)", |s| s.as_str())
            );
            println!("   ├─ Trigger delay: {} ns", summary.trigger_delay);
            println!("   └─ Retention span: {} ns", summary.retention_span);
        }

        if !self.sink_metrics.is_empty() {
            println!("\nSinks");
            for (i, (name, metrics)) in self.sink_metrics.iter().enumerate() {
                let prefix = if i + 1 == self.sink_metrics.len() { "└─" } else { "├─" };
                println!(
                    "   {} {}: {} written, {} failed",
                    prefix, name, metrics.write_count, metrics.failure_count
                );
            }
        }

        println!("\n{}", self.readout.summary());
    }
}
