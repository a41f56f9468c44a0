//! Pipeline orchestrator - wires drivers, engine and sinks together.

use std::time::Instant;

use anyhow::{Context, Result};
use contracts::ReadoutBlueprint;
use drivers::BuiltSimulation;
use tracing::{debug, info, warn};

use super::PipelineStats;

/// Buffer gauges are refreshed every this many bunches
const GAUGE_INTERVAL: u64 = 100;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// The run blueprint
    pub blueprint: ReadoutBlueprint,

    /// Beam bunches to simulate
    pub max_events: u64,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main pipeline orchestrator
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the simulation to completion.
    ///
    /// Any engine or sink error aborts the run.
    pub fn run(self) -> Result<PipelineStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
        }

        let BuiltSimulation {
            mut simulation,
            triggers,
        } = drivers::build_simulation(blueprint).context("Failed to build simulation")?;
        let mut dispatcher = dispatcher::create_dispatcher(&blueprint.sinks)
            .context("Failed to create sinks")?;

        let summary = simulation.start().context("Failed to start run")?;
        info!(
            collections = summary.streams,
            triggers = triggers.len(),
            sinks = dispatcher.sink_count(),
            critical = ?summary.critical_stream.as_ref().map(|s| s.as_str()),
            trigger_delay = summary.trigger_delay,
            retention_span = summary.retention_span,
            max_events = self.config.max_events,
            "Run started"
        );

        let mut stats = PipelineStats {
            summary: Some(summary),
            ..PipelineStats::default()
        };
        let bunch = simulation.context().settings().beam_bunch;

        for step in 0..self.config.max_events {
            let event = simulation
                .step()
                .with_context(|| format!("Simulation failed at bunch {step}"))?;

            if let Some(event) = event {
                // The clock has already moved past the bunch that emitted the event
                let emitted_at = simulation.context().current_time() - bunch;
                observability::record_event_metrics(&event);
                stats.readout.update(&event, emitted_at);
                dispatcher.dispatch(&event).with_context(|| {
                    format!("Failed to dispatch event {}", event.event_number)
                })?;
            }

            if (step + 1) % GAUGE_INTERVAL == 0 {
                record_gauges(&simulation);
                debug!(step = step + 1, events = simulation.stats().events, "Run progress");
            }
        }

        dispatcher.flush().context("Failed to flush sinks")?;
        dispatcher.close().context("Failed to close sinks")?;

        stats.run = simulation.stats();
        stats.sink_metrics = dispatcher.metrics();
        stats.duration = start_time.elapsed();

        if stats.run.pending_triggers > 0 {
            warn!(
                pending = stats.run.pending_triggers,
                "Run ended before every trigger was read out"
            );
        }
        info!(
            bunches = stats.run.steps,
            events = stats.run.events,
            duration_secs = stats.duration.as_secs_f64(),
            "Run completed"
        );

        Ok(stats)
    }
}

fn record_gauges(simulation: &readout_engine::Simulation) {
    let ctx = simulation.context();
    observability::record_pending_triggers(ctx.pending_trigger_count());
    for name in ctx.stream_names() {
        if let Ok(batches) = ctx.buffered_batches(name) {
            observability::record_buffer_depth(name, batches);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
        [readout]
        readout_window_ns = 40
        trigger_offset_ns = 10

        [[drivers]]
        kind = "pulse_source"
        name = "pulses"
        channels = 16
        hit_probability = 0.3

        [[drivers]]
        kind = "clusterer"
        name = "clusterer"

        [[drivers]]
        kind = "threshold_trigger"
        name = "threshold"
        energy_threshold_mev = 40
        dead_time = 10

        [[sinks]]
        name = "memory"
        sink_type = "memory"
    "#;

    fn load(source: &str) -> ReadoutBlueprint {
        config_loader::ConfigLoader::load_from_str(source, config_loader::ConfigFormat::Toml)
            .unwrap()
    }

    #[test]
    fn test_pipeline_runs_configured_bunches() {
        let blueprint = load(CONFIG);
        let pipeline = Pipeline::new(PipelineConfig {
            blueprint,
            max_events: 300,
            metrics_port: None,
        });

        let stats = pipeline.run().unwrap();
        assert_eq!(stats.run.steps, 300);
        assert!(stats.run.events > 0);
        assert_eq!(stats.readout.total_events, stats.run.events);
        assert_eq!(stats.sink_metrics[0].1.write_count, stats.run.events);

        let summary = stats.summary.unwrap();
        assert_eq!(summary.critical_stream.map(|s| s.to_string()), Some("Clusters".to_string()));
        // Readiness waits for the after-window plus the critical displacement
        assert!(stats.readout.latency_stats.min() >= 30.0 + 16.0);
    }

    #[test]
    fn test_sink_error_aborts_run() {
        let mut blueprint = load(CONFIG);
        blueprint.sinks[0].sink_type = contracts::SinkType::File;
        let result = Pipeline::new(PipelineConfig {
            blueprint,
            max_events: 10,
            metrics_port: None,
        })
        .run();
        assert!(result.is_err());
    }
}
