//! `run` command implementation.

use std::collections::HashMap;

use anyhow::{Context, Result};
use contracts::{DriverConfig, ReadoutBlueprint, SinkConfig, SinkType};
use tracing::info;

use crate::cli::RunArgs;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Name of the sink added by `--output`
const OUTPUT_SINK: &str = "cli_output";

/// Execute the `run` command
pub fn run_simulation(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut blueprint, args);

    info!(
        drivers = blueprint.drivers.len(),
        sinks = blueprint.sinks.len(),
        max_events = blueprint.run.max_events,
        readout_window_ns = blueprint.readout.readout_window_ns,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        max_events: blueprint.run.max_events,
        metrics_port: if args.metrics_port == 0 {
            None
        } else {
            Some(args.metrics_port)
        },
        blueprint,
    });

    info!("Starting simulation...");
    let stats = pipeline.run().context("Simulation run failed")?;
    info!(
        events = stats.run.events,
        bunches = stats.run.steps,
        duration_secs = stats.duration.as_secs_f64(),
        bunches_per_sec = format!("{:.2}", stats.steps_per_second()),
        "Simulation completed successfully"
    );
    stats.print_summary();

    Ok(())
}

/// Apply command-line overrides on top of the loaded blueprint
fn apply_overrides(blueprint: &mut ReadoutBlueprint, args: &RunArgs) {
    if let Some(max_events) = args.max_events {
        info!(max_events, "Overriding run length from CLI");
        blueprint.run.max_events = max_events;
    }
    if let Some(ref output) = args.output {
        info!(path = %output.display(), "Adding file sink from CLI");
        blueprint.sinks.push(SinkConfig {
            name: OUTPUT_SINK.to_string(),
            sink_type: SinkType::File,
            params: HashMap::from([("path".to_string(), output.display().to_string())]),
        });
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &ReadoutBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Readout:");
    println!("  Window: {} ns", blueprint.readout.readout_window_ns);
    println!("  Trigger offset: {} ns", blueprint.readout.trigger_offset_ns);
    println!("  Beam bunch: {} ns", blueprint.readout.beam_bunch_ns);
    println!("  Bunches to simulate: {}", blueprint.run.max_events);

    println!("\nDrivers ({}):", blueprint.drivers.len());
    for driver in &blueprint.drivers {
        let kind = match driver {
            DriverConfig::PulseSource(_) => "pulse_source",
            DriverConfig::Clusterer(_) => "clusterer",
            DriverConfig::ThresholdTrigger(_) => "threshold_trigger",
        };
        println!("  - {} ({})", driver.name(), kind);
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
