//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{ReadoutBlueprint, ReadoutError};
use readout_engine::{RunSummary, StreamDescriptor};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    timing: RunSummary,
    triggers: Vec<TriggerInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    collections: Vec<StreamDescriptor>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct TriggerInfo {
    name: String,
    time_displacement_ns: f64,
    dead_time: u32,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let blueprint = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&blueprint, args)?;
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

/// Register every driver and start the run to obtain the derived timing.
fn build_config_info(blueprint: &ReadoutBlueprint, args: &InfoArgs) -> Result<ConfigInfo> {
    let drivers::BuiltSimulation {
        mut simulation,
        triggers,
    } = drivers::build_simulation(blueprint).context("Failed to build simulation")?;
    let timing = simulation.start().context("Failed to start run")?;
    let ctx = simulation.context();

    let triggers = triggers
        .iter()
        .map(|(name, &id)| -> Result<TriggerInfo, ReadoutError> {
            Ok(TriggerInfo {
                name: name.clone(),
                time_displacement_ns: ctx.trigger_displacement(id)?,
                dead_time: ctx.trigger_dead_time(id)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let collections = if args.collections {
        ctx.stream_names()
            .iter()
            .map(|name| ctx.collection_parameters(name).cloned())
            .collect::<Result<Vec<_>, _>>()?
    } else {
        Vec::new()
    };

    let sinks = if args.sinks {
        blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok(ConfigInfo {
        version: format!("{:?}", blueprint.version),
        timing,
        triggers,
        collections,
        sinks,
    })
}

fn print_config_info(info: &ConfigInfo) {
    let timing = &info.timing;

    println!("\n╔══════════════════════════════════════════════════════════════╗");
    println!("║                   Readout Configuration                      ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("Version: {}", info.version);

    println!("\nTiming");
    println!("   ├─ Readout window: {} ns", timing.readout_window);
    println!("   ├─ Trigger offset: {} ns", timing.trigger_offset);
    println!(
        "   ├─ Critical stream: {}",
        timing
            .critical_stream
            .as_ref()
            .map_or("(none)", |s| s.as_str())
    );
    println!("   ├─ Max stream displacement: {} ns", timing.max_stream_displacement);
    println!("   ├─ Max trigger displacement: {} ns", timing.max_trigger_displacement);
    println!("   ├─ Trigger delay: {} ns", timing.trigger_delay);
    println!("   └─ Retention span: {} ns", timing.retention_span);

    println!(
        "\nCollections: {} ({} persistent) from {} drivers",
        timing.streams, timing.persistent_streams, timing.drivers
    );
    for (i, c) in info.collections.iter().enumerate() {
        let prefix = if i + 1 == info.collections.len() { "└─" } else { "├─" };
        println!(
            "   {} {} <{}> by {}: displacement {} ns{}",
            prefix,
            c.name,
            c.element_type,
            c.producer_name,
            c.time_displacement,
            if c.persistent { ", persistent" } else { "" }
        );
    }

    println!("\nTriggers ({})", info.triggers.len());
    for (i, t) in info.triggers.iter().enumerate() {
        let prefix = if i + 1 == info.triggers.len() { "└─" } else { "├─" };
        println!(
            "   {} {}: displacement {} ns, dead time {} bunches",
            prefix, t.name, t.time_displacement_ns, t.dead_time
        );
    }

    if !info.sinks.is_empty() {
        println!("\nSinks ({})", info.sinks.len());
        for (i, s) in info.sinks.iter().enumerate() {
            let prefix = if i + 1 == info.sinks.len() { "└─" } else { "├─" };
            println!("   {} {} ({})", prefix, s.name, s.sink_type);
        }
    }

    println!();
}
