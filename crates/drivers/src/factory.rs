//! Build a ready-to-run simulation from a blueprint.

use std::collections::BTreeMap;

use contracts::{DriverConfig, ReadoutBlueprint, ReadoutError};
use readout_engine::{ReadoutSettings, Simulation, SimulationContext, TriggerId};
use tracing::{debug, info};

use crate::{Clusterer, PulseSource, ThresholdTrigger};

/// A simulation with every configured driver registered
pub struct BuiltSimulation {
    pub simulation: Simulation,
    /// Trigger drivers by name
    pub triggers: BTreeMap<String, TriggerId>,
}

/// Instantiate the configured drivers in order and apply the overrides.
pub fn build_simulation(blueprint: &ReadoutBlueprint) -> Result<BuiltSimulation, ReadoutError> {
    let mut simulation = Simulation::new(ReadoutSettings::from_blueprint(blueprint));
    let mut triggers = BTreeMap::new();

    for driver in &blueprint.drivers {
        match driver {
            DriverConfig::PulseSource(config) => {
                simulation.add_producer(Box::new(PulseSource::new(config.clone())))?;
            }
            DriverConfig::Clusterer(config) => {
                simulation.add_producer(Box::new(Clusterer::new(config.clone())))?;
            }
            DriverConfig::ThresholdTrigger(config) => {
                let id = simulation.add_trigger(Box::new(ThresholdTrigger::new(config.clone())))?;
                triggers.insert(config.name.clone(), id);
            }
        }
        debug!(driver = driver.name(), "driver added");
    }

    apply_overrides(simulation.context_mut(), blueprint, &triggers)?;

    info!(
        drivers = blueprint.drivers.len(),
        collections = simulation.context().stream_names().len(),
        critical = ?simulation.context().critical_stream().map(|s| s.as_str()),
        "simulation built"
    );
    Ok(BuiltSimulation {
        simulation,
        triggers,
    })
}

/// Apply the `streams` and `triggers` sections to registered collections
/// and trigger drivers.
pub fn apply_overrides(
    ctx: &mut SimulationContext,
    blueprint: &ReadoutBlueprint,
    triggers: &BTreeMap<String, TriggerId>,
) -> Result<(), ReadoutError> {
    for stream in &blueprint.streams {
        if let Some(persistent) = stream.persistent {
            ctx.set_persistent(&stream.name, persistent)?;
        }
        if let Some(before) = stream.window_before_ns {
            ctx.set_window_before(&stream.name, before)?;
        }
        if let Some(after) = stream.window_after_ns {
            ctx.set_window_after(&stream.name, after)?;
        }
    }

    for trigger in &blueprint.triggers {
        let id = triggers.get(&trigger.name).copied().ok_or_else(|| {
            ReadoutError::config_validation(
                format!("triggers[{}]", trigger.name),
                "no trigger driver with this name",
            )
        })?;
        ctx.set_dead_time(id, trigger.dead_time)?;
    }
    Ok(())
}
