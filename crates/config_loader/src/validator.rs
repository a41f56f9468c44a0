//! Configuration validation
//!
//! Rules:
//! - field ranges (derived `Validate` on the blueprint types)
//! - driver names unique, collection names unique across drivers
//! - every driver input is produced by a driver declared earlier
//! - trigger_offset_ns <= readout_window_ns
//! - stream overrides name a declared collection, windows fit the readout window
//! - trigger overrides name a trigger driver
//! - sink names present and unique, file sinks carry a path

use std::collections::HashSet;

use ::validator::{Validate, ValidationErrors};
use contracts::{ReadoutBlueprint, ReadoutError, SinkType};

/// Validate a ReadoutBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &ReadoutBlueprint) -> Result<(), ReadoutError> {
    validate_fields(blueprint)?;
    validate_readout(blueprint)?;
    validate_driver_names(blueprint)?;
    validate_collections(blueprint)?;
    validate_stream_overrides(blueprint)?;
    validate_trigger_overrides(blueprint)?;
    validate_sinks(blueprint)?;
    Ok(())
}

fn field_error(scope: &str, errors: &ValidationErrors) -> ReadoutError {
    let field = errors
        .errors()
        .keys()
        .next()
        .map_or_else(|| scope.to_string(), |k| format!("{scope}.{k}"));
    ReadoutError::config_validation(field, errors.to_string())
}

/// Per-field range and length checks
fn validate_fields(blueprint: &ReadoutBlueprint) -> Result<(), ReadoutError> {
    blueprint
        .validate()
        .map_err(|e| field_error("blueprint", &e))?;

    for driver in &blueprint.drivers {
        driver
            .validate()
            .map_err(|e| field_error(&format!("drivers[{}]", driver.name()), &e))?;
    }
    Ok(())
}

fn validate_readout(blueprint: &ReadoutBlueprint) -> Result<(), ReadoutError> {
    let readout = &blueprint.readout;
    if readout.trigger_offset_ns > readout.readout_window_ns {
        return Err(ReadoutError::config_validation(
            "readout.trigger_offset_ns",
            format!(
                "trigger_offset_ns ({}) must be <= readout_window_ns ({})",
                readout.trigger_offset_ns, readout.readout_window_ns
            ),
        ));
    }
    Ok(())
}

fn validate_driver_names(blueprint: &ReadoutBlueprint) -> Result<(), ReadoutError> {
    let mut seen = HashSet::new();
    for driver in &blueprint.drivers {
        if !seen.insert(driver.name()) {
            return Err(ReadoutError::config_validation(
                format!("drivers[name={}]", driver.name()),
                "duplicate driver name",
            ));
        }
    }
    Ok(())
}

/// Outputs must be unique and inputs must be registered before their consumer
fn validate_collections(blueprint: &ReadoutBlueprint) -> Result<(), ReadoutError> {
    let mut registered = HashSet::new();
    for driver in &blueprint.drivers {
        for input in driver.inputs() {
            if !registered.contains(input) {
                return Err(ReadoutError::config_validation(
                    format!("drivers[{}].input", driver.name()),
                    format!("collection '{input}' is not produced by an earlier driver"),
                ));
            }
        }
        for output in driver.outputs() {
            if !registered.insert(output) {
                return Err(ReadoutError::config_validation(
                    format!("drivers[{}].output", driver.name()),
                    format!("duplicate collection name '{output}'"),
                ));
            }
        }
    }
    Ok(())
}

fn validate_stream_overrides(blueprint: &ReadoutBlueprint) -> Result<(), ReadoutError> {
    let declared: HashSet<&str> = blueprint.declared_outputs().collect();
    let window_after = blueprint.readout.window_after_ns();
    let mut seen = HashSet::new();

    for stream in &blueprint.streams {
        if !declared.contains(stream.name.as_str()) {
            return Err(ReadoutError::config_validation(
                format!("streams[{}]", stream.name),
                "no driver declares this collection",
            ));
        }
        if !seen.insert(stream.name.as_str()) {
            return Err(ReadoutError::config_validation(
                format!("streams[{}]", stream.name),
                "duplicate stream override",
            ));
        }
        if let Some(after) = stream.window_after_ns {
            if after > window_after {
                return Err(ReadoutError::config_validation(
                    format!("streams[{}].window_after_ns", stream.name),
                    format!(
                        "window_after_ns ({after}) exceeds readout_window_ns - trigger_offset_ns ({window_after})"
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn validate_trigger_overrides(blueprint: &ReadoutBlueprint) -> Result<(), ReadoutError> {
    let triggers: HashSet<&str> = blueprint.trigger_drivers().map(|d| d.name()).collect();
    for trigger in &blueprint.triggers {
        if !triggers.contains(trigger.name.as_str()) {
            return Err(ReadoutError::config_validation(
                format!("triggers[{}]", trigger.name),
                "no trigger driver with this name",
            ));
        }
    }
    Ok(())
}

fn validate_sinks(blueprint: &ReadoutBlueprint) -> Result<(), ReadoutError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ReadoutError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ReadoutError::config_validation(
                format!("sinks[{}].name", idx),
                format!("duplicate sink name '{}'", sink.name),
            ));
        }
        if sink.sink_type == SinkType::File && !sink.params.contains_key("path") {
            return Err(ReadoutError::config_validation(
                format!("sinks[{}].params.path", sink.name),
                "file sink requires a 'path' parameter",
            ));
        }
    }
    Ok(())
}
