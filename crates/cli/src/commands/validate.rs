//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{DriverConfig, ReadoutBlueprint, SinkType};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    driver_count: usize,
    trigger_count: usize,
    collection_count: usize,
    sink_count: usize,
    max_events: u64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => {
            let warnings = collect_warnings(&blueprint);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    version: format!("{:?}", blueprint.version),
                    driver_count: blueprint.drivers.len(),
                    trigger_count: trigger_count(&blueprint),
                    collection_count: blueprint
                        .drivers
                        .iter()
                        .map(|d| d.outputs().len())
                        .sum(),
                    sink_count: blueprint.sinks.len(),
                    max_events: blueprint.run.max_events,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

fn trigger_count(blueprint: &ReadoutBlueprint) -> usize {
    blueprint
        .drivers
        .iter()
        .filter(|d| matches!(d, DriverConfig::ThresholdTrigger(_)))
        .count()
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(blueprint: &ReadoutBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - assembled events will be dropped".to_string());
    }

    if trigger_count(blueprint) == 0 {
        warnings.push("No trigger drivers configured - no event will be assembled".to_string());
    }

    for sink in &blueprint.sinks {
        if sink.sink_type == SinkType::Memory {
            warnings.push(format!(
                "Sink '{}' keeps events in memory only; nothing is persisted",
                sink.name
            ));
        }
    }

    if !blueprint.retention.enabled {
        warnings.push("Buffer retention is disabled - buffers grow for the whole run".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Drivers: {}", summary.driver_count);
            println!("  Triggers: {}", summary.trigger_count);
            println!("  Collections: {}", summary.collection_count);
            println!("  Sinks: {}", summary.sink_count);
            println!("  Bunches: {}", summary.max_events);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn validate(path: PathBuf) -> ValidationResult {
        validate_config(&ValidateArgs {
            config: path,
            json: false,
        })
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let file = write_config(
            r#"
            [[drivers]]
            kind = "pulse_source"
            name = "pulses"

            [[sinks]]
            name = "memory"
            sink_type = "memory"
            "#,
        );

        let result = validate(file.path().to_path_buf());
        assert!(result.valid);

        let summary = result.summary.unwrap();
        assert_eq!(summary.driver_count, 1);
        assert_eq!(summary.trigger_count, 0);
        assert_eq!(summary.collection_count, 2);

        let warnings = result.warnings.unwrap();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("No trigger drivers"));
        assert!(warnings[1].contains("'memory'"));
    }

    #[test]
    fn test_invalid_config() {
        let file = write_config(
            r#"
            [readout]
            readout_window_ns = 10
            trigger_offset_ns = 20
            "#,
        );

        let result = validate(file.path().to_path_buf());
        assert!(!result.valid);
        assert!(result.error.is_some());
        assert!(result.summary.is_none());
    }

    #[test]
    fn test_missing_file() {
        let result = validate(PathBuf::from("/nonexistent/readout.toml"));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("File not found"));
    }
}
