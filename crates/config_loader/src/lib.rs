//! # Config Loader
//!
//! Configuration loading and parsing module.
//!
//! Responsibilities:
//! - Parse TOML/JSON configuration files
//! - Validate configuration legality
//! - Generate `ReadoutBlueprint`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::ConfigLoader;
//! use std::path::Path;
//!
//! let blueprint = ConfigLoader::load_from_path(Path::new("readout.toml")).unwrap();
//! println!("Readout window: {} ns", blueprint.readout.readout_window_ns);
//! ```

mod parser;
mod validator;

pub use contracts::ReadoutBlueprint;
pub use parser::ConfigFormat;

use contracts::ReadoutError;
use std::path::Path;

/// Configuration loader
///
/// Provides static methods to load configuration from files or strings.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from file path
    ///
    /// Automatically detects format from file extension (.toml / .json).
    ///
    /// # Errors
    /// - File read failure
    /// - Unsupported format
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_path(path: &Path) -> Result<ReadoutBlueprint, ReadoutError> {
        let format = Self::detect_format(path)?;
        let content = Self::read_file(path)?;
        Self::load_from_str(&content, format)
    }

    /// Load configuration from string
    ///
    /// # Errors
    /// - Parse failure
    /// - Validation failure
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ReadoutBlueprint, ReadoutError> {
        Self::parse_and_validate(content, format)
    }

    /// Validate an already constructed blueprint
    pub fn validate(blueprint: &ReadoutBlueprint) -> Result<(), ReadoutError> {
        validator::validate(blueprint)
    }

    /// Serialize ReadoutBlueprint to TOML string
    pub fn to_toml(blueprint: &ReadoutBlueprint) -> Result<String, ReadoutError> {
        toml::to_string_pretty(blueprint)
            .map_err(|e| ReadoutError::config_parse(format!("TOML serialize error: {e}")))
    }

    /// Serialize ReadoutBlueprint to JSON string
    pub fn to_json(blueprint: &ReadoutBlueprint) -> Result<String, ReadoutError> {
        serde_json::to_string_pretty(blueprint)
            .map_err(|e| ReadoutError::config_parse(format!("JSON serialize error: {e}")))
    }
}

impl ConfigLoader {
    /// Infer configuration format from file extension
    fn detect_format(path: &Path) -> Result<ConfigFormat, ReadoutError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ReadoutError::config_parse("cannot determine file format from extension")
        })?;

        ConfigFormat::from_extension(ext).ok_or_else(|| {
            ReadoutError::config_parse(format!("unsupported config format: .{ext}"))
        })
    }

    /// Read configuration file content
    fn read_file(path: &Path) -> Result<String, ReadoutError> {
        Ok(std::fs::read_to_string(path)?)
    }

    /// Parse and validate configuration content
    fn parse_and_validate(
        content: &str,
        format: ConfigFormat,
    ) -> Result<ReadoutBlueprint, ReadoutError> {
        let blueprint = parser::parse(content, format)?;
        validator::validate(&blueprint)?;
        Ok(blueprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL_TOML: &str = r#"
[readout]
readout_window_ns = 200.0
trigger_offset_ns = 50.0
beam_bunch_ns = 2.0

[[streams]]
name = "Hits"
window_before_ns = 10.0
window_after_ns = 30.0

[[triggers]]
name = "trig"
dead_time = 4

[[drivers]]
kind = "pulse_source"
name = "ecal"

[[drivers]]
kind = "clusterer"
name = "clus"

[[drivers]]
kind = "threshold_trigger"
name = "trig"

[run]
max_events = 500

[[sinks]]
name = "log_sink"
sink_type = "log"
"#;

    #[test]
    fn test_load_from_str_toml() {
        let result = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.drivers.len(), 3);
        assert_eq!(bp.triggers[0].dead_time, 4);
        assert_eq!(bp.run.max_events, 500);
    }

    #[test]
    fn test_round_trip_toml() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let serialized = ConfigLoader::to_toml(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&serialized, ConfigFormat::Toml).unwrap();
        assert_eq!(bp.drivers.len(), bp2.drivers.len());
        assert_eq!(bp.drivers[2].name(), bp2.drivers[2].name());
        assert_eq!(bp.streams[0].window_after_ns, bp2.streams[0].window_after_ns);
    }

    #[test]
    fn test_round_trip_json() {
        let bp = ConfigLoader::load_from_str(MINIMAL_TOML, ConfigFormat::Toml).unwrap();
        let json = ConfigLoader::to_json(&bp).unwrap();
        let bp2 = ConfigLoader::load_from_str(&json, ConfigFormat::Json).unwrap();
        assert_eq!(bp.run.max_events, bp2.run.max_events);
    }

    #[test]
    fn test_load_from_path_detects_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("readout.toml");
        std::fs::write(&path, MINIMAL_TOML).unwrap();

        let bp = ConfigLoader::load_from_path(&path).unwrap();
        assert_eq!(bp.sinks[0].name, "log_sink");

        let bad = dir.path().join("readout.yaml");
        std::fs::write(&bad, MINIMAL_TOML).unwrap();
        let err = ConfigLoader::load_from_path(&bad).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[test]
    fn test_validation_runs_after_parse() {
        let content = r#"
[[drivers]]
kind = "pulse_source"
name = "ecal"

[[drivers]]
kind = "pulse_source"
name = "ecal"
output = "OtherHits"
truth_output = "OtherParticles"
"#;
        let result = ConfigLoader::load_from_str(content, ConfigFormat::Toml);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }
}
