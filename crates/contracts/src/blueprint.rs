//! ReadoutBlueprint - Config Loader output
//!
//! Describes a complete simulation run: readout timing, buffer retention,
//! per-stream and per-trigger overrides, the drivers to instantiate and the
//! sinks that receive assembled events.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::{Validate, ValidationErrors};

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete run blueprint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReadoutBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Global readout timing
    #[serde(default)]
    #[validate(nested)]
    pub readout: ReadoutConfig,

    /// Buffer retention policy
    #[serde(default)]
    #[validate(nested)]
    pub retention: RetentionConfig,

    /// Per-stream overrides applied before the run starts
    #[serde(default)]
    #[validate(nested)]
    pub streams: Vec<StreamOverride>,

    /// Per-trigger overrides applied before the run starts
    #[serde(default)]
    #[validate(nested)]
    pub triggers: Vec<TriggerOverride>,

    /// Drivers to instantiate, in registration order
    #[serde(default)]
    pub drivers: Vec<DriverConfig>,

    /// Run length
    #[serde(default)]
    #[validate(nested)]
    pub run: RunConfig,

    /// Output routing
    #[serde(default)]
    #[validate(nested)]
    pub sinks: Vec<SinkConfig>,
}

/// Readout timing, all values in nanoseconds
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReadoutConfig {
    /// Width of the default readout window
    #[serde(default = "default_readout_window")]
    #[validate(range(min = 0.0))]
    pub readout_window_ns: f64,

    /// How far before the trigger time the default window opens
    #[serde(default = "default_trigger_offset")]
    #[validate(range(min = 0.0))]
    pub trigger_offset_ns: f64,

    /// Clock quantum per external input event
    #[serde(default = "default_beam_bunch")]
    #[validate(range(exclusive_min = 0.0))]
    pub beam_bunch_ns: f64,
}

impl Default for ReadoutConfig {
    fn default() -> Self {
        Self {
            readout_window_ns: default_readout_window(),
            trigger_offset_ns: default_trigger_offset(),
            beam_bunch_ns: default_beam_bunch(),
        }
    }
}

impl ReadoutConfig {
    /// Part of the default window after the trigger time
    pub fn window_after_ns(&self) -> f64 {
        self.readout_window_ns - self.trigger_offset_ns
    }
}

fn default_readout_window() -> f64 {
    200.0
}

fn default_trigger_offset() -> f64 {
    50.0
}

fn default_beam_bunch() -> f64 {
    2.0
}

/// Buffer retention policy
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetentionConfig {
    /// Drop batches no trigger can reach any more
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extra slack kept below the computed horizon (ns)
    #[serde(default = "default_safety_margin")]
    #[validate(range(min = 0.0))]
    pub safety_margin_ns: f64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            safety_margin_ns: default_safety_margin(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_safety_margin() -> f64 {
    150.0
}

/// Overrides for one registered stream
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct StreamOverride {
    /// Stream name
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default)]
    pub persistent: Option<bool>,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub window_before_ns: Option<f64>,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub window_after_ns: Option<f64>,
}

/// Overrides for one trigger driver
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TriggerOverride {
    /// Trigger driver name
    #[validate(length(min = 1))]
    pub name: String,

    /// Dead time in beam-bunch quanta
    pub dead_time: u32,
}

/// Run length
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RunConfig {
    /// Number of external input events (beam bunches) to process
    #[serde(default = "default_max_events")]
    #[validate(range(min = 1))]
    pub max_events: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_events: default_max_events(),
        }
    }
}

fn default_max_events() -> u64 {
    1000
}

/// Reference driver definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverConfig {
    /// External source producing hits and truth particles
    PulseSource(PulseSourceConfig),
    /// Groups adjacent hits into clusters
    Clusterer(ClustererConfig),
    /// Fires when a cluster exceeds an energy threshold
    ThresholdTrigger(ThresholdTriggerConfig),
}

impl DriverConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::PulseSource(c) => &c.name,
            Self::Clusterer(c) => &c.name,
            Self::ThresholdTrigger(c) => &c.name,
        }
    }

    /// Collections the driver registers
    pub fn outputs(&self) -> Vec<&str> {
        match self {
            Self::PulseSource(c) => vec![c.output.as_str(), c.truth_output.as_str()],
            Self::Clusterer(c) => vec![c.output.as_str()],
            Self::ThresholdTrigger(_) => Vec::new(),
        }
    }

    /// Collections the driver reads
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Self::PulseSource(_) => Vec::new(),
            Self::Clusterer(c) => vec![c.input.as_str()],
            Self::ThresholdTrigger(c) => vec![c.input.as_str()],
        }
    }

    pub fn is_trigger(&self) -> bool {
        matches!(self, Self::ThresholdTrigger(_))
    }
}

impl Validate for DriverConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Self::PulseSource(c) => c.validate(),
            Self::Clusterer(c) => c.validate(),
            Self::ThresholdTrigger(c) => c.validate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PulseSourceConfig {
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default = "default_hits")]
    #[validate(length(min = 1))]
    pub output: String,

    #[serde(default = "default_particles")]
    #[validate(length(min = 1))]
    pub truth_output: String,

    #[serde(default = "default_channels")]
    #[validate(range(min = 1))]
    pub channels: u32,

    /// Probability that a channel fires in one bunch
    #[serde(default = "default_hit_probability")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub hit_probability: f64,

    #[serde(default = "default_max_energy")]
    #[validate(range(exclusive_min = 0.0))]
    pub max_energy_mev: f64,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub time_displacement_ns: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ClustererConfig {
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default = "default_hits")]
    #[validate(length(min = 1))]
    pub input: String,

    #[serde(default = "default_clusters")]
    #[validate(length(min = 1))]
    pub output: String,

    #[serde(default = "default_clusterer_displacement")]
    #[validate(range(min = 0.0))]
    pub time_displacement_ns: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ThresholdTriggerConfig {
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default = "default_clusters")]
    #[validate(length(min = 1))]
    pub input: String,

    #[serde(default = "default_energy_threshold")]
    #[validate(range(min = 0.0))]
    pub energy_threshold_mev: f64,

    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub time_displacement_ns: f64,

    /// Dead time in beam-bunch quanta
    #[serde(default)]
    pub dead_time: u32,
}

fn default_hits() -> String {
    "Hits".to_string()
}

fn default_particles() -> String {
    "McParticles".to_string()
}

fn default_clusters() -> String {
    "Clusters".to_string()
}

fn default_channels() -> u32 {
    64
}

fn default_hit_probability() -> f64 {
    0.05
}

fn default_max_energy() -> f64 {
    100.0
}

fn default_seed() -> u64 {
    1
}

fn default_clusterer_displacement() -> f64 {
    16.0
}

fn default_energy_threshold() -> f64 {
    50.0
}

/// Sink output configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink name
    #[validate(length(min = 1))]
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Type-specific parameters (`path` for file sinks)
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Log output
    Log,
    /// JSON lines file
    File,
    /// In-memory collection
    Memory,
}

impl ReadoutBlueprint {
    /// Names of every collection some driver registers
    pub fn declared_outputs(&self) -> impl Iterator<Item = &str> {
        self.drivers.iter().flat_map(DriverConfig::outputs)
    }

    pub fn trigger_drivers(&self) -> impl Iterator<Item = &DriverConfig> {
        self.drivers.iter().filter(|d| d.is_trigger())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_toml() {
        let blueprint: ReadoutBlueprint = toml::from_str(
            r#"
            [[drivers]]
            kind = "pulse_source"
            name = "ecal"
            "#,
        )
        .unwrap();

        assert_eq!(blueprint.readout.readout_window_ns, 200.0);
        assert_eq!(blueprint.readout.trigger_offset_ns, 50.0);
        assert_eq!(blueprint.readout.beam_bunch_ns, 2.0);
        assert_eq!(blueprint.readout.window_after_ns(), 150.0);
        assert!(blueprint.retention.enabled);
        assert_eq!(blueprint.run.max_events, 1000);

        let outputs: Vec<&str> = blueprint.declared_outputs().collect();
        assert_eq!(outputs, vec!["Hits", "McParticles"]);
    }

    #[test]
    fn test_driver_kind_tag() {
        let blueprint: ReadoutBlueprint = toml::from_str(
            r#"
            [[drivers]]
            kind = "threshold_trigger"
            name = "trig"
            dead_time = 3

            [[sinks]]
            name = "out"
            sink_type = "memory"
            "#,
        )
        .unwrap();

        match &blueprint.drivers[0] {
            DriverConfig::ThresholdTrigger(c) => {
                assert_eq!(c.dead_time, 3);
                assert_eq!(c.input, "Clusters");
            }
            other => panic!("unexpected driver {other:?}"),
        }
        assert_eq!(blueprint.trigger_drivers().count(), 1);
        assert_eq!(blueprint.sinks[0].sink_type, SinkType::Memory);
    }

    #[test]
    fn test_field_validation() {
        let mut blueprint: ReadoutBlueprint = toml::from_str("").unwrap();
        assert!(blueprint.validate().is_ok());

        blueprint.readout.beam_bunch_ns = 0.0;
        assert!(blueprint.validate().is_err());
    }

    #[test]
    fn test_driver_validation_delegates() {
        let driver = DriverConfig::PulseSource(PulseSourceConfig {
            name: "src".into(),
            output: "Hits".into(),
            truth_output: "McParticles".into(),
            channels: 8,
            hit_probability: 1.5,
            max_energy_mev: 10.0,
            seed: 1,
            time_displacement_ns: 0.0,
        });
        assert!(driver.validate().is_err());
    }
}
