//! # Observability
//!
//! Tracing and Prometheus metrics for the readout simulation.
//!
//! ## Features
//!
//! - Tracing initialisation with verbosity mapping
//! - Optional Prometheus exporter
//! - In-memory event statistics for run summaries
//!
//! ## Example
//!
//! ```ignore
//! use observability::{init_with_config, ObservabilityConfig, ReadoutStatsAggregator};
//!
//! init_with_config(&ObservabilityConfig::from_verbosity(LogFormat::Compact, false, 1))?;
//!
//! let mut stats = ReadoutStatsAggregator::new();
//! if let Some(event) = simulation.step()? {
//!     observability::record_event_metrics(&event);
//!     stats.update(&event, emitted_at);
//! }
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// Re-exports
pub use crate::metrics::{
    record_buffer_depth, record_event_metrics, record_pending_triggers, MetricsSummary,
    ReadoutStatsAggregator, RunningStats, StatsSummary,
};

/// Tracing subscriber settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Directive used when `RUST_LOG` is unset or ignored
    pub default_directive: String,
    /// Whether `RUST_LOG` may override `default_directive`
    pub respect_env: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            default_directive: "info".to_string(),
            respect_env: true,
        }
    }
}

impl ObservabilityConfig {
    /// Map `-q` / `-v` style flags to a filter.
    ///
    /// Quiet pins the level at `warn` and ignores `RUST_LOG`.
    pub fn from_verbosity(log_format: LogFormat, quiet: bool, verbose: u8) -> Self {
        let (default_directive, respect_env) = if quiet {
            ("warn", false)
        } else {
            let level = match verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            };
            (level, true)
        };
        Self {
            log_format,
            default_directive: default_directive.to_string(),
            respect_env,
        }
    }

    fn filter(&self) -> EnvFilter {
        if self.respect_env {
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&self.default_directive))
        } else {
            EnvFilter::new(&self.default_directive)
        }
    }
}

/// Log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON
    #[default]
    Json,
    /// Human readable, multi-line
    Pretty,
    /// Single line
    Compact,
}

/// Install the global tracing subscriber
pub fn init_with_config(config: &ObservabilityConfig) -> Result<()> {
    let fmt_layer = match config.log_format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(config.filter())
        .with(fmt_layer)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::debug!(
        log_format = ?config.log_format,
        directive = %config.default_directive,
        respect_env = config.respect_env,
        "tracing initialized"
    );
    Ok(())
}

/// Install the Prometheus recorder (tracing set up elsewhere)
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ObservabilityConfig::default();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.default_directive, "info");
        assert!(config.respect_env);
    }

    #[test]
    fn test_verbosity_mapping() {
        let quiet = ObservabilityConfig::from_verbosity(LogFormat::Compact, true, 2);
        assert_eq!(quiet.default_directive, "warn");
        assert!(!quiet.respect_env);
        assert_eq!(quiet.log_format, LogFormat::Compact);

        let levels: Vec<_> = (0..4)
            .map(|v| ObservabilityConfig::from_verbosity(LogFormat::Json, false, v).default_directive)
            .collect();
        assert_eq!(levels, ["info", "debug", "trace", "trace"]);
    }

    #[test]
    fn test_quiet_filter_ignores_env() {
        let quiet = ObservabilityConfig::from_verbosity(LogFormat::Json, true, 0);
        assert_eq!(quiet.filter().to_string(), "warn");
    }
}
