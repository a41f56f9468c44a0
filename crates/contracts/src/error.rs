//! Layered error definitions
//!
//! Categorized by source: config / registration / contract / sink.
//! Every variant is fatal for a simulation run; there is no retry path.

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ReadoutError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Registration Errors =====
    /// A collection with this name is already registered
    #[error("collection \"{name}\" of object type {element_type} already exists")]
    DuplicateCollection { name: String, element_type: String },

    /// A required registration field is unset
    #[error("{field} must be defined")]
    MissingField { field: &'static str },

    /// A driver depends on a collection that has not been registered yet
    #[error("collection \"{dependency}\" required by \"{consumer}\" has not been registered")]
    UnregisteredDependency { dependency: String, consumer: String },

    /// Two collections depend on each other, directly or transitively
    #[error(
        "circular dependency: collection \"{dependency}\" depends on collection \"{dependent}\", \
         but collection \"{dependent}\" also depends on collection \"{dependency}\""
    )]
    CircularDependency { dependency: String, dependent: String },

    /// Driver handle not issued by this context
    #[error("driver #{index} is not registered")]
    UnknownDriver { index: usize },

    /// Trigger handle not issued by this context
    #[error("trigger driver #{index} is not registered")]
    UnknownTrigger { index: usize },

    /// Configuration attempted after the run began
    #[error("cannot {operation} after the run has started")]
    RunStarted { operation: &'static str },

    // ===== Contract Violations =====
    /// Collection name not registered
    #[error("collection \"{name}\" has not been registered")]
    UnknownCollection { name: String },

    /// Element type differs from the registered type
    #[error("collection \"{name}\" holds {expected} but {found} was supplied")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    /// Batch appended with a timestamp earlier than the previous batch
    #[error("batch for collection \"{name}\" at t={time} ns precedes previous batch at t={last} ns")]
    OutOfOrderBatch { name: String, last: f64, time: f64 },

    /// Batch timestamp is NaN or infinite
    #[error("batch for collection \"{name}\" has non-finite timestamp {time}")]
    NonFiniteTimestamp { name: String, time: f64 },

    /// Two contributions to one output collection disagree on its definition
    #[error("found multiple collections named \"{name}\" with differing definitions")]
    ConflictingCollection { name: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ReadoutError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create unknown collection error
    pub fn unknown_collection(name: impl Into<String>) -> Self {
        Self::UnknownCollection { name: name.into() }
    }

    /// Create type mismatch error
    pub fn type_mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Whether the error was raised while configuring the run
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigParse { .. }
                | Self::ConfigValidation { .. }
                | Self::DuplicateCollection { .. }
                | Self::MissingField { .. }
                | Self::UnregisteredDependency { .. }
                | Self::CircularDependency { .. }
                | Self::RunStarted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circular_message_names_both_collections() {
        let err = ReadoutError::CircularDependency {
            dependency: "B".into(),
            dependent: "A".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("circular dependency"), "got: {msg}");
        assert!(msg.contains("\"A\"") && msg.contains("\"B\""), "got: {msg}");
    }

    #[test]
    fn test_configuration_classification() {
        assert!(ReadoutError::config_validation("readout", "bad").is_configuration_error());
        assert!(!ReadoutError::unknown_collection("Hits").is_configuration_error());
        assert!(!ReadoutError::type_mismatch("Hits", "Hit", "u32").is_configuration_error());
    }
}
