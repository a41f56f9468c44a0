//! # Dispatcher
//!
//! Persists assembled readout events.
//!
//! Responsibilities:
//! - Fan-out of every `ReadoutEvent` to all configured sinks
//! - Per-sink write/failure counters
//! - Building sinks from `SinkConfig`

pub mod dispatcher;
pub mod error;
pub mod metrics;
pub mod sinks;

pub use contracts::{EventSink, ReadoutEvent};
pub use dispatcher::{create_dispatcher, create_sink, Dispatcher};
pub use error::DispatcherError;
pub use crate::metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, LogSink, MemoryHandle, MemorySink};
