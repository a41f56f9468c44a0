//! EventSink trait - Dispatcher output interface
//!
//! The simulation is single-threaded, so sinks are plain synchronous objects.

use crate::{ReadoutError, ReadoutEvent};

/// Destination for assembled readout events
pub trait EventSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Write one event
    ///
    /// # Errors
    /// Returns write error (should include context)
    fn write(&mut self, event: &ReadoutEvent) -> Result<(), ReadoutError>;

    /// Flush buffer (if any)
    fn flush(&mut self) -> Result<(), ReadoutError>;

    /// Close sink
    fn close(&mut self) -> Result<(), ReadoutError>;
}
