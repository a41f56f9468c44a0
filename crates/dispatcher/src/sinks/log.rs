//! LogSink - logs event summary via tracing

use contracts::{EventSink, ReadoutError, ReadoutEvent};
use tracing::{debug, info, instrument};

/// Sink that logs event summaries for debugging
pub struct LogSink {
    name: String,
    events: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: 0,
        }
    }

    fn log_event_summary(&self, event: &ReadoutEvent) {
        info!(
            sink = %self.name,
            event_number = event.event_number,
            trigger_time = event.trigger_time,
            timestamp = event.timestamp,
            source = %event.trigger_source,
            collections = event.collections.len(),
            elements = event.element_count(),
            "ReadoutEvent received"
        );
        for (name, collection) in &event.collections {
            debug!(
                sink = %self.name,
                collection = %name,
                element_type = %collection.element_type(),
                elements = collection.len(),
                "collection"
            );
        }
    }
}

impl EventSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_write",
        skip(self, event),
        fields(sink = %self.name, event_number = event.event_number)
    )]
    fn write(&mut self, event: &ReadoutEvent) -> Result<(), ReadoutError> {
        self.log_event_summary(event);
        self.events += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReadoutError> {
        // Nothing to flush for log sink
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    fn close(&mut self) -> Result<(), ReadoutError> {
        info!(sink = %self.name, events = self.events, "LogSink closed");
        Ok(())
    }
}
