//! Dispatcher - fan-out of assembled events to sinks

use tracing::{debug, info, instrument, warn};

use contracts::{EventSink, ReadoutError, ReadoutEvent, SinkConfig, SinkType};

use crate::error::DispatcherError;
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::sinks::{FileSink, LogSink, MemorySink};

/// Create a sink from configuration
#[instrument(
    name = "dispatcher_create_sink",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
pub fn create_sink(config: &SinkConfig) -> Result<Box<dyn EventSink>, DispatcherError> {
    match config.sink_type {
        SinkType::Log => Ok(Box::new(LogSink::new(&config.name))),
        SinkType::File => {
            let sink = FileSink::from_params(&config.name, &config.params)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            Ok(Box::new(sink))
        }
        SinkType::Memory => Ok(Box::new(MemorySink::new(&config.name))),
    }
}

struct SinkSlot {
    sink: Box<dyn EventSink>,
    metrics: SinkMetrics,
}

/// Hands every event to each sink in turn
///
/// A failed write is counted and returned; the caller decides whether the
/// run continues.
#[derive(Default)]
pub struct Dispatcher {
    slots: Vec<SinkSlot>,
    events: u64,
}

impl Dispatcher {
    /// Create a dispatcher with custom sinks (for testing)
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        let mut dispatcher = Self::default();
        for sink in sinks {
            dispatcher.add_sink(sink);
        }
        dispatcher
    }

    pub fn add_sink(&mut self, sink: Box<dyn EventSink>) {
        self.slots.push(SinkSlot {
            sink,
            metrics: SinkMetrics::new(),
        });
    }

    pub fn sink_count(&self) -> usize {
        self.slots.len()
    }

    /// Events dispatched so far
    pub fn event_count(&self) -> u64 {
        self.events
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.slots
            .iter()
            .map(|s| (s.sink.name().to_string(), s.metrics.snapshot()))
            .collect()
    }

    /// Write `event` to every sink, stopping at the first failure.
    pub fn dispatch(&mut self, event: &ReadoutEvent) -> Result<(), ReadoutError> {
        self.events += 1;
        let elements = event.element_count();

        for slot in &mut self.slots {
            if let Err(e) = slot.sink.write(event) {
                slot.metrics.inc_failure_count();
                ::metrics::counter!("readout_sink_failures_total", "sink" => slot.sink.name().to_string())
                    .increment(1);
                warn!(sink = slot.sink.name(), event_number = event.event_number, error = %e, "sink write failed");
                return Err(e);
            }
            slot.metrics.record_write(elements);
            ::metrics::counter!("readout_sink_writes_total", "sink" => slot.sink.name().to_string())
                .increment(1);
        }

        if self.events.is_multiple_of(100) {
            debug!(events = self.events, "Dispatcher progress");
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ReadoutError> {
        for slot in &mut self.slots {
            slot.sink.flush()?;
        }
        Ok(())
    }

    /// Close every sink; all sinks are closed even if one fails, and the
    /// first error is returned.
    #[instrument(name = "dispatcher_close", skip(self))]
    pub fn close(&mut self) -> Result<(), ReadoutError> {
        let mut first_error = None;
        for slot in &mut self.slots {
            if let Err(e) = slot.sink.close() {
                warn!(sink = slot.sink.name(), error = %e, "sink close failed");
                first_error.get_or_insert(e);
            }
        }
        info!(events = self.events, sinks = self.slots.len(), "Dispatcher closed");
        first_error.map_or(Ok(()), Err)
    }
}

/// Convenience function to create a dispatcher from sink configs
#[instrument(name = "dispatcher_create", skip(sink_configs), fields(sinks = sink_configs.len()))]
pub fn create_dispatcher(sink_configs: &[SinkConfig]) -> Result<Dispatcher, DispatcherError> {
    let mut dispatcher = Dispatcher::default();
    for config in sink_configs {
        dispatcher.add_sink(create_sink(config)?);
    }
    Ok(dispatcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::memory::tests::event;
    use std::collections::HashMap;

    /// Rejects events with an odd number
    struct OddRejecting;

    impl EventSink for OddRejecting {
        fn name(&self) -> &str {
            "odd_rejecting"
        }

        fn write(&mut self, event: &ReadoutEvent) -> Result<(), ReadoutError> {
            if event.event_number % 2 == 1 {
                return Err(ReadoutError::sink_write("odd_rejecting", "odd event"));
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<(), ReadoutError> {
            Ok(())
        }

        fn close(&mut self) -> Result<(), ReadoutError> {
            Err(ReadoutError::sink_write("odd_rejecting", "close failed"))
        }
    }

    #[test]
    fn test_dispatcher_fanout() {
        let first = MemorySink::new("first");
        let second = MemorySink::new("second");
        let (a, b) = (first.handle(), second.handle());

        let mut dispatcher = Dispatcher::with_sinks(vec![Box::new(first), Box::new(second)]);
        for i in 0..5 {
            dispatcher.dispatch(&event(i)).unwrap();
        }
        dispatcher.close().unwrap();

        assert_eq!(a.len(), 5);
        assert_eq!(b.len(), 5);
        assert_eq!(dispatcher.event_count(), 5);

        let metrics = dispatcher.metrics();
        assert_eq!(metrics[0].0, "first");
        assert_eq!(metrics[0].1.write_count, 5);
        assert_eq!(metrics[1].1.element_count, 10);
    }

    #[test]
    fn test_failure_is_counted_and_returned() {
        let memory = MemorySink::new("memory");
        let handle = memory.handle();
        let mut dispatcher = Dispatcher::with_sinks(vec![
            Box::new(OddRejecting),
            Box::new(memory),
        ]);

        dispatcher.dispatch(&event(2)).unwrap();
        assert!(matches!(
            dispatcher.dispatch(&event(3)),
            Err(ReadoutError::SinkWrite { .. })
        ));

        let metrics = dispatcher.metrics();
        assert_eq!(metrics[0].1.failure_count, 1);
        assert_eq!(metrics[0].1.write_count, 1);
        // Later sinks never saw the failed event
        assert_eq!(handle.len(), 1);

        assert!(dispatcher.close().is_err());
    }

    #[test]
    fn test_create_dispatcher_from_config() {
        let configs = vec![
            SinkConfig {
                name: "test_log".to_string(),
                sink_type: SinkType::Log,
                params: HashMap::new(),
            },
            SinkConfig {
                name: "test_memory".to_string(),
                sink_type: SinkType::Memory,
                params: HashMap::new(),
            },
        ];

        let mut dispatcher = create_dispatcher(&configs).unwrap();
        assert_eq!(dispatcher.sink_count(), 2);
        dispatcher.dispatch(&event(1)).unwrap();
        dispatcher.flush().unwrap();
    }

    #[test]
    fn test_file_sink_without_path() {
        let config = SinkConfig {
            name: "broken".to_string(),
            sink_type: SinkType::File,
            params: HashMap::new(),
        };
        assert!(matches!(
            create_sink(&config),
            Err(DispatcherError::SinkCreation { .. })
        ));
    }
}
