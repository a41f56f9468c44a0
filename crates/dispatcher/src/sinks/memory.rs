//! MemorySink - keeps events in memory for tests and tooling

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{EventSink, ReadoutError, ReadoutEvent};

type Events = Arc<Mutex<Vec<ReadoutEvent>>>;

fn lock(events: &Events) -> MutexGuard<'_, Vec<ReadoutEvent>> {
    events.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Sink that stores every event it receives
pub struct MemorySink {
    name: String,
    events: Events,
}

/// Read access to a [`MemorySink`]'s events after it was handed to a dispatcher
#[derive(Clone)]
pub struct MemoryHandle {
    events: Events,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Arc::default(),
        }
    }

    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle {
            events: Arc::clone(&self.events),
        }
    }
}

impl MemoryHandle {
    pub fn len(&self) -> usize {
        lock(&self.events).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the stored events
    pub fn events(&self) -> Vec<ReadoutEvent> {
        lock(&self.events).clone()
    }

    /// Remove and return the stored events
    pub fn take(&self) -> Vec<ReadoutEvent> {
        std::mem::take(&mut *lock(&self.events))
    }
}

impl EventSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn write(&mut self, event: &ReadoutEvent) -> Result<(), ReadoutError> {
        lock(&self.events).push(event.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ReadoutError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), ReadoutError> {
        Ok(())
    }
}
