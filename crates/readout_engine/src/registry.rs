//! Collection registry: stream descriptors, buffers and driver records.

use std::collections::HashMap;

use contracts::{ElementType, ReadoutError, StreamId};
use serde::Serialize;

use crate::buffer::AnyBuffer;
use crate::driver::{DriverId, TriggerId};

/// Registration-time definition of a stream.
///
/// Immutable once registered except for the configuration setters, which are
/// only accepted before the run starts.
#[derive(Debug, Clone, Serialize)]
pub struct StreamDescriptor {
    pub name: StreamId,
    pub element_type: ElementType,
    #[serde(skip)]
    pub producer: DriverId,
    pub producer_name: String,
    pub flags: u32,
    pub readout_name: Option<String>,
    pub persistent: bool,
    /// How far before the trigger time the stream's window opens (ns)
    pub window_before: Option<f64>,
    /// How far after the trigger time the stream's window closes (ns)
    pub window_after: Option<f64>,
    /// Global time displacement (ns), computed once at registration
    pub time_displacement: f64,
}

#[derive(Debug)]
pub(crate) struct StreamEntry {
    pub descriptor: StreamDescriptor,
    pub buffer: Box<dyn AnyBuffer>,
}

#[derive(Debug, Clone)]
pub(crate) struct DriverRecord {
    pub name: String,
    pub dependencies: Vec<StreamId>,
    pub local_displacement: f64,
    pub outputs: Vec<StreamId>,
}

#[derive(Debug, Clone)]
pub(crate) struct TriggerRecord {
    pub name: String,
    pub dependencies: Vec<StreamId>,
    pub local_displacement: f64,
    /// Dependencies' largest displacement plus the local one
    pub displacement: f64,
    pub dead_time: u32,
    pub last_trigger_time: Option<f64>,
}

#[derive(Debug, Default)]
pub(crate) struct Registry {
    streams: HashMap<StreamId, StreamEntry>,
    /// Registration order
    order: Vec<StreamId>,
    drivers: Vec<DriverRecord>,
    triggers: Vec<TriggerRecord>,
    /// Persistent stream with the largest displacement
    critical: Option<StreamId>,
}

impl Registry {
    pub fn contains(&self, name: &str) -> bool {
        self.streams.contains_key(name)
    }

    pub fn stream(&self, name: &str) -> Result<&StreamEntry, ReadoutError> {
        self.streams
            .get(name)
            .ok_or_else(|| ReadoutError::unknown_collection(name))
    }

    pub fn stream_mut(&mut self, name: &str) -> Result<&mut StreamEntry, ReadoutError> {
        self.streams
            .get_mut(name)
            .ok_or_else(|| ReadoutError::unknown_collection(name))
    }

    pub fn insert_stream(&mut self, entry: StreamEntry) {
        let name = entry.descriptor.name.clone();
        if let Some(driver) = self.drivers.get_mut(entry.descriptor.producer.0) {
            driver.outputs.push(name.clone());
        }
        self.order.push(name.clone());
        self.streams.insert(name, entry);
        self.refresh_critical();
    }

    /// Streams in registration order
    pub fn streams(&self) -> impl Iterator<Item = &StreamEntry> {
        self.order.iter().filter_map(|name| self.streams.get(name))
    }

    pub fn streams_mut(&mut self) -> impl Iterator<Item = &mut StreamEntry> {
        self.streams.values_mut()
    }

    pub fn stream_names(&self) -> &[StreamId] {
        &self.order
    }

    pub fn push_driver(&mut self, record: DriverRecord) -> DriverId {
        self.drivers.push(record);
        DriverId(self.drivers.len() - 1)
    }

    pub fn driver(&self, id: DriverId) -> Result<&DriverRecord, ReadoutError> {
        self.drivers
            .get(id.0)
            .ok_or(ReadoutError::UnknownDriver { index: id.0 })
    }

    pub fn driver_mut(&mut self, id: DriverId) -> Result<&mut DriverRecord, ReadoutError> {
        self.drivers
            .get_mut(id.0)
            .ok_or(ReadoutError::UnknownDriver { index: id.0 })
    }

    pub fn drivers(&self) -> &[DriverRecord] {
        &self.drivers
    }

    pub fn push_trigger(&mut self, record: TriggerRecord) -> TriggerId {
        self.triggers.push(record);
        TriggerId(self.triggers.len() - 1)
    }

    pub fn trigger(&self, id: TriggerId) -> Result<&TriggerRecord, ReadoutError> {
        self.triggers
            .get(id.0)
            .ok_or(ReadoutError::UnknownTrigger { index: id.0 })
    }

    pub fn trigger_mut(&mut self, id: TriggerId) -> Result<&mut TriggerRecord, ReadoutError> {
        self.triggers
            .get_mut(id.0)
            .ok_or(ReadoutError::UnknownTrigger { index: id.0 })
    }

    pub fn triggers(&self) -> &[TriggerRecord] {
        &self.triggers
    }

    pub fn critical(&self) -> Option<&StreamId> {
        self.critical.as_ref()
    }

    /// Re-pick the critical stream; ties keep the earliest registered.
    pub fn refresh_critical(&mut self) {
        let mut best: Option<(&StreamId, f64)> = None;
        for name in &self.order {
            let Some(entry) = self.streams.get(name) else {
                continue;
            };
            let descriptor = &entry.descriptor;
            if !descriptor.persistent {
                continue;
            }
            match best {
                Some((_, displacement)) if descriptor.time_displacement <= displacement => {}
                _ => best = Some((name, descriptor.time_displacement)),
            }
        }
        self.critical = best.map(|(name, _)| name.clone());
    }

    pub fn max_stream_displacement(&self) -> f64 {
        self.streams
            .values()
            .map(|e| e.descriptor.time_displacement)
            .fold(0.0, f64::max)
    }

    pub fn max_trigger_displacement(&self) -> f64 {
        self.triggers
            .iter()
            .map(|t| t.displacement)
            .fold(0.0, f64::max)
    }

    pub fn max_local_displacement(&self) -> f64 {
        self.drivers
            .iter()
            .map(|d| d.local_displacement)
            .chain(self.triggers.iter().map(|t| t.local_displacement))
            .fold(0.0, f64::max)
    }
}
