//! ReadoutEvent - trigger scheduler output
//!
//! One assembled event per accepted trigger.

use serde::ser::{Error as _, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::{Element, ElementType, ReadoutError, StreamId};

/// Half-open simulated time interval `[start, end)` in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Inclusive lower bound
    pub start: f64,
    /// Exclusive upper bound
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Whether `time` lies in `[start, end)`
    #[inline]
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

/// Type-erased element list stored in an output collection.
trait ErasedItems: fmt::Debug {
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_boxed(&self) -> Box<dyn ErasedItems>;
    fn to_json(&self) -> serde_json::Result<serde_json::Value>;
    /// Appends `other` if it holds the same element type; returns false otherwise.
    fn extend_boxed(&mut self, other: Box<dyn ErasedItems>) -> bool;
}

impl<T: Element> ErasedItems for Vec<T> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_boxed(&self) -> Box<dyn ErasedItems> {
        Box::new(self.clone())
    }

    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    fn extend_boxed(&mut self, other: Box<dyn ErasedItems>) -> bool {
        if !other.as_any().is::<Vec<T>>() {
            return false;
        }
        match other.into_any().downcast::<Vec<T>>() {
            Ok(items) => {
                self.extend(*items);
                true
            }
            Err(_) => false,
        }
    }
}

/// One named collection written into an output event.
///
/// Carries the registration-time definition (element type, flags, readout name)
/// so contributions from several drivers can be merged safely.
#[derive(Debug)]
pub struct TriggeredCollection {
    name: StreamId,
    element_type: ElementType,
    flags: u32,
    readout_name: Option<String>,
    items: Box<dyn ErasedItems>,
}

impl TriggeredCollection {
    /// Create a collection with no flags and no readout name
    pub fn new<T: Element>(name: impl Into<StreamId>, items: Vec<T>) -> Self {
        Self {
            name: name.into(),
            element_type: ElementType::of::<T>(),
            flags: 0,
            readout_name: None,
            items: Box::new(items),
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_readout_name(mut self, readout_name: Option<String>) -> Self {
        self.readout_name = readout_name;
        self
    }

    pub fn name(&self) -> &StreamId {
        &self.name
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn readout_name(&self) -> Option<&str> {
        self.readout_name.as_deref()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.len() == 0
    }

    /// Typed view of the elements; `None` if `T` is not the element type.
    pub fn items<T: Element>(&self) -> Option<&[T]> {
        self.items
            .as_any()
            .downcast_ref::<Vec<T>>()
            .map(Vec::as_slice)
    }

    /// Elements rendered as a JSON array
    pub fn items_json(&self) -> serde_json::Result<serde_json::Value> {
        self.items.to_json()
    }

    fn same_definition(&self, other: &Self) -> bool {
        self.name == other.name
            && self.element_type == other.element_type
            && self.flags == other.flags
            && self.readout_name == other.readout_name
    }

    /// Append the elements of another contribution to the same collection.
    ///
    /// # Errors
    /// `ConflictingCollection` if the two definitions differ.
    pub fn merge(&mut self, other: TriggeredCollection) -> Result<(), ReadoutError> {
        if !self.same_definition(&other) || !self.items.extend_boxed(other.items) {
            return Err(ReadoutError::ConflictingCollection {
                name: self.name.to_string(),
            });
        }
        Ok(())
    }
}

impl Clone for TriggeredCollection {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            element_type: self.element_type,
            flags: self.flags,
            readout_name: self.readout_name.clone(),
            items: self.items.clone_boxed(),
        }
    }
}

impl Serialize for TriggeredCollection {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let items = self.items.to_json().map_err(S::Error::custom)?;
        let mut state = serializer.serialize_struct("TriggeredCollection", 5)?;
        state.serialize_field("name", &self.name)?;
        state.serialize_field("element_type", &self.element_type)?;
        state.serialize_field("flags", &self.flags)?;
        state.serialize_field("readout_name", &self.readout_name)?;
        state.serialize_field("items", &items)?;
        state.end()
    }
}

/// Assembled readout event
///
/// Contains every persistent collection's data inside its readout window plus
/// any auxiliary on-trigger collections.
#[derive(Debug, Clone, Serialize)]
pub struct ReadoutEvent {
    /// Synthetic event number aligned with the trigger's true time
    pub event_number: i64,

    /// Trigger time (simulated ns, displacement-corrected)
    pub trigger_time: f64,

    /// Simulation time at which the trigger decision was made
    pub sim_trigger_time: f64,

    /// Event timestamp, trigger time rounded to the 4 ns clock
    pub timestamp: i64,

    /// Name of the trigger driver that issued the request
    pub trigger_source: String,

    /// Default readout window applied to streams without their own window
    pub window: TimeWindow,

    /// Output collections (name -> collection)
    pub collections: BTreeMap<StreamId, TriggeredCollection>,
}

impl ReadoutEvent {
    /// Add a collection, merging with an existing one of the same name.
    pub fn insert_collection(&mut self, collection: TriggeredCollection) -> Result<(), ReadoutError> {
        match self.collections.get_mut(collection.name().as_str()) {
            Some(existing) => existing.merge(collection),
            None => {
                self.collections
                    .insert(collection.name().clone(), collection);
                Ok(())
            }
        }
    }

    pub fn collection(&self, name: &str) -> Option<&TriggeredCollection> {
        self.collections.get(name)
    }

    /// Typed elements of a collection
    pub fn items<T: Element>(&self, name: &str) -> Option<&[T]> {
        self.collections.get(name).and_then(|c| c.items::<T>())
    }

    /// Total number of elements over all collections
    pub fn element_count(&self) -> usize {
        self.collections.values().map(TriggeredCollection::len).sum()
    }
}
