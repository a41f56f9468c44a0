//! Per-stream time-window buffer.
//!
//! Batches are kept in non-decreasing timestamp order, so range queries and
//! eviction are binary searches over a `VecDeque`.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;

use contracts::{Element, ElementType, TriggeredCollection};

/// One append: a timestamp plus the elements produced for it.
#[derive(Debug, Clone)]
pub struct TimedBatch<T> {
    pub timestamp: f64,
    pub items: Vec<T>,
}

/// Why a batch was refused
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PushError {
    /// Timestamp is NaN or infinite
    NonFinite,
    /// Timestamp precedes the last appended batch
    OutOfOrder { last: f64 },
}

/// Ordered batches of one stream
pub struct StreamBuffer<T> {
    batches: VecDeque<TimedBatch<T>>,
    evicted_batches: u64,
}

impl<T> Default for StreamBuffer<T> {
    fn default() -> Self {
        Self {
            batches: VecDeque::new(),
            evicted_batches: 0,
        }
    }
}

impl<T> fmt::Debug for StreamBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("batches", &self.batches.len())
            .field("first", &self.first_timestamp())
            .field("last", &self.last_timestamp())
            .field("evicted", &self.evicted_batches)
            .finish()
    }
}

impl<T> StreamBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch.
    ///
    /// Only finite timestamps are stored, so the last batch always holds the
    /// ordering bound. Empty batches are ignored.
    pub fn push(&mut self, timestamp: f64, items: Vec<T>) -> Result<(), PushError> {
        if items.is_empty() {
            return Ok(());
        }
        if !timestamp.is_finite() {
            return Err(PushError::NonFinite);
        }
        if let Some(last) = self.last_timestamp() {
            if timestamp < last {
                return Err(PushError::OutOfOrder { last });
            }
        }
        self.batches.push_back(TimedBatch { timestamp, items });
        Ok(())
    }

    fn bounds(&self, start: f64, end: f64) -> (usize, usize) {
        if end <= start {
            return (0, 0);
        }
        let lo = self.batches.partition_point(|b| b.timestamp < start);
        let hi = self.batches.partition_point(|b| b.timestamp < end);
        (lo, hi.max(lo))
    }

    /// Drop batches with timestamp strictly below `horizon`
    pub fn evict_before(&mut self, horizon: f64) -> usize {
        let count = self.batches.partition_point(|b| b.timestamp < horizon);
        self.batches.drain(..count);
        self.evicted_batches += count as u64;
        count
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn element_count(&self) -> usize {
        self.batches.iter().map(|b| b.items.len()).sum()
    }

    pub fn first_timestamp(&self) -> Option<f64> {
        self.batches.front().map(|b| b.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.batches.back().map(|b| b.timestamp)
    }

    pub fn evicted_batches(&self) -> u64 {
        self.evicted_batches
    }
}

impl<T: Clone> StreamBuffer<T> {
    /// Elements of every batch with timestamp in `[start, end)`, in append order.
    pub fn range(&self, start: f64, end: f64) -> Vec<T> {
        let (lo, hi) = self.bounds(start, end);
        self.batches
            .range(lo..hi)
            .flat_map(|batch| batch.items.iter().cloned())
            .collect()
    }
}

/// Type-erased view used by the registry, which stores buffers of many element types.
pub(crate) trait AnyBuffer: fmt::Debug {
    fn element_type(&self) -> ElementType;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn len(&self) -> usize;
    fn element_count(&self) -> usize;
    fn evict_before(&mut self, horizon: f64) -> usize;
    /// Copy of the elements in `[start, end)` as an output collection
    fn window_collection(&self, name: &str, start: f64, end: f64) -> TriggeredCollection;
}

impl<T: Element> AnyBuffer for StreamBuffer<T> {
    fn element_type(&self) -> ElementType {
        ElementType::of::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn len(&self) -> usize {
        StreamBuffer::len(self)
    }

    fn element_count(&self) -> usize {
        StreamBuffer::element_count(self)
    }

    fn evict_before(&mut self, horizon: f64) -> usize {
        StreamBuffer::evict_before(self, horizon)
    }

    fn window_collection(&self, name: &str, start: f64, end: f64) -> TriggeredCollection {
        TriggeredCollection::new(name, self.range(start, end))
    }
}
