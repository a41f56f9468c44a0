//! Trigger queue and per-trigger dead-time state.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::driver::TriggerId;

/// A pending readout request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerRequest {
    /// Time the triggered physics happened (ns)
    pub trigger_time: f64,
    /// Earliest time all persistent data for the window may be complete (ns)
    pub write_ready_time: f64,
    /// Issuing trigger driver
    pub source: TriggerId,
}

/// Queue ordering key.
///
/// Requests are ordered by:
/// 1. write-ready time (earlier first)
/// 2. sequence number (issuance order for equal times)
#[derive(Debug, Clone, Copy)]
struct RequestKey {
    write_ready_time: f64,
    sequence: u64,
}

impl PartialEq for RequestKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RequestKey {}

impl Ord for RequestKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.write_ready_time.total_cmp(&other.write_ready_time) {
            Ordering::Equal => {}
            ord => return ord,
        }
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for RequestKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending requests ordered by readiness, not arrival.
#[derive(Debug, Default)]
pub(crate) struct TriggerQueue {
    pending: BTreeMap<RequestKey, TriggerRequest>,
    next_sequence: u64,
}

impl TriggerQueue {
    pub fn push(&mut self, request: TriggerRequest) {
        let key = RequestKey {
            write_ready_time: request.write_ready_time,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.pending.insert(key, request);
    }

    /// Earliest-ready request
    pub fn peek(&self) -> Option<&TriggerRequest> {
        self.pending.first_key_value().map(|(_, r)| r)
    }

    pub fn pop(&mut self) -> Option<TriggerRequest> {
        self.pending.pop_first().map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TriggerRequest> {
        self.pending.values()
    }
}

/// Dead-time state of a trigger driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerState {
    /// Will accept the next trigger
    Armed,
    /// Ignores triggers until `until` (ns)
    DeadTime { until: f64 },
}

impl TriggerState {
    /// State at `now` for a driver last fired at `last_trigger_time`.
    ///
    /// Dead while `now - last < dead_time * bunch`; a driver that never fired is armed.
    pub fn at(now: f64, last_trigger_time: Option<f64>, dead_time: u32, bunch: f64) -> Self {
        let span = f64::from(dead_time) * bunch;
        match last_trigger_time {
            Some(last) if now - last < span => Self::DeadTime { until: last + span },
            _ => Self::Armed,
        }
    }

    pub fn is_armed(&self) -> bool {
        matches!(self, Self::Armed)
    }
}
