//! SimulationContext - the per-run registry, clock and trigger queue.
//!
//! One context exists per run and is handed by reference to every driver.
//! Registration and configuration happen before [`SimulationContext::start_run`];
//! afterwards only data flow and triggering are accepted.

use std::fmt;
use std::marker::PhantomData;

use contracts::{Element, ElementType, ReadoutBlueprint, ReadoutError, StreamId};
use serde::Serialize;
use tracing::{debug, info, instrument, trace};

use crate::buffer::{PushError, StreamBuffer};
use crate::dependency;
use crate::driver::{DriverId, DriverSpec, TriggerId};
use crate::registry::{DriverRecord, Registry, StreamDescriptor, StreamEntry, TriggerRecord};
use crate::scheduler::{TriggerQueue, TriggerRequest, TriggerState};

/// Readout timing and retention, in nanoseconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReadoutSettings {
    /// Width of the default readout window
    pub readout_window: f64,
    /// How far before the trigger time the default window opens
    pub trigger_offset: f64,
    /// Clock quantum per step
    pub beam_bunch: f64,
    /// Evict batches no trigger can reach
    pub retention: bool,
    /// Slack kept below the retention horizon
    pub safety_margin: f64,
}

impl Default for ReadoutSettings {
    fn default() -> Self {
        Self {
            readout_window: 200.0,
            trigger_offset: 50.0,
            beam_bunch: 2.0,
            retention: true,
            safety_margin: 150.0,
        }
    }
}

impl ReadoutSettings {
    pub fn from_blueprint(blueprint: &ReadoutBlueprint) -> Self {
        Self {
            readout_window: blueprint.readout.readout_window_ns,
            trigger_offset: blueprint.readout.trigger_offset_ns,
            beam_bunch: blueprint.readout.beam_bunch_ns,
            retention: blueprint.retention.enabled,
            safety_margin: blueprint.retention.safety_margin_ns,
        }
    }

    /// Part of the default window after the trigger time
    #[inline]
    pub fn window_after(&self) -> f64 {
        self.readout_window - self.trigger_offset
    }

    /// Reject timing the step loop and drivers cannot advance with.
    pub fn validate(&self) -> Result<(), ReadoutError> {
        if !self.beam_bunch.is_finite() || self.beam_bunch <= 0.0 {
            return Err(ReadoutError::config_validation(
                "readout.beam_bunch_ns",
                format!("must be a positive finite number, got {}", self.beam_bunch),
            ));
        }
        for (field, value) in [
            ("readout.readout_window_ns", self.readout_window),
            ("readout.trigger_offset_ns", self.trigger_offset),
            ("retention.safety_margin_ns", self.safety_margin),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ReadoutError::config_validation(
                    field,
                    format!("must be a non-negative finite number, got {value}"),
                ));
            }
        }
        if self.trigger_offset > self.readout_window {
            return Err(ReadoutError::config_validation(
                "readout.trigger_offset_ns",
                format!(
                    "trigger_offset ({}) exceeds readout_window ({})",
                    self.trigger_offset, self.readout_window
                ),
            ));
        }
        Ok(())
    }
}

/// Typed name of a registered stream.
pub struct StreamHandle<T> {
    name: StreamId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StreamHandle<T> {
    pub fn name(&self) -> &StreamId {
        &self.name
    }
}

impl<T> Clone for StreamHandle<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for StreamHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamHandle({})", self.name)
    }
}

/// Timing summary computed when the run starts
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub streams: usize,
    pub persistent_streams: usize,
    pub drivers: usize,
    pub triggers: usize,
    pub critical_stream: Option<StreamId>,
    pub max_stream_displacement: f64,
    pub max_trigger_displacement: f64,
    pub max_window_before: f64,
    pub max_window_after: f64,
    pub readout_window: f64,
    pub trigger_offset: f64,
    /// Longest time between an event and its trigger decision becoming writable
    pub trigger_delay: f64,
    /// How much history the buffers keep at most
    pub retention_span: f64,
}

#[derive(Debug)]
pub struct SimulationContext {
    settings: ReadoutSettings,
    registry: Registry,
    queue: TriggerQueue,
    now: f64,
    step: u64,
    started: bool,
}

impl Default for SimulationContext {
    fn default() -> Self {
        Self::new(ReadoutSettings::default())
    }
}

impl SimulationContext {
    pub fn new(settings: ReadoutSettings) -> Self {
        Self {
            settings,
            registry: Registry::default(),
            queue: TriggerQueue::default(),
            now: 0.0,
            step: 0,
            started: false,
        }
    }

    pub fn settings(&self) -> &ReadoutSettings {
        &self.settings
    }

    /// Current simulated time (ns)
    #[inline]
    pub fn current_time(&self) -> f64 {
        self.now
    }

    /// Number of completed steps
    #[inline]
    pub fn step_index(&self) -> u64 {
        self.step
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    fn ensure_configurable(&self, operation: &'static str) -> Result<(), ReadoutError> {
        if self.started {
            return Err(ReadoutError::RunStarted { operation });
        }
        Ok(())
    }

    // ===== Registration =====

    /// Register a producer driver. Its dependencies must already be registered.
    pub fn register_driver(&mut self, spec: DriverSpec) -> Result<DriverId, ReadoutError> {
        self.ensure_configurable("register a driver")?;
        if spec.name.is_empty() {
            return Err(ReadoutError::MissingField {
                field: "driver name",
            });
        }
        for dependency in &spec.dependencies {
            if !self.registry.contains(dependency) {
                return Err(ReadoutError::UnregisteredDependency {
                    dependency: dependency.to_string(),
                    consumer: spec.name.clone(),
                });
            }
        }

        let id = self.registry.push_driver(DriverRecord {
            name: spec.name,
            dependencies: spec.dependencies,
            local_displacement: spec.time_displacement,
            outputs: Vec::new(),
        });
        debug!(driver = %id, "driver registered");
        Ok(id)
    }

    /// Declare an extra input of an already registered driver.
    ///
    /// The edge is checked the next time a collection is registered and
    /// again by [`start_run`](Self::start_run).
    pub fn add_dependency(
        &mut self,
        driver: DriverId,
        stream: impl Into<StreamId>,
    ) -> Result<(), ReadoutError> {
        self.ensure_configurable("add a dependency")?;
        let stream = stream.into();
        let record = self.registry.driver_mut(driver)?;
        if !record.dependencies.contains(&stream) {
            record.dependencies.push(stream);
        }
        Ok(())
    }

    /// Register a collection produced by `producer`.
    ///
    /// Computes and caches the stream's global time displacement; fails on a
    /// duplicate name, an unregistered or circular dependency.
    #[instrument(name = "readout_register_collection", skip(self, readout_name), fields(element_type = %ElementType::of::<T>()))]
    pub fn register_collection<T: Element>(
        &mut self,
        name: &str,
        producer: DriverId,
        flags: u32,
        readout_name: Option<&str>,
        persistent: bool,
    ) -> Result<StreamHandle<T>, ReadoutError> {
        self.ensure_configurable("register a collection")?;
        if name.is_empty() {
            return Err(ReadoutError::MissingField {
                field: "collection name",
            });
        }
        if let Ok(existing) = self.registry.stream(name) {
            return Err(ReadoutError::DuplicateCollection {
                name: name.to_string(),
                element_type: existing.descriptor.element_type.to_string(),
            });
        }

        let driver = self.registry.driver(producer)?;
        dependency::validate_dependencies(&self.registry, name, &driver.dependencies)?;
        let time_displacement = dependency::total_time_displacement(
            &self.registry,
            name,
            &driver.dependencies,
            driver.local_displacement,
        )?;
        let producer_name = driver.name.clone();

        let stream = StreamId::from(name);
        self.registry.insert_stream(StreamEntry {
            descriptor: StreamDescriptor {
                name: stream.clone(),
                element_type: ElementType::of::<T>(),
                producer,
                producer_name,
                flags,
                readout_name: readout_name.map(str::to_string),
                persistent,
                window_before: None,
                window_after: None,
                time_displacement,
            },
            buffer: Box::new(StreamBuffer::<T>::new()),
        });

        debug!(time_displacement, persistent, "collection registered");
        Ok(StreamHandle {
            name: stream,
            _marker: PhantomData,
        })
    }

    /// Register a trigger driver and cache its total time displacement.
    pub fn register_trigger(
        &mut self,
        spec: DriverSpec,
        dead_time: u32,
    ) -> Result<TriggerId, ReadoutError> {
        self.ensure_configurable("register a trigger")?;
        if spec.name.is_empty() {
            return Err(ReadoutError::MissingField {
                field: "trigger name",
            });
        }
        let displacement = dependency::total_time_displacement(
            &self.registry,
            &spec.name,
            &spec.dependencies,
            spec.time_displacement,
        )?;

        let id = self.registry.push_trigger(TriggerRecord {
            name: spec.name,
            dependencies: spec.dependencies,
            local_displacement: spec.time_displacement,
            displacement,
            dead_time,
            last_trigger_time: None,
        });
        debug!(trigger = %id, displacement, dead_time, "trigger registered");
        Ok(id)
    }

    // ===== Configuration =====

    pub fn set_window_before(&mut self, name: &str, ns: f64) -> Result<(), ReadoutError> {
        self.ensure_configurable("set a readout window")?;
        self.registry.stream_mut(name)?.descriptor.window_before = Some(ns);
        Ok(())
    }

    pub fn set_window_after(&mut self, name: &str, ns: f64) -> Result<(), ReadoutError> {
        self.ensure_configurable("set a readout window")?;
        self.registry.stream_mut(name)?.descriptor.window_after = Some(ns);
        Ok(())
    }

    /// Mark a stream as written to every event; re-picks the critical stream.
    pub fn set_persistent(&mut self, name: &str, persistent: bool) -> Result<(), ReadoutError> {
        self.ensure_configurable("change persistence")?;
        self.registry.stream_mut(name)?.descriptor.persistent = persistent;
        self.registry.refresh_critical();
        Ok(())
    }

    /// Dead time in beam-bunch quanta
    pub fn set_dead_time(&mut self, trigger: TriggerId, quanta: u32) -> Result<(), ReadoutError> {
        self.ensure_configurable("set dead time")?;
        self.registry.trigger_mut(trigger)?.dead_time = quanta;
        Ok(())
    }

    pub fn update_readout_name(
        &mut self,
        name: &str,
        readout_name: Option<String>,
    ) -> Result<(), ReadoutError> {
        self.ensure_configurable("update a readout name")?;
        self.registry.stream_mut(name)?.descriptor.readout_name = readout_name;
        Ok(())
    }

    // ===== Introspection =====

    pub fn collection_parameters(&self, name: &str) -> Result<&StreamDescriptor, ReadoutError> {
        Ok(&self.registry.stream(name)?.descriptor)
    }

    pub fn total_time_displacement(&self, name: &str) -> Result<f64, ReadoutError> {
        Ok(self.registry.stream(name)?.descriptor.time_displacement)
    }

    pub fn trigger_displacement(&self, trigger: TriggerId) -> Result<f64, ReadoutError> {
        Ok(self.registry.trigger(trigger)?.displacement)
    }

    pub fn trigger_name(&self, trigger: TriggerId) -> Result<&str, ReadoutError> {
        Ok(&self.registry.trigger(trigger)?.name)
    }

    /// Dead time in beam-bunch quanta
    pub fn trigger_dead_time(&self, trigger: TriggerId) -> Result<u32, ReadoutError> {
        Ok(self.registry.trigger(trigger)?.dead_time)
    }

    pub fn trigger_state(&self, trigger: TriggerId) -> Result<TriggerState, ReadoutError> {
        let record = self.registry.trigger(trigger)?;
        Ok(TriggerState::at(
            self.now,
            record.last_trigger_time,
            record.dead_time,
            self.settings.beam_bunch,
        ))
    }

    /// Collections registered by `driver`, in registration order
    pub fn driver_outputs(&self, driver: DriverId) -> Result<&[StreamId], ReadoutError> {
        Ok(&self.registry.driver(driver)?.outputs)
    }

    /// Persistent stream with the largest displacement
    pub fn critical_stream(&self) -> Option<&StreamId> {
        self.registry.critical()
    }

    /// Registered stream names in registration order
    pub fn stream_names(&self) -> &[StreamId] {
        self.registry.stream_names()
    }

    pub fn buffered_batches(&self, name: &str) -> Result<usize, ReadoutError> {
        Ok(self.registry.stream(name)?.buffer.len())
    }

    pub fn buffered_elements(&self, name: &str) -> Result<usize, ReadoutError> {
        Ok(self.registry.stream(name)?.buffer.element_count())
    }

    pub fn pending_triggers(&self) -> impl Iterator<Item = &TriggerRequest> {
        self.queue.iter()
    }

    pub fn pending_trigger_count(&self) -> usize {
        self.queue.len()
    }

    // ===== Data flow =====

    /// Append a batch to `name`.
    ///
    /// Without a timestamp the batch is stamped `current_time - displacement`.
    /// An empty batch is a no-op.
    pub fn add_data<T: Element>(
        &mut self,
        name: &str,
        timestamp: Option<f64>,
        items: Vec<T>,
    ) -> Result<(), ReadoutError> {
        let now = self.now;
        let entry = self.registry.stream_mut(name)?;
        let expected = entry.buffer.element_type();
        let buffer = entry
            .buffer
            .as_any_mut()
            .downcast_mut::<StreamBuffer<T>>()
            .ok_or_else(|| {
                ReadoutError::type_mismatch(name, expected.to_string(), ElementType::of::<T>().to_string())
            })?;

        if items.is_empty() {
            return Ok(());
        }
        let timestamp = timestamp.unwrap_or(now - entry.descriptor.time_displacement);
        let count = items.len();
        buffer.push(timestamp, items).map_err(|e| match e {
            PushError::NonFinite => ReadoutError::NonFiniteTimestamp {
                name: name.to_string(),
                time: timestamp,
            },
            PushError::OutOfOrder { last } => ReadoutError::OutOfOrderBatch {
                name: name.to_string(),
                last,
                time: timestamp,
            },
        })?;

        trace!(collection = name, timestamp, count, "batch appended");
        metrics::counter!("readout_batches_appended_total").increment(1);
        Ok(())
    }

    pub fn add_data_to<T: Element>(
        &mut self,
        handle: &StreamHandle<T>,
        timestamp: Option<f64>,
        items: Vec<T>,
    ) -> Result<(), ReadoutError> {
        self.add_data(handle.name(), timestamp, items)
    }

    /// Elements of `name` stamped in `[start, end)`.
    ///
    /// A pure read: callers check readiness with
    /// [`check_collection_status`](Self::check_collection_status) first.
    pub fn get_data<T: Element>(
        &self,
        start: f64,
        end: f64,
        name: &str,
    ) -> Result<Vec<T>, ReadoutError> {
        let entry = self.registry.stream(name)?;
        let buffer = entry
            .buffer
            .as_any()
            .downcast_ref::<StreamBuffer<T>>()
            .ok_or_else(|| {
                ReadoutError::type_mismatch(
                    name,
                    entry.buffer.element_type().to_string(),
                    ElementType::of::<T>().to_string(),
                )
            })?;
        Ok(buffer.range(start, end))
    }

    pub fn get_data_from<T: Element>(
        &self,
        start: f64,
        end: f64,
        handle: &StreamHandle<T>,
    ) -> Result<Vec<T>, ReadoutError> {
        self.get_data(start, end, handle.name())
    }

    /// Whether data stamped `time` can no longer arrive on `name`.
    pub fn check_collection_status(&self, name: &str, time: f64) -> Result<bool, ReadoutError> {
        let entry = self.registry.stream(name)?;
        Ok(time <= self.now - entry.descriptor.time_displacement)
    }

    // ===== Triggering =====

    /// Queue a readout request for `trigger`.
    ///
    /// Returns `Ok(false)` without queuing while the driver is in dead time.
    #[instrument(name = "readout_send_trigger", level = "debug", skip(self), fields(now = self.now))]
    pub fn send_trigger(&mut self, trigger: TriggerId) -> Result<bool, ReadoutError> {
        let now = self.now;
        let bunch = self.settings.beam_bunch;
        let window_after = self.settings.window_after();
        let record = self.registry.trigger_mut(trigger)?;

        if let TriggerState::DeadTime { until } =
            TriggerState::at(now, record.last_trigger_time, record.dead_time, bunch)
        {
            trace!(until, "trigger suppressed by dead time");
            metrics::counter!("readout_triggers_total", "status" => "dead_time").increment(1);
            return Ok(false);
        }

        let trigger_time = now - record.displacement;
        let write_ready_time = trigger_time + window_after;
        record.last_trigger_time = Some(now);
        self.queue.push(TriggerRequest {
            trigger_time,
            write_ready_time,
            source: trigger,
        });

        debug!(trigger_time, write_ready_time, "trigger queued");
        metrics::counter!("readout_triggers_total", "status" => "queued").increment(1);
        Ok(true)
    }

    /// Dequeue the earliest-ready request if the critical stream has caught up
    /// to its write-ready time. Later requests are never examined first.
    #[instrument(name = "readout_poll_trigger", level = "trace", skip(self))]
    pub fn poll_ready_request(&mut self) -> Result<Option<TriggerRequest>, ReadoutError> {
        let Some(request) = self.queue.peek() else {
            return Ok(None);
        };
        let ready = match self.registry.critical() {
            Some(critical) => self.check_collection_status(critical, request.write_ready_time)?,
            None => true,
        };
        if !ready {
            return Ok(None);
        }
        Ok(self.queue.pop())
    }

    // ===== Run lifecycle =====

    /// Close registration after validating the whole configuration.
    #[instrument(name = "readout_start_run", skip(self))]
    pub fn start_run(&mut self) -> Result<RunSummary, ReadoutError> {
        self.ensure_configurable("start the run")?;
        self.settings.validate()?;

        dependency::topological_order(&self.registry)?;
        for trigger in self.registry.triggers() {
            for dependency in &trigger.dependencies {
                if !self.registry.contains(dependency) {
                    return Err(ReadoutError::UnregisteredDependency {
                        dependency: dependency.to_string(),
                        consumer: trigger.name.clone(),
                    });
                }
            }
        }

        let window_after = self.settings.window_after();
        for entry in self.registry.streams() {
            if let Some(after) = entry.descriptor.window_after {
                if after > window_after {
                    return Err(ReadoutError::config_validation(
                        format!("streams[{}].window_after_ns", entry.descriptor.name),
                        format!(
                            "window_after ({after}) exceeds readout_window - trigger_offset ({window_after})"
                        ),
                    ));
                }
            }
        }

        let summary = self.summary();
        self.started = true;

        info!(
            streams = summary.streams,
            triggers = summary.triggers,
            critical = ?summary.critical_stream,
            "run started"
        );
        debug!(
            max_stream_displacement = summary.max_stream_displacement,
            max_trigger_displacement = summary.max_trigger_displacement,
            max_window_before = summary.max_window_before,
            max_window_after = summary.max_window_after,
            readout_window = summary.readout_window,
            trigger_offset = summary.trigger_offset,
            trigger_delay = summary.trigger_delay,
            retention_span = summary.retention_span,
            "readout timing"
        );
        Ok(summary)
    }

    /// Timing summary of the current registration state
    pub fn summary(&self) -> RunSummary {
        let max_stream_displacement = self.registry.max_stream_displacement();
        let max_trigger_displacement = self.registry.max_trigger_displacement();
        let max_window_before = self.lookback();
        let max_window_after = self
            .registry
            .streams()
            .filter_map(|e| e.descriptor.window_after)
            .fold(self.settings.window_after(), f64::max);

        let trigger_delay = max_trigger_displacement
            .max(max_stream_displacement + max_window_after)
            .max(self.registry.max_local_displacement());

        RunSummary {
            streams: self.registry.stream_names().len(),
            persistent_streams: self
                .registry
                .streams()
                .filter(|e| e.descriptor.persistent)
                .count(),
            drivers: self.registry.drivers().len(),
            triggers: self.registry.triggers().len(),
            critical_stream: self.registry.critical().cloned(),
            max_stream_displacement,
            max_trigger_displacement,
            max_window_before,
            max_window_after,
            readout_window: self.settings.readout_window,
            trigger_offset: self.settings.trigger_offset,
            trigger_delay,
            retention_span: trigger_delay + max_window_before + self.settings.safety_margin,
        }
    }

    /// Widest reach before a trigger time of any window
    fn lookback(&self) -> f64 {
        self.registry
            .streams()
            .filter_map(|e| e.descriptor.window_before)
            .fold(self.settings.trigger_offset, f64::max)
    }

    /// Oldest timestamp any pending or future request can still read.
    pub fn retention_horizon(&self) -> Option<f64> {
        if !self.settings.retention {
            return None;
        }
        let lookback = self.lookback();
        let mut horizon = self.now - self.registry.max_stream_displacement();

        if let Some(earliest) = self
            .queue
            .iter()
            .map(|r| r.trigger_time)
            .min_by(f64::total_cmp)
        {
            horizon = horizon.min(earliest - lookback);
        }
        if !self.registry.triggers().is_empty() {
            horizon = horizon.min(self.now - self.registry.max_trigger_displacement() - lookback);
        }
        Some(horizon - self.settings.safety_margin)
    }

    /// Evict batches below the retention horizon; returns the number dropped.
    #[instrument(name = "readout_retention", level = "trace", skip(self))]
    pub fn apply_retention(&mut self) -> usize {
        let Some(horizon) = self.retention_horizon() else {
            return 0;
        };
        let evicted: usize = self
            .registry
            .streams_mut()
            .map(|entry| entry.buffer.evict_before(horizon))
            .sum();
        if evicted > 0 {
            trace!(horizon, evicted, "batches evicted");
            metrics::counter!("readout_batches_evicted_total").increment(evicted as u64);
        }
        evicted
    }

    /// Advance the clock by one beam bunch
    pub fn advance_clock(&mut self) {
        self.now += self.settings.beam_bunch;
        self.step += 1;
    }
}
