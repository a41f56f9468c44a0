//! Simulation runner: owns the drivers and drives the per-bunch cycle.
//!
//! One step is one beam bunch:
//! 1. every producer processes
//! 2. every trigger driver processes
//! 3. the earliest-ready request is assembled into an event, if ready
//! 4. unreachable batches are evicted
//! 5. the clock advances

use contracts::{ReadoutError, ReadoutEvent};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::assembly;
use crate::context::{ReadoutSettings, RunSummary, SimulationContext};
use crate::driver::{DriverId, DriverSpec, ProducerDriver, TriggerDriver, TriggerId};
use crate::scheduler::TriggerRequest;

/// Counters of one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub steps: u64,
    pub events: u64,
    pub elements: u64,
    pub batches_evicted: u64,
    /// Requests still queued when the run stopped
    pub pending_triggers: usize,
}

pub struct Simulation {
    ctx: SimulationContext,
    producers: Vec<Box<dyn ProducerDriver>>,
    triggers: Vec<(TriggerId, Box<dyn TriggerDriver>)>,
    stats: RunStats,
}

impl Simulation {
    pub fn new(settings: ReadoutSettings) -> Self {
        Self::with_context(SimulationContext::new(settings))
    }

    pub fn with_context(ctx: SimulationContext) -> Self {
        Self {
            ctx,
            producers: Vec::new(),
            triggers: Vec::new(),
            stats: RunStats::default(),
        }
    }

    pub fn context(&self) -> &SimulationContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SimulationContext {
        &mut self.ctx
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    /// Register a producer and let it register its collections.
    pub fn add_producer(
        &mut self,
        mut driver: Box<dyn ProducerDriver>,
    ) -> Result<DriverId, ReadoutError> {
        let id = self.ctx.register_driver(DriverSpec::of_producer(driver.as_ref()))?;
        driver.configure(&mut self.ctx, id)?;
        self.producers.push(driver);
        Ok(id)
    }

    /// Register a trigger driver with its own dead time.
    pub fn add_trigger(
        &mut self,
        mut driver: Box<dyn TriggerDriver>,
    ) -> Result<TriggerId, ReadoutError> {
        let spec = DriverSpec::of_trigger(driver.as_ref());
        let id = self.ctx.register_trigger(spec, driver.dead_time())?;
        driver.configure(&mut self.ctx, id)?;
        self.triggers.push((id, driver));
        Ok(id)
    }

    pub fn start(&mut self) -> Result<RunSummary, ReadoutError> {
        self.ctx.start_run()
    }

    /// Run one beam bunch; returns the event emitted in it, if any.
    ///
    /// Starts the run on first use.
    #[instrument(name = "readout_step", level = "trace", skip(self), fields(step = self.ctx.step_index()))]
    pub fn step(&mut self) -> Result<Option<ReadoutEvent>, ReadoutError> {
        if !self.ctx.is_started() {
            self.ctx.start_run()?;
        }

        for producer in &mut self.producers {
            producer.process(&mut self.ctx)?;
        }
        for (id, trigger) in &mut self.triggers {
            trigger.process(&mut self.ctx, *id)?;
        }

        let event = match self.ctx.poll_ready_request()? {
            Some(request) => Some(self.build_event(&request)?),
            None => None,
        };

        let evicted = self.ctx.apply_retention();
        self.ctx.advance_clock();

        self.stats.steps += 1;
        self.stats.batches_evicted += evicted as u64;
        self.stats.pending_triggers = self.ctx.pending_trigger_count();
        if let Some(event) = &event {
            self.stats.events += 1;
            self.stats.elements += event.element_count() as u64;
        }
        Ok(event)
    }

    fn build_event(&mut self, request: &TriggerRequest) -> Result<ReadoutEvent, ReadoutError> {
        let mut event = assembly::assemble(&self.ctx, request)?;

        let mut extra = Vec::new();
        for producer in &mut self.producers {
            extra.extend(producer.on_trigger_data(&self.ctx, &event)?);
        }
        for collection in extra {
            event.insert_collection(collection)?;
        }

        let latency = self.ctx.current_time() - request.trigger_time;
        debug!(
            event_number = event.event_number,
            trigger_time = event.trigger_time,
            source = %event.trigger_source,
            elements = event.element_count(),
            latency,
            "event assembled"
        );
        metrics::counter!("readout_events_total").increment(1);
        metrics::histogram!("readout_event_elements").record(event.element_count() as f64);
        metrics::histogram!("readout_trigger_latency_ns").record(latency);
        Ok(event)
    }

    /// Run `steps` beam bunches, handing each event to `on_event`.
    pub fn run<F>(&mut self, steps: u64, mut on_event: F) -> Result<RunStats, ReadoutError>
    where
        F: FnMut(ReadoutEvent) -> Result<(), ReadoutError>,
    {
        for _ in 0..steps {
            if let Some(event) = self.step()? {
                on_event(event)?;
            }
        }

        if self.stats.pending_triggers > 0 {
            warn!(
                pending = self.stats.pending_triggers,
                "run stopped with queued triggers"
            );
        }
        info!(
            steps = self.stats.steps,
            events = self.stats.events,
            elements = self.stats.elements,
            evicted = self.stats.batches_evicted,
            "run finished"
        );
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StreamHandle;
    use contracts::TriggeredCollection;
    use serde::Serialize;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Sample {
        label: &'static str,
    }

    /// Adds one scripted batch at a given clock time
    struct Scripted {
        name: &'static str,
        output: &'static str,
        displacement: f64,
        script: Vec<(f64, f64, Sample)>,
        handle: Option<StreamHandle<Sample>>,
    }

    impl ProducerDriver for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn time_displacement(&self) -> f64 {
            self.displacement
        }

        fn configure(&mut self, ctx: &mut SimulationContext, id: DriverId) -> Result<(), ReadoutError> {
            self.handle = Some(ctx.register_collection(self.output, id, 0, None, true)?);
            Ok(())
        }

        fn process(&mut self, ctx: &mut SimulationContext) -> Result<(), ReadoutError> {
            let now = ctx.current_time();
            let Some(handle) = &self.handle else {
                return Ok(());
            };
            for (at, stamp, sample) in &self.script {
                if *at == now {
                    ctx.add_data_to(handle, Some(*stamp), vec![sample.clone()])?;
                }
            }
            Ok(())
        }
    }

    /// Fires at scripted clock times
    struct Scheduled {
        name: &'static str,
        displacement: f64,
        dead_time: u32,
        fire_at: Vec<f64>,
    }

    impl TriggerDriver for Scheduled {
        fn name(&self) -> &str {
            self.name
        }

        fn time_displacement(&self) -> f64 {
            self.displacement
        }

        fn dead_time(&self) -> u32 {
            self.dead_time
        }

        fn process(&mut self, ctx: &mut SimulationContext, id: TriggerId) -> Result<(), ReadoutError> {
            if self.fire_at.contains(&ctx.current_time()) {
                ctx.send_trigger(id)?;
            }
            Ok(())
        }
    }

    /// Contributes a tag collection to every event
    struct Tagger;

    impl ProducerDriver for Tagger {
        fn name(&self) -> &str {
            "tagger"
        }

        fn configure(&mut self, _ctx: &mut SimulationContext, _id: DriverId) -> Result<(), ReadoutError> {
            Ok(())
        }

        fn process(&mut self, _ctx: &mut SimulationContext) -> Result<(), ReadoutError> {
            Ok(())
        }

        fn on_trigger_data(
            &mut self,
            _ctx: &SimulationContext,
            event: &ReadoutEvent,
        ) -> Result<Vec<TriggeredCollection>, ReadoutError> {
            let seen = event.items::<Sample>("A").map_or(0, <[Sample]>::len);
            Ok(vec![TriggeredCollection::new("Tags", vec![seen as u64])])
        }
    }

    fn stream_a() -> Box<Scripted> {
        Box::new(Scripted {
            name: "a",
            output: "A",
            displacement: 10.0,
            script: vec![
                (12.0, 2.0, Sample { label: "x" }),
                (20.0, 9.0, Sample { label: "late" }),
            ],
            handle: None,
        })
    }

    #[test]
    fn test_scenario_event_contains_caught_up_data() {
        let mut sim = Simulation::new(ReadoutSettings::default());
        sim.add_producer(stream_a()).unwrap();
        sim.context_mut().set_window_before("A", 5.0).unwrap();
        sim.context_mut().set_window_after("A", 5.0).unwrap();
        sim.add_trigger(Box::new(Scheduled {
            name: "trig",
            displacement: 0.0,
            dead_time: 0,
            fire_at: vec![2.0],
        }))
        .unwrap();

        let mut events = Vec::new();
        let stats = sim
            .run(100, |event| {
                events.push(event);
                Ok(())
            })
            .unwrap();

        assert_eq!(stats.events, 1);
        let event = &events[0];
        assert_eq!(event.trigger_time, 2.0);
        assert_eq!(event.items::<Sample>("A").unwrap(), &[Sample { label: "x" }]);
        // Emitted once A caught up to 2 + 150
        assert_eq!(event.event_number, 1);
        assert_eq!(sim.context().current_time(), 200.0);
    }

    #[test]
    fn test_event_waits_for_critical_stream() {
        let mut sim = Simulation::new(ReadoutSettings::default());
        sim.add_producer(stream_a()).unwrap();
        sim.add_trigger(Box::new(Scheduled {
            name: "trig",
            displacement: 0.0,
            dead_time: 0,
            fire_at: vec![2.0],
        }))
        .unwrap();

        let mut emitted_at = None;
        for _ in 0..100 {
            let now = sim.context().current_time();
            if sim.step().unwrap().is_some() {
                emitted_at = Some(now);
            }
        }
        // write-ready 152 must be <= now - 10
        assert_eq!(emitted_at, Some(162.0));
    }

    #[test]
    fn test_one_event_per_step() {
        let mut sim = Simulation::new(ReadoutSettings::default());
        sim.add_trigger(Box::new(Scheduled {
            name: "first",
            displacement: 0.0,
            dead_time: 0,
            fire_at: vec![0.0],
        }))
        .unwrap();
        sim.add_trigger(Box::new(Scheduled {
            name: "second",
            displacement: 0.0,
            dead_time: 0,
            fire_at: vec![0.0],
        }))
        .unwrap();

        let first = sim.step().unwrap().unwrap();
        let second = sim.step().unwrap().unwrap();
        assert_eq!(first.trigger_source, "first");
        assert_eq!(second.trigger_source, "second");
        assert!(sim.step().unwrap().is_none());
    }

    #[test]
    fn test_dead_time_through_runner() {
        let run = |fire_at: Vec<f64>| {
            let mut sim = Simulation::new(ReadoutSettings::default());
            sim.add_trigger(Box::new(Scheduled {
                name: "trig",
                displacement: 0.0,
                dead_time: 3,
                fire_at,
            }))
            .unwrap();
            sim.run(10, |_| Ok(())).unwrap().events
        };
        // 2 quanta apart, then 4 quanta apart
        assert_eq!(run(vec![0.0, 4.0]), 1);
        assert_eq!(run(vec![0.0, 8.0]), 2);
    }

    #[test]
    fn test_on_trigger_data_merged() {
        let mut sim = Simulation::new(ReadoutSettings::default());
        sim.add_producer(stream_a()).unwrap();
        sim.add_producer(Box::new(Tagger)).unwrap();
        sim.add_trigger(Box::new(Scheduled {
            name: "trig",
            displacement: 0.0,
            dead_time: 0,
            fire_at: vec![10.0],
        }))
        .unwrap();

        let mut events = Vec::new();
        sim.run(200, |event| {
            events.push(event);
            Ok(())
        })
        .unwrap();

        let event = &events[0];
        // window [-40, 160) holds both samples
        assert_eq!(event.items::<Sample>("A").map(<[Sample]>::len), Some(2));
        assert_eq!(event.items::<u64>("Tags"), Some(&[2u64][..]));
    }

    #[test]
    fn test_conflicting_on_trigger_collection_aborts() {
        struct Clash;
        impl ProducerDriver for Clash {
            fn name(&self) -> &str {
                "clash"
            }
            fn configure(&mut self, _: &mut SimulationContext, _: DriverId) -> Result<(), ReadoutError> {
                Ok(())
            }
            fn process(&mut self, _: &mut SimulationContext) -> Result<(), ReadoutError> {
                Ok(())
            }
            fn on_trigger_data(
                &mut self,
                _: &SimulationContext,
                _: &ReadoutEvent,
            ) -> Result<Vec<TriggeredCollection>, ReadoutError> {
                Ok(vec![TriggeredCollection::new("A", vec![1u8])])
            }
        }

        let mut sim = Simulation::new(ReadoutSettings::default());
        sim.add_producer(stream_a()).unwrap();
        sim.add_producer(Box::new(Clash)).unwrap();
        sim.add_trigger(Box::new(Scheduled {
            name: "trig",
            displacement: 0.0,
            dead_time: 0,
            fire_at: vec![0.0],
        }))
        .unwrap();

        let err = sim.run(200, |_| Ok(())).unwrap_err();
        assert!(matches!(err, ReadoutError::ConflictingCollection { .. }));
    }

    #[test]
    fn test_registration_errors_surface_from_configure() {
        let mut sim = Simulation::new(ReadoutSettings::default());
        sim.add_producer(stream_a()).unwrap();
        let err = sim.add_producer(stream_a()).unwrap_err();
        assert!(matches!(err, ReadoutError::DuplicateCollection { .. }));
    }
}
