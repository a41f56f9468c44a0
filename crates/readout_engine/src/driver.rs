//! Driver contract.
//!
//! Producers and trigger drivers are distinct traits: a trigger driver has no
//! way to register persistent output or readout windows.

use std::fmt;

use contracts::{ReadoutError, ReadoutEvent, StreamId, TriggeredCollection};

use crate::SimulationContext;

/// Handle of a registered producer driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DriverId(pub(crate) usize);

impl DriverId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "driver#{}", self.0)
    }
}

/// Handle of a registered trigger driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerId(pub(crate) usize);

impl TriggerId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for TriggerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trigger#{}", self.0)
    }
}

/// Registration record of a driver: what the context needs to know up front.
#[derive(Debug, Clone, Default)]
pub struct DriverSpec {
    pub name: String,
    /// Collections read by the driver; must already be registered
    pub dependencies: Vec<StreamId>,
    /// Local processing-time displacement (ns)
    pub time_displacement: f64,
}

impl DriverSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn depends_on(mut self, stream: impl Into<StreamId>) -> Self {
        self.dependencies.push(stream.into());
        self
    }

    pub fn displaced_by(mut self, ns: f64) -> Self {
        self.time_displacement = ns;
        self
    }

    pub fn of_producer(driver: &dyn ProducerDriver) -> Self {
        Self {
            name: driver.name().to_string(),
            dependencies: driver.dependencies(),
            time_displacement: driver.time_displacement(),
        }
    }

    pub fn of_trigger(driver: &dyn TriggerDriver) -> Self {
        Self {
            name: driver.name().to_string(),
            dependencies: driver.dependencies(),
            time_displacement: driver.time_displacement(),
        }
    }
}

/// A driver producing named collections.
///
/// `configure` runs once, right after the driver is registered, and is where
/// collections are registered. `process` runs once per beam bunch.
pub trait ProducerDriver {
    fn name(&self) -> &str;

    /// Collections this driver reads
    fn dependencies(&self) -> Vec<StreamId> {
        Vec::new()
    }

    /// Local time displacement (ns) between input and output
    fn time_displacement(&self) -> f64 {
        0.0
    }

    fn configure(&mut self, ctx: &mut SimulationContext, id: DriverId) -> Result<(), ReadoutError>;

    fn process(&mut self, ctx: &mut SimulationContext) -> Result<(), ReadoutError>;

    /// Extra collections for an event being assembled.
    ///
    /// `event` already holds every persistent collection, so implementations
    /// can follow references out of the selected data.
    fn on_trigger_data(
        &mut self,
        _ctx: &SimulationContext,
        _event: &ReadoutEvent,
    ) -> Result<Vec<TriggeredCollection>, ReadoutError> {
        Ok(Vec::new())
    }
}

/// A driver deciding when to read out.
///
/// Calls [`SimulationContext::send_trigger`] from `process` when its condition fires.
pub trait TriggerDriver {
    fn name(&self) -> &str;

    fn dependencies(&self) -> Vec<StreamId> {
        Vec::new()
    }

    fn time_displacement(&self) -> f64 {
        0.0
    }

    /// Dead time in beam-bunch quanta
    fn dead_time(&self) -> u32 {
        0
    }

    fn configure(&mut self, _ctx: &mut SimulationContext, _id: TriggerId) -> Result<(), ReadoutError> {
        Ok(())
    }

    fn process(&mut self, ctx: &mut SimulationContext, id: TriggerId) -> Result<(), ReadoutError>;
}
