//! # Readout Engine
//!
//! Time synchronization and trigger assembly for simulated detector readout.
//!
//! Responsibilities:
//! - Collection registry with per-stream time-window buffers
//! - Dependency resolution (transitive time displacement, cycle rejection)
//! - Trigger scheduling with dead time, served in write-readiness order
//! - Event assembly once the slowest persistent stream has caught up
//!
//! ## Usage
//!
//! ```ignore
//! use readout_engine::{ReadoutSettings, Simulation};
//!
//! let mut sim = Simulation::new(ReadoutSettings::default());
//! sim.add_producer(Box::new(source))?;
//! sim.add_trigger(Box::new(trigger))?;
//!
//! sim.run(1000, |event| {
//!     // Persist the event
//!     Ok(())
//! })?;
//! ```

mod assembly;
mod buffer;
mod context;
mod dependency;
mod driver;
mod registry;
mod scheduler;
mod simulation;

pub use assembly::{default_window, stream_window};
pub use buffer::{PushError, StreamBuffer, TimedBatch};
pub use context::{ReadoutSettings, RunSummary, SimulationContext, StreamHandle};
pub use driver::{DriverId, DriverSpec, ProducerDriver, TriggerDriver, TriggerId};
pub use registry::StreamDescriptor;
pub use scheduler::{TriggerRequest, TriggerState};
pub use simulation::{RunStats, Simulation};

// Re-export contracts types
pub use contracts::{ReadoutError, ReadoutEvent, StreamId, TimeWindow, TriggeredCollection};
