//! Reference drivers for the readout engine.
//!
//! A small calorimeter chain used by the CLI and the end-to-end tests:
//! - [`PulseSource`]: random hits plus the particles that caused them
//! - [`Clusterer`]: groups hits on adjacent channels
//! - [`ThresholdTrigger`]: fires when a cluster crosses an energy threshold
//!
//! [`build_simulation`] wires them up from a [`contracts::ReadoutBlueprint`].

mod clusterer;
mod factory;
mod pulse_source;
mod threshold_trigger;
mod types;

pub use clusterer::Clusterer;
pub use factory::{apply_overrides, build_simulation, BuiltSimulation};
pub use pulse_source::PulseSource;
pub use threshold_trigger::ThresholdTrigger;
pub use types::{Cluster, Hit, McParticle};
