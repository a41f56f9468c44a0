//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the readout simulation.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Simulated time is an `f64` number of nanoseconds
//! - The clock advances by one beam-bunch quantum per external input event
//! - A stream's *time displacement* is how far behind the clock its data lags

mod blueprint;
mod element;
mod error;
mod event;
mod sink;
mod stream_id;

pub use blueprint::*;
pub use element::{Element, ElementType};
pub use error::*;
pub use event::{ReadoutEvent, TimeWindow, TriggeredCollection};
pub use sink::EventSink;
pub use stream_id::StreamId;
