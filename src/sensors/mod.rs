//! Sensor subsystem.
//!
//! The flow meter has a single sensor: the hall-effect pulse output, counted
//! in interrupt context by [`flow::PulseCounter`].

pub mod flow;

pub use flow::{PulseCounter, PulseSnapshot};
