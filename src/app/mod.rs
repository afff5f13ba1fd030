//! Application core: pure domain logic, zero I/O.
//!
//! Flow detection, volume accounting and the daily reset live here.  All
//! interaction with hardware happens through **port traits** defined in
//! [`ports`], keeping this layer fully testable without real peripherals.

pub mod commands;
pub mod daily_reset;
pub mod events;
pub mod ports;
pub mod service;
