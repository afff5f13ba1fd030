//! Inbound commands to the application service.
//!
//! These represent actions requested by the outside world (the daily-reset
//! schedule, the reporter, a maintenance console) that the
//! [`FlowMeterService`](super::service::FlowMeterService) interprets and
//! acts upon.

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppCommand {
    /// Zero the day-scoped totals and record `epoch` as the new boundary.
    PerformDailyReset { epoch: u32 },

    /// Count one more publish cycle for today's hourly average.
    IncrementHoursElapsed,

    /// Wipe the persisted record and every total, lifetime included.
    FactoryReset,
}
