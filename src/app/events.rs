//! Outbound application events.
//!
//! The [`FlowMeterService`](super::service::FlowMeterService) and the
//! reporters emit these through the [`EventSink`](super::ports::EventSink)
//! port.  Adapters on the other side decide what to do with them.

use crate::storage::StoreInit;

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service has started; carries the restored totals.
    Started {
        store: StoreInit,
        lifetime_gallons: f32,
        daily_gallons: f32,
    },

    /// The persisted record failed its guard check and was zeroed.
    StorageReinitialized,

    /// A flow event opened at customer count `start_pulse`.
    FlowStarted { start_pulse: u32, events_today: i32 },

    /// A flow event closed.  `credited` is false when the volume was at or
    /// below the minimum and only the event count changed.
    FlowEnded {
        pulses: u32,
        gallons: f32,
        credited: bool,
    },

    /// Day-scoped totals were zeroed.
    DailyReset {
        epoch: u32,
        /// Volume of an open event closed by the reset, if any.
        closed_gallons: Option<f32>,
        lifetime_gallons: f32,
    },

    /// A report was handed to the telemetry transport.
    Published { topic: &'static str, accepted: bool },
}
