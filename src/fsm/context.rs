//! Shared mutable context threaded through every flow-state handler.
//!
//! `FlowContext` holds the latest pulse sample, the detection thresholds,
//! the bookkeeping of the event in progress, and a one-slot outbox where
//! handlers leave the [`FlowAction`] produced by the current sample.

use crate::config::FlowConfig;

// ---------------------------------------------------------------------------
// Thresholds (copied from config at construction)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct FlowThresholds {
    /// A sample delta must exceed this to count as flow.
    pub min_pulse_delta: u32,
    /// Sub-threshold time before an active event closes (ms).
    pub timeout_ms: u32,
    /// Calibration constant.
    pub pulses_per_gallon: f32,
}

impl From<&FlowConfig> for FlowThresholds {
    fn from(cfg: &FlowConfig) -> Self {
        Self {
            min_pulse_delta: cfg.min_pulse_threshold,
            timeout_ms: cfg.flow_timeout_ms,
            pulses_per_gallon: cfg.pulses_per_gallon,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-sample input
// ---------------------------------------------------------------------------

/// One sampling step's view of the customer counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct PulseSample {
    /// Clock at the time of the sample (ms, wrapping).
    pub now_ms: u32,
    /// Customer counter value at the sample.
    pub customer_count: u32,
    /// Pulses since the previous sample.
    pub delta: u32,
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A completed flow event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosedFlow {
    /// Customer-counter span of the event.
    pub pulses: u32,
    /// `pulses / pulses_per_gallon`.
    pub gallons: f32,
}

/// What a sampling step asks the rest of the system to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlowAction {
    /// A new flow event began at customer count `start_pulse`.
    Started { start_pulse: u32 },
    /// The event in progress closed.
    Closed(ClosedFlow),
}

// ---------------------------------------------------------------------------
// FlowContext
// ---------------------------------------------------------------------------

pub struct FlowContext {
    pub thresholds: FlowThresholds,
    /// Latest sample.  Updated before each FSM tick.
    pub sample: PulseSample,
    /// Customer count at which the open event started.
    pub flow_start_pulse: u32,
    /// Last time the pulse delta exceeded the threshold (ms).
    pub inactivity_since_ms: u32,
    /// Action produced by the most recent handler run, if any.
    pub outbox: Option<FlowAction>,
}

impl FlowContext {
    pub fn new(thresholds: FlowThresholds) -> Self {
        Self {
            thresholds,
            sample: PulseSample::default(),
            flow_start_pulse: 0,
            inactivity_since_ms: 0,
            outbox: None,
        }
    }

    /// Whether the current sample shows flow.
    pub fn above_threshold(&self) -> bool {
        self.sample.delta > self.thresholds.min_pulse_delta
    }

    /// Build the closing record for the open event using the current sample.
    pub fn close_open_event(&self) -> ClosedFlow {
        let pulses = self
            .sample
            .customer_count
            .wrapping_sub(self.flow_start_pulse);
        ClosedFlow {
            pulses,
            gallons: pulses as f32 / self.thresholds.pulses_per_gallon,
        }
    }
}
