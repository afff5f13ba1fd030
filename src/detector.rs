//! Flow detector: periodic sampler driving the Idle/Active state machine.
//!
//! Once per sampling interval the detector snapshots the [`PulseCounter`],
//! computes the customer-count delta against its [`SampleWindow`], and
//! ticks the FSM with it.  The FSM leaves at most one [`FlowAction`] per
//! sample, which is handed back to the caller for accounting.

use crate::config::{FlowConfig, OpenFlowPolicy};
use crate::fsm::context::{ClosedFlow, FlowAction, FlowContext, FlowThresholds, PulseSample};
use crate::fsm::{states, Fsm, StateId};
use crate::sensors::{PulseCounter, PulseSnapshot};
use crate::timing::elapsed_ms;
use log::{debug, info};

/// Counter values at the previous sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SampleWindow {
    pub last_check_ms: u32,
    pub last_customer: u32,
    pub last_technical: u32,
}

/// Public view of the detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Active {
        /// Customer count at which the event started.
        flow_start_pulse: u32,
        /// Last sample that exceeded the pulse threshold (ms).
        inactivity_since_ms: u32,
    },
}

pub struct FlowDetector {
    fsm: Fsm,
    ctx: FlowContext,
    window: SampleWindow,
    interval_ms: u32,
}

impl FlowDetector {
    pub fn new(config: &FlowConfig, now_ms: u32) -> Self {
        let mut ctx = FlowContext::new(FlowThresholds::from(config));
        let mut fsm = Fsm::new(states::build_state_table(), StateId::Idle);
        fsm.start(&mut ctx);
        Self {
            fsm,
            ctx,
            window: SampleWindow {
                last_check_ms: now_ms,
                ..SampleWindow::default()
            },
            interval_ms: config.flow_check_interval_ms,
        }
    }

    /// Sample `counter` if the sampling interval has elapsed.
    pub fn poll(&mut self, now_ms: u32, counter: &PulseCounter) -> Option<FlowAction> {
        if elapsed_ms(now_ms, self.window.last_check_ms) < self.interval_ms {
            return None;
        }
        self.sample(now_ms, counter.snapshot())
    }

    /// Run one sampling step with `snap` taken at `now_ms`.
    pub fn sample(&mut self, now_ms: u32, snap: PulseSnapshot) -> Option<FlowAction> {
        let delta = snap.customer.wrapping_sub(self.window.last_customer);
        let technical_delta = snap.technical.wrapping_sub(self.window.last_technical);
        self.window = SampleWindow {
            last_check_ms: now_ms,
            last_customer: snap.customer,
            last_technical: snap.technical,
        };

        let ppg = self.ctx.thresholds.pulses_per_gallon;
        debug!(
            "sample: +{} pulses (+{} technical) | customer={} ({:.2} gal) technical={} ({:.2} gal) | {:?}",
            delta,
            technical_delta,
            snap.customer,
            snap.customer as f32 / ppg,
            snap.technical,
            snap.technical as f32 / ppg,
            self.fsm.current_state(),
        );

        self.ctx.outbox = None;
        self.ctx.sample = PulseSample {
            now_ms,
            customer_count: snap.customer,
            delta,
        };
        self.fsm.tick(&mut self.ctx);
        self.ctx.outbox.take()
    }

    /// Re-anchor the sample window without ticking the FSM.  Pulses counted
    /// before this call never contribute to a delta.
    pub fn rebase(&mut self, now_ms: u32, snap: PulseSnapshot) {
        debug!(
            "detector rebased at customer={} technical={}",
            snap.customer, snap.technical
        );
        self.window = SampleWindow {
            last_check_ms: now_ms,
            last_customer: snap.customer,
            last_technical: snap.technical,
        };
    }

    pub fn is_flow_active(&self) -> bool {
        self.fsm.current_state() == StateId::Active
    }

    pub fn flow_state(&self) -> FlowState {
        match self.fsm.current_state() {
            StateId::Idle => FlowState::Idle,
            StateId::Active => FlowState::Active {
                flow_start_pulse: self.ctx.flow_start_pulse,
                inactivity_since_ms: self.ctx.inactivity_since_ms,
            },
        }
    }

    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    /// Resolve the open event (if any) when the customer counter has just
    /// been zeroed by a daily reset.
    ///
    /// `drained` is the value the customer counter held at the reset.  With
    /// [`OpenFlowPolicy::ForceClose`] the event is closed at that count and
    /// returned for crediting; with [`OpenFlowPolicy::Discard`] it is
    /// dropped.  Either way the window is re-anchored to the zeroed counter.
    pub fn close_for_reset(&mut self, drained: u32, policy: OpenFlowPolicy) -> Option<ClosedFlow> {
        self.window.last_customer = 0;
        if !self.is_flow_active() {
            return None;
        }

        self.ctx.sample.customer_count = drained;
        self.ctx.outbox = None;
        self.fsm.force_transition(StateId::Idle, &mut self.ctx);
        let closed = match self.ctx.outbox.take() {
            Some(FlowAction::Closed(c)) => c,
            _ => return None,
        };

        match policy {
            OpenFlowPolicy::ForceClose => {
                info!(
                    "daily reset: force-closed open event ({} pulses, {:.2} gal)",
                    closed.pulses, closed.gallons
                );
                Some(closed)
            }
            OpenFlowPolicy::Discard => {
                info!(
                    "daily reset: discarded open event ({} pulses, {:.2} gal)",
                    closed.pulses, closed.gallons
                );
                None
            }
        }
    }
}
