//! Concrete state handler functions and table builder.
//!
//! Each state is defined by three plain `fn` pointers: no closures, no
//! dynamic dispatch, no heap.
//!
//! ```text
//!          [delta > threshold]
//!  IDLE ─────────────────────────▶ ACTIVE ──┐ [delta > threshold]
//!    ▲                               │  ▲   │  refresh inactivity timer
//!    │   [sub-threshold for timeout] │  └───┘
//!    └───────────────────────────────┘
//!           emits Closed(gallons)
//! ```

use super::context::{FlowAction, FlowContext};
use super::{StateDescriptor, StateId};
use crate::timing::elapsed_ms;
use log::info;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: None,
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1: Active
        StateDescriptor {
            id: StateId::Active,
            name: "Active",
            on_enter: Some(active_enter),
            on_exit: Some(active_exit),
            on_update: active_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state: no flow event open
// ═══════════════════════════════════════════════════════════════════════════

fn idle_update(ctx: &mut FlowContext) -> Option<StateId> {
    // Sub-threshold samples are absorbed here: short trickles never open
    // an event.
    if ctx.above_threshold() {
        return Some(StateId::Active);
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  ACTIVE state: a flow event is open
// ═══════════════════════════════════════════════════════════════════════════

fn active_enter(ctx: &mut FlowContext) {
    // The pulses of the opening sample belong to the event.
    let start = ctx.sample.customer_count.wrapping_sub(ctx.sample.delta);
    ctx.flow_start_pulse = start;
    ctx.inactivity_since_ms = ctx.sample.now_ms;
    ctx.outbox = Some(FlowAction::Started { start_pulse: start });
    info!(
        "ACTIVE: flow started at pulse {} ({} pulses in opening sample)",
        start, ctx.sample.delta
    );
}

fn active_exit(ctx: &mut FlowContext) {
    let closed = ctx.close_open_event();
    ctx.outbox = Some(FlowAction::Closed(closed));
    info!(
        "ACTIVE: flow ended after {} pulses ({:.2} gal)",
        closed.pulses, closed.gallons
    );
}

fn active_update(ctx: &mut FlowContext) -> Option<StateId> {
    if ctx.above_threshold() {
        ctx.inactivity_since_ms = ctx.sample.now_ms;
        return None;
    }

    if elapsed_ms(ctx.sample.now_ms, ctx.inactivity_since_ms) >= ctx.thresholds.timeout_ms {
        return Some(StateId::Idle);
    }

    None
}
