//! Application service, the hexagonal core.
//!
//! [`FlowMeterService`] owns the flow detector, the accumulator and the
//! persistent store, and borrows the ISR-fed [`PulseCounter`].  All I/O
//! flows through port traits, making the whole service testable with the
//! simulated NVS backend.
//!
//! ```text
//!  PulseCounter ──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!   (ISR writes)    │       FlowMeterService       │
//!                   │ Detector · Accumulator · Store│ ◀──▶ NvmPort
//!                   └──────────────────────────────┘
//! ```

use log::{info, warn};

use crate::accumulator::{Accumulator, CloseOutcome, Totals};
use crate::config::FlowConfig;
use crate::detector::{FlowDetector, FlowState};
use crate::fsm::context::{ClosedFlow, FlowAction};
use crate::sensors::PulseCounter;
use crate::storage::{PersistentStore, StoreInit};

use super::commands::AppCommand;
use super::events::AppEvent;
use super::ports::{EventSink, NvmPort};

// ───────────────────────────────────────────────────────────────
// FlowMeterService
// ───────────────────────────────────────────────────────────────

pub struct FlowMeterService<'c, N: NvmPort> {
    config: FlowConfig,
    counter: &'c PulseCounter,
    detector: FlowDetector,
    accumulator: Accumulator,
    store: PersistentStore<N>,
    /// Sampling is suppressed until the boot sequence completes.
    monitoring: bool,
}

impl<'c, N: NvmPort> FlowMeterService<'c, N> {
    /// Construct the service.
    ///
    /// Does **not** touch storage; call [`begin`](Self::begin) next.
    pub fn new(config: FlowConfig, counter: &'c PulseCounter, nvm: N, now_ms: u32) -> Self {
        let detector = FlowDetector::new(&config, now_ms);
        let accumulator = Accumulator::new(config.min_gallons_threshold);
        Self {
            config,
            counter,
            detector,
            accumulator,
            store: PersistentStore::new(nvm),
            monitoring: false,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Check the storage guard and restore the persisted totals.
    pub fn begin(&mut self, sink: &mut impl EventSink) -> StoreInit {
        let init = match self.store.begin() {
            Ok(init) => init,
            Err(e) => {
                warn!("store init failed ({}), continuing with in-memory totals", e);
                StoreInit::Reinitialized
            }
        };
        if init == StoreInit::Reinitialized {
            sink.emit(&AppEvent::StorageReinitialized);
        }

        self.accumulator = Accumulator::load(self.config.min_gallons_threshold, &self.store);
        let t = *self.accumulator.totals();
        sink.emit(&AppEvent::Started {
            store: init,
            lifetime_gallons: t.lifetime_gallons,
            daily_gallons: t.daily_gallons,
        });
        info!(
            "FlowMeterService started ({:?}): lifetime {:.2} gal",
            init, t.lifetime_gallons
        );
        init
    }

    /// Begin sampling.  Pulses counted before this call are ignored.
    pub fn start_monitoring(&mut self, now_ms: u32) {
        self.detector.rebase(now_ms, self.counter.snapshot());
        self.monitoring = true;
        info!("flow monitoring started");
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    // ── Per-iteration orchestration ───────────────────────────

    /// Sample the counter if the interval has elapsed and account for any
    /// event boundary it produces.
    pub fn poll(&mut self, now_ms: u32, sink: &mut impl EventSink) -> Option<FlowAction> {
        if !self.monitoring {
            return None;
        }
        let action = self.detector.poll(now_ms, self.counter)?;
        self.apply(action, sink);
        Some(action)
    }

    fn apply(&mut self, action: FlowAction, sink: &mut impl EventSink) {
        match action {
            FlowAction::Started { start_pulse } => {
                self.accumulator.record_start(&mut self.store);
                sink.emit(&AppEvent::FlowStarted {
                    start_pulse,
                    events_today: self.accumulator.totals().flow_events_today,
                });
            }
            FlowAction::Closed(closed) => {
                self.credit(&closed, sink);
            }
        }
    }

    fn credit(&mut self, closed: &ClosedFlow, sink: &mut impl EventSink) {
        let outcome = self.accumulator.record_close(closed, &mut self.store);
        sink.emit(&AppEvent::FlowEnded {
            pulses: closed.pulses,
            gallons: closed.gallons,
            credited: matches!(outcome, CloseOutcome::Credited(_)),
        });
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command.
    pub fn handle_command(&mut self, cmd: AppCommand, sink: &mut impl EventSink) {
        match cmd {
            AppCommand::PerformDailyReset { epoch } => self.perform_daily_reset(epoch, sink),
            AppCommand::IncrementHoursElapsed => self.increment_hours_elapsed(),
            AppCommand::FactoryReset => self.factory_reset(sink),
        }
    }

    /// Zero the day-scoped totals and the customer counter.
    ///
    /// An event open at this point is resolved per the configured
    /// [`OpenFlowPolicy`](crate::config::OpenFlowPolicy) before anything
    /// is zeroed.
    pub fn perform_daily_reset(&mut self, epoch: u32, sink: &mut impl EventSink) {
        let drained = self.counter.reset_customer();
        let closed = self
            .detector
            .close_for_reset(drained, self.config.open_flow_on_reset);
        if let Some(c) = &closed {
            self.credit(c, sink);
        }

        self.accumulator.daily_reset(epoch, &mut self.store);
        let lifetime = self.accumulator.totals().lifetime_gallons;
        info!(
            "daily reset at {} ({} customer pulses drained, lifetime {:.2} gal)",
            epoch, drained, lifetime
        );
        sink.emit(&AppEvent::DailyReset {
            epoch,
            closed_gallons: closed.map(|c| c.gallons),
            lifetime_gallons: lifetime,
        });
    }

    pub fn increment_hours_elapsed(&mut self) {
        self.accumulator.increment_hours(&mut self.store);
    }

    fn factory_reset(&mut self, sink: &mut impl EventSink) {
        if let Err(e) = self.store.factory_reset() {
            warn!("factory reset: store write failed: {}", e);
        }
        self.accumulator.clear();
        self.counter.reset_customer();
        let last_check_ms = self.detector.window().last_check_ms;
        self.detector = FlowDetector::new(&self.config, last_check_ms);
        self.detector.rebase(last_check_ms, self.counter.snapshot());
        sink.emit(&AppEvent::StorageReinitialized);
    }

    // ── Queries ───────────────────────────────────────────────

    /// Read and clear the session total.
    pub fn take_session_gallons(&mut self) -> f32 {
        self.accumulator.take_session()
    }

    pub fn daily_gallons(&self) -> f32 {
        self.accumulator.totals().daily_gallons
    }

    pub fn lifetime_gallons(&self) -> f32 {
        self.accumulator.totals().lifetime_gallons
    }

    pub fn flow_events_today(&self) -> i32 {
        self.accumulator.totals().flow_events_today
    }

    pub fn hours_elapsed(&self) -> i32 {
        self.accumulator.totals().hours_elapsed
    }

    pub fn totals(&self) -> &Totals {
        self.accumulator.totals()
    }

    pub fn customer_count(&self) -> u32 {
        self.counter.customer_count()
    }

    pub fn technical_count(&self) -> u32 {
        self.counter.technical_count()
    }

    pub fn is_flow_active(&self) -> bool {
        self.detector.is_flow_active()
    }

    pub fn flow_state(&self) -> FlowState {
        self.detector.flow_state()
    }

    /// Clock value of the most recent sample (or rebase).
    pub fn last_sample_ms(&self) -> u32 {
        self.detector.window().last_check_ms
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn counter(&self) -> &'c PulseCounter {
        self.counter
    }

    pub fn store(&self) -> &PersistentStore<N> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut PersistentStore<N> {
        &mut self.store
    }
}
