//! Volume accounting across session, day and device lifetime.
//!
//! Totals are loaded from the [`PersistentStore`] at boot and written back
//! before any mutating call returns.  `session_gallons` is transient: the
//! reporter reads and clears it each publish cycle.
//!
//! Storage failures are logged and absorbed; the in-memory totals stay
//! authoritative until the next successful write.

use crate::app::ports::NvmPort;
use crate::fsm::context::ClosedFlow;
use crate::storage::{FieldValue, PersistedField, PersistentStore};
use log::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Totals {
    pub session_gallons: f32,
    pub daily_gallons: f32,
    pub lifetime_gallons: f32,
    pub flow_events_today: i32,
    pub hours_elapsed: i32,
}

/// What happened to a closed event's volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CloseOutcome {
    /// Added to every total.
    Credited(f32),
    /// At or below the minimum volume; counted as an event only.
    BelowThreshold(f32),
}

pub struct Accumulator {
    totals: Totals,
    min_gallons: f32,
}

impl Accumulator {
    /// Zeroed totals.
    pub fn new(min_gallons: f32) -> Self {
        Self {
            totals: Totals::default(),
            min_gallons,
        }
    }

    /// Restore the persisted totals.  Unreadable fields start at zero.
    pub fn load<N: NvmPort>(min_gallons: f32, store: &PersistentStore<N>) -> Self {
        let mut acc = Self::new(min_gallons);
        match store.snapshot() {
            Ok(Some(rec)) => {
                acc.totals.daily_gallons = rec.daily_gallons;
                acc.totals.lifetime_gallons = rec.lifetime_gallons;
                acc.totals.flow_events_today = rec.flow_events_today;
                acc.totals.hours_elapsed = rec.hours_elapsed;
                info!(
                    "totals restored: lifetime={:.2} gal daily={:.2} gal events={} hours={}",
                    rec.lifetime_gallons, rec.daily_gallons, rec.flow_events_today, rec.hours_elapsed
                );
            }
            Ok(None) => warn!("totals: record not initialised, starting from zero"),
            Err(e) => warn!("totals: record read failed ({}), starting from zero", e),
        }
        acc
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    /// A new flow event opened.  The event count is persisted at once so
    /// an event still open at a power loss is not forgotten.
    pub fn record_start<N: NvmPort>(&mut self, store: &mut PersistentStore<N>) {
        self.totals.flow_events_today = self.totals.flow_events_today.saturating_add(1);
        if let Err(e) = store.save(
            PersistedField::FlowEventsToday,
            FieldValue::Count(self.totals.flow_events_today),
        ) {
            warn!("totals: persisting event count failed: {}", e);
        }
    }

    /// Credit a closed event and persist the day's figures in one commit.
    pub fn record_close<N: NvmPort>(
        &mut self,
        closed: &ClosedFlow,
        store: &mut PersistentStore<N>,
    ) -> CloseOutcome {
        let outcome = if closed.gallons > self.min_gallons {
            self.totals.session_gallons += closed.gallons;
            self.totals.daily_gallons += closed.gallons;
            self.totals.lifetime_gallons += closed.gallons;
            info!(
                "credited {:.2} gal (daily {:.2}, lifetime {:.2})",
                closed.gallons, self.totals.daily_gallons, self.totals.lifetime_gallons
            );
            CloseOutcome::Credited(closed.gallons)
        } else {
            info!(
                "event of {:.3} gal at or below {:.2} gal, volume discarded",
                closed.gallons, self.min_gallons
            );
            CloseOutcome::BelowThreshold(closed.gallons)
        };

        let t = self.totals;
        if let Err(e) = store.save_group(&[
            (PersistedField::DailyGallons, FieldValue::Gallons(t.daily_gallons)),
            (PersistedField::LifetimeGallons, FieldValue::Gallons(t.lifetime_gallons)),
            (PersistedField::FlowEventsToday, FieldValue::Count(t.flow_events_today)),
        ]) {
            warn!("totals: persisting closed event failed: {}", e);
        }
        outcome
    }

    /// Read and clear the session total.
    pub fn take_session(&mut self) -> f32 {
        core::mem::take(&mut self.totals.session_gallons)
    }

    /// One more publish cycle elapsed today.
    pub fn increment_hours<N: NvmPort>(&mut self, store: &mut PersistentStore<N>) {
        self.totals.hours_elapsed = self.totals.hours_elapsed.saturating_add(1);
        if let Err(e) = store.save(
            PersistedField::HoursElapsed,
            FieldValue::Count(self.totals.hours_elapsed),
        ) {
            warn!("totals: persisting hours elapsed failed: {}", e);
        }
    }

    /// Zero the day-scoped totals and record the new reset boundary.
    ///
    /// Lifetime and session totals are untouched.
    pub fn daily_reset<N: NvmPort>(&mut self, epoch: u32, store: &mut PersistentStore<N>) {
        self.totals.daily_gallons = 0.0;
        self.totals.flow_events_today = 0;
        self.totals.hours_elapsed = 0;
        if let Err(e) = store.save_group(&[
            (PersistedField::DailyGallons, FieldValue::Gallons(0.0)),
            (PersistedField::FlowEventsToday, FieldValue::Count(0)),
            (PersistedField::HoursElapsed, FieldValue::Count(0)),
            (PersistedField::DailyResetEpoch, FieldValue::Word(epoch)),
        ]) {
            warn!("totals: persisting daily reset failed: {}", e);
        }
    }

    /// Forget everything (factory reset).
    pub fn clear(&mut self) {
        self.totals = Totals::default();
    }
}
