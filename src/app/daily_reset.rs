//! Daily-reset orchestration.
//!
//! The accounting day starts at an anchor timestamp.  Each poll compares
//! the clock against it:
//!
//! - no anchor yet (epoch `0` in a fresh record): anchor the day at now;
//! - clock behind the anchor (RTC fell back): re-anchor, no reset;
//! - at least one interval past the anchor: reset and anchor at now.
//!
//! With a synced wall clock the persisted `daily_reset_epoch` is the anchor
//! itself.  Without one, timestamps restart from the same fallback base on
//! every boot, so the record instead holds the anchor shifted into the
//! boot frame: `boot - elapsed`.  Read back after a reboot, it places the
//! anchor `elapsed` seconds before the new boot, and the day continues
//! where it left off.  That form is refreshed every
//! [`UNSYNCED_CHECKPOINT_SECS`]; progress since the last checkpoint and
//! time spent powered off are not counted.

use log::{info, warn};

use super::commands::AppCommand;
use super::ports::{ClockPort, EventSink, NvmPort};
use super::service::FlowMeterService;

/// How often the day's progress is written back while the wall clock is
/// not synced.
pub const UNSYNCED_CHECKPOINT_SECS: u32 = 600;

#[derive(Debug, Clone, Copy)]
pub struct DailyResetSchedule {
    interval_secs: u32,
    /// Start of the current day in this boot's timestamp frame.
    anchor: Option<u32>,
    /// Timestamp at which this boot's uptime was zero.
    boot_secs: u32,
    synced: bool,
    last_now: u32,
    last_checkpoint: u32,
}

impl DailyResetSchedule {
    pub fn new(interval_secs: u32) -> Self {
        Self {
            interval_secs,
            anchor: None,
            boot_secs: 0,
            synced: false,
            last_now: 0,
            last_checkpoint: 0,
        }
    }

    /// Returns `true` if a daily reset was performed.
    pub fn poll<N: NvmPort>(
        &mut self,
        clock: &impl ClockPort,
        service: &mut FlowMeterService<'_, N>,
        sink: &mut impl EventSink,
    ) -> bool {
        let now = clock.timestamp_secs();
        let synced = clock.is_time_synced();

        let anchor = match self.anchor {
            Some(anchor) if synced != self.synced => {
                // The timestamp frame jumped; keep the progress made so far.
                let elapsed = self.last_now.saturating_sub(anchor);
                info!(
                    "daily reset: wall clock {}, carrying {} s into the new frame",
                    if synced { "synced" } else { "lost" },
                    elapsed
                );
                self.synced = synced;
                self.boot_secs = now.saturating_sub(clock.now_ms() / 1_000);
                self.last_now = now;
                self.set_anchor(now.saturating_sub(elapsed), now, service);
                return false;
            }
            Some(anchor) => anchor,
            None => match self.restore(now, synced, clock, service) {
                Some(anchor) => anchor,
                None => return false,
            },
        };
        self.last_now = now;

        if now < anchor {
            warn!(
                "daily reset: clock moved backwards ({} < {}), re-anchoring",
                now, anchor
            );
            self.set_anchor(now, now, service);
            return false;
        }

        if now - anchor >= self.interval_secs {
            let epoch = self.stored_epoch(now, now);
            service.handle_command(AppCommand::PerformDailyReset { epoch }, sink);
            self.anchor = Some(now);
            self.last_checkpoint = now;
            return true;
        }

        if !synced && now.saturating_sub(self.last_checkpoint) >= UNSYNCED_CHECKPOINT_SECS {
            self.persist(anchor, now, service);
        }
        false
    }

    /// Start of the current day in this boot's frame, once known.
    pub fn anchor(&self) -> Option<u32> {
        self.anchor
    }

    /// First poll of a boot: pick up the persisted anchor.
    fn restore<N: NvmPort>(
        &mut self,
        now: u32,
        synced: bool,
        clock: &impl ClockPort,
        service: &mut FlowMeterService<'_, N>,
    ) -> Option<u32> {
        let stored = match service.store().daily_reset_epoch() {
            Ok(e) => e,
            Err(e) => {
                warn!("daily reset: epoch unreadable: {}", e);
                return None;
            }
        };
        self.synced = synced;
        self.boot_secs = now.saturating_sub(clock.now_ms() / 1_000);
        self.last_now = now;
        self.last_checkpoint = now;

        if stored == 0 {
            info!("daily reset: anchoring first day at {}", now);
            self.set_anchor(now, now, service);
            return None;
        }
        self.anchor = Some(stored);
        Some(stored)
    }

    fn set_anchor<N: NvmPort>(&mut self, anchor: u32, now: u32, service: &mut FlowMeterService<'_, N>) {
        self.anchor = Some(anchor);
        self.persist(anchor, now, service);
    }

    fn persist<N: NvmPort>(&mut self, anchor: u32, now: u32, service: &mut FlowMeterService<'_, N>) {
        self.last_checkpoint = now;
        let epoch = self.stored_epoch(anchor, now);
        if let Err(e) = service.store_mut().set_daily_reset_epoch(epoch) {
            warn!("daily reset: persisting epoch failed: {}", e);
        }
    }

    /// Persisted form of `anchor` as seen at `now`.
    fn stored_epoch(&self, anchor: u32, now: u32) -> u32 {
        if self.synced {
            anchor
        } else {
            self.boot_secs.saturating_sub(now.saturating_sub(anchor))
        }
    }
}
