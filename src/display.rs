//! Local display feed.
//!
//! Every display interval a one-line JSON frame goes out over the
//! [`DisplayPort`]: current flow rate, lifetime gallons, link quality and
//! wall-clock time.

use core::fmt::Write as _;

use log::{debug, warn};
use serde::Serialize;

use crate::app::ports::{ClockPort, DisplayPort, NvmPort};
use crate::app::service::FlowMeterService;
use crate::telemetry::round1;
use crate::timing::{elapsed_ms, Interval};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayFrame {
    /// Gallons per minute since the previous frame; 0 while idle.
    pub gpm: f32,
    /// Lifetime gallons.
    pub gallons: f32,
    /// Link quality in percent, -1 if unknown.
    pub signal: i32,
    /// `HH:MM:SS` (UTC).
    pub time: heapless::String<8>,
}

/// Format the time of day of `timestamp_secs` as `HH:MM:SS`.
pub fn clock_time(timestamp_secs: u32) -> heapless::String<8> {
    let secs = timestamp_secs % 86_400;
    let mut s = heapless::String::new();
    let _ = write!(s, "{:02}:{:02}:{:02}", secs / 3_600, (secs / 60) % 60, secs % 60);
    s
}

pub struct DisplayUpdater {
    interval: Interval,
    last_count: u32,
    last_calc_ms: u32,
}

impl DisplayUpdater {
    pub fn new(interval_ms: u32, now_ms: u32) -> Self {
        Self {
            interval: Interval::new(interval_ms, now_ms),
            last_count: 0,
            last_calc_ms: now_ms,
        }
    }

    /// Send a frame if the display interval has elapsed.
    pub fn poll<N: NvmPort>(
        &mut self,
        now_ms: u32,
        service: &FlowMeterService<'_, N>,
        clock: &impl ClockPort,
        signal: Option<f32>,
        display: &mut impl DisplayPort,
    ) -> Option<DisplayFrame> {
        if !self.interval.poll(now_ms) {
            return None;
        }
        let frame = self.frame(now_ms, service, clock, signal);
        match serde_json::to_string(&frame) {
            Ok(line) => {
                debug!("display: {}", line);
                display.send_line(&line);
            }
            Err(e) => warn!("display: serialisation failed: {}", e),
        }
        Some(frame)
    }

    fn frame<N: NvmPort>(
        &mut self,
        now_ms: u32,
        service: &FlowMeterService<'_, N>,
        clock: &impl ClockPort,
        signal: Option<f32>,
    ) -> DisplayFrame {
        let count = service.customer_count();
        let elapsed = elapsed_ms(now_ms, self.last_calc_ms);
        // The customer counter restarts at zero after a daily reset.
        let pulses = count.checked_sub(self.last_count).unwrap_or(0);
        self.last_count = count;
        self.last_calc_ms = now_ms;

        let gpm = if service.is_flow_active() && elapsed > 0 {
            let gallons = pulses as f32 / service.config().pulses_per_gallon;
            gallons / (elapsed as f32 / 60_000.0)
        } else {
            0.0
        };

        DisplayFrame {
            gpm: round1(gpm),
            gallons: round1(service.lifetime_gallons()),
            signal: signal.map_or(-1, |s| s.round() as i32),
            time: clock_time(clock.timestamp_secs()),
        }
    }
}
