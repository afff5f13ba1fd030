//! ESP32 time adapter.
//!
//! Implements [`ClockPort`] for the flow meter.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer (microsecond precision, monotonic) and
//!   `gettimeofday()` for wall-clock time once SNTP has set it.
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` for
//!   host-side testing and simulation; the wall clock is never synced.

use crate::app::ports::ClockPort;

/// Base of the fallback timestamp used before the wall clock is synced
/// (2024-03-24T17:40:00Z).
pub const FALLBACK_EPOCH_BASE: u32 = 1_711_302_000;

/// Anything earlier than 2020-01-01 is an unsynced RTC.
#[cfg(target_os = "espidf")]
const EPOCH_2020: i64 = 1_577_836_800;

/// Time adapter for the ESP32 platform.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Microseconds since boot (monotonic).
    #[cfg(target_os = "espidf")]
    pub fn uptime_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    /// Microseconds since boot (monotonic).
    #[cfg(not(target_os = "espidf"))]
    pub fn uptime_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Seconds since the Unix epoch, if the RTC has been set.
    #[cfg(target_os = "espidf")]
    pub fn wall_clock_secs(&self) -> Option<u32> {
        let mut tv = esp_idf_svc::sys::timeval {
            tv_sec: 0,
            tv_usec: 0,
        };
        if unsafe { esp_idf_svc::sys::gettimeofday(&mut tv, core::ptr::null_mut()) } != 0 {
            return None;
        }
        let secs = tv.tv_sec as i64;
        if secs < EPOCH_2020 {
            return None;
        }
        Some(secs as u32)
    }

    /// Seconds since the Unix epoch.  On non-ESP targets always `None`.
    #[cfg(not(target_os = "espidf"))]
    pub fn wall_clock_secs(&self) -> Option<u32> {
        None
    }
}

impl ClockPort for Esp32TimeAdapter {
    fn now_ms(&self) -> u32 {
        (self.uptime_us() / 1_000) as u32
    }

    fn is_time_synced(&self) -> bool {
        self.wall_clock_secs().is_some()
    }

    fn timestamp_secs(&self) -> u32 {
        self.wall_clock_secs().unwrap_or_else(|| {
            FALLBACK_EPOCH_BASE.wrapping_add((self.uptime_us() / 1_000_000) as u32)
        })
    }
}
