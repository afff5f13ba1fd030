//! Boot supervision: reset-cause bookkeeping and the boot sequence gate.

use log::{info, warn};

use crate::app::ports::NvmPort;
use crate::config::FlowConfig;
use crate::storage::PersistentStore;
use crate::telemetry::ResetReason;
use crate::timing::elapsed_ms;

/// Reads the persisted watchdog reset count and bumps it when the last
/// restart was a watchdog reset.
#[derive(Debug, Clone, Copy)]
pub struct SystemMonitor {
    reset_reason: ResetReason,
    watchdog_reset_count: i32,
}

impl SystemMonitor {
    pub fn begin<N: NvmPort>(reset_reason: ResetReason, store: &mut PersistentStore<N>) -> Self {
        let mut count = store.watchdog_reset_count().unwrap_or_else(|e| {
            warn!("monitor: watchdog count unreadable: {}", e);
            0
        });
        if reset_reason == ResetReason::Watchdog {
            count = count.saturating_add(1);
            if let Err(e) = store.set_watchdog_reset_count(count) {
                warn!("monitor: persisting watchdog count failed: {}", e);
            }
            warn!("watchdog reset detected, total {}", count);
        }
        info!("monitor: reset reason {}", reset_reason.name());
        Self {
            reset_reason,
            watchdog_reset_count: count,
        }
    }

    pub fn reset_reason(&self) -> ResetReason {
        self.reset_reason
    }

    pub fn watchdog_reset_count(&self) -> i32 {
        self.watchdog_reset_count
    }
}

/// Holds flow monitoring back until the device has settled.
///
/// Completes `boot_delay_ms` after start once connected, or after
/// `connection_wait_ms` regardless of connectivity.
#[derive(Debug, Clone, Copy)]
pub struct BootSequence {
    start_ms: u32,
    boot_delay_ms: u32,
    connection_wait_ms: u32,
    complete: bool,
}

impl BootSequence {
    pub fn new(config: &FlowConfig, now_ms: u32) -> Self {
        Self {
            start_ms: now_ms,
            boot_delay_ms: config.boot_delay_ms,
            connection_wait_ms: config.connection_wait_ms,
            complete: false,
        }
    }

    /// Returns `true` exactly once, on the call that completes the sequence.
    pub fn poll(&mut self, now_ms: u32, connected: bool) -> bool {
        if self.complete {
            return false;
        }
        let elapsed = elapsed_ms(now_ms, self.start_ms);
        if connected && elapsed >= self.boot_delay_ms {
            info!("boot sequence complete after {} ms", elapsed);
            self.complete = true;
        } else if elapsed >= self.connection_wait_ms {
            warn!("no connection after {} ms, continuing offline", elapsed);
            self.complete = true;
        }
        self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }
}

/// Cause of the most recent restart, as reported by ESP-IDF.
#[cfg(target_os = "espidf")]
pub fn last_reset_reason() -> ResetReason {
    use esp_idf_svc::sys::*;

    #[allow(non_upper_case_globals)]
    match unsafe { esp_reset_reason() } {
        esp_reset_reason_t_ESP_RST_EXT => ResetReason::PinReset,
        esp_reset_reason_t_ESP_RST_POWERON | esp_reset_reason_t_ESP_RST_BROWNOUT => {
            ResetReason::PowerManagement
        }
        esp_reset_reason_t_ESP_RST_INT_WDT
        | esp_reset_reason_t_ESP_RST_TASK_WDT
        | esp_reset_reason_t_ESP_RST_WDT => ResetReason::Watchdog,
        esp_reset_reason_t_ESP_RST_PANIC => ResetReason::Panic,
        esp_reset_reason_t_ESP_RST_SW => ResetReason::UserRequested,
        _ => ResetReason::Unknown,
    }
}

/// Host simulation: no reset history.
#[cfg(not(target_os = "espidf"))]
pub fn last_reset_reason() -> ResetReason {
    ResetReason::Unknown
}
