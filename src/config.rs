//! System configuration parameters
//!
//! All tunable parameters for the flow meter.
//! Values can be overridden via NVS (non-volatile storage).

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// What a daily reset does with a flow event that is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenFlowPolicy {
    /// Close the event with the pulses counted so far and credit its volume
    /// (subject to the minimum-gallons rule) before the daily totals zero.
    ForceClose,
    /// Drop the open event without crediting any volume.
    Discard,
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    // --- Calibration ---
    /// Sensor pulses per US gallon
    pub pulses_per_gallon: f32,

    // --- Flow detection ---
    /// Sampling interval of the pulse counter (milliseconds)
    pub flow_check_interval_ms: u32,
    /// Pulses per sampling interval that must be exceeded to count as flow
    pub min_pulse_threshold: u32,
    /// Sub-threshold time after which an active flow event closes (milliseconds)
    pub flow_timeout_ms: u32,
    /// Event volume that must be exceeded to be credited to the totals (gallons)
    pub min_gallons_threshold: f32,

    // --- Reporting ---
    /// Flow report publish interval (milliseconds)
    pub publish_interval_ms: u32,
    /// Diagnostic report publish interval (milliseconds)
    pub diagnostic_interval_ms: u32,
    /// Display refresh interval (milliseconds)
    pub display_interval_ms: u32,

    // --- Daily accounting ---
    /// Length of an accounting day (seconds)
    pub daily_reset_interval_secs: u32,
    /// Handling of an event still open when the day rolls over
    pub open_flow_on_reset: OpenFlowPolicy,

    // --- Boot / supervision ---
    /// Delay after connecting before flow monitoring starts (milliseconds)
    pub boot_delay_ms: u32,
    /// Maximum wait for connectivity before monitoring starts anyway (milliseconds)
    pub connection_wait_ms: u32,
    /// Main-loop watchdog timeout (milliseconds)
    pub watchdog_timeout_ms: u32,

    /// Identifier reported in telemetry payloads
    pub device_id: heapless::String<32>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        let mut device_id = heapless::String::new();
        let _ = device_id.push_str("pool_1");

        Self {
            // Calibration
            pulses_per_gallon: 1700.0,

            // Flow detection
            flow_check_interval_ms: 5_000,
            min_pulse_threshold: 5,
            flow_timeout_ms: 20_000,
            min_gallons_threshold: 0.05,

            // Reporting
            publish_interval_ms: 3_600_000,   // hourly
            diagnostic_interval_ms: 900_000,  // 15 min
            display_interval_ms: 5_000,

            // Daily accounting
            daily_reset_interval_secs: 86_400,
            open_flow_on_reset: OpenFlowPolicy::ForceClose,

            // Boot / supervision
            boot_delay_ms: 30_000,
            connection_wait_ms: 60_000,
            watchdog_timeout_ms: 60_000,

            device_id,
        }
    }
}

impl FlowConfig {
    /// Range-check every field.  Invalid values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1.0..=100_000.0).contains(&self.pulses_per_gallon) {
            return Err(ConfigError::ValidationFailed(
                "pulses_per_gallon must be 1–100000",
            ));
        }
        if !(100..=60_000).contains(&self.flow_check_interval_ms) {
            return Err(ConfigError::ValidationFailed(
                "flow_check_interval_ms must be 100–60000",
            ));
        }
        if self.flow_timeout_ms < self.flow_check_interval_ms {
            return Err(ConfigError::ValidationFailed(
                "flow_timeout_ms must be >= flow_check_interval_ms",
            ));
        }
        if !(0.0..=10.0).contains(&self.min_gallons_threshold) {
            return Err(ConfigError::ValidationFailed(
                "min_gallons_threshold must be 0.0–10.0",
            ));
        }
        if self.publish_interval_ms < 60_000 {
            return Err(ConfigError::ValidationFailed(
                "publish_interval_ms must be >= 60000",
            ));
        }
        if self.diagnostic_interval_ms < 60_000 {
            return Err(ConfigError::ValidationFailed(
                "diagnostic_interval_ms must be >= 60000",
            ));
        }
        if self.display_interval_ms < 1_000 {
            return Err(ConfigError::ValidationFailed(
                "display_interval_ms must be >= 1000",
            ));
        }
        if !(3_600..=604_800).contains(&self.daily_reset_interval_secs) {
            return Err(ConfigError::ValidationFailed(
                "daily_reset_interval_secs must be 3600–604800",
            ));
        }
        if self.connection_wait_ms < self.boot_delay_ms {
            return Err(ConfigError::ValidationFailed(
                "connection_wait_ms must be >= boot_delay_ms",
            ));
        }
        if !(5_000..=300_000).contains(&self.watchdog_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "watchdog_timeout_ms must be 5000–300000",
            ));
        }
        if self.device_id.is_empty() {
            return Err(ConfigError::ValidationFailed("device_id must not be empty"));
        }
        Ok(())
    }
}
