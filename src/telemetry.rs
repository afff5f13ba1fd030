//! Periodic cloud reports.
//!
//! Two JSON payloads are published through the [`TelemetryPort`]:
//!
//! - `flow_data` on the publish interval: the session volume (whole
//!   gallons) and today's hourly average.  Publishing closes the session
//!   and counts one more hour for the average.
//! - `diagnostic_data` on the diagnostic interval: lifetime and daily
//!   totals, raw pulse count, reset history and link quality.

use log::{info, warn};
use serde::Serialize;

use crate::app::events::AppEvent;
use crate::app::ports::{ClockPort, EventSink, NvmPort, TelemetryPort};
use crate::app::service::FlowMeterService;
use crate::config::FlowConfig;
use crate::timing::Interval;

pub const FLOW_TOPIC: &str = "flow_data";
pub const DIAGNOSTIC_TOPIC: &str = "diagnostic_data";

/// Why the device last restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    PinReset,
    PowerManagement,
    Watchdog,
    FirmwareUpdate,
    FirmwareUpdateTimeout,
    FactoryReset,
    SafeMode,
    DfuMode,
    Panic,
    UserRequested,
    Unknown,
}

impl ResetReason {
    /// Name used in diagnostic reports.
    pub fn name(self) -> &'static str {
        match self {
            Self::PinReset => "Pin Reset",
            Self::PowerManagement => "Power Management",
            Self::Watchdog => "Watchdog Timer",
            Self::FirmwareUpdate => "Firmware Update",
            Self::FirmwareUpdateTimeout => "Firmware Update Timeout",
            Self::FactoryReset => "Factory Reset",
            Self::SafeMode => "Safe Mode",
            Self::DfuMode => "DFU Mode",
            Self::Panic => "System Panic",
            Self::UserRequested => "User Requested",
            Self::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowReport<'a> {
    pub device_id: &'a str,
    pub timestamp: u32,
    /// Session volume truncated to whole gallons.
    pub gallons_used: u32,
    pub hourly_average: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticReport<'a> {
    pub device_id: &'a str,
    pub timestamp: u32,
    pub firmware: &'a str,
    pub reset_count: i32,
    pub reset_reason: &'a str,
    pub lifetime_gallons: f32,
    pub daily_total: f32,
    pub hours_elapsed: i32,
    pub total_pulses: u32,
    pub flow_events_today: i32,
    pub signal_strength: Option<i32>,
}

/// Round to one decimal place.
pub fn round1(x: f32) -> f32 {
    (x * 10.0).round() / 10.0
}

/// Round to two decimal places.
fn round2(x: f32) -> f32 {
    (x * 100.0).round() / 100.0
}

/// Today's average volume per publish cycle.
pub fn hourly_average(daily_gallons: f32, hours_elapsed: i32) -> f32 {
    if hours_elapsed > 0 {
        daily_gallons / hours_elapsed as f32
    } else {
        0.0
    }
}

pub struct Reporter {
    publish: Interval,
    diagnostic: Interval,
    reset_reason: ResetReason,
    firmware: &'static str,
}

impl Reporter {
    /// The first report of each kind is due one full interval after `now_ms`.
    pub fn new(config: &FlowConfig, now_ms: u32, reset_reason: ResetReason) -> Self {
        info!("reporter: last reset reason {}", reset_reason.name());
        Self {
            publish: Interval::new(config.publish_interval_ms, now_ms),
            diagnostic: Interval::new(config.diagnostic_interval_ms, now_ms),
            reset_reason,
            firmware: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn reset_reason(&self) -> ResetReason {
        self.reset_reason
    }

    /// Publish whichever reports are due.
    pub fn poll<N: NvmPort>(
        &mut self,
        now_ms: u32,
        service: &mut FlowMeterService<'_, N>,
        clock: &impl ClockPort,
        telemetry: &mut impl TelemetryPort,
        sink: &mut impl EventSink,
    ) {
        if self.publish.poll(now_ms) {
            self.publish_flow(service, clock, telemetry, sink);
        }
        if self.diagnostic.poll(now_ms) {
            self.publish_diagnostics(service, clock, telemetry, sink);
        }
    }

    /// Close the session and publish `flow_data`.
    pub fn publish_flow<N: NvmPort>(
        &mut self,
        service: &mut FlowMeterService<'_, N>,
        clock: &impl ClockPort,
        telemetry: &mut impl TelemetryPort,
        sink: &mut impl EventSink,
    ) {
        let session = service.take_session_gallons();
        let report = FlowReport {
            device_id: service.config().device_id.as_str(),
            timestamp: clock.timestamp_secs(),
            gallons_used: session as u32,
            hourly_average: round1(hourly_average(
                service.daily_gallons(),
                service.hours_elapsed(),
            )),
        };
        info!(
            "flow report: {} gal this interval, {:.1} gal/h average, daily {:.2} gal over {} h",
            report.gallons_used,
            report.hourly_average,
            service.daily_gallons(),
            service.hours_elapsed()
        );
        send(FLOW_TOPIC, &report, telemetry, sink);
        service.increment_hours_elapsed();
    }

    /// Publish `diagnostic_data`.
    pub fn publish_diagnostics<N: NvmPort>(
        &mut self,
        service: &FlowMeterService<'_, N>,
        clock: &impl ClockPort,
        telemetry: &mut impl TelemetryPort,
        sink: &mut impl EventSink,
    ) {
        let reset_count = service.store().watchdog_reset_count().unwrap_or_else(|e| {
            warn!("diagnostics: watchdog count unreadable: {}", e);
            0
        });
        let report = DiagnosticReport {
            device_id: service.config().device_id.as_str(),
            timestamp: clock.timestamp_secs(),
            firmware: self.firmware,
            reset_count,
            reset_reason: self.reset_reason.name(),
            lifetime_gallons: round2(service.lifetime_gallons()),
            daily_total: round2(service.daily_gallons()),
            hours_elapsed: service.hours_elapsed(),
            total_pulses: service.technical_count(),
            flow_events_today: service.flow_events_today(),
            signal_strength: telemetry.signal_strength().map(|s| s.round() as i32),
        };
        send(DIAGNOSTIC_TOPIC, &report, telemetry, sink);
    }
}

fn send(
    topic: &'static str,
    report: &impl Serialize,
    telemetry: &mut impl TelemetryPort,
    sink: &mut impl EventSink,
) {
    let payload = match serde_json::to_string(report) {
        Ok(p) => p,
        Err(e) => {
            warn!("{}: serialisation failed: {}", topic, e);
            return;
        }
    };
    info!("publishing {}: {}", topic, payload);
    let accepted = telemetry.is_connected() && telemetry.publish(topic, &payload);
    sink.emit(&AppEvent::Published { topic, accepted });
}
