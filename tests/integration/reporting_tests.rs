//! Reporter and display feed driven by a running service.

use crate::mock_hw::{pulse, test_config, MockClock, MockDisplay, MockTelemetry, RecordingSink, T0};

use flowmeter::adapters::nvs::NvsAdapter;
use flowmeter::app::events::AppEvent;
use flowmeter::app::service::FlowMeterService;
use flowmeter::config::FlowConfig;
use flowmeter::display::DisplayUpdater;
use flowmeter::monitor::BootSequence;
use flowmeter::sensors::PulseCounter;
use flowmeter::telemetry::{Reporter, ResetReason, DIAGNOSTIC_TOPIC, FLOW_TOPIC};

const HOUR_MS: u32 = 3_600_000;

fn running_service<'c>(
    counter: &'c PulseCounter,
    sink: &mut RecordingSink,
) -> FlowMeterService<'c, NvsAdapter> {
    let mut svc = FlowMeterService::new(test_config(), counter, NvsAdapter::new().unwrap(), 0);
    svc.begin(sink);
    svc.start_monitoring(0);
    svc
}

/// Run one 2.5 gal event that closes by t = 25 s.
fn flow_two_and_a_half(
    svc: &mut FlowMeterService<'_, NvsAdapter>,
    counter: &PulseCounter,
    sink: &mut RecordingSink,
) {
    pulse(counter, 2_500);
    for t in (5_000..=25_000).step_by(5_000) {
        svc.poll(t, sink);
    }
}

#[test]
fn hourly_report_carries_session_and_average() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = running_service(&counter, &mut sink);
    let clock = MockClock::new();
    let mut telemetry = MockTelemetry::new();
    let mut reporter = Reporter::new(&test_config(), 0, ResetReason::PinReset);

    flow_two_and_a_half(&mut svc, &counter, &mut sink);

    clock.set_ms(HOUR_MS - 1);
    reporter.poll(HOUR_MS - 1, &mut svc, &clock, &mut telemetry, &mut sink);
    assert!(telemetry.payloads_for(FLOW_TOPIC).is_empty());

    clock.set_ms(HOUR_MS);
    reporter.poll(HOUR_MS, &mut svc, &clock, &mut telemetry, &mut sink);
    let flow = telemetry.payloads_for(FLOW_TOPIC);
    assert_eq!(flow.len(), 1);
    assert_eq!(flow[0]["device_id"], "pool_1");
    assert_eq!(flow[0]["gallons_used"], 2);
    assert_eq!(flow[0]["timestamp"], T0 + 3_600);
    // Daily 2.5 gal over zero elapsed hours.
    assert_eq!(flow[0]["hourly_average"], 0.0);

    assert_eq!(svc.hours_elapsed(), 1);
    assert_eq!(svc.take_session_gallons(), 0.0, "publishing clears the session");
    assert!(sink.events.contains(&AppEvent::Published {
        topic: FLOW_TOPIC,
        accepted: true,
    }));
}

#[test]
fn second_report_averages_over_hours() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = running_service(&counter, &mut sink);
    let clock = MockClock::new();
    let mut telemetry = MockTelemetry::new();
    let mut reporter = Reporter::new(&test_config(), 0, ResetReason::PinReset);

    flow_two_and_a_half(&mut svc, &counter, &mut sink);
    reporter.publish_flow(&mut svc, &clock, &mut telemetry, &mut sink);
    reporter.publish_flow(&mut svc, &clock, &mut telemetry, &mut sink);

    let flow = telemetry.payloads_for(FLOW_TOPIC);
    assert_eq!(flow[1]["gallons_used"], 0);
    assert_eq!(flow[1]["hourly_average"], 2.5);
    assert_eq!(svc.hours_elapsed(), 2);
}

#[test]
fn rejected_publish_still_clears_session() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = running_service(&counter, &mut sink);
    let clock = MockClock::new();
    let mut telemetry = MockTelemetry::new();
    telemetry.connected = false;
    let mut reporter = Reporter::new(&test_config(), 0, ResetReason::Unknown);

    flow_two_and_a_half(&mut svc, &counter, &mut sink);
    reporter.publish_flow(&mut svc, &clock, &mut telemetry, &mut sink);

    assert!(telemetry.sent.is_empty());
    assert_eq!(svc.take_session_gallons(), 0.0);
    assert!(sink.events.contains(&AppEvent::Published {
        topic: FLOW_TOPIC,
        accepted: false,
    }));
}

#[test]
fn diagnostics_report_device_health() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = running_service(&counter, &mut sink);
    let clock = MockClock::new();
    let mut telemetry = MockTelemetry::new();
    let config = test_config();
    let mut reporter = Reporter::new(&config, 0, ResetReason::Watchdog);

    flow_two_and_a_half(&mut svc, &counter, &mut sink);
    clock.set_ms(config.diagnostic_interval_ms);
    reporter.poll(config.diagnostic_interval_ms, &mut svc, &clock, &mut telemetry, &mut sink);

    assert!(telemetry.payloads_for(FLOW_TOPIC).is_empty());
    let diag = telemetry.payloads_for(DIAGNOSTIC_TOPIC);
    assert_eq!(diag.len(), 1);
    assert_eq!(diag[0]["reset_reason"], "Watchdog Timer");
    assert_eq!(diag[0]["total_pulses"], 2_500);
    assert_eq!(diag[0]["lifetime_gallons"], 2.5);
    assert_eq!(diag[0]["daily_total"], 2.5);
    assert_eq!(diag[0]["flow_events_today"], 1);
    assert_eq!(diag[0]["signal_strength"], 72);
    assert_eq!(diag[0]["firmware"], env!("CARGO_PKG_VERSION"));
}

#[test]
fn display_shows_rate_while_flowing() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = running_service(&counter, &mut sink);
    let clock = MockClock::new();
    let mut display = MockDisplay::default();
    let mut updater = DisplayUpdater::new(5_000, 0);

    // 500 pulses in 5 s at 1000 ppg: 0.5 gal in 1/12 min.
    pulse(&counter, 500);
    svc.poll(5_000, &mut sink);
    clock.set_ms(5_000);
    let frame = updater
        .poll(5_000, &svc, &clock, Some(55.0), &mut display)
        .unwrap();
    assert_eq!(frame.gpm, 6.0);
    assert_eq!(frame.signal, 55);
    assert_eq!(frame.time.as_str(), "17:40:05");
    assert_eq!(display.lines.len(), 1);

    let line: serde_json::Value = serde_json::from_str(&display.lines[0]).unwrap();
    assert_eq!(line["gpm"], 6.0);
    assert_eq!(line["signal"], 55);
}

#[test]
fn display_idle_frame_reports_zero_rate() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let svc = running_service(&counter, &mut sink);
    let clock = MockClock::new();
    let mut display = MockDisplay::default();
    let mut updater = DisplayUpdater::new(5_000, 0);

    assert!(updater.poll(4_999, &svc, &clock, None, &mut display).is_none());
    let frame = updater.poll(5_000, &svc, &clock, None, &mut display).unwrap();
    assert_eq!(frame.gpm, 0.0);
    assert_eq!(frame.signal, -1);
    assert_eq!(frame.gallons, 0.0);
}

#[test]
fn boot_gate_holds_monitoring_until_settled() {
    let config = FlowConfig::default();
    let mut boot = BootSequence::new(&config, 0);
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = FlowMeterService::new(test_config(), &counter, NvsAdapter::new().unwrap(), 0);
    svc.begin(&mut sink);

    // Pulses before the gate opens are never counted as flow.
    pulse(&counter, 400);
    assert!(!boot.poll(10_000, true));
    assert!(!svc.is_monitoring());

    assert!(boot.poll(config.boot_delay_ms, true));
    svc.start_monitoring(config.boot_delay_ms);
    assert!(!boot.poll(config.boot_delay_ms + 1, true), "completes once");

    svc.poll(config.boot_delay_ms + 5_000, &mut sink);
    assert!(!svc.is_flow_active());
    assert_eq!(sink.count_started(), 0);
}
