//! Integration tests for the PulseCounter → FlowDetector → Accumulator →
//! PersistentStore pipeline, driven through `FlowMeterService`.

use crate::mock_hw::{pulse, test_config, MockClock, RecordingSink, T0};

use flowmeter::adapters::nvs::NvsAdapter;
use flowmeter::app::commands::AppCommand;
use flowmeter::app::daily_reset::DailyResetSchedule;
use flowmeter::app::events::AppEvent;
use flowmeter::app::service::FlowMeterService;
use flowmeter::config::{FlowConfig, OpenFlowPolicy};
use flowmeter::detector::FlowState;
use flowmeter::fsm::context::FlowAction;
use flowmeter::sensors::PulseCounter;
use flowmeter::storage::StoreInit;

const DAY: u32 = 86_400;

fn close_to(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-4
}

fn make_service<'c>(
    config: FlowConfig,
    counter: &'c PulseCounter,
    sink: &mut RecordingSink,
) -> FlowMeterService<'c, NvsAdapter> {
    let mut svc = FlowMeterService::new(config, counter, NvsAdapter::new().unwrap(), 0);
    svc.begin(sink);
    svc.start_monitoring(0);
    svc
}

/// Fire `pulses` in one burst, then sample every 5 s until the event times
/// out.
fn run_flow(
    svc: &mut FlowMeterService<'_, NvsAdapter>,
    counter: &PulseCounter,
    pulses: u32,
    sink: &mut RecordingSink,
) {
    pulse(counter, pulses);
    for t in (5_000..=25_000).step_by(5_000) {
        svc.poll(t, sink);
    }
}

// ── Event accounting ──────────────────────────────────────────

#[test]
fn sixty_pulses_are_credited() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(test_config(), &counter, &mut sink);

    run_flow(&mut svc, &counter, 60, &mut sink);

    assert_eq!(sink.count_started(), 1);
    let ends = sink.flow_ends();
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].0, 60);
    assert!(close_to(ends[0].1, 0.06));
    assert!(ends[0].2, "0.06 gal exceeds the minimum and must be credited");

    assert!(close_to(svc.daily_gallons(), 0.06));
    assert!(close_to(svc.lifetime_gallons(), 0.06));
    assert_eq!(svc.flow_events_today(), 1);
    assert!(close_to(svc.store().lifetime_gallons().unwrap(), 0.06));
    assert_eq!(svc.store().flow_events_today().unwrap(), 1);
    assert!(!svc.is_flow_active());
}

#[test]
fn calibrated_gallon_is_exact() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(FlowConfig::default(), &counter, &mut sink);

    run_flow(&mut svc, &counter, 1_700, &mut sink);

    assert!(close_to(svc.lifetime_gallons(), 1.0));
    assert!(close_to(svc.take_session_gallons(), 1.0));
    assert_eq!(svc.take_session_gallons(), 0.0, "session clears on read");
}

#[test]
fn trickle_never_opens_an_event() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(test_config(), &counter, &mut sink);

    for i in 1..=10u32 {
        pulse(&counter, 5);
        assert_eq!(svc.poll(i * 5_000, &mut sink), None);
    }
    assert_eq!(sink.count_started(), 0);
    assert_eq!(svc.flow_events_today(), 0);
    assert_eq!(svc.customer_count(), 50);
}

#[test]
fn continuous_flow_is_one_event() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(test_config(), &counter, &mut sink);

    // Flow for a minute with a 15 s pause in the middle.
    let mut t = 0;
    for burst in [100, 100, 100, 0, 0, 0, 100, 100] {
        pulse(&counter, burst);
        t += 5_000;
        svc.poll(t, &mut sink);
    }
    assert!(svc.is_flow_active());
    for _ in 0..4 {
        t += 5_000;
        svc.poll(t, &mut sink);
    }

    assert_eq!(sink.count_started(), 1);
    let ends = sink.flow_ends();
    assert_eq!(ends.len(), 1);
    assert_eq!(ends[0].0, 500);
    assert!(close_to(svc.lifetime_gallons(), 0.5));
}

#[test]
fn start_pulse_includes_opening_sample() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(test_config(), &counter, &mut sink);

    pulse(&counter, 3);
    svc.poll(5_000, &mut sink);
    pulse(&counter, 30);
    let action = svc.poll(10_000, &mut sink);

    assert_eq!(action, Some(FlowAction::Started { start_pulse: 3 }));
    assert_eq!(
        svc.flow_state(),
        FlowState::Active {
            flow_start_pulse: 3,
            inactivity_since_ms: 10_000,
        }
    );
}

// ── Daily reset ───────────────────────────────────────────────

#[test]
fn daily_reset_while_idle_keeps_lifetime() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(test_config(), &counter, &mut sink);
    run_flow(&mut svc, &counter, 60, &mut sink);

    svc.handle_command(AppCommand::PerformDailyReset { epoch: T0 + DAY }, &mut sink);

    assert_eq!(svc.daily_gallons(), 0.0);
    assert_eq!(svc.flow_events_today(), 0);
    assert_eq!(svc.hours_elapsed(), 0);
    assert!(close_to(svc.lifetime_gallons(), 0.06));
    assert_eq!(svc.customer_count(), 0);
    assert_eq!(svc.technical_count(), 60);
    assert_eq!(svc.store().daily_reset_epoch().unwrap(), T0 + DAY);
    assert!(matches!(
        sink.events.last(),
        Some(AppEvent::DailyReset { closed_gallons: None, .. })
    ));
}

#[test]
fn daily_reset_force_closes_open_event() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(test_config(), &counter, &mut sink);

    pulse(&counter, 60);
    svc.poll(5_000, &mut sink);
    assert!(svc.is_flow_active());

    svc.perform_daily_reset(T0 + DAY, &mut sink);

    assert!(!svc.is_flow_active());
    assert!(close_to(svc.lifetime_gallons(), 0.06));
    assert_eq!(svc.daily_gallons(), 0.0);
    assert_eq!(svc.flow_events_today(), 0);
    match sink.events.last() {
        Some(AppEvent::DailyReset { closed_gallons: Some(g), .. }) => assert!(close_to(*g, 0.06)),
        other => panic!("unexpected last event {:?}", other),
    }

    // The zeroed counter is the new baseline; nothing closes twice.
    for t in (10_000..=30_000).step_by(5_000) {
        svc.poll(t, &mut sink);
    }
    assert_eq!(sink.flow_ends().len(), 1);
}

#[test]
fn daily_reset_can_discard_open_event() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let config = FlowConfig {
        open_flow_on_reset: OpenFlowPolicy::Discard,
        ..test_config()
    };
    let mut svc = make_service(config, &counter, &mut sink);

    pulse(&counter, 60);
    svc.poll(5_000, &mut sink);
    svc.perform_daily_reset(T0 + DAY, &mut sink);

    assert!(!svc.is_flow_active());
    assert_eq!(svc.lifetime_gallons(), 0.0);
    assert!(sink.flow_ends().is_empty());
    assert!(matches!(
        sink.events.last(),
        Some(AppEvent::DailyReset { closed_gallons: None, .. })
    ));
}

#[test]
fn flow_after_reset_measures_from_zero() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(test_config(), &counter, &mut sink);

    pulse(&counter, 500);
    svc.poll(5_000, &mut sink);
    svc.perform_daily_reset(T0 + DAY, &mut sink);

    pulse(&counter, 80);
    let action = svc.poll(10_000, &mut sink);
    assert_eq!(action, Some(FlowAction::Started { start_pulse: 0 }));
    for t in (15_000..=30_000).step_by(5_000) {
        svc.poll(t, &mut sink);
    }
    let ends = sink.flow_ends();
    assert_eq!(ends.last().map(|e| e.0), Some(80));
    assert!(close_to(svc.daily_gallons(), 0.08));
    assert!(close_to(svc.lifetime_gallons(), 0.58));
}

#[test]
fn schedule_anchors_then_resets_after_interval() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(test_config(), &counter, &mut sink);
    let clock = MockClock::new();
    let mut schedule = DailyResetSchedule::new(DAY);

    assert!(!schedule.poll(&clock, &mut svc, &mut sink), "first poll only anchors");
    assert_eq!(svc.store().daily_reset_epoch().unwrap(), T0);

    run_flow(&mut svc, &counter, 60, &mut sink);
    clock.set_ms((DAY - 1) * 1_000);
    assert!(!schedule.poll(&clock, &mut svc, &mut sink));
    assert!(close_to(svc.daily_gallons(), 0.06));

    clock.set_ms(DAY * 1_000);
    assert!(schedule.poll(&clock, &mut svc, &mut sink));
    assert_eq!(svc.daily_gallons(), 0.0);
    assert_eq!(svc.store().daily_reset_epoch().unwrap(), T0 + DAY);
}

#[test]
fn schedule_reanchors_when_clock_goes_backwards() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(test_config(), &counter, &mut sink);
    let clock = MockClock::new();
    let mut schedule = DailyResetSchedule::new(DAY);

    schedule.poll(&clock, &mut svc, &mut sink);
    clock.set_timestamp_secs(T0 - 3_600);
    assert!(!schedule.poll(&clock, &mut svc, &mut sink));
    assert_eq!(svc.store().daily_reset_epoch().unwrap(), T0 - 3_600);
}

#[test]
fn reboot_mid_day_keeps_the_day_running_without_rtc() {
    const HOUR: u32 = 3_600;
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(test_config(), &counter, &mut sink);
    let clock = MockClock::unsynced();
    let mut schedule = DailyResetSchedule::new(DAY);

    clock.set_ms(60_000);
    schedule.poll(&clock, &mut svc, &mut sink);
    run_flow(&mut svc, &counter, 60, &mut sink);
    svc.increment_hours_elapsed();
    clock.set_ms(60_000 + 23 * HOUR * 1_000);
    assert!(!schedule.poll(&clock, &mut svc, &mut sink));
    let image = svc.store().backend().durable_image();
    drop(svc);

    // The fallback timestamp restarts from T0 after the reboot.
    let counter2 = PulseCounter::new();
    let mut sink2 = RecordingSink::new();
    let mut rebooted =
        FlowMeterService::new(test_config(), &counter2, NvsAdapter::with_record_image(image), 0);
    rebooted.begin(&mut sink2);
    let clock2 = MockClock::unsynced();
    let mut schedule2 = DailyResetSchedule::new(DAY);

    clock2.set_ms(60_000);
    assert!(!schedule2.poll(&clock2, &mut rebooted, &mut sink2));
    assert!(close_to(rebooted.daily_gallons(), 0.06));
    assert_eq!(rebooted.hours_elapsed(), 1);

    // 23 h before the reboot plus 2 h after it: the day is over.
    clock2.set_ms(2 * HOUR * 1_000);
    assert!(schedule2.poll(&clock2, &mut rebooted, &mut sink2));
    assert_eq!(rebooted.daily_gallons(), 0.0);
    assert_eq!(rebooted.flow_events_today(), 0);
    assert_eq!(rebooted.hours_elapsed(), 0);
    assert!(close_to(rebooted.lifetime_gallons(), 0.06));
}

// ── Restart ───────────────────────────────────────────────────

#[test]
fn totals_survive_restart() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(test_config(), &counter, &mut sink);
    run_flow(&mut svc, &counter, 60, &mut sink);
    svc.increment_hours_elapsed();
    let image = svc.store().backend().durable_image();
    drop(svc);

    let counter2 = PulseCounter::new();
    let mut sink2 = RecordingSink::new();
    let mut rebooted =
        FlowMeterService::new(test_config(), &counter2, NvsAdapter::with_record_image(image), 0);
    assert_eq!(rebooted.begin(&mut sink2), StoreInit::Loaded);
    assert!(close_to(rebooted.lifetime_gallons(), 0.06));
    assert!(close_to(rebooted.daily_gallons(), 0.06));
    assert_eq!(rebooted.flow_events_today(), 1);
    assert_eq!(rebooted.hours_elapsed(), 1);
    assert_eq!(rebooted.take_session_gallons(), 0.0, "session is not persisted");
}

#[test]
fn failed_commit_keeps_counting_in_memory() {
    let counter = PulseCounter::new();
    let mut sink = RecordingSink::new();
    let mut svc = make_service(test_config(), &counter, &mut sink);
    let before = svc.store().backend().durable_image();

    svc.store_mut().backend_mut().set_fail_commits(true);
    run_flow(&mut svc, &counter, 60, &mut sink);

    assert!(close_to(svc.lifetime_gallons(), 0.06));
    assert_eq!(svc.store().backend().durable_image(), before);
}
