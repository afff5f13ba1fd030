//! Durability tests: what survives a reset, and what a reboot reads back.

use flowmeter::adapters::nvs::NvsAdapter;
use flowmeter::app::ports::{ConfigError, ConfigPort, NvmPort};
use flowmeter::config::{FlowConfig, OpenFlowPolicy};
use flowmeter::monitor::SystemMonitor;
use flowmeter::storage::{
    FieldValue, PersistedField, PersistedRecord, PersistentStore, StoreInit, RECORD_SIZE,
};
use flowmeter::telemetry::ResetReason;

fn fresh_store() -> PersistentStore<NvsAdapter> {
    let mut store = PersistentStore::new(NvsAdapter::new().unwrap());
    assert_eq!(store.begin().unwrap(), StoreInit::Reinitialized);
    store
}

fn reboot(store: PersistentStore<NvsAdapter>) -> PersistentStore<NvsAdapter> {
    let mut store = PersistentStore::new(store.into_backend().simulate_power_loss());
    store.begin().unwrap();
    store
}

#[test]
fn committed_group_survives_power_loss() {
    let mut store = fresh_store();
    store
        .save_group(&[
            (PersistedField::DailyGallons, FieldValue::Gallons(2.5)),
            (PersistedField::LifetimeGallons, FieldValue::Gallons(120.0)),
            (PersistedField::FlowEventsToday, FieldValue::Count(4)),
        ])
        .unwrap();

    let store = reboot(store);
    let rec = store.snapshot().unwrap().unwrap();
    assert_eq!(rec.daily_gallons, 2.5);
    assert_eq!(rec.lifetime_gallons, 120.0);
    assert_eq!(rec.flow_events_today, 4);
}

#[test]
fn uncommitted_write_is_lost_on_power_loss() {
    let mut store = fresh_store();
    store
        .save(PersistedField::LifetimeGallons, FieldValue::Gallons(10.0))
        .unwrap();
    store
        .backend_mut()
        .write(
            PersistedField::LifetimeGallons.offset(),
            &11.0f32.to_le_bytes(),
        )
        .unwrap();
    assert_eq!(store.lifetime_gallons().unwrap(), 11.0, "staged value is readable");

    let store = reboot(store);
    assert_eq!(store.lifetime_gallons().unwrap(), 10.0);
}

#[test]
fn failed_commit_leaves_previous_record() {
    let mut store = fresh_store();
    store
        .save(PersistedField::HoursElapsed, FieldValue::Count(3))
        .unwrap();
    store.backend_mut().set_fail_commits(true);
    assert!(store
        .save(PersistedField::HoursElapsed, FieldValue::Count(4))
        .is_err());

    let image = store.backend().durable_image();
    let rec = PersistedRecord::decode(&image).unwrap();
    assert_eq!(rec.hours_elapsed, 3);
}

#[test]
fn interrupted_first_boot_reinitialises_again() {
    // Data words zeroed and committed, guard never written.
    let mut image = [0u8; RECORD_SIZE];
    image[..8].fill(0xFF);
    let mut store = PersistentStore::new(NvsAdapter::with_record_image(image));
    assert_eq!(store.begin().unwrap(), StoreInit::Reinitialized);
    assert_eq!(store.snapshot().unwrap(), Some(PersistedRecord::default()));
}

#[test]
fn watchdog_resets_accumulate_across_boots() {
    let mut store = fresh_store();
    let m = SystemMonitor::begin(ResetReason::Watchdog, &mut store);
    assert_eq!(m.watchdog_reset_count(), 1);

    let mut store = reboot(store);
    let m = SystemMonitor::begin(ResetReason::PowerManagement, &mut store);
    assert_eq!(m.watchdog_reset_count(), 1);

    let mut store = reboot(store);
    let m = SystemMonitor::begin(ResetReason::Watchdog, &mut store);
    assert_eq!(m.watchdog_reset_count(), 2);
    assert_eq!(store.watchdog_reset_count().unwrap(), 2);
}

#[test]
fn factory_reset_survives_power_loss() {
    let mut store = fresh_store();
    store
        .save(PersistedField::LifetimeGallons, FieldValue::Gallons(999.0))
        .unwrap();
    store.factory_reset().unwrap();

    let store = reboot(store);
    assert_eq!(store.lifetime_gallons().unwrap(), 0.0);
}

// ── Config blob ───────────────────────────────────────────────

#[test]
fn config_roundtrips_through_nvs() {
    let nvs = NvsAdapter::new().unwrap();
    assert_eq!(nvs.load().unwrap(), FlowConfig::default());

    let cfg = FlowConfig {
        pulses_per_gallon: 450.0,
        open_flow_on_reset: OpenFlowPolicy::Discard,
        ..FlowConfig::default()
    };
    nvs.save(&cfg).unwrap();
    assert_eq!(nvs.load().unwrap(), cfg);
}

#[test]
fn invalid_config_is_not_saved() {
    let nvs = NvsAdapter::new().unwrap();
    let bad = FlowConfig {
        min_pulse_threshold: 5,
        flow_timeout_ms: 10,
        ..FlowConfig::default()
    };
    assert!(matches!(
        nvs.save(&bad),
        Err(ConfigError::ValidationFailed(_))
    ));
    assert_eq!(nvs.load().unwrap(), FlowConfig::default());
}
