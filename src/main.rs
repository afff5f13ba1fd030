//! Flow Meter Firmware: Main Entry Point
//!
//! Hexagonal architecture with a single cooperative main loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  NvsAdapter        LogEventSink   Esp32TimeAdapter             │
//! │  (NvmPort+Config)  (EventSink)    (ClockPort)                  │
//! │  LogPublisher      DisplayLink                                 │
//! │  (TelemetryPort)   (DisplayPort)                               │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            FlowMeterService (pure logic)               │    │
//! │  │  FlowDetector · Accumulator · PersistentStore          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  PulseCounter ◀── GPIO ISR          Reporter · DisplayUpdater  │
//! │  BootSequence · DailyResetSchedule · Watchdog · PulseLed       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::Result;
use esp_idf_hal::delay::FreeRtos;
use esp_idf_hal::gpio::{AnyIOPin, PinDriver};
use esp_idf_hal::peripherals::Peripherals;
use esp_idf_hal::uart::{config::Config as UartConfig, UartDriver};
use esp_idf_hal::units::Hertz;
use log::{info, warn};

use flowmeter::adapters::display_link::DisplayLink;
use flowmeter::adapters::log_sink::LogEventSink;
use flowmeter::adapters::nvs::NvsAdapter;
use flowmeter::adapters::publish::LogPublisher;
use flowmeter::adapters::time::Esp32TimeAdapter;
use flowmeter::app::daily_reset::DailyResetSchedule;
use flowmeter::app::ports::{ClockPort, ConfigPort, TelemetryPort};
use flowmeter::app::service::FlowMeterService;
use flowmeter::config::FlowConfig;
use flowmeter::display::DisplayUpdater;
use flowmeter::drivers::{hw_init, pulse_led::PulseLed, watchdog::Watchdog};
use flowmeter::monitor::{self, BootSequence, SystemMonitor};
use flowmeter::pins;
use flowmeter::sensors::PulseCounter;
use flowmeter::telemetry::Reporter;

/// Main-loop pacing.
const LOOP_DELAY_MS: u32 = 10;

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  FlowMeter v{}                       ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let reset_reason = monitor::last_reset_reason();

    // ── 2. Load config from NVS (or defaults) ─────────────────
    let nvs = NvsAdapter::new()?;
    let config = match nvs.load() {
        Ok(cfg) => match cfg.validate() {
            Ok(()) => cfg,
            Err(e) => {
                warn!("stored config invalid ({}), using defaults", e);
                FlowConfig::default()
            }
        },
        Err(e) => {
            warn!("NVS config load failed ({}), using defaults", e);
            FlowConfig::default()
        }
    };

    // ── 3. Pulse counter + ISR ────────────────────────────────
    let counter: &'static PulseCounter = Box::leak(Box::new(PulseCounter::new()));
    hw_init::init_flow_input()?;
    hw_init::register_flow_isr(counter)?;

    // ── 4. Peripherals owned by adapters ──────────────────────
    let peripherals = Peripherals::take()?;
    let led_pin = PinDriver::output(peripherals.pins.gpio7)?;
    let uart = UartDriver::new(
        peripherals.uart1,
        peripherals.pins.gpio17,
        peripherals.pins.gpio18,
        Option::<AnyIOPin>::None,
        Option::<AnyIOPin>::None,
        &UartConfig::default().baudrate(Hertz(pins::DISPLAY_BAUD)),
    )?;
    info!(
        "display UART on GPIO{}/{} at {} baud, pulse LED on GPIO{}",
        pins::DISPLAY_UART_TX_GPIO,
        pins::DISPLAY_UART_RX_GPIO,
        pins::DISPLAY_BAUD,
        pins::PULSE_LED_GPIO
    );

    let clock = Esp32TimeAdapter::new();
    let mut log_sink = LogEventSink::new();
    let mut publisher = LogPublisher::new();
    let mut display_link = DisplayLink::new(uart);
    let mut pulse_led = PulseLed::new(led_pin);

    // ── 5. Construct app service ──────────────────────────────
    let boot_ms = clock.now_ms();
    let mut service = FlowMeterService::new(config.clone(), counter, nvs, boot_ms);
    service.begin(&mut log_sink);

    let sys_monitor = SystemMonitor::begin(reset_reason, service.store_mut());
    info!(
        "reset reason: {}, watchdog resets: {}",
        sys_monitor.reset_reason().name(),
        sys_monitor.watchdog_reset_count()
    );

    let watchdog = Watchdog::new(config.watchdog_timeout_ms);
    let mut boot = BootSequence::new(&config, boot_ms);
    let mut reporter = Reporter::new(&config, boot_ms, reset_reason);
    let mut display = DisplayUpdater::new(config.display_interval_ms, boot_ms);
    let mut daily_reset = DailyResetSchedule::new(config.daily_reset_interval_secs);

    info!("System ready. Entering main loop.");

    // ── 6. Main loop ──────────────────────────────────────────
    loop {
        watchdog.feed();
        let now = clock.now_ms();

        pulse_led.update(counter);

        if boot.poll(now, publisher.is_connected()) {
            service.start_monitoring(now);
        }

        let sampled_at = service.last_sample_ms();
        service.poll(now, &mut log_sink);
        if service.last_sample_ms() != sampled_at {
            pulse_led.on_sample(service.is_flow_active());
        }

        if boot.is_complete() {
            daily_reset.poll(&clock, &mut service, &mut log_sink);
            reporter.poll(now, &mut service, &clock, &mut publisher, &mut log_sink);
        }

        display.poll(
            now,
            &service,
            &clock,
            publisher.signal_strength(),
            &mut display_link,
        );

        FreeRtos::delay_ms(LOOP_DELAY_MS);
    }
}
