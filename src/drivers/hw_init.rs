//! One-shot hardware peripheral initialization.
//!
//! Configures the flow sensor input and registers its edge interrupt using
//! raw ESP-IDF sys calls.  Called once from `main()` before the main loop
//! starts.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

use crate::sensors::PulseCounter;

#[cfg(target_os = "espidf")]
use crate::pins;

// ── Error type ────────────────────────────────────────────────

/// Errors during one-shot peripheral initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
    IsrAddFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::IsrAddFailed(rc) => write!(f, "flow ISR registration failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwInitError {}

// ── Flow sensor input ─────────────────────────────────────────

/// Configure the flow sensor pin as a pulled-up input interrupting on the
/// falling edge.
#[cfg(target_os = "espidf")]
pub fn init_flow_input() -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << pins::FLOW_SENSOR_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_NEGEDGE,
    };
    // SAFETY: called once from main() before the ISR is registered.
    let ret = unsafe { gpio_config(&cfg) };
    if ret != ESP_OK {
        return Err(HwInitError::GpioConfigFailed(ret));
    }
    info!("hw_init: flow input on GPIO{}", pins::FLOW_SENSOR_GPIO);
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
pub fn init_flow_input() -> Result<(), HwInitError> {
    log::info!("hw_init(sim): flow input skipped");
    Ok(())
}

// ── GPIO ISR Service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
unsafe extern "C" fn flow_gpio_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: `arg` is the `&'static PulseCounter` passed to
    // gpio_isr_handler_add in register_flow_isr; it outlives the handler.
    let counter = unsafe { &*(arg as *const PulseCounter) };
    counter.on_edge();
}

/// Install the GPIO ISR service and bind the flow edge interrupt to
/// `counter`.
#[cfg(target_os = "espidf")]
pub fn register_flow_isr(counter: &'static PulseCounter) -> Result<(), HwInitError> {
    // SAFETY: gpio_install_isr_service is idempotent; ESP_ERR_INVALID_STATE
    // means it was already installed (acceptable).  The handler only
    // touches the atomics inside `counter`, which lives for 'static.
    unsafe {
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK && ret != ESP_ERR_INVALID_STATE {
            return Err(HwInitError::IsrInstallFailed(ret));
        }

        let arg = counter as *const PulseCounter as *mut core::ffi::c_void;
        let ret = gpio_isr_handler_add(pins::FLOW_SENSOR_GPIO, Some(flow_gpio_isr), arg);
        if ret != ESP_OK {
            return Err(HwInitError::IsrAddFailed(ret));
        }
        gpio_intr_enable(pins::FLOW_SENSOR_GPIO);
    }
    info!("hw_init: flow ISR registered");
    Ok(())
}

/// Host simulation: tests drive [`PulseCounter::on_edge`] directly.
#[cfg(not(target_os = "espidf"))]
pub fn register_flow_isr(_counter: &'static PulseCounter) -> Result<(), HwInitError> {
    log::info!("hw_init(sim): flow ISR skipped");
    Ok(())
}
