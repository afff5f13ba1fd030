//! Hall-effect water flow sensor pulse counter.
//!
//! The sensor outputs one pulse per 1/1700 US gallon.  The GPIO ISR calls
//! [`PulseCounter::on_edge`] on every falling edge; the main loop reads a
//! [`PulseSnapshot`] once per sampling interval and works with deltas.
//!
//! Both counters are `AtomicU32`: 32-bit loads and stores are single
//! instructions on Xtensa and RISC-V ESP32 parts, so a snapshot can never
//! observe a torn value.  No locks are taken in either context.
//!
//! Ordering contract:
//! - ISR: `technical` is incremented (`Relaxed`) *before* `customer`
//!   (`Release`).
//! - Loop: `customer` is loaded (`Acquire`) *before* `technical`.
//!
//! Every technical increment that precedes a customer increment the loop
//! has seen is therefore visible too, so a snapshot always satisfies
//! `technical >= customer` (modulo wrap).  A snapshot taken while the ISR is
//! running may be one pulse stale; that pulse is picked up by the next
//! sample.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Interrupt-safe monotonic pulse counters.
///
/// Created once at boot and shared by reference with the ISR for the
/// lifetime of the process (see `drivers::hw_init::register_flow_isr`).
#[derive(Debug, Default)]
pub struct PulseCounter {
    /// Reset at each daily boundary; drives day-scoped accounting.
    customer: AtomicU32,
    /// Never reset; lifetime diagnostics.
    technical: AtomicU32,
    /// Set on every edge, consumed by the pulse LED driver.
    pulse_seen: AtomicBool,
}

/// Values read from a [`PulseCounter`] at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PulseSnapshot {
    pub customer: u32,
    pub technical: u32,
}

impl PulseCounter {
    pub const fn new() -> Self {
        Self {
            customer: AtomicU32::new(0),
            technical: AtomicU32::new(0),
            pulse_seen: AtomicBool::new(false),
        }
    }

    /// ISR entry point: exactly one increment per qualifying edge.
    ///
    /// Bounded and lock-free: two atomic adds and one store, no floating
    /// point, no heap, no logging.
    #[inline]
    pub fn on_edge(&self) {
        self.technical.fetch_add(1, Ordering::Relaxed);
        self.customer.fetch_add(1, Ordering::Release);
        self.pulse_seen.store(true, Ordering::Relaxed);
    }

    /// Read both counters.
    pub fn snapshot(&self) -> PulseSnapshot {
        let customer = self.customer.load(Ordering::Acquire);
        let technical = self.technical.load(Ordering::Relaxed);
        PulseSnapshot {
            customer,
            technical,
        }
    }

    pub fn customer_count(&self) -> u32 {
        self.customer.load(Ordering::Acquire)
    }

    pub fn technical_count(&self) -> u32 {
        self.technical.load(Ordering::Relaxed)
    }

    /// Zero the customer counter, returning the value it held.
    ///
    /// The swap is atomic with respect to the ISR, so every pulse ends up
    /// either in the returned value or in the fresh count.
    pub fn reset_customer(&self) -> u32 {
        self.customer.swap(0, Ordering::AcqRel)
    }

    /// Consume the "pulse observed" flag.
    pub fn take_pulse_flag(&self) -> bool {
        self.pulse_seen.swap(false, Ordering::Relaxed)
    }
}
