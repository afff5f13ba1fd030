//! Pulse indicator LED.
//!
//! Lit by the main loop whenever the ISR has flagged a pulse since the last
//! check, and turned off after a sample that leaves the detector idle.
//! Generic over [`OutputPin`] so the host tests can use a recording pin.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::sensors::PulseCounter;

pub struct PulseLed<P: OutputPin> {
    pin: P,
    lit: bool,
}

impl<P: OutputPin> PulseLed<P> {
    pub fn new(pin: P) -> Self {
        Self { pin, lit: false }
    }

    /// Light the LED if a pulse was seen since the last call.
    pub fn update(&mut self, counter: &PulseCounter) {
        if counter.take_pulse_flag() {
            self.set(true);
        }
    }

    /// Turn the LED off when a sample shows no flow.
    pub fn on_sample(&mut self, flow_active: bool) {
        if !flow_active {
            self.set(false);
        }
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }

    fn set(&mut self, on: bool) {
        if self.lit == on {
            return;
        }
        let res = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match res {
            Ok(()) => self.lit = on,
            Err(e) => warn!("pulse LED: pin write failed: {:?}", e),
        }
    }
}
