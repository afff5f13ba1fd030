//! Hardware initialisation, the watchdog and the pulse indicator LED.

pub mod hw_init;
pub mod pulse_led;
pub mod watchdog;
