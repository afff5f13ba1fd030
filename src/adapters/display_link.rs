//! Serial link to the external display.
//!
//! Implements [`DisplayPort`] by writing newline-terminated frames to a
//! UART.  The host twin records the frames for inspection.

use crate::app::ports::DisplayPort;

#[cfg(target_os = "espidf")]
use esp_idf_hal::uart::UartDriver;

#[cfg(target_os = "espidf")]
use log::warn;

pub struct DisplayLink {
    #[cfg(target_os = "espidf")]
    uart: UartDriver<'static>,
    #[cfg(not(target_os = "espidf"))]
    sent: Vec<String>,
}

impl DisplayLink {
    #[cfg(target_os = "espidf")]
    pub fn new(uart: UartDriver<'static>) -> Self {
        Self { uart }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Self {
        Self { sent: Vec::new() }
    }

    /// Frames written so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn sent(&self) -> &[String] {
        &self.sent
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for DisplayLink {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayPort for DisplayLink {
    #[cfg(target_os = "espidf")]
    fn send_line(&mut self, line: &str) {
        if let Err(e) = self
            .uart
            .write(line.as_bytes())
            .and_then(|_| self.uart.write(b"\n"))
        {
            warn!("display: UART write failed: {:?}", e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn send_line(&mut self, line: &str) {
        self.sent.push(line.to_owned());
    }
}
