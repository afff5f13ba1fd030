//! Log-only telemetry transport.
//!
//! Implements [`TelemetryPort`] by writing each payload to the serial log.
//! The cellular uplink is a separate concern; swapping it in means
//! implementing the same trait.

use log::info;

use crate::app::ports::TelemetryPort;

pub struct LogPublisher {
    connected: bool,
    signal: Option<f32>,
    published: usize,
}

impl LogPublisher {
    pub fn new() -> Self {
        Self {
            connected: true,
            signal: None,
            published: 0,
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn set_signal_strength(&mut self, signal: Option<f32>) {
        self.signal = signal;
    }

    /// Payloads accepted so far.
    pub fn published(&self) -> usize {
        self.published
    }
}

impl Default for LogPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryPort for LogPublisher {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn publish(&mut self, topic: &str, payload: &str) -> bool {
        if !self.connected {
            return false;
        }
        info!("PUB   | {} | {}", topic, payload);
        self.published += 1;
        true
    }

    fn signal_strength(&self) -> Option<f32> {
        self.signal
    }
}
