//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (which goes to UART / USB-CDC in production).

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started {
                store,
                lifetime_gallons,
                daily_gallons,
            } => {
                info!(
                    "START | store={:?} | lifetime={:.2}gal daily={:.2}gal",
                    store, lifetime_gallons, daily_gallons
                );
            }
            AppEvent::StorageReinitialized => {
                warn!("STORE | record reinitialised, totals zeroed");
            }
            AppEvent::FlowStarted {
                start_pulse,
                events_today,
            } => {
                info!("FLOW  | started at pulse {} | event #{} today", start_pulse, events_today);
            }
            AppEvent::FlowEnded {
                pulses,
                gallons,
                credited,
            } => {
                info!(
                    "FLOW  | ended | {} pulses = {:.3}gal | {}",
                    pulses,
                    gallons,
                    if *credited { "credited" } else { "below minimum" }
                );
            }
            AppEvent::DailyReset {
                epoch,
                closed_gallons,
                lifetime_gallons,
            } => match closed_gallons {
                Some(g) => info!(
                    "RESET | epoch={} | open event closed at {:.3}gal | lifetime={:.2}gal",
                    epoch, g, lifetime_gallons
                ),
                None => info!("RESET | epoch={} | lifetime={:.2}gal", epoch, lifetime_gallons),
            },
            AppEvent::Published { topic, accepted } => {
                if *accepted {
                    info!("TOTAL | published {}", topic);
                } else {
                    warn!("TOTAL | {} rejected by transport", topic);
                }
            }
        }
    }
}
