//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ FlowMeterService (domain)
//! ```
//!
//! Driven adapters (non-volatile memory, clock, event sinks, telemetry and
//! the display link) implement these traits.  The
//! [`FlowMeterService`](super::service::FlowMeterService) consumes them via
//! generics, so the accounting core never touches hardware directly.

use crate::config::FlowConfig;

// ───────────────────────────────────────────────────────────────
// Non-volatile memory port (driven adapter: domain ↔ flash)
// ───────────────────────────────────────────────────────────────

/// Byte-addressed non-volatile memory holding the persisted record.
///
/// Writes are staged until [`commit`](NvmPort::commit).  A commit must
/// make every staged write durable at once: after a power loss the backend
/// holds either all of them or none.  Reads observe staged writes.
pub trait NvmPort {
    /// Read `buf.len()` bytes starting at `offset`.
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Stage `data` at `offset`.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError>;

    /// Make all staged writes durable.
    fn commit(&mut self) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Clock port (driven adapter: hardware timer / RTC → domain)
// ───────────────────────────────────────────────────────────────

/// Monotonic and wall-clock time.
pub trait ClockPort {
    /// Milliseconds since boot.  Wraps at `u32::MAX`; callers compare
    /// with [`elapsed_ms`](crate::timing::elapsed_ms).
    fn now_ms(&self) -> u32;

    /// Whether the wall clock has been synchronised.
    fn is_time_synced(&self) -> bool;

    /// Seconds since the Unix epoch, or a fixed base plus uptime when the
    /// wall clock is not synchronised.
    fn timestamp_secs(&self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

// ───────────────────────────────────────────────────────────────
// Telemetry port (driven adapter: domain → cloud)
// ───────────────────────────────────────────────────────────────

/// Outbound publish channel for report payloads.
pub trait TelemetryPort {
    /// Whether the uplink is currently connected.
    fn is_connected(&self) -> bool;

    /// Publish a JSON payload under `topic`.  Returns `false` if the
    /// transport refused it.
    fn publish(&mut self, topic: &str, payload: &str) -> bool;

    /// Link quality in percent, if known.
    fn signal_strength(&self) -> Option<f32>;
}

// ───────────────────────────────────────────────────────────────
// Display port (driven adapter: domain → serial display)
// ───────────────────────────────────────────────────────────────

/// Line-oriented link to the external display.
pub trait DisplayPort {
    fn send_line(&mut self, line: &str);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists the flow meter configuration.
///
/// Implementations MUST validate before persisting.  Out-of-range values
/// are rejected with [`ConfigError::ValidationFailed`], never clamped.
pub trait ConfigPort {
    /// Returns [`FlowConfig::default()`] if no stored config exists.
    fn load(&self) -> Result<FlowConfig, ConfigError>;

    fn save(&self, config: &FlowConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug)]
pub enum ConfigError {
    /// Stored config failed deserialization.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`NvmPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Access beyond the end of the record region.
    OutOfBounds { offset: usize, len: usize },
    /// The magic and version words are written by the store alone.
    GuardField,
    /// Value type differs from the type stored at `offset`.
    TypeMismatch { offset: usize },
    /// Backend rejected the write or commit.
    IoError,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfBounds { offset, len } => {
                write!(f, "access of {} bytes at offset {} out of bounds", len, offset)
            }
            Self::GuardField => write!(f, "guard words are not writable"),
            Self::TypeMismatch { offset } => {
                write!(f, "value type does not match field at offset {}", offset)
            }
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for ConfigError {}
impl std::error::Error for StorageError {}
