//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to              |
//! |----------------|--------------------|--------------------------|
//! | `display_link` | DisplayPort        | UART to the display      |
//! | `log_sink`     | EventSink          | Serial log output        |
//! | `nvs`          | NvmPort            | NVS / simulated flash    |
//! |                | ConfigPort         |                          |
//! | `publish`      | TelemetryPort      | Serial log output        |
//! | `time`         | ClockPort          | ESP32 system timer / RTC |

pub mod display_link;
pub mod log_sink;
pub mod nvs;
pub mod publish;
pub mod time;
