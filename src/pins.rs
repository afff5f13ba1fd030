//! GPIO pin assignments for the flow meter board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

/// Hall-effect flow sensor pulse output (open collector, pulled up).
/// Interrupt on the falling edge.
pub const FLOW_SENSOR_GPIO: i32 = 6;

/// Pulse indicator LED (active HIGH).
pub const PULSE_LED_GPIO: i32 = 7;

/// UART to the external display.
pub const DISPLAY_UART_TX_GPIO: i32 = 17;
pub const DISPLAY_UART_RX_GPIO: i32 = 18;
/// Display link baud rate.
pub const DISPLAY_BAUD: u32 = 115_200;
