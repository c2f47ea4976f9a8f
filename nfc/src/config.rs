//! Driver timing and addressing.

use crate::clock::TICKS_PERIOD;

/// Longest wait the wrapping clock can measure.
pub const MAX_TIMEOUT_MS: u32 = TICKS_PERIOD - 1;

/// Default 7-bit I2C address of the PN7150.
pub const DEFAULT_ADDRESS: u8 = 0x28;

/// Session configuration.
///
/// `response_timeout_ms` bounds the CORE_INIT, proprietary activation and
/// RF_DISCOVER responses. `None` waits as long as the chip takes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub address: u8,
    /// How long VEN is held low during a hardware reset
    pub reset_low_ms: u32,
    /// Settle time after VEN goes high
    pub reset_settle_ms: u32,
    pub reset_timeout_ms: u32,
    pub map_timeout_ms: u32,
    pub response_timeout_ms: Option<u32>,
    /// Window of a single poll while waiting without a deadline
    pub poll_slice_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            reset_low_ms: 1,
            reset_settle_ms: 3,
            reset_timeout_ms: 15,
            map_timeout_ms: 10,
            response_timeout_ms: None,
            poll_slice_ms: 5,
        }
    }
}

impl Config {
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    /// Bound the init, activation and discover waits. Values past
    /// [`MAX_TIMEOUT_MS`] are clamped to it.
    pub fn with_response_timeout(mut self, timeout_ms: Option<u32>) -> Self {
        self.response_timeout_ms = timeout_ms.map(|ms| ms.min(MAX_TIMEOUT_MS));
        self
    }

    pub fn with_poll_slice(mut self, slice_ms: u32) -> Self {
        self.poll_slice_ms = slice_ms.max(1);
        self
    }
}
