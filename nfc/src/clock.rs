//! Wrapping millisecond clock used for timeout arithmetic.
//!
//! Tick counters on the targets this driver runs on are only 29 bits wide,
//! so every reading is taken modulo [`TICKS_PERIOD`] and differences are
//! computed with [`elapsed_since`].

use std::time::Instant;

/// Period of the millisecond tick counter (2^29 ms, about 6.2 days).
pub const TICKS_PERIOD: u32 = 1 << 29;

const TICKS_MASK: u32 = TICKS_PERIOD - 1;

/// Milliseconds from `t0` to `t1`, correct across one wrap of the counter.
pub fn elapsed_since(t0: u32, t1: u32) -> u32 {
    t1.wrapping_sub(t0) & TICKS_MASK
}

/// Monotonic millisecond source that wraps at [`TICKS_PERIOD`].
pub trait Clock {
    /// Current tick count, always below [`TICKS_PERIOD`].
    fn now(&mut self) -> u32;
}

/// [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&mut self) -> u32 {
        (self.origin.elapsed().as_millis() as u64 & TICKS_MASK as u64) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elapsed_without_wrap() {
        assert_eq!(elapsed_since(100, 115), 15);
        assert_eq!(elapsed_since(7, 7), 0);
    }

    #[test]
    fn test_elapsed_across_one_wrap() {
        assert_eq!(elapsed_since(TICKS_PERIOD - 5, 3), 8);
        assert_eq!(elapsed_since(TICKS_PERIOD - 1, 0), 1);
    }

    #[test]
    fn test_std_clock_stays_in_period() {
        let mut clock = StdClock::new();
        let t0 = clock.now();
        let t1 = clock.now();
        assert!(t0 < TICKS_PERIOD);
        assert!(elapsed_since(t0, t1) < 1000);
    }
}
