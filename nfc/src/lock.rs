//! Exclusive access to the shared I2C bus.
//!
//! The PN7150 usually shares its bus with other devices (the tag EEPROM,
//! sensors). Every driver on the bus holds the same [`BusLock`] and takes it
//! for the whole of one operation, so a command and its response are never
//! split by foreign traffic.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct BusLock {
    held: AtomicBool,
}

impl BusLock {
    pub fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    /// Take the lock without waiting. `None` if it is already held.
    pub fn try_acquire(&self) -> Option<BusGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| BusGuard { lock: self })
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the [`BusLock`] when dropped.
#[derive(Debug)]
pub struct BusGuard<'a> {
    lock: &'a BusLock,
}

impl Drop for BusGuard<'_> {
    fn drop(&mut self) {
        self.lock.held.store(false, Ordering::Release);
    }
}
