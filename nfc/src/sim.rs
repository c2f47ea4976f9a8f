//! Scripted PN7150 model for running the driver without hardware.
//!
//! [`SimulatedChip`] hands out embedded-hal implementations (bus, IRQ, VEN,
//! delay, clock) that all share one chip model. The model answers each
//! written command with the replies registered for it and records every
//! bus transaction in order.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, InputPin, OutputPin};
use embedded_hal::i2c::{self, ErrorKind, NoAcknowledgeSource, Operation};

use crate::clock::{Clock, TICKS_PERIOD};
use crate::config::DEFAULT_ADDRESS;
use crate::nci::commands;

/// One observable bus or pin event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Write(Vec<u8>),
    /// Bytes returned by one read transaction
    Read(Vec<u8>),
    Enable(bool),
}

/// Replies of a chip running firmware 12.50.05, with an NTAG in the field.
pub mod replies {
    pub const CORE_RESET_RSP: &[u8] = &[0x40, 0x00, 0x03, 0x00, 0x10, 0x01];
    pub const CORE_INIT_RSP: &[u8] = &[
        0x40, 0x01, 0x15, 0x00, 0x1E, 0x03, 0x00, 0x00, 0x04, 0x01, 0x02, 0x03, 0x80, 0x01, 0x00,
        0x02, 0xFF, 0x00, 0x01, 0x04, 0x08, 0x12, 0x50, 0x05,
    ];
    pub const PROP_ACT_RSP: &[u8] = &[0x4F, 0x02, 0x05, 0x00, 0x00, 0x01, 0x9E, 0xAA];
    pub const RF_DISCOVER_MAP_RSP: &[u8] = &[0x41, 0x00, 0x01, 0x00];
    pub const RF_DISCOVER_RSP: &[u8] = &[0x41, 0x03, 0x01, 0x00];
    pub const RF_INTF_ACTIVATED_NTF: &[u8] = &[
        0x61, 0x05, 0x17, 0x01, 0x01, 0x02, 0x00, 0xFF, 0x01, 0x0C, 0x44, 0x00, 0x07, 0x04, 0x6B,
        0x2E, 0x52, 0x9A, 0x3C, 0x80, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00,
    ];
}

#[derive(Debug, Default)]
struct ChipModel {
    address: u8,
    powered: bool,
    replies: HashMap<Vec<u8>, Vec<Vec<u8>>>,
    pending: VecDeque<Vec<u8>>,
    /// Message being read and how much of it the host has taken
    reading: Option<(Vec<u8>, usize)>,
    events: Vec<BusEvent>,
    time: u32,
    clock_step: u32,
}

impl ChipModel {
    fn irq(&self) -> bool {
        self.reading.is_some() || !self.pending.is_empty()
    }

    fn write(&mut self, bytes: &[u8]) {
        self.events.push(BusEvent::Write(bytes.to_vec()));
        if let Some(replies) = self.replies.get(bytes) {
            self.pending.extend(replies.iter().cloned());
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<(), ErrorKind> {
        let (message, taken) = match self.reading.take() {
            Some(current) => current,
            None => (
                self.pending
                    .pop_front()
                    .ok_or(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data))?,
                0,
            ),
        };
        let n = buf.len().min(message.len() - taken);
        buf[..n].copy_from_slice(&message[taken..taken + n]);
        self.events.push(BusEvent::Read(buf[..n].to_vec()));
        if taken + n < message.len() {
            self.reading = Some((message, taken + n));
        }
        Ok(())
    }

    fn set_enable(&mut self, high: bool) {
        self.events.push(BusEvent::Enable(high));
        if !high {
            self.pending.clear();
            self.reading = None;
        }
        self.powered = high;
    }

    fn advance(&mut self, ms: u32) {
        self.time = (self.time + ms) & (TICKS_PERIOD - 1);
    }
}

/// Handle to the shared chip model. Clones refer to the same chip.
#[derive(Debug, Clone)]
pub struct SimulatedChip {
    model: Rc<RefCell<ChipModel>>,
}

impl SimulatedChip {
    /// A chip that answers nothing until replies are registered.
    pub fn new() -> Self {
        let model = ChipModel {
            address: DEFAULT_ADDRESS,
            powered: true,
            clock_step: 1,
            ..ChipModel::default()
        };
        Self {
            model: Rc::new(RefCell::new(model)),
        }
    }

    /// A chip that completes the whole handshake and activates an NTAG.
    pub fn pn7150() -> Self {
        let chip = Self::new();
        chip.on_command(commands::CORE_RESET, &[replies::CORE_RESET_RSP]);
        chip.on_command(commands::CORE_INIT, &[replies::CORE_INIT_RSP]);
        chip.on_command(commands::PROP_ACT, &[replies::PROP_ACT_RSP]);
        chip.on_command(commands::RF_DISCOVER_MAP_RW, &[replies::RF_DISCOVER_MAP_RSP]);
        chip.on_command(
            commands::RF_DISCOVER_RW,
            &[replies::RF_DISCOVER_RSP, replies::RF_INTF_ACTIVATED_NTF],
        );
        chip
    }

    /// Answer `command` with `messages`, replacing earlier replies.
    pub fn on_command(&self, command: &[u8], messages: &[&[u8]]) {
        self.model.borrow_mut().replies.insert(
            command.to_vec(),
            messages.iter().map(|m| m.to_vec()).collect(),
        );
    }

    /// Queue a message as if the chip produced it unprompted.
    pub fn push_pending(&self, message: &[u8]) {
        self.model.borrow_mut().pending.push_back(message.to_vec());
    }

    pub fn address(&self) -> u8 {
        self.model.borrow().address
    }

    pub fn is_powered(&self) -> bool {
        self.model.borrow().powered
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.model.borrow().events.clone()
    }

    /// Commands written so far, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.model
            .borrow()
            .events
            .iter()
            .filter_map(|e| match e {
                BusEvent::Write(bytes) => Some(bytes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn time(&self) -> u32 {
        self.model.borrow().time
    }

    pub fn set_time(&self, ms: u32) {
        self.model.borrow_mut().time = ms & (TICKS_PERIOD - 1);
    }

    pub fn i2c(&self) -> SimI2c {
        SimI2c {
            model: Rc::clone(&self.model),
        }
    }

    pub fn irq(&self) -> SimIrq {
        SimIrq {
            model: Rc::clone(&self.model),
        }
    }

    pub fn ven(&self) -> SimVen {
        SimVen {
            model: Rc::clone(&self.model),
        }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay {
            model: Rc::clone(&self.model),
        }
    }

    pub fn clock(&self) -> ManualClock {
        ManualClock {
            model: Rc::clone(&self.model),
        }
    }
}

impl Default for SimulatedChip {
    fn default() -> Self {
        Self::new()
    }
}

/// I2C bus with the simulated chip as its only device.
#[derive(Debug)]
pub struct SimI2c {
    model: Rc<RefCell<ChipModel>>,
}

impl i2c::ErrorType for SimI2c {
    type Error = ErrorKind;
}

impl i2c::I2c for SimI2c {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), Self::Error> {
        let mut model = self.model.borrow_mut();
        if address != model.address || !model.powered {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => model.write(&bytes[..]),
                Operation::Read(buf) => model.read(&mut buf[..])?,
            }
        }
        Ok(())
    }
}

/// IRQ line, high while the chip holds a message.
#[derive(Debug)]
pub struct SimIrq {
    model: Rc<RefCell<ChipModel>>,
}

impl PinErrorType for SimIrq {
    type Error = Infallible;
}

impl InputPin for SimIrq {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(self.model.borrow().irq())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.model.borrow().irq())
    }
}

/// VEN line. Driving it low powers the chip down and drops pending messages.
#[derive(Debug)]
pub struct SimVen {
    model: Rc<RefCell<ChipModel>>,
}

impl PinErrorType for SimVen {
    type Error = Infallible;
}

impl OutputPin for SimVen {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.model.borrow_mut().set_enable(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.model.borrow_mut().set_enable(true);
        Ok(())
    }
}

/// Delay that advances simulated time instead of sleeping.
#[derive(Debug)]
pub struct SimDelay {
    model: Rc<RefCell<ChipModel>>,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.model.borrow_mut().advance(ns.div_ceil(1_000_000));
    }
}

/// Simulated millisecond clock; every reading moves time forward one step.
#[derive(Debug)]
pub struct ManualClock {
    model: Rc<RefCell<ChipModel>>,
}

impl Clock for ManualClock {
    fn now(&mut self) -> u32 {
        let mut model = self.model.borrow_mut();
        let now = model.time;
        let step = model.clock_step;
        model.advance(step);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::I2c;

    #[test]
    fn test_reply_is_read_in_pieces() {
        let chip = SimulatedChip::pn7150();
        let mut i2c = chip.i2c();
        let mut irq = chip.irq();

        i2c.write(DEFAULT_ADDRESS, commands::CORE_RESET).unwrap();
        assert!(irq.is_high().unwrap());

        let mut header = [0u8; 3];
        i2c.read(DEFAULT_ADDRESS, &mut header).unwrap();
        assert_eq!(header, [0x40, 0x00, 0x03]);
        assert!(irq.is_high().unwrap());

        let mut payload = [0u8; 3];
        i2c.read(DEFAULT_ADDRESS, &mut payload).unwrap();
        assert_eq!(payload, [0x00, 0x10, 0x01]);
        assert!(irq.is_low().unwrap());
    }

    #[test]
    fn test_power_down_drops_pending() {
        let chip = SimulatedChip::new();
        chip.push_pending(&[0x60, 0x07, 0x00]);
        let mut ven = chip.ven();
        ven.set_low().unwrap();
        assert!(!chip.is_powered());
        assert!(chip.irq().is_low().unwrap());
        assert!(chip.i2c().write(DEFAULT_ADDRESS, commands::CORE_INIT).is_err());
    }

    #[test]
    fn test_clock_wraps() {
        let chip = SimulatedChip::new();
        chip.set_time(TICKS_PERIOD - 1);
        let mut clock = chip.clock();
        assert_eq!(clock.now(), TICKS_PERIOD - 1);
        assert_eq!(clock.now(), 0);
    }
}
