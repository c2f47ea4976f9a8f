//! Message framing on the I2C bus.
//!
//! The chip raises IRQ while it has a message for the host. A message is
//! read in two transactions: the 3-byte header first, then exactly as many
//! payload bytes as the header announces.

use embedded_hal::digital::InputPin;
use embedded_hal::i2c::I2c;
use log::{debug, trace, warn};

use crate::clock::{elapsed_since, Clock};
use crate::config::MAX_TIMEOUT_MS;
use crate::error::{DecodeError, TransportError};
use crate::nci::{decode, header, Message};

/// Receive buffer for one message, reused for every read.
#[derive(Debug, Clone)]
pub struct RxBuffer {
    bytes: [u8; header::MAX_MESSAGE],
    len: usize,
}

impl RxBuffer {
    pub fn new() -> Self {
        Self {
            bytes: [0; header::MAX_MESSAGE],
            len: 0,
        }
    }

    /// Bytes of the last message read into this buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl Default for RxBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Which way a message crossed the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
    /// Read while draining before a command and dropped
    Discarded,
}

/// Receives every message the transport moves, for presentation elsewhere.
pub trait MessageSink {
    fn on_message(&mut self, direction: Direction, raw: &[u8], decoded: &Result<Message, DecodeError>);
}

impl MessageSink for () {
    fn on_message(&mut self, _: Direction, _: &[u8], _: &Result<Message, DecodeError>) {}
}

pub struct Transport<I2C, IRQ, CLK, S = ()> {
    i2c: I2C,
    irq: IRQ,
    clock: CLK,
    address: u8,
    sink: S,
}

impl<I2C, IRQ, CLK> Transport<I2C, IRQ, CLK, ()> {
    pub fn new(i2c: I2C, irq: IRQ, clock: CLK, address: u8) -> Self {
        Self {
            i2c,
            irq,
            clock,
            address,
            sink: (),
        }
    }
}

impl<I2C, IRQ, CLK, S> Transport<I2C, IRQ, CLK, S> {
    /// Replace the message sink.
    pub fn with_sink<S2: MessageSink>(self, sink: S2) -> Transport<I2C, IRQ, CLK, S2> {
        Transport {
            i2c: self.i2c,
            irq: self.irq,
            clock: self.clock,
            address: self.address,
            sink,
        }
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn release(self) -> (I2C, IRQ, CLK, S) {
        (self.i2c, self.irq, self.clock, self.sink)
    }
}

impl<I2C, IRQ, CLK, S> Transport<I2C, IRQ, CLK, S>
where
    I2C: I2c,
    IRQ: InputPin,
    CLK: Clock,
    S: MessageSink,
{
    /// Whether the chip has a message pending.
    pub fn is_ready(&mut self) -> Result<bool, TransportError> {
        self.irq.is_high().map_err(TransportError::pin)
    }

    /// Wait up to `timeout_ms` for a message and read it into `buf`.
    ///
    /// `Ok(None)` if IRQ stayed low for the whole window. Windows longer
    /// than [`MAX_TIMEOUT_MS`] are shortened to it.
    pub fn read_one(&mut self, buf: &mut RxBuffer, timeout_ms: u32) -> Result<Option<Message>, TransportError> {
        self.read_as(buf, timeout_ms, Direction::Received)
    }

    /// Write one command in a single transaction.
    pub fn write(&mut self, cmd: &[u8]) -> Result<(), TransportError> {
        trace!("> {:02x?}", cmd);
        self.i2c.write(self.address, cmd).map_err(TransportError::bus)?;
        self.sink.on_message(Direction::Sent, cmd, &decode(cmd));
        Ok(())
    }

    /// Flush whatever the chip still holds, then write `cmd`.
    ///
    /// Stale messages that fail to decode are dropped; bus errors abort.
    pub fn write_drain_then_send(&mut self, buf: &mut RxBuffer, cmd: &[u8]) -> Result<(), TransportError> {
        while self.is_ready()? {
            match self.read_as(buf, 0, Direction::Discarded) {
                Ok(Some(stale)) => debug!("Discarded pending {:?}", stale.kind()),
                Ok(None) => break,
                Err(TransportError::Decode(err)) => warn!("Discarded undecodable message: {err}"),
                Err(err) => return Err(err),
            }
        }
        self.write(cmd)
    }

    fn read_as(
        &mut self,
        buf: &mut RxBuffer,
        timeout_ms: u32,
        direction: Direction,
    ) -> Result<Option<Message>, TransportError> {
        let timeout_ms = timeout_ms.min(MAX_TIMEOUT_MS);
        let start = self.clock.now();
        while !self.is_ready()? {
            if elapsed_since(start, self.clock.now()) >= timeout_ms {
                return Ok(None);
            }
        }

        let address = self.address;
        buf.len = 0;
        self.i2c
            .read(address, &mut buf.bytes[..header::LEN])
            .map_err(TransportError::bus)?;
        let end = header::LEN + buf.bytes[2] as usize;
        if end > header::LEN {
            self.i2c
                .read(address, &mut buf.bytes[header::LEN..end])
                .map_err(TransportError::bus)?;
        }
        buf.len = end;

        trace!("< {:02x?}", buf.as_slice());
        let decoded = decode(buf.as_slice());
        self.sink.on_message(direction, buf.as_slice(), &decoded);
        Ok(Some(decoded?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TICKS_PERIOD;
    use crate::nci::{commands, MessageKind};
    use crate::sim::{BusEvent, SimulatedChip};

    type SimTransport = Transport<crate::sim::SimI2c, crate::sim::SimIrq, crate::sim::ManualClock>;

    fn transport(chip: &SimulatedChip) -> SimTransport {
        Transport::new(chip.i2c(), chip.irq(), chip.clock(), chip.address())
    }

    #[derive(Default)]
    struct Recorder(Vec<(Direction, Vec<u8>, bool)>);

    impl MessageSink for Recorder {
        fn on_message(&mut self, direction: Direction, raw: &[u8], decoded: &Result<Message, DecodeError>) {
            self.0.push((direction, raw.to_vec(), decoded.is_ok()));
        }
    }

    #[test]
    fn test_read_one_times_out_without_irq() {
        let chip = SimulatedChip::new();
        let mut transport = transport(&chip);
        let mut buf = RxBuffer::new();

        let result = transport.read_one(&mut buf, 15).unwrap();
        assert!(result.is_none());
        assert!(chip.events().is_empty());
    }

    #[test]
    fn test_read_one_timeout_across_clock_wrap() {
        let chip = SimulatedChip::new();
        chip.set_time(TICKS_PERIOD - 5);
        let mut transport = transport(&chip);
        let mut buf = RxBuffer::new();

        assert!(transport.read_one(&mut buf, 10).unwrap().is_none());
        // Without wrap-safe arithmetic the loop would have stopped at the wrap
        assert!(chip.time() >= 5 && chip.time() < 20, "time {}", chip.time());
    }

    #[test]
    fn test_header_then_payload_read() {
        let chip = SimulatedChip::new();
        chip.push_pending(&[0x41, 0x00, 0x01, 0x00]);
        let mut transport = transport(&chip);
        let mut buf = RxBuffer::new();

        let msg = transport.read_one(&mut buf, 5).unwrap().unwrap();
        assert_eq!(msg.kind(), MessageKind::RfDiscoverMapRsp);
        assert_eq!(buf.as_slice(), &[0x41, 0x00, 0x01, 0x00]);
        assert_eq!(
            chip.events(),
            vec![
                BusEvent::Read(vec![0x41, 0x00, 0x01]),
                BusEvent::Read(vec![0x00]),
            ]
        );
    }

    #[test]
    fn test_empty_payload_is_one_read() {
        let chip = SimulatedChip::new();
        chip.push_pending(&[0x60, 0x07, 0x00]);
        let mut transport = transport(&chip);
        let mut buf = RxBuffer::new();

        let msg = transport.read_one(&mut buf, 5).unwrap().unwrap();
        assert_eq!(msg.wire_len(), 3);
        assert_eq!(chip.events(), vec![BusEvent::Read(vec![0x60, 0x07, 0x00])]);
    }

    #[test]
    fn test_undecodable_message_surfaces_decode_error() {
        let chip = SimulatedChip::new();
        chip.push_pending(&[0x41, 0x00, 0x00]);
        let mut transport = transport(&chip);
        let mut buf = RxBuffer::new();

        let err = transport.read_one(&mut buf, 5).unwrap_err();
        assert!(matches!(err, TransportError::Decode(DecodeError::FieldOutOfRange { .. })));
    }

    #[test]
    fn test_bus_error_surfaces() {
        let chip = SimulatedChip::new();
        chip.push_pending(&[0x41, 0x00, 0x01, 0x00]);
        let mut transport = Transport::new(chip.i2c(), chip.irq(), chip.clock(), 0x29);
        let mut buf = RxBuffer::new();

        let err = transport.read_one(&mut buf, 5).unwrap_err();
        assert!(matches!(err, TransportError::Bus(_)));
    }

    #[test]
    fn test_drain_reads_all_before_single_write() {
        let chip = SimulatedChip::new();
        chip.push_pending(&[0x61, 0x07, 0x01, 0x00]);
        chip.push_pending(&[0x61, 0x08, 0x00]);
        let mut transport = transport(&chip);
        let mut buf = RxBuffer::new();

        transport
            .write_drain_then_send(&mut buf, commands::CORE_INIT)
            .unwrap();

        let events = chip.events();
        let writes: Vec<_> = events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e, BusEvent::Write(_)))
            .collect();
        assert_eq!(writes.len(), 1);
        let (write_at, _) = writes[0];
        assert_eq!(write_at, events.len() - 1);
        assert_eq!(
            events.iter().filter(|e| matches!(e, BusEvent::Read(_))).count(),
            3
        );
    }

    #[test]
    fn test_bus_error_while_draining_aborts_write() {
        let chip = SimulatedChip::new();
        chip.push_pending(&[0x61, 0x07, 0x01, 0x00]);
        let mut transport = Transport::new(chip.i2c(), chip.irq(), chip.clock(), 0x29);
        let mut buf = RxBuffer::new();

        let err = transport
            .write_drain_then_send(&mut buf, commands::CORE_INIT)
            .unwrap_err();
        assert!(matches!(err, TransportError::Bus(_)));
        assert!(chip.writes().is_empty());
    }

    #[test]
    fn test_failed_write_is_not_reported_sent() {
        let chip = SimulatedChip::new();
        let mut transport =
            Transport::new(chip.i2c(), chip.irq(), chip.clock(), 0x29).with_sink(Recorder::default());

        assert!(transport.write(commands::CORE_RESET).is_err());
        assert!(transport.sink_mut().0.is_empty());
    }

    #[test]
    fn test_drain_with_nothing_pending_only_writes() {
        let chip = SimulatedChip::new();
        let mut transport = transport(&chip);
        let mut buf = RxBuffer::new();

        transport
            .write_drain_then_send(&mut buf, commands::PROP_ACT)
            .unwrap();
        assert_eq!(chip.events(), vec![BusEvent::Write(commands::PROP_ACT.to_vec())]);
    }

    #[test]
    fn test_drain_drops_garbled_messages() {
        let chip = SimulatedChip::new();
        chip.push_pending(&[0x41, 0x03, 0x00]);
        let mut transport = transport(&chip);
        let mut buf = RxBuffer::new();

        transport
            .write_drain_then_send(&mut buf, commands::CORE_INIT)
            .unwrap();
        assert_eq!(chip.writes(), vec![commands::CORE_INIT.to_vec()]);
    }

    #[test]
    fn test_sink_sees_every_direction() {
        let chip = SimulatedChip::new();
        chip.push_pending(&[0x61, 0x07, 0x00]);
        chip.on_command(commands::CORE_RESET, &[&[0x40, 0x00, 0x03, 0x00, 0x10, 0x01]]);
        let mut transport = transport(&chip).with_sink(Recorder::default());
        let mut buf = RxBuffer::new();

        transport
            .write_drain_then_send(&mut buf, commands::CORE_RESET)
            .unwrap();
        transport.read_one(&mut buf, 5).unwrap();

        let seen: Vec<_> = transport
            .sink_mut()
            .0
            .iter()
            .map(|(direction, _, ok)| (*direction, *ok))
            .collect();
        assert_eq!(
            seen,
            vec![
                (Direction::Discarded, true),
                (Direction::Sent, true),
                (Direction::Received, true),
            ]
        );
    }
}
