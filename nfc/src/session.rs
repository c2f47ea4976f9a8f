//! Handshake and discovery state machine.
//!
//! A session walks the chip through
//! reset -> init -> proprietary activation -> interface mapping -> discovery
//! and waits for a target to be activated. Each step sends one command and
//! checks the response kind, length and status before moving on. Any
//! mismatch leaves the session in [`SessionState::Failed`]; recovering means
//! calling [`Session::connect`] again.

use std::sync::Arc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::i2c::I2c;
use log::{debug, info, warn};

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{SessionError, TransportError, ValidationFailure};
use crate::lock::BusLock;
use crate::nci::{Command, Message, MessageBody, MessageKind, Status};
use crate::transport::{MessageSink, RxBuffer, Transport};

/// Minimum lengths of valid responses, header included
const CORE_RESET_RSP_MIN_LEN: usize = 6;
const CORE_INIT_RSP_MIN_LEN: usize = 20;
const PROP_ACT_RSP_MIN_LEN: usize = 4;
const RF_RSP_MIN_LEN: usize = 4;

/// Configuration status reported after a reset that cleared the configuration
const CONFIG_RESET: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingResetRsp,
    AwaitingInitRsp,
    AwaitingPropActRsp,
    Ready,
    AwaitingMapRsp,
    Mapped,
    AwaitingDiscoverRsp,
    Discovering,
    Activated,
    Failed(SessionError),
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::AwaitingResetRsp => "AwaitingResetRsp",
            SessionState::AwaitingInitRsp => "AwaitingInitRsp",
            SessionState::AwaitingPropActRsp => "AwaitingPropActRsp",
            SessionState::Ready => "Ready",
            SessionState::AwaitingMapRsp => "AwaitingMapRsp",
            SessionState::Mapped => "Mapped",
            SessionState::AwaitingDiscoverRsp => "AwaitingDiscoverRsp",
            SessionState::Discovering => "Discovering",
            SessionState::Activated => "Activated",
            SessionState::Failed(_) => "Failed",
        }
    }
}

/// What the chip reported about itself during [`Session::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub nci_version: u8,
    /// ROM code version, firmware major, firmware minor
    pub firmware_version: [u8; 3],
    pub rf_interfaces: usize,
    pub max_control_payload: u8,
    pub build_number: Option<[u8; 4]>,
}

pub struct Session<I2C, IRQ, VEN, D, CLK, S = ()> {
    transport: Transport<I2C, IRQ, CLK, S>,
    ven: VEN,
    delay: D,
    lock: Arc<BusLock>,
    config: Config,
    rx: RxBuffer,
    state: SessionState,
    firmware: Option<FirmwareInfo>,
}

impl<I2C, IRQ, VEN, D, CLK> Session<I2C, IRQ, VEN, D, CLK, ()> {
    pub fn new(i2c: I2C, irq: IRQ, ven: VEN, delay: D, clock: CLK, lock: Arc<BusLock>, config: Config) -> Self {
        Self {
            transport: Transport::new(i2c, irq, clock, config.address),
            ven,
            delay,
            lock,
            config,
            rx: RxBuffer::new(),
            state: SessionState::Idle,
            firmware: None,
        }
    }
}

impl<I2C, IRQ, VEN, D, CLK, S> Session<I2C, IRQ, VEN, D, CLK, S> {
    /// Report every message moved on the bus to `sink`.
    pub fn with_sink<S2: MessageSink>(self, sink: S2) -> Session<I2C, IRQ, VEN, D, CLK, S2> {
        Session {
            transport: self.transport.with_sink(sink),
            ven: self.ven,
            delay: self.delay,
            lock: self.lock,
            config: self.config,
            rx: self.rx,
            state: self.state,
            firmware: self.firmware,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Firmware details from the last successful connect.
    pub fn firmware(&self) -> Option<&FirmwareInfo> {
        self.firmware.as_ref()
    }

    pub fn sink_mut(&mut self) -> &mut S {
        self.transport.sink_mut()
    }

    pub fn release(self) -> (I2C, IRQ, VEN, D, CLK, S) {
        let (i2c, irq, clock, sink) = self.transport.release();
        (i2c, irq, self.ven, self.delay, clock, sink)
    }
}

impl<I2C, IRQ, VEN, D, CLK, S> Session<I2C, IRQ, VEN, D, CLK, S>
where
    I2C: I2c,
    IRQ: InputPin,
    VEN: OutputPin,
    D: DelayNs,
    CLK: Clock,
    S: MessageSink,
{
    /// Power-cycle the chip and run reset, init and proprietary activation.
    ///
    /// Any earlier state is abandoned. On success the session is `Ready`,
    /// on failure it is back to `Idle`.
    pub fn connect(&mut self) -> Result<FirmwareInfo, SessionError> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.try_acquire().ok_or(SessionError::BusLocked)?;

        self.firmware = None;
        let result = self.handshake();
        if let Err(err) = &result {
            warn!("{} failed: {err}", self.state.name());
            self.enter(SessionState::Idle);
        }
        result
    }

    /// Map the read/write protocols to their RF interfaces.
    pub fn select_rw_mode(&mut self) -> Result<(), SessionError> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.try_acquire().ok_or(SessionError::BusLocked)?;
        self.require("select_rw_mode", SessionState::Ready)?;

        let result = self.map_interfaces();
        self.settle(result)
    }

    /// Start polling NFC-A, NFC-F, NFC-B and ISO15693.
    pub fn start_discovery(&mut self) -> Result<(), SessionError> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.try_acquire().ok_or(SessionError::BusLocked)?;
        self.require("start_discovery", SessionState::Mapped)?;

        let result = self.discover();
        self.settle(result)
    }

    /// Block until the chip reports something, normally RF_INTF_ACTIVATED_NTF.
    ///
    /// The message is returned as read; checking its kind is up to the caller.
    pub fn wait_for_activation(&mut self) -> Result<Message, SessionError> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.try_acquire().ok_or(SessionError::BusLocked)?;
        self.require("wait_for_activation", SessionState::Discovering)?;

        let result = self.poll_until_message().map_err(SessionError::from);
        let message = self.settle(result)?;
        if let MessageBody::RfIntfActivatedNtf(params) = message.body() {
            info!(
                "Activated {:?} over {:?} ({:?})",
                params.protocol, params.interface, params.mode
            );
        } else {
            debug!("Discovery ended with {:?}", message.kind());
        }
        self.enter(SessionState::Activated);
        Ok(message)
    }

    /// Power the chip down. The session returns to `Idle`.
    pub fn off(&mut self) -> Result<(), SessionError> {
        self.ven.set_low().map_err(TransportError::pin)?;
        self.enter(SessionState::Idle);
        Ok(())
    }

    fn handshake(&mut self) -> Result<FirmwareInfo, SessionError> {
        self.hardware_reset()?;
        self.enter(SessionState::Idle);

        self.enter(SessionState::AwaitingResetRsp);
        let rsp = self.transact(Command::CoreReset, Some(self.config.reset_timeout_ms))?;
        validate(&rsp, MessageKind::CoreResetRsp, CORE_RESET_RSP_MIN_LEN)?;
        let MessageBody::CoreResetRsp(reset) = rsp.body() else {
            return Err(unexpected(MessageKind::CoreResetRsp, &rsp));
        };
        if reset.config_status != CONFIG_RESET {
            return Err(ValidationFailure::ConfigStatus(reset.config_status).into());
        }
        let nci_version = reset.nci_version;

        self.enter(SessionState::AwaitingInitRsp);
        let rsp = self.transact(Command::CoreInit, self.config.response_timeout_ms)?;
        validate(&rsp, MessageKind::CoreInitRsp, CORE_INIT_RSP_MIN_LEN)?;
        let MessageBody::CoreInitRsp(init) = rsp.body() else {
            return Err(unexpected(MessageKind::CoreInitRsp, &rsp));
        };
        let firmware_version = init.firmware_version();
        let rf_interfaces = init.interfaces.len();
        let max_control_payload = init.max_control_payload;
        info!(
            "Firmware version: 0x{:02x} 0x{:02x} 0x{:02x}",
            firmware_version[0], firmware_version[1], firmware_version[2]
        );

        self.enter(SessionState::AwaitingPropActRsp);
        let rsp = self.transact(Command::PropAct, self.config.response_timeout_ms)?;
        validate(&rsp, MessageKind::PropActRsp, PROP_ACT_RSP_MIN_LEN)?;
        let MessageBody::PropActRsp(prop) = rsp.body() else {
            return Err(unexpected(MessageKind::PropActRsp, &rsp));
        };
        if let Some(build) = prop.build_number {
            info!("FW build number: {:02x?}", build);
        }

        let firmware = FirmwareInfo {
            nci_version,
            firmware_version,
            rf_interfaces,
            max_control_payload,
            build_number: prop.build_number,
        };
        self.firmware = Some(firmware.clone());
        self.enter(SessionState::Ready);
        Ok(firmware)
    }

    fn map_interfaces(&mut self) -> Result<(), SessionError> {
        self.enter(SessionState::AwaitingMapRsp);
        let rsp = self.transact(Command::RfDiscoverMapRw, Some(self.config.map_timeout_ms))?;
        validate(&rsp, MessageKind::RfDiscoverMapRsp, RF_RSP_MIN_LEN)?;
        self.enter(SessionState::Mapped);
        Ok(())
    }

    fn discover(&mut self) -> Result<(), SessionError> {
        self.enter(SessionState::AwaitingDiscoverRsp);
        let rsp = self.transact(Command::RfDiscoverRw, self.config.response_timeout_ms)?;
        validate(&rsp, MessageKind::RfDiscoverRsp, RF_RSP_MIN_LEN)?;
        self.enter(SessionState::Discovering);
        Ok(())
    }

    /// VEN low, hold, VEN high, settle.
    fn hardware_reset(&mut self) -> Result<(), TransportError> {
        self.ven.set_low().map_err(TransportError::pin)?;
        self.delay.delay_ms(self.config.reset_low_ms);
        self.ven.set_high().map_err(TransportError::pin)?;
        self.delay.delay_ms(self.config.reset_settle_ms);
        Ok(())
    }

    /// Send `command` and wait for the next message, bounded by `timeout_ms` if set.
    fn transact(&mut self, command: Command, timeout_ms: Option<u32>) -> Result<Message, SessionError> {
        self.transport
            .write_drain_then_send(&mut self.rx, command.bytes())?;
        self.await_message(timeout_ms)?
            .ok_or(SessionError::Timeout {
                awaiting: command.response(),
                timeout_ms: timeout_ms.unwrap_or_default(),
            })
    }

    fn await_message(&mut self, timeout_ms: Option<u32>) -> Result<Option<Message>, TransportError> {
        match timeout_ms {
            Some(timeout_ms) => self.transport.read_one(&mut self.rx, timeout_ms),
            None => self.poll_until_message().map(Some),
        }
    }

    /// Read in `poll_slice_ms` windows until a message arrives.
    fn poll_until_message(&mut self) -> Result<Message, TransportError> {
        loop {
            if let Some(message) = self
                .transport
                .read_one(&mut self.rx, self.config.poll_slice_ms)?
            {
                return Ok(message);
            }
        }
    }

    fn require(&self, operation: &'static str, expected: SessionState) -> Result<(), SessionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SessionError::InvalidState {
                operation,
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }

    fn enter(&mut self, next: SessionState) {
        debug!("{} -> {}", self.state.name(), next.name());
        self.state = next;
    }

    fn settle<T>(&mut self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(err) = &result {
            warn!("{} failed: {err}", self.state.name());
            self.enter(SessionState::Failed(err.clone()));
        }
        result
    }
}

/// Check length, kind, completeness and status of a response, in that order.
fn validate(msg: &Message, expected: MessageKind, min_len: usize) -> Result<(), ValidationFailure> {
    if msg.wire_len() < min_len {
        return Err(ValidationFailure::TooShort {
            kind: msg.kind(),
            expected: min_len,
            actual: msg.wire_len(),
        });
    }
    if msg.kind() != expected {
        return Err(ValidationFailure::UnexpectedKind {
            expected,
            actual: msg.kind(),
        });
    }
    if msg.header().segmented {
        return Err(ValidationFailure::Segmented { kind: expected });
    }
    match msg.status() {
        Some(Status::Ok) => Ok(()),
        Some(status) => Err(ValidationFailure::BadStatus { kind: expected, status }),
        None => Err(ValidationFailure::UnexpectedKind {
            expected,
            actual: msg.kind(),
        }),
    }
}

fn unexpected(expected: MessageKind, msg: &Message) -> SessionError {
    ValidationFailure::UnexpectedKind {
        expected,
        actual: msg.kind(),
    }
    .into()
}
