//! Error types for decoding, transport and session operations.

use embedded_hal::{digital, i2c};
use thiserror::Error;

use crate::nci::{MessageKind, Status};

/// A received byte sequence that does not fit its own layout.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer than 3 header bytes, or fewer payload bytes than the header declares.
    #[error("message too short: need {needed} bytes, have {available}")]
    TooShort { needed: usize, available: usize },

    /// An offset derived from an earlier payload byte points past the payload.
    #[error("{field} ends at payload offset {offset}, payload is {len} bytes")]
    FieldOutOfRange {
        field: &'static str,
        offset: usize,
        len: usize,
    },
}

/// Failures while moving a message over the bus.
///
/// Hardware errors are reduced to their embedded-hal kinds so this type is
/// independent of the concrete bus and pin drivers.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("i2c error: {0:?}")]
    Bus(i2c::ErrorKind),

    #[error("pin error: {0:?}")]
    Pin(digital::ErrorKind),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl TransportError {
    pub(crate) fn bus<E: i2c::Error>(err: E) -> Self {
        TransportError::Bus(err.kind())
    }

    pub(crate) fn pin<E: digital::Error>(err: E) -> Self {
        TransportError::Pin(err.kind())
    }
}

/// A well-framed response that is not the one the handshake expects.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("expected {expected:?}, received {actual:?}")]
    UnexpectedKind {
        expected: MessageKind,
        actual: MessageKind,
    },

    #[error("{kind:?} returned status {status}")]
    BadStatus { kind: MessageKind, status: Status },

    #[error("{kind:?} is {actual} bytes, need at least {expected}")]
    TooShort {
        kind: MessageKind,
        expected: usize,
        actual: usize,
    },

    #[error("configuration status 0x{0:02x}, expected 0x01")]
    ConfigStatus(u8),

    /// Only the first segment of a response arrived.
    #[error("{kind:?} is segmented")]
    Segmented { kind: MessageKind },
}

/// Outcome of a failed session operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The shared bus lock was already taken.
    #[error("bus is held by another operation")]
    BusLocked,

    #[error("{operation} requires state {expected}, session is {actual}")]
    InvalidState {
        operation: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("no {awaiting:?} within {timeout_ms} ms")]
    Timeout {
        awaiting: MessageKind,
        timeout_ms: u32,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid response: {0}")]
    Validation(#[from] ValidationFailure),
}
