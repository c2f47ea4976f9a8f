//! NCI message codec.
//!
//! Outbound traffic is a handful of fixed command sequences ([`Command`]).
//! Inbound traffic is classified by its first two bytes into a
//! [`MessageKind`] and decoded into typed fields by [`decode`].

mod message;
mod rf;

pub use message::{
    decode, ActivationParams, Bytes, CoreInitInfo, CoreResetInfo, DiscoverConfig, Header, InterfaceMapping,
    Message, MessageBody, MessageKind, PropActInfo, Status,
};
pub use rf::{RfInterface, RfProtocol, RfTechMode, RfTechParams};

/// Framing constants (byte 0 and byte 1 of every message)
pub mod header {
    /// Length of the fixed header: type/group, opcode, payload length
    pub const LEN: usize = 3;
    /// Largest payload a one-byte length can announce
    pub const MAX_PAYLOAD: usize = 255;
    pub const MAX_MESSAGE: usize = LEN + MAX_PAYLOAD;

    // Byte 0: message type (bits 7..5), packet boundary flag (bit 4), group (bits 3..0)
    pub const MT_MASK: u8 = 0xE0;
    pub const PBF_SEGMENTED: u8 = 0x10;
    pub const GID_MASK: u8 = 0x0F;

    pub const MT_DATA: u8 = 0x00;
    pub const MT_CMD: u8 = 0x20;
    pub const MT_RSP: u8 = 0x40;
    pub const MT_NTF: u8 = 0x60;

    pub const GID_CORE: u8 = 0x00;
    pub const GID_RF: u8 = 0x01;
    pub const GID_PROPRIETARY: u8 = 0x0F;

    // Byte 1: opcode (bits 5..0)
    pub const OID_MASK: u8 = 0x3F;

    pub const OID_CORE_RESET: u8 = 0x00;
    pub const OID_CORE_INIT: u8 = 0x01;
    pub const OID_PROP_ACT: u8 = 0x02;
    pub const OID_RF_DISCOVER_MAP: u8 = 0x00;
    pub const OID_RF_DISCOVER: u8 = 0x03;
    pub const OID_RF_INTF_ACTIVATED: u8 = 0x05;
}

/// Handshake command byte sequences
pub mod commands {
    /// Reset type 1: reset configuration
    pub const CORE_RESET: &[u8] = &[0x20, 0x00, 0x01, 0x01];
    pub const CORE_INIT: &[u8] = &[0x20, 0x01, 0x00];
    /// PN7150 proprietary activation, unlocks the vendor extensions
    pub const PROP_ACT: &[u8] = &[0x2F, 0x02, 0x00];

    /// Five (protocol, mode = poll, interface) mappings:
    /// T1T/T2T/T3T -> frame, ISO-DEP -> ISO-DEP, MIFARE Classic -> tag command
    pub const RF_DISCOVER_MAP_RW: &[u8] = &[
        0x21, 0x00, 0x10, 0x05, 0x01, 0x01, 0x01, 0x02, 0x01, 0x01, 0x03, 0x01, 0x01, 0x04, 0x01,
        0x02, 0x80, 0x01, 0x80,
    ];

    /// Poll NFC-A, NFC-F, NFC-B and ISO15693, every discovery period
    pub const RF_DISCOVER_RW: &[u8] = &[
        0x21, 0x03, 0x09, 0x04, 0x00, 0x01, 0x02, 0x01, 0x01, 0x01, 0x06, 0x01,
    ];
}

/// Status codes carried in byte 3 of most responses
pub mod status {
    pub const OK: u8 = 0x00;
    pub const REJECTED: u8 = 0x01;
    pub const FAILED: u8 = 0x03;
}

/// Outbound commands the driver knows how to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    CoreReset,
    CoreInit,
    PropAct,
    RfDiscoverMapRw,
    RfDiscoverRw,
}

impl Command {
    /// Exact wire bytes of this command.
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Command::CoreReset => commands::CORE_RESET,
            Command::CoreInit => commands::CORE_INIT,
            Command::PropAct => commands::PROP_ACT,
            Command::RfDiscoverMapRw => commands::RF_DISCOVER_MAP_RW,
            Command::RfDiscoverRw => commands::RF_DISCOVER_RW,
        }
    }

    /// The response kind the chip answers this command with.
    pub fn response(self) -> MessageKind {
        match self {
            Command::CoreReset => MessageKind::CoreResetRsp,
            Command::CoreInit => MessageKind::CoreInitRsp,
            Command::PropAct => MessageKind::PropActRsp,
            Command::RfDiscoverMapRw => MessageKind::RfDiscoverMapRsp,
            Command::RfDiscoverRw => MessageKind::RfDiscoverRsp,
        }
    }
}

/// Wire bytes for `command`.
pub fn encode(command: Command) -> &'static [u8] {
    command.bytes()
}
