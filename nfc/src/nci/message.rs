//! Message classification and per-kind payload layouts.

use core::fmt;

use super::header;
use super::rf::{RfInterface, RfProtocol, RfTechMode, RfTechParams};
use super::status;
use crate::error::DecodeError;

/// Variable-length field copied out of a payload.
pub type Bytes = heapless::Vec<u8, { header::MAX_PAYLOAD }>;

/// Most (protocol, mode, interface) triples a payload can hold
const MAX_MAPPINGS: usize = header::MAX_PAYLOAD / 3;
/// Most (technology, frequency) pairs a payload can hold
const MAX_DISCOVER_CONFIGS: usize = header::MAX_PAYLOAD / 2;

/// Decoded first three bytes of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Message type, one of `header::MT_*`
    pub message_type: u8,
    pub segmented: bool,
    pub group: u8,
    pub opcode: u8,
    pub payload_len: u8,
}

impl Header {
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        match bytes {
            [b0, b1, len, ..] => Ok(Header {
                message_type: b0 & header::MT_MASK,
                segmented: b0 & header::PBF_SEGMENTED != 0,
                group: b0 & header::GID_MASK,
                opcode: b1 & header::OID_MASK,
                payload_len: *len,
            }),
            _ => Err(DecodeError::TooShort {
                needed: header::LEN,
                available: bytes.len(),
            }),
        }
    }

    /// Header plus payload.
    pub fn message_len(&self) -> usize {
        header::LEN + self.payload_len as usize
    }

    pub fn kind(&self) -> MessageKind {
        use header::*;
        match (self.message_type, self.group, self.opcode) {
            (MT_CMD, GID_CORE, OID_CORE_RESET) => MessageKind::CoreResetCmd,
            (MT_RSP, GID_CORE, OID_CORE_RESET) => MessageKind::CoreResetRsp,
            (MT_CMD, GID_CORE, OID_CORE_INIT) => MessageKind::CoreInitCmd,
            (MT_RSP, GID_CORE, OID_CORE_INIT) => MessageKind::CoreInitRsp,
            (MT_CMD, GID_PROPRIETARY, OID_PROP_ACT) => MessageKind::PropActCmd,
            (MT_RSP, GID_PROPRIETARY, OID_PROP_ACT) => MessageKind::PropActRsp,
            (MT_CMD, GID_RF, OID_RF_DISCOVER_MAP) => MessageKind::RfDiscoverMapCmd,
            (MT_RSP, GID_RF, OID_RF_DISCOVER_MAP) => MessageKind::RfDiscoverMapRsp,
            (MT_CMD, GID_RF, OID_RF_DISCOVER) => MessageKind::RfDiscoverCmd,
            (MT_RSP, GID_RF, OID_RF_DISCOVER) => MessageKind::RfDiscoverRsp,
            (MT_NTF, GID_RF, OID_RF_INTF_ACTIVATED) => MessageKind::RfIntfActivatedNtf,
            (message_type, group, opcode) => MessageKind::Unknown {
                type_group: message_type | group,
                opcode,
            },
        }
    }
}

/// The part of the NCI vocabulary this driver understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    CoreResetCmd,
    CoreResetRsp,
    CoreInitCmd,
    CoreInitRsp,
    PropActCmd,
    PropActRsp,
    RfDiscoverMapCmd,
    RfDiscoverMapRsp,
    RfDiscoverCmd,
    RfDiscoverRsp,
    RfIntfActivatedNtf,
    Unknown { type_group: u8, opcode: u8 },
}

impl MessageKind {
    /// Classify from the first two message bytes.
    pub fn classify(b0: u8, b1: u8) -> Self {
        Header {
            message_type: b0 & header::MT_MASK,
            segmented: false,
            group: b0 & header::GID_MASK,
            opcode: b1 & header::OID_MASK,
            payload_len: 0,
        }
        .kind()
    }
}

/// Response status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Rejected,
    Failed,
    Unknown(u8),
}

impl From<u8> for Status {
    fn from(v: u8) -> Self {
        match v {
            status::OK => Status::Ok,
            status::REJECTED => Status::Rejected,
            status::FAILED => Status::Failed,
            other => Status::Unknown(other),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Rejected => write!(f, "REJECTED"),
            Status::Failed => write!(f, "FAILED"),
            Status::Unknown(code) => write!(f, "0x{code:02x}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreResetInfo {
    pub status: Status,
    pub nci_version: u8,
    /// 0x00 = configuration kept, 0x01 = configuration reset
    pub config_status: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreInitInfo {
    pub status: Status,
    pub features: [u8; 4],
    pub interfaces: heapless::Vec<RfInterface, { header::MAX_PAYLOAD }>,
    pub max_logical_connections: u8,
    pub max_routing_table_size: u16,
    pub max_control_payload: u8,
    pub max_large_param_size: u16,
    pub manufacturer_id: u8,
    /// Hardware version, ROM code version, firmware major, firmware minor
    pub manufacturer_info: [u8; 4],
}

impl CoreInitInfo {
    /// ROM code version, firmware major and minor version.
    pub fn firmware_version(&self) -> [u8; 3] {
        let [_, rom, major, minor] = self.manufacturer_info;
        [rom, major, minor]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropActInfo {
    pub status: Status,
    pub build_number: Option<[u8; 4]>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceMapping {
    pub protocol: RfProtocol,
    /// Bit 0: poll mode, bit 1: listen mode
    pub mode: u8,
    pub interface: RfInterface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverConfig {
    pub tech_mode: RfTechMode,
    /// Discovery periods between polls of this technology
    pub frequency: u8,
}

/// Contents of RF_INTF_ACTIVATED_NTF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationParams {
    pub discovery_id: u8,
    pub interface: RfInterface,
    pub protocol: RfProtocol,
    pub mode: RfTechMode,
    pub max_data_payload: u8,
    pub initial_credits: u8,
    pub tech_params: RfTechParams,
    pub exchange_mode: RfTechMode,
    pub exchange_tx_rate: u8,
    pub exchange_rx_rate: u8,
    pub activation_params: Bytes,
}

/// Kind-specific fields of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    CoreResetCmd { reset_type: u8 },
    CoreResetRsp(CoreResetInfo),
    CoreInitCmd,
    CoreInitRsp(CoreInitInfo),
    PropActCmd,
    PropActRsp(PropActInfo),
    RfDiscoverMapCmd(heapless::Vec<InterfaceMapping, MAX_MAPPINGS>),
    RfDiscoverMapRsp { status: Status },
    RfDiscoverCmd(heapless::Vec<DiscoverConfig, MAX_DISCOVER_CONFIGS>),
    RfDiscoverRsp { status: Status },
    RfIntfActivatedNtf(ActivationParams),
    /// Raw payload of a message outside the supported vocabulary
    Unknown(Bytes),
}

/// A decoded NCI message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: Header,
    kind: MessageKind,
    body: MessageBody,
}

impl Message {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    /// Length on the wire, header included.
    pub fn wire_len(&self) -> usize {
        self.header.message_len()
    }

    /// Status byte of a response.
    pub fn status(&self) -> Option<Status> {
        match &self.body {
            MessageBody::CoreResetRsp(info) => Some(info.status),
            MessageBody::CoreInitRsp(info) => Some(info.status),
            MessageBody::PropActRsp(info) => Some(info.status),
            MessageBody::RfDiscoverMapRsp { status } | MessageBody::RfDiscoverRsp { status } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Decode one message from the start of `bytes`.
///
/// Exactly `3 + bytes[2]` bytes are consumed; anything after that is ignored.
pub fn decode(bytes: &[u8]) -> Result<Message, DecodeError> {
    let header = Header::parse(bytes)?;
    let needed = header.message_len();
    let payload = bytes
        .get(header::LEN..needed)
        .ok_or(DecodeError::TooShort {
            needed,
            available: bytes.len(),
        })?;
    let kind = header.kind();
    let p = Fields::new(payload);

    let body = match kind {
        MessageKind::CoreResetCmd => MessageBody::CoreResetCmd {
            reset_type: p.byte("reset type", 0)?,
        },
        MessageKind::CoreResetRsp => MessageBody::CoreResetRsp(core_reset_rsp(p)?),
        MessageKind::CoreInitCmd => MessageBody::CoreInitCmd,
        MessageKind::CoreInitRsp => MessageBody::CoreInitRsp(core_init_rsp(p)?),
        MessageKind::PropActCmd => MessageBody::PropActCmd,
        MessageKind::PropActRsp => MessageBody::PropActRsp(prop_act_rsp(p)?),
        MessageKind::RfDiscoverMapCmd => MessageBody::RfDiscoverMapCmd(rf_discover_map_cmd(p)?),
        MessageKind::RfDiscoverMapRsp => MessageBody::RfDiscoverMapRsp {
            status: p.byte("status", 0)?.into(),
        },
        MessageKind::RfDiscoverCmd => MessageBody::RfDiscoverCmd(rf_discover_cmd(p)?),
        MessageKind::RfDiscoverRsp => MessageBody::RfDiscoverRsp {
            status: p.byte("status", 0)?.into(),
        },
        MessageKind::RfIntfActivatedNtf => {
            MessageBody::RfIntfActivatedNtf(rf_intf_activated_ntf(p)?)
        }
        MessageKind::Unknown { .. } => MessageBody::Unknown(p.bytes("payload", 0, p.len())?),
    };

    Ok(Message { header, kind, body })
}

fn core_reset_rsp(p: Fields<'_>) -> Result<CoreResetInfo, DecodeError> {
    Ok(CoreResetInfo {
        status: p.byte("status", 0)?.into(),
        nci_version: p.byte("nci version", 1)?,
        config_status: p.byte("configuration status", 2)?,
    })
}

fn core_init_rsp(p: Fields<'_>) -> Result<CoreInitInfo, DecodeError> {
    let n = p.byte("rf interface count", 5)? as usize;
    let interfaces = p
        .slice("rf interfaces", 6, n)?
        .iter()
        .map(|&v| RfInterface::from(v))
        .collect();
    Ok(CoreInitInfo {
        status: p.byte("status", 0)?.into(),
        features: p.array("nfcc features", 1)?,
        interfaces,
        max_logical_connections: p.byte("max logical connections", 6 + n)?,
        max_routing_table_size: p.u16_le("max routing table size", 7 + n)?,
        max_control_payload: p.byte("max control payload", 9 + n)?,
        max_large_param_size: p.u16_le("max large parameter size", 10 + n)?,
        manufacturer_id: p.byte("manufacturer id", 12 + n)?,
        manufacturer_info: p.array("manufacturer info", 13 + n)?,
    })
}

fn prop_act_rsp(p: Fields<'_>) -> Result<PropActInfo, DecodeError> {
    Ok(PropActInfo {
        status: p.byte("status", 0)?.into(),
        // Status-only responses carry no build number
        build_number: match p.len() {
            0 | 1 => None,
            _ => Some(p.array("build number", 1)?),
        },
    })
}

fn rf_discover_map_cmd(
    p: Fields<'_>,
) -> Result<heapless::Vec<InterfaceMapping, MAX_MAPPINGS>, DecodeError> {
    let count = p.byte("mapping count", 0)? as usize;
    let entries = p.slice("mappings", 1, count * 3)?;
    Ok(entries
        .chunks_exact(3)
        .map(|m| InterfaceMapping {
            protocol: m[0].into(),
            mode: m[1],
            interface: m[2].into(),
        })
        .collect())
}

fn rf_discover_cmd(
    p: Fields<'_>,
) -> Result<heapless::Vec<DiscoverConfig, MAX_DISCOVER_CONFIGS>, DecodeError> {
    let count = p.byte("configuration count", 0)? as usize;
    let entries = p.slice("configurations", 1, count * 2)?;
    Ok(entries
        .chunks_exact(2)
        .map(|c| DiscoverConfig {
            tech_mode: c[0].into(),
            frequency: c[1],
        })
        .collect())
}

fn rf_intf_activated_ntf(p: Fields<'_>) -> Result<ActivationParams, DecodeError> {
    let mode = RfTechMode::from(p.byte("activation mode", 3)?);
    let n = p.byte("rf tech params length", 6)? as usize;
    let tech_params = RfTechParams::parse(mode, p.sub("rf tech params", 7, n)?)?;
    // Data exchange block follows the variable-length parameters
    let de = p.sub("data exchange", 7 + n, 4)?;
    let m = de.byte("activation params length", 3)? as usize;
    Ok(ActivationParams {
        discovery_id: p.byte("discovery id", 0)?,
        interface: p.byte("rf interface", 1)?.into(),
        protocol: p.byte("rf protocol", 2)?.into(),
        mode,
        max_data_payload: p.byte("max data payload", 4)?,
        initial_credits: p.byte("initial credits", 5)?,
        tech_params,
        exchange_mode: de.byte("exchange mode", 0)?.into(),
        exchange_tx_rate: de.byte("exchange tx rate", 1)?,
        exchange_rx_rate: de.byte("exchange rx rate", 2)?,
        activation_params: p.bytes("activation params", 11 + n, m)?,
    })
}

/// Bounds-checked view over a payload, or a block nested inside one.
///
/// Offsets in errors are reported relative to the enclosing payload.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Fields<'a> {
    bytes: &'a [u8],
    base: usize,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Fields { bytes, base: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.bytes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub(crate) fn get(&self, at: usize) -> Option<u8> {
        self.bytes.get(at).copied()
    }

    pub(crate) fn slice(&self, field: &'static str, at: usize, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = at + len;
        self.bytes.get(at..end).ok_or(DecodeError::FieldOutOfRange {
            field,
            offset: self.base + end,
            len: self.base + self.bytes.len(),
        })
    }

    pub(crate) fn byte(&self, field: &'static str, at: usize) -> Result<u8, DecodeError> {
        Ok(self.slice(field, at, 1)?[0])
    }

    pub(crate) fn array<const N: usize>(&self, field: &'static str, at: usize) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.slice(field, at, N)?);
        Ok(out)
    }

    pub(crate) fn u16_le(&self, field: &'static str, at: usize) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.array(field, at)?))
    }

    /// Owned copy of a variable-length field.
    pub(crate) fn bytes(&self, field: &'static str, at: usize, len: usize) -> Result<Bytes, DecodeError> {
        let slice = self.slice(field, at, len)?;
        // A payload never exceeds the capacity of `Bytes`
        Bytes::from_slice(slice).map_err(|_| DecodeError::FieldOutOfRange {
            field,
            offset: self.base + at + len,
            len: header::MAX_PAYLOAD,
        })
    }

    /// Nested block of `len` bytes starting at `at`.
    pub(crate) fn sub(&self, field: &'static str, at: usize, len: usize) -> Result<Fields<'a>, DecodeError> {
        Ok(Fields {
            bytes: self.slice(field, at, len)?,
            base: self.base + at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// CORE_INIT_RSP with two RF interfaces, firmware 10.01.0c
    const CORE_INIT_RSP: &[u8] = &[
        0x40, 0x01, 0x13, // header, 17 + 2 bytes
        0x00, // status
        0x1E, 0x03, 0x00, 0x00, // features
        0x02, 0x01, 0x02, // two interfaces: frame, iso-dep
        0x01, // max logical connections
        0x00, 0x02, // max routing table
        0xFF, // max control payload
        0x00, 0x01, // max large params
        0x04, // manufacturer id
        0x62, 0x10, 0x01, 0x0C, // hw, rom, fw major, fw minor
    ];

    /// RF_INTF_ACTIVATED_NTF for an NTAG (T2T over NFC-A, 7 byte UID)
    const ACTIVATED_NTF: &[u8] = &[
        0x61, 0x05, 0x17, // header
        0x01, 0x01, 0x02, 0x00, 0xFF, 0x01, // id, frame, T2T, NFC-A poll, max payload, credits
        0x0C, // rf tech params length
        0x44, 0x00, 0x07, 0x04, 0x6B, 0x2E, 0x52, 0x9A, 0x3C, 0x80, 0x01, 0x00,
        0x00, 0x00, 0x00, // data exchange: mode, tx rate, rx rate
        0x00, // activation params length
    ];

    #[test]
    fn test_core_reset_rsp_fields() {
        let msg = decode(&[0x40, 0x00, 0x03, 0x00, 0x10, 0x01]).unwrap();
        assert_eq!(msg.kind(), MessageKind::CoreResetRsp);
        assert_eq!(msg.wire_len(), 6);
        assert_eq!(
            msg.body(),
            &MessageBody::CoreResetRsp(CoreResetInfo {
                status: Status::Ok,
                nci_version: 0x10,
                config_status: 0x01,
            })
        );
    }

    #[test]
    fn test_core_init_rsp_offsets_follow_interface_count() {
        let msg = decode(CORE_INIT_RSP).unwrap();
        let MessageBody::CoreInitRsp(info) = msg.body() else {
            panic!("unexpected body {:?}", msg.body());
        };
        assert_eq!(info.status, Status::Ok);
        assert_eq!(info.interfaces.as_slice(), &[RfInterface::Frame, RfInterface::IsoDep]);
        assert_eq!(info.max_routing_table_size, 0x0200);
        assert_eq!(info.max_control_payload, 0xFF);
        assert_eq!(info.manufacturer_id, 0x04);
        assert_eq!(info.firmware_version(), [0x10, 0x01, 0x0C]);
    }

    #[test]
    fn test_core_init_rsp_interface_count_past_payload() {
        // Same response but claiming five interfaces
        let mut bytes = CORE_INIT_RSP.to_vec();
        bytes[8] = 0x05;
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::FieldOutOfRange { .. }), "{err:?}");
    }

    #[test]
    fn test_prop_act_rsp_build_number() {
        let msg = decode(&[0x4F, 0x02, 0x05, 0x00, 0x11, 0x22, 0x33, 0x44]).unwrap();
        assert_eq!(msg.kind(), MessageKind::PropActRsp);
        assert_eq!(
            msg.body(),
            &MessageBody::PropActRsp(PropActInfo {
                status: Status::Ok,
                build_number: Some([0x11, 0x22, 0x33, 0x44]),
            })
        );

        let short = decode(&[0x4F, 0x02, 0x01, 0x00]).unwrap();
        assert_eq!(short.status(), Some(Status::Ok));
    }

    #[test]
    fn test_prop_act_rsp_partial_build_number() {
        let err = decode(&[0x4F, 0x02, 0x03, 0x00, 0x11, 0x22]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::FieldOutOfRange {
                field: "build number",
                offset: 5,
                len: 3,
            }
        );
    }

    #[test]
    fn test_status_responses() {
        let map = decode(&[0x41, 0x00, 0x01, 0x00]).unwrap();
        assert_eq!(map.kind(), MessageKind::RfDiscoverMapRsp);
        assert_eq!(map.status(), Some(Status::Ok));

        let discover = decode(&[0x41, 0x03, 0x01, 0x03]).unwrap();
        assert_eq!(discover.kind(), MessageKind::RfDiscoverRsp);
        assert_eq!(discover.status(), Some(Status::Failed));

        let empty = decode(&[0x41, 0x00, 0x00]).unwrap_err();
        assert!(matches!(empty, DecodeError::FieldOutOfRange { field: "status", .. }));
    }

    #[test]
    fn test_activated_ntf() {
        let msg = decode(ACTIVATED_NTF).unwrap();
        assert_eq!(msg.kind(), MessageKind::RfIntfActivatedNtf);
        let MessageBody::RfIntfActivatedNtf(params) = msg.body() else {
            panic!("unexpected body {:?}", msg.body());
        };
        assert_eq!(params.interface, RfInterface::Frame);
        assert_eq!(params.protocol, RfProtocol::T2T);
        assert_eq!(params.mode, RfTechMode::NfcAPassivePoll);
        assert_eq!(params.max_data_payload, 0xFF);
        assert_eq!(
            params.tech_params.nfcid1(),
            Some(&[0x04, 0x6B, 0x2E, 0x52, 0x9A, 0x3C, 0x80][..])
        );
        assert_eq!(params.exchange_mode, RfTechMode::NfcAPassivePoll);
        assert!(params.activation_params.is_empty());
    }

    #[test]
    fn test_activated_ntf_truncated_after_tech_params() {
        // n = 3, but the message stops before the data exchange block is complete
        let bytes = [
            0x61, 0x05, 0x0B, 0x01, 0x01, 0x02, 0x01, 0xFF, 0x01, 0x03, 0xAA, 0xBB, 0xCC, 0x01,
        ];
        assert!(bytes.len() < 9 + 3 + 1 + 4);
        let err = decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            DecodeError::FieldOutOfRange {
                field: "data exchange",
                offset: 14,
                len: 11,
            }
        );
    }

    #[test]
    fn test_consumes_exactly_declared_length() {
        let mut bytes = vec![0x41, 0x00, 0x01, 0x00];
        bytes.extend_from_slice(&[0xDE, 0xAD]);
        let msg = decode(&bytes).unwrap();
        assert_eq!(msg.wire_len(), 4);
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            decode(&[0x40, 0x00]).unwrap_err(),
            DecodeError::TooShort {
                needed: 3,
                available: 2,
            }
        );
        assert_eq!(
            decode(&[0x40, 0x00, 0x03, 0x00, 0x10]).unwrap_err(),
            DecodeError::TooShort {
                needed: 6,
                available: 5,
            }
        );
    }

    #[test]
    fn test_unknown_kind_keeps_payload() {
        let msg = decode(&[0x60, 0x07, 0x02, 0xAB, 0xCD]).unwrap();
        assert_eq!(
            msg.kind(),
            MessageKind::Unknown {
                type_group: 0x60,
                opcode: 0x07,
            }
        );
        assert_eq!(msg.wire_len(), 5);
        assert_eq!(msg.status(), None);
        match msg.body() {
            MessageBody::Unknown(payload) => assert_eq!(payload.as_slice(), &[0xAB, 0xCD]),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_segmentation_flag_kept_on_header() {
        let msg = decode(&[0x50, 0x00, 0x03, 0x00, 0x10, 0x01]).unwrap();
        assert!(msg.header().segmented);
        assert_eq!(msg.kind(), MessageKind::CoreResetRsp);
    }

    #[test]
    fn test_classify_from_two_bytes() {
        assert_eq!(MessageKind::classify(0x61, 0x05), MessageKind::RfIntfActivatedNtf);
        assert_eq!(MessageKind::classify(0x2F, 0x02), MessageKind::PropActCmd);
    }
}
