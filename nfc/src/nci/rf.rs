//! RF interface, protocol and technology values carried in RF messages.

use super::message::{Bytes, Fields};
use crate::error::DecodeError;

/// RF interface the chip routes a protocol to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfInterface {
    Frame,
    IsoDep,
    NfcDep,
    /// PN7150 proprietary interface for MIFARE Classic
    TagCmd,
    Other(u8),
}

impl From<u8> for RfInterface {
    fn from(v: u8) -> Self {
        match v {
            0x01 => RfInterface::Frame,
            0x02 => RfInterface::IsoDep,
            0x03 => RfInterface::NfcDep,
            0x80 => RfInterface::TagCmd,
            other => RfInterface::Other(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfProtocol {
    T1T,
    T2T,
    T3T,
    IsoDep,
    NfcDep,
    /// ISO15693
    T5T,
    MifareClassic,
    Other(u8),
}

impl From<u8> for RfProtocol {
    fn from(v: u8) -> Self {
        match v {
            0x01 => RfProtocol::T1T,
            0x02 => RfProtocol::T2T,
            0x03 => RfProtocol::T3T,
            0x04 => RfProtocol::IsoDep,
            0x05 => RfProtocol::NfcDep,
            0x06 => RfProtocol::T5T,
            0x80 => RfProtocol::MifareClassic,
            other => RfProtocol::Other(other),
        }
    }
}

/// RF technology and mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfTechMode {
    NfcAPassivePoll,
    NfcBPassivePoll,
    NfcFPassivePoll,
    /// ISO15693
    NfcVPassivePoll,
    Other(u8),
}

impl From<u8> for RfTechMode {
    fn from(v: u8) -> Self {
        match v {
            0x00 => RfTechMode::NfcAPassivePoll,
            0x01 => RfTechMode::NfcBPassivePoll,
            0x02 => RfTechMode::NfcFPassivePoll,
            0x06 => RfTechMode::NfcVPassivePoll,
            other => RfTechMode::Other(other),
        }
    }
}

/// RF technology specific parameters of an activated target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RfTechParams {
    /// NFC-A passive poll mode
    NfcA {
        sens_res: [u8; 2],
        /// UID, 4, 7 or 10 bytes (empty if the chip did not report one)
        nfcid1: Bytes,
        sel_res: Option<u8>,
    },
    /// Any other mode, kept undecoded
    Raw(Bytes),
}

impl RfTechParams {
    /// Decode the parameter block `block` reported for `mode`.
    ///
    /// NFC-A layout: SENS_RES (2), NFCID1 length, NFCID1, SEL_RES length, SEL_RES.
    pub(crate) fn parse(mode: RfTechMode, block: Fields<'_>) -> Result<Self, DecodeError> {
        match mode {
            RfTechMode::NfcAPassivePoll if !block.is_empty() => {
                let sens_res = block.array::<2>("sens_res", 0)?;
                let nfcid1_len = block.byte("nfcid1 length", 2)? as usize;
                let nfcid1 = block.bytes("nfcid1", 3, nfcid1_len)?;
                let sel_res_at = 3 + nfcid1_len;
                let sel_res = match block.get(sel_res_at) {
                    Some(0) | None => None,
                    Some(_) => Some(block.byte("sel_res", sel_res_at + 1)?),
                };
                Ok(RfTechParams::NfcA {
                    sens_res,
                    nfcid1,
                    sel_res,
                })
            }
            _ => Ok(RfTechParams::Raw(block.bytes("rf tech params", 0, block.len())?)),
        }
    }

    /// UID of an NFC-A target.
    pub fn nfcid1(&self) -> Option<&[u8]> {
        match self {
            RfTechParams::NfcA { nfcid1, .. } if !nfcid1.is_empty() => Some(nfcid1.as_slice()),
            _ => None,
        }
    }
}
