//! Human-readable rendering of NCI traffic.

use std::fmt::Write as _;

use log::{info, warn};
use pn7150::nci::{MessageBody, RfTechParams};
use pn7150::{DecodeError, Direction, Message, MessageSink};

/// Logs every message the driver moves.
#[derive(Debug, Default)]
pub struct LoggingSink {
    pub sent: usize,
    pub received: usize,
    pub discarded: usize,
}

impl MessageSink for LoggingSink {
    fn on_message(&mut self, direction: Direction, raw: &[u8], decoded: &Result<Message, DecodeError>) {
        let arrow = match direction {
            Direction::Sent => {
                self.sent += 1;
                ">"
            }
            Direction::Received => {
                self.received += 1;
                "<"
            }
            Direction::Discarded => {
                self.discarded += 1;
                "x"
            }
        };
        match decoded {
            Ok(message) => info!("{arrow} {}", describe(message)),
            Err(err) => warn!("{arrow} {} ({err})", hex(raw)),
        }
    }
}

/// One-line summary of a decoded message.
pub fn describe(message: &Message) -> String {
    let mut out = format!("{:?}", message.kind());
    match message.body() {
        MessageBody::CoreResetCmd { reset_type } => {
            let _ = write!(out, " reset_type=0x{reset_type:02x}");
        }
        MessageBody::CoreResetRsp(info) => {
            let _ = write!(
                out,
                " {} nci=0x{:02x} config=0x{:02x}",
                info.status, info.nci_version, info.config_status
            );
        }
        MessageBody::CoreInitRsp(info) => {
            let fw = info.firmware_version();
            let _ = write!(
                out,
                " {} fw={:02x}.{:02x}.{:02x} interfaces={:?} max_ctrl={}",
                info.status,
                fw[0],
                fw[1],
                fw[2],
                info.interfaces.as_slice(),
                info.max_control_payload
            );
        }
        MessageBody::PropActRsp(info) => {
            let _ = write!(out, " {}", info.status);
            if let Some(build) = info.build_number {
                let _ = write!(out, " build={}", hex(&build));
            }
        }
        MessageBody::RfDiscoverMapCmd(mappings) => {
            for m in mappings {
                let _ = write!(out, " {:?}->{:?}", m.protocol, m.interface);
            }
        }
        MessageBody::RfDiscoverCmd(configs) => {
            let modes: Vec<_> = configs.iter().map(|c| c.tech_mode).collect();
            let _ = write!(out, " {modes:?}");
        }
        MessageBody::RfDiscoverMapRsp { status } | MessageBody::RfDiscoverRsp { status } => {
            let _ = write!(out, " {status}");
        }
        MessageBody::RfIntfActivatedNtf(params) => {
            let _ = write!(
                out,
                " id={} {:?} over {:?} {:?}",
                params.discovery_id, params.protocol, params.interface, params.mode
            );
            match &params.tech_params {
                RfTechParams::NfcA { sens_res, nfcid1, sel_res } => {
                    let _ = write!(out, " sens_res={}", hex(sens_res));
                    if !nfcid1.is_empty() {
                        let _ = write!(out, " nfcid1={}", hex(nfcid1));
                    }
                    if let Some(sel_res) = sel_res {
                        let _ = write!(out, " sel_res=0x{sel_res:02x}");
                    }
                }
                RfTechParams::Raw(bytes) if !bytes.is_empty() => {
                    let _ = write!(out, " params={}", hex(bytes));
                }
                RfTechParams::Raw(_) => {}
            }
        }
        MessageBody::CoreInitCmd | MessageBody::PropActCmd => {}
        MessageBody::Unknown(payload) => {
            let _ = write!(out, " {}", hex(payload));
        }
    }
    out
}

/// Colon separated upper-case hex, `04:6B:2E`.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}
