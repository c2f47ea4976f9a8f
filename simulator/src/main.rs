//! PN7150 desktop simulator
//!
//! Runs the full reader bring-up (reset, init, activation, RW mapping,
//! discovery) against a scripted chip and logs every NCI message.
//!
//! # Usage
//! ```bash
//! cargo run -p pn7150-simulator
//!
//! # More detail, and a chip that rejects its first two resets
//! RUST_LOG=debug SIM_REJECT_RESETS=2 SIM_ATTEMPTS=4 cargo run -p pn7150-simulator
//! ```
//!
//! # Environment
//! - PN7150_ADDRESS: I2C address (`0x28`)
//! - PN7150_RESPONSE_TIMEOUT_MS: bound for init/activation/discover responses (unbounded)
//! - PN7150_POLL_SLICE_MS: poll window of unbounded waits (5)
//! - SIM_ATTEMPTS: handshake attempts before giving up (3)
//! - SIM_REJECT_RESETS: leading attempts whose reset is rejected (1)

mod config;
mod dump;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use pn7150::nci::{commands, MessageBody};
use pn7150::sim::{replies, ManualClock, SimDelay, SimI2c, SimIrq, SimVen, SimulatedChip};
use pn7150::{BusLock, Message, Session};

use crate::config::SimConfig;
use crate::dump::{hex, LoggingSink};

type SimSession = Session<SimI2c, SimIrq, SimVen, SimDelay, ManualClock, LoggingSink>;

/// CORE_RESET_RSP with status REJECTED
const REJECTED_RESET_RSP: &[u8] = &[0x40, 0x00, 0x03, 0x01, 0x10, 0x01];

fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = SimConfig::from_env().context("loading simulator configuration")?;
    info!("PN7150 Simulator");
    info!(
        "Address 0x{:02x}, {} attempts, {} rejected resets",
        config.driver.address, config.attempts, config.reject_resets
    );

    let chip = SimulatedChip::pn7150();
    let mut nfc: SimSession = Session::new(
        chip.i2c(),
        chip.irq(),
        chip.ven(),
        chip.delay(),
        chip.clock(),
        Arc::new(BusLock::new()),
        config.driver.clone(),
    )
    .with_sink(LoggingSink::default());

    for attempt in 1..=config.attempts {
        let reset_reply = if attempt <= config.reject_resets {
            REJECTED_RESET_RSP
        } else {
            replies::CORE_RESET_RSP
        };
        chip.on_command(commands::CORE_RESET, &[reset_reply]);

        info!("Attempt {attempt}/{}", config.attempts);
        match bring_up(&mut nfc) {
            Ok(activated) => {
                report(&activated);
                let sink = nfc.sink_mut();
                info!(
                    "Done after {} ms: {} sent, {} received, {} discarded",
                    chip.time(),
                    sink.sent,
                    sink.received,
                    sink.discarded
                );
                nfc.off()?;
                return Ok(());
            }
            Err(err) => warn!("Attempt {attempt} failed: {err}"),
        }
    }

    bail!("no target activated after {} attempts", config.attempts)
}

fn bring_up(nfc: &mut SimSession) -> Result<Message> {
    let firmware = nfc.connect().context("connect")?;
    info!(
        "Connected: NCI 0x{:02x}, firmware {:02x}.{:02x}.{:02x}, {} RF interfaces",
        firmware.nci_version,
        firmware.firmware_version[0],
        firmware.firmware_version[1],
        firmware.firmware_version[2],
        firmware.rf_interfaces
    );
    nfc.select_rw_mode().context("select RW mode")?;
    nfc.start_discovery().context("start discovery")?;
    info!("Waiting for a target...");
    nfc.wait_for_activation().context("wait for activation")
}

fn report(message: &Message) {
    match message.body() {
        MessageBody::RfIntfActivatedNtf(params) => match params.tech_params.nfcid1() {
            Some(uid) => info!("Tag present, NFCID1 {}", hex(uid)),
            None => info!("Tag present ({:?}), no NFCID1", params.mode),
        },
        _ => warn!("Discovery ended with {:?}", message.kind()),
    }
}
