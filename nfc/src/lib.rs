//! Driver for the NXP PN7150 NFC controller.
//!
//! The PN7150 talks NCI (NFC Controller Interface) over I2C:
//! - SDA, SCL - I2C bus, device address 0x28 by default
//! - IRQ - Ready line, driven high by the chip while a message is pending
//! - VEN - Enable line, pulled low to power the chip down or reset it
//!
//! Every NCI message is:
//! [MT|PBF|GID] [OID] [LEN] [PAYLOAD...]
//!
//! The header has to be read before the payload can be sized, so each
//! message is fetched with two bus reads.
//!
//! Bringing up a reader:
//!
//! ```ignore
//! let lock = Arc::new(BusLock::new());
//! let mut nfc = Session::new(i2c, irq, ven, delay, StdClock::new(), lock, Config::default());
//! let firmware = nfc.connect()?;
//! nfc.select_rw_mode()?;
//! nfc.start_discovery()?;
//! let activated = nfc.wait_for_activation()?;
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod lock;
pub mod nci;
pub mod session;
pub mod transport;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use clock::{elapsed_since, Clock, StdClock, TICKS_PERIOD};
pub use config::Config;
pub use error::{DecodeError, SessionError, TransportError, ValidationFailure};
pub use lock::{BusGuard, BusLock};
pub use nci::{decode, encode, Command, Message, MessageKind, Status};
pub use session::{FirmwareInfo, Session, SessionState};
pub use transport::{Direction, MessageSink, RxBuffer, Transport};
