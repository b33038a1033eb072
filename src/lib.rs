//! Lumi Bridge
//!
//! Drives ROLI LUMI key lighting and plain MIDI keyboards for an ear-training
//! game. Notes are routed so a challenge never sounds on a keyboard that would
//! light up the answer, while lighting commands only reach keyboards that can
//! show them.
//!
//! - [`lumi`]: SysEx frame encoder, 7-bit color packing and the command catalog
//! - [`device`]: port classification (melodic, percussive, controller, lighting)
//! - [`router`]: session selection, note and lighting routing, hot-plug handling
//! - [`sustain`]: held-note bookkeeping
//! - [`transport`]: endpoint traits and the midir backend

pub mod cli;
pub mod config;
pub mod device;
pub mod error;
pub mod lumi;
pub mod midi;
pub mod monitor;
pub mod router;
pub mod sequence;
pub mod sustain;
pub mod theory;
pub mod transport;

pub use config::AppConfig;
pub use device::{Classifier, DeviceKind, Direction, Endpoint};
pub use error::{ProtocolError, TransportError};
pub use router::{Delivery, NoteKind, NoteLength, RouterSettings, Session, SessionRouter};
