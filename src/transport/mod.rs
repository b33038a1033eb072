//! Transport contracts
//!
//! The router only talks to endpoints through these traits. The midir
//! backend lives in [`midir`]; tests substitute in-memory fakes.

pub mod midir;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::device::Endpoint;
use crate::error::TransportError;

/// A port the application can write MIDI bytes to
pub trait OutputEndpoint: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    /// Send one complete MIDI message
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// A port the application can listen to for notes
pub trait InputEndpoint: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    /// Attach a note handler; dropping the subscription detaches it
    fn on_note(&self, handler: NoteHandler) -> Result<NoteSubscription, TransportError>;
}

/// Note played on an input endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct NoteEvent {
    pub endpoint_id: String,
    pub note: u8,
    pub velocity: u8,
    /// false for note-off (including note-on with velocity 0)
    pub on: bool,
    pub timestamp: Instant,
}

pub type NoteHandler = Arc<dyn Fn(NoteEvent) + Send + Sync>;

/// Live note subscription, detached on drop
pub struct NoteSubscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl NoteSubscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    pub fn detach(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for NoteSubscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for NoteSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NoteSubscription")
            .field("attached", &self.detach.is_some())
            .finish()
    }
}

/// Handle to a connected port of either direction
#[derive(Clone)]
pub enum Port {
    Input(Arc<dyn InputEndpoint>),
    Output(Arc<dyn OutputEndpoint>),
}

impl Port {
    pub fn endpoint(&self) -> &Endpoint {
        match self {
            Port::Input(input) => input.endpoint(),
            Port::Output(output) => output.endpoint(),
        }
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Input(input) => write!(f, "Input({})", input.endpoint().id),
            Port::Output(output) => write!(f, "Output({})", output.endpoint().id),
        }
    }
}

/// Device arrival or removal
#[derive(Debug, Clone)]
pub enum HotplugEvent {
    Connected(Port),
    Disconnected(Endpoint),
}

/// Endpoints present in `current` but not `previous`, and the reverse
pub fn diff_endpoints(previous: &[Endpoint], current: &[Endpoint]) -> (Vec<Endpoint>, Vec<Endpoint>) {
    let same = |a: &Endpoint, b: &Endpoint| a.id == b.id && a.direction == b.direction;

    let added = current
        .iter()
        .filter(|ep| !previous.iter().any(|old| same(old, ep)))
        .cloned()
        .collect();
    let removed = previous
        .iter()
        .filter(|ep| !current.iter().any(|new| same(new, ep)))
        .cloned()
        .collect();

    (added, removed)
}
