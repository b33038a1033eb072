//! Session router - decides which endpoint receives which message
//!
//! The router owns:
//! - The registry of connected input/output ports
//! - The active session (preferred ids resolved against connected ports)
//! - Note subscriptions of active inputs
//! - The last commanded display state, replayed on reconnect
//! - Sustained notes and the light sequence slot
//!
//! Challenge notes never reach an output that also shows the answer through
//! key lighting. Every operation locks the state only to compute its targets;
//! the sends happen after the lock is released.

mod display;
mod hotplug;
mod lighting;
mod routing;
mod session;

pub use display::{DisplayState, Highlight};
pub use routing::{Delivery, NoteKind, NoteLength};
pub use session::Session;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::device::Endpoint;
use crate::lumi::{palette, Brightness, DeviceId, Rgb};
use crate::sequence::{SequencePlayer, FLASH_HOLD};
use crate::sustain::SustainTracker;
use crate::transport::{InputEndpoint, NoteEvent, NoteSubscription, OutputEndpoint};

/// Capacity of the note event channel
const NOTE_CHANNEL_CAPACITY: usize = 1000;

/// Tunables applied by the router, derived from [`AppConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct RouterSettings {
    pub device_id: DeviceId,
    /// MIDI channel 0-15 for outgoing notes
    pub note_channel: u8,
    /// Velocity 0.0-1.0 for sustained notes
    pub velocity: f32,
    pub brightness: Brightness,
    pub resting_color: Rgb,
    pub highlight_color: Rgb,
    pub off_scale_color: Rgb,
    pub flash_hold: Duration,
    /// Newly connected devices join the session even if not listed
    pub auto_join: bool,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            device_id: DeviceId::DEFAULT,
            note_channel: 0,
            velocity: 0.8,
            brightness: Brightness::Full,
            resting_color: palette::BRIGHT_BLUE,
            highlight_color: palette::BRIGHT_BLUE,
            off_scale_color: palette::OFF,
            flash_hold: FLASH_HOLD,
            auto_join: true,
        }
    }
}

impl RouterSettings {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let lumi = &config.lumi;
        Ok(Self {
            device_id: DeviceId::new(lumi.device_id)?,
            note_channel: config.midi.note_channel.saturating_sub(1) & 0x0F,
            velocity: config.midi.velocity,
            brightness: lumi.brightness,
            resting_color: lumi.resting_color.parse()?,
            highlight_color: lumi.highlight_color.parse()?,
            off_scale_color: lumi.off_scale_color.parse()?,
            flash_hold: Duration::from_millis(lumi.flash_hold_ms),
            auto_join: config.devices.auto_join,
        })
    }
}

/// Mutable router state, guarded by a single mutex
#[derive(Default)]
pub(crate) struct RouterState {
    /// Connected ports in arrival order
    pub(crate) inputs: Vec<Arc<dyn InputEndpoint>>,
    pub(crate) outputs: Vec<Arc<dyn OutputEndpoint>>,
    pub(crate) session: Session,
    /// Live subscriptions of active inputs, by endpoint id
    pub(crate) subscriptions: HashMap<String, NoteSubscription>,
    pub(crate) display: DisplayState,
    pub(crate) sustain: SustainTracker,
    /// Timed note-offs not yet sent, one per note
    pub(crate) pending_releases: HashMap<u8, PendingRelease>,
    pub(crate) next_release: u64,
}

/// Note-off owed by a timed note
pub(crate) struct PendingRelease {
    /// Only the timer holding this generation may send the note-off
    pub(crate) generation: u64,
    pub(crate) targets: Vec<Arc<dyn OutputEndpoint>>,
}

impl RouterState {
    fn connected_inputs(&self) -> Vec<Endpoint> {
        self.inputs.iter().map(|i| i.endpoint().clone()).collect()
    }

    fn connected_outputs(&self) -> Vec<Endpoint> {
        self.outputs.iter().map(|o| o.endpoint().clone()).collect()
    }

    /// Re-derive the active sets from the preferences
    fn resolve_session(&mut self) {
        self.session.active_inputs =
            session::resolve(&self.session.preferred_inputs, &self.connected_inputs());
        self.session.active_outputs =
            session::resolve(&self.session.preferred_outputs, &self.connected_outputs());
    }

    fn active_outputs(&self) -> Vec<Arc<dyn OutputEndpoint>> {
        self.session
            .active_outputs
            .iter()
            .filter_map(|ep| self.outputs.iter().find(|o| o.endpoint().id == ep.id).cloned())
            .collect()
    }

    fn input(&self, id: &str) -> Option<Arc<dyn InputEndpoint>> {
        self.inputs.iter().find(|i| i.endpoint().id == id).cloned()
    }
}

/// Routes notes and lighting commands to the active endpoints
#[derive(Clone)]
pub struct SessionRouter {
    pub(crate) settings: Arc<RwLock<RouterSettings>>,
    pub(crate) state: Arc<Mutex<RouterState>>,
    pub(crate) sequences: Arc<SequencePlayer>,
    note_tx: mpsc::Sender<NoteEvent>,
    note_rx: Arc<Mutex<Option<mpsc::Receiver<NoteEvent>>>>,
}

impl SessionRouter {
    pub fn new(settings: RouterSettings) -> Self {
        let (note_tx, note_rx) = mpsc::channel(NOTE_CHANNEL_CAPACITY);
        Self {
            settings: Arc::new(RwLock::new(settings)),
            state: Arc::new(Mutex::new(RouterState::default())),
            sequences: Arc::new(SequencePlayer::new()),
            note_tx,
            note_rx: Arc::new(Mutex::new(Some(note_rx))),
        }
    }

    /// Take the receiver of notes played on active inputs (once)
    pub fn take_note_receiver(&self) -> Option<mpsc::Receiver<NoteEvent>> {
        self.note_rx.lock().take()
    }

    pub fn settings(&self) -> RouterSettings {
        self.settings.read().clone()
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        self.state.lock().session.clone()
    }

    pub fn primary_lighting_output(&self) -> Option<Endpoint> {
        self.state.lock().session.primary_lighting_output().cloned()
    }

    pub fn display_state(&self) -> DisplayState {
        self.state.lock().display.clone()
    }

    /// Every connected endpoint, inputs first
    pub fn connected(&self) -> Vec<Endpoint> {
        let state = self.state.lock();
        let mut all = state.connected_inputs();
        all.extend(state.connected_outputs());
        all
    }

    /// Replace the active input set
    ///
    /// Unknown ids are kept as preferences and join when they connect.
    /// Inputs that stay active keep their existing subscription.
    pub fn set_active_inputs<I, S>(&self, ids: I) -> Session
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        state.session.preferred_inputs = session::dedup_ids(ids);
        state.resolve_session();
        self.sync_subscriptions(&mut state);
        debug!(
            "Active inputs: {:?}",
            state.session.active_inputs.iter().map(|e| &e.id).collect::<Vec<_>>()
        );
        state.session.clone()
    }

    /// Replace the active output set
    pub fn set_active_outputs<I, S>(&self, ids: I) -> Session
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        state.session.preferred_outputs = session::dedup_ids(ids);
        state.resolve_session();
        debug!(
            "Active outputs: {:?}",
            state.session.active_outputs.iter().map(|e| &e.id).collect::<Vec<_>>()
        );
        state.session.clone()
    }

    /// Attach to added active inputs and detach from removed ones
    fn sync_subscriptions(&self, state: &mut RouterState) {
        let active: Vec<String> = state
            .session
            .active_inputs
            .iter()
            .map(|ep| ep.id.clone())
            .collect();

        // Dropping a subscription detaches its handler
        state.subscriptions.retain(|id, _| active.contains(id));

        for id in active {
            if state.subscriptions.contains_key(&id) {
                continue;
            }
            let Some(input) = state.input(&id) else {
                continue;
            };
            let tx = self.note_tx.clone();
            let handler = Arc::new(move |event: NoteEvent| {
                // Drop notes rather than block the MIDI callback thread
                let _ = tx.try_send(event);
            });
            match input.on_note(handler) {
                Ok(subscription) => {
                    debug!("Subscribed to notes from {}", id);
                    state.subscriptions.insert(id, subscription);
                }
                Err(e) => warn!("⚠️ Could not listen to {}: {}", id, e),
            }
        }
    }

    /// Number of live note subscriptions
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }
}
