//! Note and lighting routing policy

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::{PendingRelease, SessionRouter};
use crate::error::TransportError;
use crate::lumi::{Command, Frame};
use crate::midi::{convert, format_hex, MidiMessage};
use crate::sustain::Transition;
use crate::transport::OutputEndpoint;

/// Why a note is being played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteKind {
    /// The question: must not reach a device that lights up the answer
    Challenge,
    /// Response to the player: every active output
    Feedback,
}

/// How long a routed note sounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteLength {
    /// Note-on only; released through the sustain operations
    Sustain,
    /// Note-on now, note-off after the duration
    Duration(Duration),
}

/// Outcome of a broadcast, per endpoint id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, TransportError)>,
}

impl Delivery {
    /// Ids of every endpoint a send was attempted on
    pub fn attempted(&self) -> Vec<&str> {
        self.delivered
            .iter()
            .map(String::as_str)
            .chain(self.failed.iter().map(|(id, _)| id.as_str()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.failed.is_empty()
    }

    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }

    /// Fold another report in; an id appears in `delivered` once
    pub fn merge(&mut self, other: Delivery) {
        for id in other.delivered {
            if !self.delivered.contains(&id) {
                self.delivered.push(id);
            }
        }
        self.failed.extend(other.failed);
    }
}

/// Send `messages` in order to every target
///
/// A failing endpoint is logged, skips its remaining messages and never
/// stops delivery to the others.
pub(crate) fn broadcast(targets: &[Arc<dyn OutputEndpoint>], messages: &[Vec<u8>]) -> Delivery {
    let mut delivery = Delivery::default();

    for target in targets {
        let id = &target.endpoint().id;
        let result = messages.iter().try_for_each(|msg| {
            trace!("-> {}: {}", id, format_hex(msg));
            target.send(msg)
        });
        match result {
            Ok(()) => delivery.delivered.push(id.clone()),
            Err(e) => {
                warn!("⚠️ Send to {} failed: {}", id, e);
                delivery.failed.push((id.clone(), e));
            }
        }
    }

    delivery
}

impl SessionRouter {
    /// Active outputs allowed to receive a note of this kind
    pub(crate) fn note_targets(&self, kind: NoteKind) -> Vec<Arc<dyn OutputEndpoint>> {
        let outputs = self.state.lock().active_outputs();
        match kind {
            NoteKind::Feedback => outputs,
            NoteKind::Challenge => outputs
                .into_iter()
                .filter(|o| !o.endpoint().shows_lighting())
                .collect(),
        }
    }

    pub(crate) fn lighting_targets(&self) -> Vec<Arc<dyn OutputEndpoint>> {
        self.state
            .lock()
            .active_outputs()
            .into_iter()
            .filter(|o| o.endpoint().shows_lighting())
            .collect()
    }

    /// Play a note on the outputs the kind allows
    ///
    /// `velocity` is 0.0-1.0. A [`NoteLength::Sustain`] note is held until
    /// `stop_sustain`/`stop_all_sustain`; a [`NoteLength::Duration`] note is
    /// released after the hold. Either way the note-off goes to the same class
    /// of outputs as the note-on, and a note that is already sounding is
    /// released before it is played again.
    pub fn route_note(&self, kind: NoteKind, note: u8, velocity: f32, length: NoteLength) -> Delivery {
        let note = note & 0x7F;
        let velocity = convert::velocity_to_7bit(velocity);

        let delivery = match length {
            NoteLength::Sustain => self.hold_note(kind, note, velocity),
            NoteLength::Duration(hold) => self.play_timed(kind, note, velocity, hold),
        };
        debug!("{:?} note {} -> {:?}", kind, note, delivery.delivered);
        delivery
    }

    fn hold_note(&self, kind: NoteKind, note: u8, velocity: u8) -> Delivery {
        let mut delivery = self.release_pending(note, None);
        let transitions = self.state.lock().sustain.start(note, kind, velocity);
        delivery.merge(self.apply_transitions(&transitions));
        delivery
    }

    fn play_timed(&self, kind: NoteKind, note: u8, velocity: u8, hold: Duration) -> Delivery {
        let mut delivery = self.release_pending(note, None);
        let held = self.state.lock().sustain.stop(note);
        delivery.merge(self.apply_transitions(held.as_slice()));

        let targets = self.note_targets(kind);
        if targets.is_empty() {
            debug!("No outputs for {:?} note {}", kind, note);
            return delivery;
        }

        let channel = self.settings.read().note_channel;
        let on = MidiMessage::NoteOn {
            channel,
            note,
            velocity,
        };
        delivery.merge(broadcast(&targets, &[on.encode()]));

        let generation = {
            let mut state = self.state.lock();
            state.next_release += 1;
            let generation = state.next_release;
            state
                .pending_releases
                .insert(note, PendingRelease { generation, targets });
            generation
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let router = self.clone();
                runtime.spawn(async move {
                    tokio::time::sleep(hold).await;
                    router.release_pending(note, Some(generation));
                });
            }
            Err(_) => warn!("No runtime to time note {}; stop_all_sustain releases it", note),
        }

        delivery
    }

    /// Send the note-off owed by a timed note
    ///
    /// With `generation` set, only the timer that scheduled the release may
    /// send it; a retriggered note has a newer generation.
    fn release_pending(&self, note: u8, generation: Option<u64>) -> Delivery {
        let pending = {
            let mut state = self.state.lock();
            let current = state.pending_releases.get(&note).map(|p| p.generation);
            match (current, generation) {
                (None, _) => None,
                (Some(current), Some(g)) if current != g => None,
                _ => state.pending_releases.remove(&note),
            }
        };

        match pending {
            Some(pending) => broadcast(&pending.targets, &[self.note_off(note)]),
            None => Delivery::default(),
        }
    }

    fn note_off(&self, note: u8) -> Vec<u8> {
        MidiMessage::NoteOff {
            channel: self.settings.read().note_channel,
            note,
            velocity: 0,
        }
        .encode()
    }

    /// Send a command frame to the lighting-capable active outputs
    pub fn route_lighting(&self, command: Command) -> Delivery {
        self.route_lighting_batch(&[command])
    }

    /// Send several commands, in order, to each lighting output
    pub(crate) fn route_lighting_batch(&self, commands: &[Command]) -> Delivery {
        let device_id = self.settings.read().device_id;
        let targets = {
            let mut state = self.state.lock();
            for command in commands {
                state.display.record(command);
            }
            state
                .active_outputs()
                .into_iter()
                .filter(|o| o.endpoint().shows_lighting())
                .collect::<Vec<_>>()
        };

        let frames: Vec<Vec<u8>> = commands
            .iter()
            .map(|cmd| cmd.to_frame(device_id).as_bytes().to_vec())
            .collect();
        for cmd in commands {
            debug!("💡 {}", cmd);
        }
        broadcast(&targets, &frames)
    }

    /// Send a prebuilt frame to the lighting outputs without recording it
    pub fn send_frame(&self, frame: &Frame) -> Delivery {
        debug!("💡 raw {}", frame);
        broadcast(&self.lighting_targets(), &[frame.as_bytes().to_vec()])
    }

    /// Turn tracker transitions into MIDI, each to the outputs its note kind allows
    fn apply_transitions(&self, transitions: &[Transition]) -> Delivery {
        let channel = self.settings.read().note_channel;
        let mut delivery = Delivery::default();

        for transition in transitions {
            let (held, message) = match *transition {
                Transition::NoteOn(held) => (
                    held,
                    MidiMessage::NoteOn {
                        channel,
                        note: held.note,
                        velocity: held.velocity,
                    },
                ),
                Transition::NoteOff(held) => (
                    held,
                    MidiMessage::NoteOff {
                        channel,
                        note: held.note,
                        velocity: 0,
                    },
                ),
            };
            delivery.merge(broadcast(&self.note_targets(held.kind), &[message.encode()]));
        }

        delivery
    }

    /// Start a sustained note on every active output (retriggers if sounding)
    pub fn start_sustain(&self, note: u8) -> Delivery {
        let velocity = convert::velocity_to_7bit(self.settings.read().velocity);
        self.hold_note(NoteKind::Feedback, note & 0x7F, velocity)
    }

    /// Release a sustained note; a note that is not sounding sends nothing
    pub fn stop_sustain(&self, note: u8) -> Delivery {
        let transition = self.state.lock().sustain.stop(note);
        self.apply_transitions(transition.as_slice())
    }

    /// Release every held note and every pending timed note now
    pub fn stop_all_sustain(&self) -> Delivery {
        let (transitions, pending) = {
            let mut state = self.state.lock();
            let pending: Vec<u8> = state.pending_releases.keys().copied().collect();
            (state.sustain.stop_all(), pending)
        };

        let mut delivery = self.apply_transitions(&transitions);
        for note in pending {
            delivery.merge(self.release_pending(note, None));
        }
        delivery
    }

    pub fn sounding_notes(&self) -> Vec<u8> {
        self.state.lock().sustain.sounding()
    }
}
