//! Sustained note tracking
//!
//! Each note is either idle or sounding. The tracker only computes the
//! note-on/note-off transitions; the router turns them into MIDI. A sounding
//! note remembers its [`NoteKind`] so the release reaches the same class of
//! outputs as the note-on.

use std::collections::BTreeMap;

use crate::router::NoteKind;

/// A live sustained note
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeldNote {
    pub note: u8,
    pub kind: NoteKind,
    /// 7-bit note-on velocity
    pub velocity: u8,
}

/// MIDI action implied by a tracker operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    NoteOn(HeldNote),
    NoteOff(HeldNote),
}

#[derive(Debug, Default)]
pub struct SustainTracker {
    notes: BTreeMap<u8, HeldNote>,
}

impl SustainTracker {
    /// Start a note; a note already sounding is released and retriggered
    pub fn start(&mut self, note: u8, kind: NoteKind, velocity: u8) -> Vec<Transition> {
        let held = HeldNote {
            note: note & 0x7F,
            kind,
            velocity: velocity & 0x7F,
        };
        let mut transitions = Vec::with_capacity(2);
        if let Some(previous) = self.notes.insert(held.note, held) {
            transitions.push(Transition::NoteOff(previous));
        }
        transitions.push(Transition::NoteOn(held));
        transitions
    }

    /// Release a note; idle notes produce nothing
    pub fn stop(&mut self, note: u8) -> Option<Transition> {
        self.notes.remove(&(note & 0x7F)).map(Transition::NoteOff)
    }

    /// Release every sounding note, lowest first
    pub fn stop_all(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.notes)
            .into_values()
            .map(Transition::NoteOff)
            .collect()
    }

    pub fn sounding(&self) -> Vec<u8> {
        self.notes.keys().copied().collect()
    }
}
