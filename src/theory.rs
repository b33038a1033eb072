//! Pitch classes, note names and key signatures
//!
//! MIDI numbering with C4 = 60.

use crate::error::ProtocolError;
use crate::lumi::{RootKey, Scale};

/// Pitch classes (0-11) of a scale built on `root`, in scale order
pub fn scale_note_classes(root: RootKey, scale: Scale) -> Vec<u8> {
    scale
        .intervals()
        .iter()
        .map(|interval| (interval + root.pitch_class()) % 12)
        .collect()
}

/// Parse a key signature like `"C-major"`, `"F#-minor"` or `"D-harmonic-minor"`
pub fn parse_key_signature(text: &str) -> Result<(RootKey, Scale), ProtocolError> {
    let (tonic, scale) = text
        .trim()
        .split_once('-')
        .ok_or_else(|| ProtocolError::lookup("key signature", text))?;
    Ok((tonic.parse()?, scale.parse()?))
}

/// Convert a note name like `"C4"`, `"Bb3"` or `"F#-1"` to a MIDI note number
pub fn note_to_midi(name: &str) -> Result<u8, ProtocolError> {
    let name = name.trim();
    let split = name
        .char_indices()
        .find(|&(i, c)| i > 0 && (c.is_ascii_digit() || c == '-'))
        .map(|(i, _)| i)
        .ok_or_else(|| ProtocolError::lookup("note", name))?;

    let (pitch, octave) = name.split_at(split);
    let key: RootKey = pitch.parse().map_err(|_| ProtocolError::lookup("note", name))?;
    let octave: i32 = octave
        .parse()
        .map_err(|_| ProtocolError::lookup("note", name))?;

    let midi = 12 * (octave + 1) + key.pitch_class() as i32;
    if !(0..=127).contains(&midi) {
        return Err(ProtocolError::validation(format!(
            "note {} is outside the MIDI range",
            name
        )));
    }
    Ok(midi as u8)
}

/// Sharp-spelled name of a MIDI note (`60` -> `"C4"`)
pub fn note_name(note: u8) -> String {
    let octave = (note / 12) as i32 - 1;
    format!("{}{}", RootKey::from_pitch_class(note % 12).name(), octave)
}

/// Parse an inclusive note range like `"C3-C5"`
pub fn parse_range(text: &str) -> Result<(u8, u8), ProtocolError> {
    let text = text.trim();
    // The separator is the first '-' that follows an octave digit
    let split = text
        .char_indices()
        .skip(1)
        .find(|&(i, c)| {
            c == '-'
                && text[..i]
                    .chars()
                    .last()
                    .is_some_and(|prev| prev.is_ascii_digit())
        })
        .map(|(i, _)| i)
        .ok_or_else(|| ProtocolError::lookup("note range", text))?;

    let low = note_to_midi(&text[..split])?;
    let high = note_to_midi(&text[split + 1..])?;
    if low > high {
        return Err(ProtocolError::validation(format!(
            "note range {} is inverted",
            text
        )));
    }
    Ok((low, high))
}
