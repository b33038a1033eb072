//! Per-key color message used for scale highlighting
//!
//! ```text
//! F0 00 21 10 | 78 | <note> | <r> <g> <b> | F7
//! ```
//!
//! Color channels are sent as 7-bit values (high bit dropped). No checksum.

use super::color::Rgb;
use super::{KEY_COLOR_MESSAGE_TYPE, SYSEX_END, VENDOR_PREFIX};

pub const KEY_COLOR_LEN: usize = 10;

/// Color a single key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyColor {
    pub note: u8,
    pub color: Rgb,
}

impl KeyColor {
    pub fn new(note: u8, color: Rgb) -> Self {
        Self { note, color }
    }

    pub fn encode(&self) -> [u8; KEY_COLOR_LEN] {
        let mut bytes = [0u8; KEY_COLOR_LEN];
        bytes[..4].copy_from_slice(&VENDOR_PREFIX);
        bytes[4] = KEY_COLOR_MESSAGE_TYPE;
        bytes[5] = self.note & 0x7F;
        bytes[6] = self.color.r & 0x7F;
        bytes[7] = self.color.g & 0x7F;
        bytes[8] = self.color.b & 0x7F;
        bytes[9] = SYSEX_END;
        bytes
    }
}

/// Key colors for every note in `low..high_exclusive`
///
/// Notes whose pitch class is in `note_classes` get `in_scale`, the rest `off_scale`.
pub fn scale_colors(
    note_classes: &[u8],
    low: u8,
    high_exclusive: u8,
    in_scale: Rgb,
    off_scale: Rgb,
) -> Vec<KeyColor> {
    (low..high_exclusive.min(128))
        .map(|note| {
            let color = if note_classes.contains(&(note % 12)) {
                in_scale
            } else {
                off_scale
            };
            KeyColor::new(note, color)
        })
        .collect()
}
