//! MIDI utilities and message types
//!
//! Channel-message parsing and encoding for note traffic, plus hex helpers
//! for logging SysEx frames.

use std::fmt;

/// MIDI message types seen on trainer ports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },

    /// System Exclusive, including the F0/F7 framing bytes
    SysEx { data: Vec<u8> },
}

impl MidiMessage {
    /// Parse a MIDI message from raw bytes
    pub fn parse(data: &[u8]) -> Option<Self> {
        let status = *data.first()?;

        // Running status is not used by the devices we talk to
        if status < 0x80 {
            return None;
        }

        if status == 0xF0 {
            let end = data.iter().position(|&b| b == 0xF7)?;
            return Some(MidiMessage::SysEx {
                data: data[..=end].to_vec(),
            });
        }

        let channel = status & 0x0F;
        let data1 = data.get(1).map(|b| b & 0x7F);
        let data2 = data.get(2).map(|b| b & 0x7F);

        match status & 0xF0 {
            0x80 => Some(MidiMessage::NoteOff {
                channel,
                note: data1?,
                velocity: data2?,
            }),
            0x90 => {
                let (note, velocity) = (data1?, data2?);
                // Note On with velocity 0 is a Note Off
                if velocity == 0 {
                    Some(MidiMessage::NoteOff { channel, note, velocity: 0 })
                } else {
                    Some(MidiMessage::NoteOn { channel, note, velocity })
                }
            }
            0xB0 => Some(MidiMessage::ControlChange {
                channel,
                cc: data1?,
                value: data2?,
            }),
            0xE0 => {
                let (lsb, msb) = (data1? as u16, data2? as u16);
                Some(MidiMessage::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![0xE0 | (channel & 0x0F), lsb, msb]
            }
            MidiMessage::SysEx { ref data } => data.clone(),
        }
    }

    /// Note number and "is note on" for note messages
    pub fn as_note(&self) -> Option<(u8, u8, bool)> {
        match *self {
            MidiMessage::NoteOn { note, velocity, .. } => Some((note, velocity, true)),
            MidiMessage::NoteOff { note, velocity, .. } => Some((note, velocity, false)),
            _ => None,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{}", channel + 1, value)
            }
            MidiMessage::SysEx { ref data } => {
                write!(f, "SysEx {} bytes", data.len())
            }
        }
    }
}

/// MIDI value conversion utilities
pub mod convert {
    /// Convert a 0.0-1.0 velocity to a 7-bit note velocity (1-127)
    ///
    /// Zero is raised to 1 so a note-on never turns into a note-off.
    pub fn velocity_to_7bit(velocity: f32) -> u8 {
        let v = (velocity.clamp(0.0, 1.0) * 127.0).round() as u8;
        v.max(1)
    }
}

/// Find a port whose name contains `pattern` (case-insensitive)
///
/// An exact name match wins over partial matches.
pub fn find_port_by_substring<T: midir::MidiIO>(io: &T, pattern: &str) -> Option<T::Port> {
    let needle = pattern.to_lowercase();
    let ports = io.ports();
    let names: Vec<String> = ports
        .iter()
        .map(|port| io.port_name(port).unwrap_or_default().to_lowercase())
        .collect();

    let index = names
        .iter()
        .position(|name| *name == needle)
        .or_else(|| names.iter().position(|name| name.contains(&needle)))?;
    ports.into_iter().nth(index)
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_on_parsing() {
        let data = vec![0x90, 60, 100]; // Note On, ch 1, Middle C, velocity 100
        let msg = MidiMessage::parse(&data).unwrap();

        assert_eq!(msg, MidiMessage::NoteOn {
            channel: 0,
            note: 60,
            velocity: 100,
        });
    }

    #[test]
    fn test_note_on_velocity_zero() {
        let data = vec![0x90, 60, 0]; // Note On with velocity 0 = Note Off
        let msg = MidiMessage::parse(&data).unwrap();

        assert_eq!(msg, MidiMessage::NoteOff {
            channel: 0,
            note: 60,
            velocity: 0,
        });
    }

    #[test]
    fn test_truncated_messages() {
        assert_eq!(MidiMessage::parse(&[]), None);
        assert_eq!(MidiMessage::parse(&[0x90, 60]), None);
        assert_eq!(MidiMessage::parse(&[0xF0, 0x00, 0x21]), None);
        assert_eq!(MidiMessage::parse(&[60, 100]), None);
    }

    #[test]
    fn test_sysex_keeps_framing() {
        let data = [0xF0, 0x00, 0x21, 0x10, 0x77, 0x00, 0xF7];
        let msg = MidiMessage::parse(&data).unwrap();
        assert_eq!(msg, MidiMessage::SysEx { data: data.to_vec() });
        assert_eq!(msg.encode(), data.to_vec());
    }

    #[test]
    fn test_pitch_bend() {
        let data = vec![0xE0, 0x00, 0x40]; // Pitch Bend ch 1, center (8192)
        let msg = MidiMessage::parse(&data).unwrap();

        assert_eq!(msg, MidiMessage::PitchBend {
            channel: 0,
            value: 8192,
        });
    }

    #[test]
    fn test_encode_note_messages() {
        let on = MidiMessage::NoteOn { channel: 2, note: 60, velocity: 100 };
        assert_eq!(on.encode(), vec![0x92, 60, 100]);

        let off = MidiMessage::NoteOff { channel: 0, note: 61, velocity: 0 };
        assert_eq!(off.encode(), vec![0x80, 61, 0]);
    }

    #[test]
    fn test_velocity_conversion() {
        assert_eq!(convert::velocity_to_7bit(0.8), 102);
        assert_eq!(convert::velocity_to_7bit(1.5), 127);
        assert_eq!(convert::velocity_to_7bit(0.0), 1);
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0xF0, 0x00, 0x21]), "F0 00 21");
    }
}
