//! LUMI command catalog
//!
//! Every configurable display setting is a closed enum mapped to its fixed
//! 8-byte payload. Only the `FromStr` impls can fail, when a user-facing name
//! is not recognized.
//!
//! Root key and scale payloads are an index packed as
//! `lo = base | (index & 3) << 5`, `hi = index >> 2`. The tables below are the
//! ones captured from the LUMI desktop app; the earlier 0x10-step root key
//! table (C# = 0x13, ...) was wrong and is not supported.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

use super::codec::{decode_color, encode_color};
use super::color::Rgb;
use super::frame::Payload8;

const GROUP: u8 = 0x10;
const TOPIC_PRIMARY_COLOR: u8 = 0x20;
const TOPIC_ROOT: u8 = 0x30;
const TOPIC_DISPLAY: u8 = 0x40;
const TOPIC_SCALE: u8 = 0x60;
const COLOR_SUFFIX: u8 = 0x03;

fn indexed(topic: u8, base: u8, index: u8) -> Payload8 {
    [
        GROUP,
        topic,
        base | ((index & 0x03) << 5),
        index >> 2,
        0,
        0,
        0,
        0,
    ]
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase().replace(['_', ' '], "-")
}

/// Tonal center, one variant per pitch class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootKey {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl RootKey {
    pub const ALL: [RootKey; 12] = [
        RootKey::C,
        RootKey::CSharp,
        RootKey::D,
        RootKey::DSharp,
        RootKey::E,
        RootKey::F,
        RootKey::FSharp,
        RootKey::G,
        RootKey::GSharp,
        RootKey::A,
        RootKey::ASharp,
        RootKey::B,
    ];

    /// Pitch class 0-11 (C = 0)
    pub fn pitch_class(self) -> u8 {
        self as u8
    }

    pub fn from_pitch_class(pc: u8) -> Self {
        Self::ALL[(pc % 12) as usize]
    }

    pub fn payload(self) -> Payload8 {
        indexed(TOPIC_ROOT, 0x03, self.pitch_class())
    }

    /// Sharp spelling used in logs and the REPL
    pub fn name(self) -> &'static str {
        match self {
            RootKey::C => "C",
            RootKey::CSharp => "C#",
            RootKey::D => "D",
            RootKey::DSharp => "D#",
            RootKey::E => "E",
            RootKey::F => "F",
            RootKey::FSharp => "F#",
            RootKey::G => "G",
            RootKey::GSharp => "G#",
            RootKey::A => "A",
            RootKey::ASharp => "A#",
            RootKey::B => "B",
        }
    }
}

impl FromStr for RootKey {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = match s.trim().to_lowercase().as_str() {
            "c" | "b#" => RootKey::C,
            "c#" | "db" => RootKey::CSharp,
            "d" => RootKey::D,
            "d#" | "eb" => RootKey::DSharp,
            "e" | "fb" => RootKey::E,
            "f" | "e#" => RootKey::F,
            "f#" | "gb" => RootKey::FSharp,
            "g" => RootKey::G,
            "g#" | "ab" => RootKey::GSharp,
            "a" => RootKey::A,
            "a#" | "bb" => RootKey::ASharp,
            "b" | "cb" => RootKey::B,
            _ => return Err(ProtocolError::lookup("root key", s)),
        };
        Ok(key)
    }
}

impl fmt::Display for RootKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Scale shown by the keyboard around the root key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scale {
    Major,
    Minor,
    HarmonicMinor,
    PentatonicNeutral,
    PentatonicMajor,
    PentatonicMinor,
    Blues,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    WholeTone,
    ArabicA,
    ArabicB,
    Japanese,
    Ryukyu,
    EightToneSpanish,
    Chromatic,
}

impl Scale {
    pub const ALL: [Scale; 19] = [
        Scale::Major,
        Scale::Minor,
        Scale::HarmonicMinor,
        Scale::PentatonicNeutral,
        Scale::PentatonicMajor,
        Scale::PentatonicMinor,
        Scale::Blues,
        Scale::Dorian,
        Scale::Phrygian,
        Scale::Lydian,
        Scale::Mixolydian,
        Scale::Locrian,
        Scale::WholeTone,
        Scale::ArabicA,
        Scale::ArabicB,
        Scale::Japanese,
        Scale::Ryukyu,
        Scale::EightToneSpanish,
        Scale::Chromatic,
    ];

    pub fn payload(self) -> Payload8 {
        indexed(TOPIC_SCALE, 0x02, self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Scale::Major => "major",
            Scale::Minor => "minor",
            Scale::HarmonicMinor => "harmonic-minor",
            Scale::PentatonicNeutral => "pentatonic-neutral",
            Scale::PentatonicMajor => "pentatonic-major",
            Scale::PentatonicMinor => "pentatonic-minor",
            Scale::Blues => "blues",
            Scale::Dorian => "dorian",
            Scale::Phrygian => "phrygian",
            Scale::Lydian => "lydian",
            Scale::Mixolydian => "mixolydian",
            Scale::Locrian => "locrian",
            Scale::WholeTone => "whole-tone",
            Scale::ArabicA => "arabic-a",
            Scale::ArabicB => "arabic-b",
            Scale::Japanese => "japanese",
            Scale::Ryukyu => "ryukyu",
            Scale::EightToneSpanish => "eight-tone-spanish",
            Scale::Chromatic => "chromatic",
        }
    }

    /// Semitone offsets from the root
    pub fn intervals(self) -> &'static [u8] {
        match self {
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Scale::PentatonicNeutral => &[0, 2, 5, 7, 10],
            Scale::PentatonicMajor => &[0, 2, 4, 7, 9],
            Scale::PentatonicMinor => &[0, 3, 5, 7, 10],
            Scale::Blues => &[0, 3, 5, 6, 7, 10],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Scale::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Scale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Scale::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            Scale::WholeTone => &[0, 2, 4, 6, 8, 10],
            Scale::ArabicA => &[0, 2, 3, 5, 6, 8, 9, 11],
            Scale::ArabicB => &[0, 2, 4, 5, 6, 8, 10],
            Scale::Japanese => &[0, 1, 5, 7, 8],
            Scale::Ryukyu => &[0, 4, 5, 7, 11],
            Scale::EightToneSpanish => &[0, 1, 3, 4, 5, 6, 8, 10],
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }
}

impl FromStr for Scale {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        let alias = match wanted.as_str() {
            "ionian" => Some(Scale::Major),
            "aeolian" | "natural-minor" => Some(Scale::Minor),
            "8-tone-spanish" => Some(Scale::EightToneSpanish),
            _ => None,
        };
        alias
            .or_else(|| Scale::ALL.into_iter().find(|scale| scale.name() == wanted))
            .ok_or_else(|| ProtocolError::lookup("scale", s))
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key lighting mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Rainbow,
    Single,
    Piano,
    Night,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Rainbow, Mode::Single, Mode::Piano, Mode::Night];

    pub fn payload(self) -> Payload8 {
        indexed(TOPIC_DISPLAY, 0x02, self as u8)
    }

    pub fn name(self) -> &'static str {
        match self {
            Mode::Rainbow => "rainbow",
            Mode::Single => "single",
            Mode::Piano => "piano",
            Mode::Night => "night",
        }
    }
}

impl FromStr for Mode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "rainbow" => Ok(Mode::Rainbow),
            "single" | "single-color" => Ok(Mode::Single),
            "piano" => Ok(Mode::Piano),
            "night" => Ok(Mode::Night),
            _ => Err(ProtocolError::lookup("mode", s)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Global LED brightness, five fixed steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Brightness {
    Off,
    Quarter,
    Half,
    ThreeQuarters,
    Full,
}

impl Brightness {
    pub const ALL: [Brightness; 5] = [
        Brightness::Off,
        Brightness::Quarter,
        Brightness::Half,
        Brightness::ThreeQuarters,
        Brightness::Full,
    ];

    pub fn percent(self) -> u8 {
        match self {
            Brightness::Off => 0,
            Brightness::Quarter => 25,
            Brightness::Half => 50,
            Brightness::ThreeQuarters => 75,
            Brightness::Full => 100,
        }
    }

    pub fn from_percent(percent: u8) -> Result<Self, ProtocolError> {
        match percent {
            0 => Ok(Brightness::Off),
            25 => Ok(Brightness::Quarter),
            50 => Ok(Brightness::Half),
            75 => Ok(Brightness::ThreeQuarters),
            100 => Ok(Brightness::Full),
            other => Err(ProtocolError::lookup("brightness level", other.to_string())),
        }
    }

    pub fn payload(self) -> Payload8 {
        let (lo, hi) = match self {
            Brightness::Off => (0x04, 0x00),
            Brightness::Quarter => (0x24, 0x06),
            Brightness::Half => (0x44, 0x0C),
            Brightness::ThreeQuarters => (0x64, 0x12),
            Brightness::Full => (0x04, 0x19),
        };
        [GROUP, TOPIC_DISPLAY, lo, hi, 0, 0, 0, 0]
    }
}

impl TryFrom<u8> for Brightness {
    type Error = ProtocolError;

    fn try_from(percent: u8) -> Result<Self, Self::Error> {
        Brightness::from_percent(percent)
    }
}

impl From<Brightness> for u8 {
    fn from(level: Brightness) -> u8 {
        level.percent()
    }
}

impl FromStr for Brightness {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim().trim_end_matches('%');
        digits
            .parse::<u8>()
            .map_err(|_| ProtocolError::lookup("brightness level", s))
            .and_then(Brightness::from_percent)
    }
}

impl fmt::Display for Brightness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.percent())
    }
}

/// A logical LUMI command, turned into a frame by the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    PrimaryColor(Rgb),
    RootColor(Rgb),
    RootKey(RootKey),
    Scale(Scale),
    Mode(Mode),
    Brightness(Brightness),
}

impl Command {
    pub fn payload(&self) -> Payload8 {
        match *self {
            Command::PrimaryColor(c) => color_payload(TOPIC_PRIMARY_COLOR, c),
            Command::RootColor(c) => color_payload(TOPIC_ROOT, c),
            Command::RootKey(key) => key.payload(),
            Command::Scale(scale) => scale.payload(),
            Command::Mode(mode) => mode.payload(),
            Command::Brightness(level) => level.payload(),
        }
    }

    /// Map a payload back to the command that produces it
    ///
    /// Color commands decode lossily, see [`decode_color`].
    pub fn identify(payload: &Payload8) -> Option<Command> {
        if payload[0] != GROUP {
            return None;
        }

        if payload[7] == COLOR_SUFFIX && matches!(payload[1], TOPIC_PRIMARY_COLOR | TOPIC_ROOT) {
            let mut color = [0u8; 5];
            color.copy_from_slice(&payload[2..7]);
            let (r, g, b) = decode_color(&color);
            let rgb = Rgb::new(r, g, b);
            return Some(if payload[1] == TOPIC_PRIMARY_COLOR {
                Command::PrimaryColor(rgb)
            } else {
                Command::RootColor(rgb)
            });
        }

        RootKey::ALL
            .into_iter()
            .map(Command::RootKey)
            .chain(Scale::ALL.into_iter().map(Command::Scale))
            .chain(Mode::ALL.into_iter().map(Command::Mode))
            .chain(Brightness::ALL.into_iter().map(Command::Brightness))
            .find(|cmd| cmd.payload() == *payload)
    }
}

fn color_payload(topic: u8, color: Rgb) -> Payload8 {
    let c = encode_color(color.r as i32, color.g as i32, color.b as i32);
    [GROUP, topic, c[0], c[1], c[2], c[3], c[4], COLOR_SUFFIX]
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::PrimaryColor(c) => write!(f, "primary color {}", c),
            Command::RootColor(c) => write!(f, "root color {}", c),
            Command::RootKey(k) => write!(f, "root key {}", k),
            Command::Scale(s) => write!(f, "scale {}", s),
            Command::Mode(m) => write!(f, "mode {}", m),
            Command::Brightness(b) => write!(f, "brightness {}", b),
        }
    }
}
