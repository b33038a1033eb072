//! Last commanded lighting state, replayed to outputs that (re)connect

use crate::lumi::key_color::scale_colors;
use crate::lumi::{Brightness, Command, DeviceId, Mode, Rgb, RootKey, Scale};

/// Per-key scale highlight over a note range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub note_classes: Vec<u8>,
    pub low: u8,
    pub high_exclusive: u8,
    pub in_scale: Rgb,
    pub off_scale: Rgb,
}

impl Highlight {
    pub fn messages(&self) -> Vec<Vec<u8>> {
        scale_colors(
            &self.note_classes,
            self.low,
            self.high_exclusive,
            self.in_scale,
            self.off_scale,
        )
        .iter()
        .map(|key| key.encode().to_vec())
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayState {
    pub brightness: Option<Brightness>,
    pub root_key: Option<RootKey>,
    pub scale: Option<Scale>,
    pub mode: Option<Mode>,
    pub primary_color: Option<Rgb>,
    pub root_color: Option<Rgb>,
    pub highlight: Option<Highlight>,
}

impl DisplayState {
    pub fn record(&mut self, command: &Command) {
        match *command {
            Command::PrimaryColor(c) => self.primary_color = Some(c),
            Command::RootColor(c) => self.root_color = Some(c),
            Command::RootKey(k) => self.root_key = Some(k),
            Command::Scale(s) => self.scale = Some(s),
            Command::Mode(m) => self.mode = Some(m),
            Command::Brightness(b) => self.brightness = Some(b),
        }
    }

    /// Commands that restore this state, key before scale before mode
    pub fn commands(&self) -> Vec<Command> {
        [
            self.brightness.map(Command::Brightness),
            self.root_key.map(Command::RootKey),
            self.scale.map(Command::Scale),
            self.mode.map(Command::Mode),
            self.primary_color.map(Command::PrimaryColor),
            self.root_color.map(Command::RootColor),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Raw messages that restore this state on one device
    pub fn replay(&self, device_id: DeviceId) -> Vec<Vec<u8>> {
        let mut messages: Vec<Vec<u8>> = self
            .commands()
            .iter()
            .map(|cmd| cmd.to_frame(device_id).as_bytes().to_vec())
            .collect();
        if let Some(highlight) = &self.highlight {
            messages.extend(highlight.messages());
        }
        messages
    }

    pub fn is_empty(&self) -> bool {
        *self == DisplayState::default()
    }
}
