//! High-level lighting operations on the LUMI outputs

use std::sync::Arc;

use tracing::{debug, info};

use super::display::Highlight;
use super::routing::{broadcast, Delivery};
use super::{RouterSettings, SessionRouter};
use crate::lumi::key_color::scale_colors;
use crate::lumi::{palette, Brightness, Command, Mode, Rgb, RootKey, Scale};
use crate::sequence::{LightSequence, LightSink, SequenceHandle};

impl SessionRouter {
    /// Show a key and scale: root key, scale, then single-color mode, in that order
    pub fn configure_key_scale(&self, root: RootKey, scale: Scale) -> Delivery {
        info!("🎼 Key {} {}", root, scale);
        self.route_lighting_batch(&[
            Command::RootKey(root),
            Command::Scale(scale),
            Command::Mode(Mode::Single),
        ])
    }

    /// Primary (scale) color; components are clamped to 0-255
    pub fn set_primary_color(&self, r: i32, g: i32, b: i32) -> Delivery {
        self.route_lighting(Command::PrimaryColor(Rgb::clamped(r, g, b)))
    }

    /// Root key color; components are clamped to 0-255
    pub fn set_root_color(&self, r: i32, g: i32, b: i32) -> Delivery {
        self.route_lighting(Command::RootColor(Rgb::clamped(r, g, b)))
    }

    pub fn set_brightness(&self, level: Brightness) -> Delivery {
        self.route_lighting(Command::Brightness(level))
    }

    pub fn set_mode(&self, mode: Mode) -> Delivery {
        self.route_lighting(Command::Mode(mode))
    }

    /// Light every key in `low..high_exclusive`: in-scale keys in the
    /// highlight color, the others in the off-scale color
    ///
    /// Stops any running flash or rainbow first.
    pub fn highlight_scale(&self, note_classes: &[u8], low: u8, high_exclusive: u8) -> Delivery {
        self.sequences.cancel();

        let settings = self.settings.read().clone();
        let classes: Vec<u8> = note_classes.iter().map(|pc| pc % 12).collect();
        let highlight = Highlight {
            note_classes: classes,
            low,
            high_exclusive,
            in_scale: settings.highlight_color,
            off_scale: settings.off_scale_color,
        };
        let messages = highlight.messages();

        let targets = {
            let mut state = self.state.lock();
            state.display.highlight = Some(highlight);
            state
                .active_outputs()
                .into_iter()
                .filter(|o| o.endpoint().shows_lighting())
                .collect::<Vec<_>>()
        };

        debug!("💡 Highlight {} keys", messages.len());
        broadcast(&targets, &messages)
    }

    /// Turn off every key in `low..high_exclusive`
    pub fn clear_range(&self, low: u8, high_exclusive: u8) -> Delivery {
        self.sequences.cancel();

        let messages: Vec<Vec<u8>> = scale_colors(&[], low, high_exclusive, palette::OFF, palette::OFF)
            .iter()
            .map(|key| key.encode().to_vec())
            .collect();

        self.state.lock().display.highlight = None;
        debug!("💡 Clear {} keys", messages.len());
        broadcast(&self.lighting_targets(), &messages)
    }

    fn sequence_sink(&self) -> LightSink {
        let router = self.clone();
        Arc::new(move |color: Rgb| {
            router.route_lighting(Command::PrimaryColor(color));
        })
    }

    /// Flash green (correct) or red, then return to the resting color
    pub fn flash_feedback(&self, correct: bool) -> Option<SequenceHandle> {
        let settings = self.settings.read().clone();
        let sequence = LightSequence::flash(correct, settings.flash_hold, settings.resting_color);
        self.sequences.play(sequence, self.sequence_sink())
    }

    /// Rainbow sweep, then the resting color
    pub fn celebrate(&self) -> Option<SequenceHandle> {
        let resting = self.settings.read().resting_color;
        let sequence = LightSequence::rainbow(resting);
        info!("🌈 Celebrate ({} ms)", sequence.total_duration().as_millis());
        self.sequences.play(sequence, self.sequence_sink())
    }

    /// Stop a running flash or rainbow where it is
    pub fn cancel_sequence(&self) -> bool {
        self.sequences.cancel()
    }

    /// Apply new settings, resending brightness and resting color if they changed
    pub fn reconfigure(&self, settings: RouterSettings) -> Delivery {
        let previous = std::mem::replace(&mut *self.settings.write(), settings.clone());

        let mut commands = Vec::new();
        if previous.brightness != settings.brightness {
            commands.push(Command::Brightness(settings.brightness));
        }
        if previous.resting_color != settings.resting_color {
            commands.push(Command::PrimaryColor(settings.resting_color));
        }

        if commands.is_empty() {
            return Delivery::default();
        }
        info!("🔄 Lighting settings changed, resending {} command(s)", commands.len());
        self.route_lighting_batch(&commands)
    }
}
