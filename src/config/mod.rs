//! Configuration management for lumi-bridge
//!
//! Handles loading, validating and hot-reloading the YAML configuration file.
//! Every section is optional; missing fields fall back to defaults.

pub mod watcher;

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::info;

use crate::device::PatternSet;
use crate::lumi::{Brightness, DeviceId, Rgb, RootKey, Scale};
use crate::theory;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub lumi: LumiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// MIDI transport settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MidiConfig {
    /// Client name shown to other MIDI software
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Channel for outgoing notes (1-16)
    #[serde(default = "default_note_channel")]
    pub note_channel: u8,
    /// Velocity for sustained notes (0.0-1.0)
    #[serde(default = "default_velocity")]
    pub velocity: f32,
    /// Port list polling interval for hot-plug detection
    #[serde(default = "default_hotplug_poll_ms")]
    pub hotplug_poll_ms: u64,
    /// Sound notes played on inputs through every active output
    #[serde(default)]
    pub echo_input: bool,
}

/// Device selection
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DevicesConfig {
    /// Preferred input port names; empty selects every connected input
    #[serde(default)]
    pub inputs: Vec<String>,
    /// Preferred output port names; empty selects every connected output
    #[serde(default)]
    pub outputs: Vec<String>,
    /// Devices plugged in later join the session automatically
    #[serde(default = "default_true")]
    pub auto_join: bool,
    /// Extra classifier patterns
    #[serde(default)]
    pub patterns: PatternSet,
}

/// LUMI lighting settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LumiConfig {
    #[serde(default)]
    pub device_id: u8,
    /// 0, 25, 50, 75 or 100
    #[serde(default = "default_brightness")]
    pub brightness: Brightness,
    /// Color the keys return to after a flash or rainbow
    #[serde(default = "default_resting_color")]
    pub resting_color: String,
    #[serde(default = "default_resting_color")]
    pub highlight_color: String,
    #[serde(default = "default_off_scale_color")]
    pub off_scale_color: String,
    #[serde(default = "default_flash_hold_ms")]
    pub flash_hold_ms: u64,
    /// Inclusive note range for scale highlighting, e.g. "C3-C6"
    #[serde(default = "default_highlight_range")]
    pub highlight_range: String,
    /// Key shown at startup, e.g. "C-major"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Log output settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Filter used when neither --log-level nor LOG_LEVEL is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// Directory for daily rotated log files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_dir: Option<String>,
    /// Console output as JSON lines
    #[serde(default)]
    pub json: bool,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            note_channel: default_note_channel(),
            velocity: default_velocity(),
            hotplug_poll_ms: default_hotplug_poll_ms(),
            echo_input: false,
        }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            auto_join: default_true(),
            patterns: PatternSet::default(),
        }
    }
}

impl Default for LumiConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            brightness: default_brightness(),
            resting_color: default_resting_color(),
            highlight_color: default_resting_color(),
            off_scale_color: default_off_scale_color(),
            flash_hold_ms: default_flash_hold_ms(),
            highlight_range: default_highlight_range(),
            key: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Invalid config file: {}", path))
    }

    /// Load the file if it exists, otherwise use defaults
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            return Self::load(path).await;
        }
        info!("No config at {}, using defaults", path);
        Ok(Self::default())
    }

    /// Parse and validate YAML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig =
            serde_yaml::from_str(contents).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.client_name.trim().is_empty() {
            anyhow::bail!("midi.client_name cannot be empty");
        }
        if !(1..=16).contains(&self.midi.note_channel) {
            anyhow::bail!(
                "midi.note_channel {} is invalid (must be 1-16)",
                self.midi.note_channel
            );
        }
        if !(0.0..=1.0).contains(&self.midi.velocity) {
            anyhow::bail!(
                "midi.velocity {} is invalid (must be 0.0-1.0)",
                self.midi.velocity
            );
        }
        if self.midi.hotplug_poll_ms < 100 {
            anyhow::bail!("midi.hotplug_poll_ms must be at least 100");
        }

        DeviceId::new(self.lumi.device_id).context("lumi.device_id")?;
        for (field, value) in [
            ("lumi.resting_color", &self.lumi.resting_color),
            ("lumi.highlight_color", &self.lumi.highlight_color),
            ("lumi.off_scale_color", &self.lumi.off_scale_color),
        ] {
            value
                .parse::<Rgb>()
                .with_context(|| format!("{} is not a color", field))?;
        }
        if self.lumi.flash_hold_ms == 0 {
            anyhow::bail!("lumi.flash_hold_ms must be greater than 0");
        }
        self.highlight_range()?;
        self.startup_key()?;

        Ok(())
    }

    /// Highlight range as `(low, high_exclusive)`
    pub fn highlight_range(&self) -> Result<(u8, u8)> {
        let (low, high) = theory::parse_range(&self.lumi.highlight_range)
            .context("lumi.highlight_range")?;
        Ok((low, high.saturating_add(1).min(128)))
    }

    /// Key and scale to show at startup, if configured
    pub fn startup_key(&self) -> Result<Option<(RootKey, Scale)>> {
        self.lumi
            .key
            .as_deref()
            .map(|key| theory::parse_key_signature(key).context("lumi.key"))
            .transpose()
    }
}

fn default_client_name() -> String { "lumi-bridge".to_string() }
fn default_note_channel() -> u8 { 1 }
fn default_velocity() -> f32 { 0.8 }
fn default_hotplug_poll_ms() -> u64 { 1000 }
fn default_true() -> bool { true }
fn default_brightness() -> Brightness { Brightness::Full }
fn default_resting_color() -> String { "brightblue".to_string() }
fn default_off_scale_color() -> String { "off".to_string() }
fn default_flash_hold_ms() -> u64 { 500 }
fn default_highlight_range() -> String { "C3-C6".to_string() }
