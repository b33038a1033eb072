//! Endpoint descriptions and the name-based device classifier
//!
//! Port names are matched case-insensitively against pattern lists:
//! percussive first, then controller, then melodic. Anything unmatched is
//! treated as melodic, since most class-compliant keyboards have generic names.

use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Port direction, seen from the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

/// Coarse instrument family derived from the endpoint name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Melodic,
    Percussive,
    Controller,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceKind::Melodic => "melodic",
            DeviceKind::Percussive => "percussive",
            DeviceKind::Controller => "controller",
        };
        f.write_str(s)
    }
}

/// A MIDI port as reported by the transport
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    pub manufacturer: String,
    pub direction: Direction,
    pub kind: DeviceKind,
    pub lighting: bool,
}

impl Endpoint {
    /// Describe an endpoint using the built-in patterns
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        manufacturer: impl Into<String>,
        direction: Direction,
    ) -> Self {
        DEFAULT_CLASSIFIER.describe(id, name, manufacturer, direction)
    }

    /// Lighting as far as routing is concerned
    ///
    /// Set by the classifier, or implied by the built-in patterns for an
    /// endpoint assembled by hand with the flag left off.
    pub fn shows_lighting(&self) -> bool {
        self.lighting || is_lighting_capable(self)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.name, self.kind)?;
        if self.shows_lighting() {
            write!(f, ", lighting")?;
        }
        write!(f, ")")
    }
}

/// Extra patterns appended to the built-in lists, usually from config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSet {
    #[serde(default)]
    pub percussive: Vec<String>,
    #[serde(default)]
    pub controller: Vec<String>,
    #[serde(default)]
    pub melodic: Vec<String>,
    #[serde(default)]
    pub lighting: Vec<String>,
}

const PERCUSSIVE_PATTERNS: &[&str] = &[
    "drum",
    "pad",
    "kick",
    "snare",
    "hihat",
    "cymbal",
    "tom",
    "percussion",
    "beat",
    "rhythm",
    "sample pad",
    "electronic drum",
    "m-vave",
    "alesis",
    "roland td",
    "yamaha dtx",
    "pearl e-pro",
];

const CONTROLLER_PATTERNS: &[&str] = &[
    "controller",
    "control",
    "mixer",
    "interface",
    "launch",
    "push",
    "maschine",
    "mpc",
    "trigger finger",
    "oxygen pro",
];

const MELODIC_PATTERNS: &[&str] = &[
    "piano",
    "keyboard",
    "keys",
    "synth",
    "organ",
    "stage",
    "digital piano",
    "electric piano",
    "workstation",
    "kawai",
    "yamaha p",
    "yamaha cp",
    "nord",
    "korg",
    "roland fp",
    "roland rd",
    "casio",
    "roli",
    "lumi",
];

const LIGHTING_PATTERNS: &[&str] = &["lumi", "roli"];

static DEFAULT_CLASSIFIER: Lazy<Classifier> = Lazy::new(Classifier::default);

/// Pattern-based classifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    percussive: Vec<String>,
    controller: Vec<String>,
    melodic: Vec<String>,
    lighting: Vec<String>,
}

impl Default for Classifier {
    fn default() -> Self {
        let owned = |list: &[&str]| list.iter().map(|p| p.to_string()).collect();
        Self {
            percussive: owned(PERCUSSIVE_PATTERNS),
            controller: owned(CONTROLLER_PATTERNS),
            melodic: owned(MELODIC_PATTERNS),
            lighting: owned(LIGHTING_PATTERNS),
        }
    }
}

impl Classifier {
    /// Built-in patterns plus `extra`
    pub fn with_patterns(extra: &PatternSet) -> Self {
        let mut classifier = Self::default();
        let extend = |list: &mut Vec<String>, more: &[String]| {
            list.extend(
                more.iter()
                    .map(|p| p.trim().to_lowercase())
                    .filter(|p| !p.is_empty()),
            );
        };
        extend(&mut classifier.percussive, &extra.percussive);
        extend(&mut classifier.controller, &extra.controller);
        extend(&mut classifier.melodic, &extra.melodic);
        extend(&mut classifier.lighting, &extra.lighting);
        classifier
    }

    pub fn kind_of(&self, name: &str, manufacturer: &str) -> DeviceKind {
        let name = name.to_lowercase();
        let manufacturer = manufacturer.to_lowercase();
        let hit = |patterns: &[String]| {
            patterns
                .iter()
                .any(|p| name.contains(p.as_str()) || manufacturer.contains(p.as_str()))
        };

        if hit(&self.percussive) {
            DeviceKind::Percussive
        } else if hit(&self.controller) {
            DeviceKind::Controller
        } else {
            if !hit(&self.melodic) {
                trace!("No pattern matched '{}', assuming melodic", name);
            }
            DeviceKind::Melodic
        }
    }

    pub fn has_lighting(&self, name: &str, manufacturer: &str) -> bool {
        let name = name.to_lowercase();
        let manufacturer = manufacturer.to_lowercase();
        self.lighting
            .iter()
            .any(|p| name.contains(p.as_str()) || manufacturer.contains(p.as_str()))
    }

    /// Build an [`Endpoint`] with kind and lighting flag filled in
    pub fn describe(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        manufacturer: impl Into<String>,
        direction: Direction,
    ) -> Endpoint {
        let name = name.into();
        let manufacturer = manufacturer.into();
        Endpoint {
            id: id.into(),
            kind: self.kind_of(&name, &manufacturer),
            lighting: self.has_lighting(&name, &manufacturer),
            name,
            manufacturer,
            direction,
        }
    }
}

/// Classify an endpoint with the built-in patterns
pub fn classify(endpoint: &Endpoint) -> DeviceKind {
    DEFAULT_CLASSIFIER.kind_of(&endpoint.name, &endpoint.manufacturer)
}

/// True if the endpoint renders key lighting (LUMI / ROLI hardware)
pub fn is_lighting_capable(endpoint: &Endpoint) -> bool {
    DEFAULT_CLASSIFIER.has_lighting(&endpoint.name, &endpoint.manufacturer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn output(name: &str, manufacturer: &str) -> Endpoint {
        Endpoint::new(name, name, manufacturer, Direction::Output)
    }

    #[test]
    fn test_lumi_is_melodic_with_lighting() {
        let lumi = output("LUMI Keys", "ROLI");
        assert_eq!(classify(&lumi), DeviceKind::Melodic);
        assert!(is_lighting_capable(&lumi));
        assert!(lumi.lighting);
    }

    #[test]
    fn test_manufacturer_alone_enables_lighting() {
        let block = output("Block 2", "Roli Ltd.");
        assert!(is_lighting_capable(&block));
    }

    #[test]
    fn test_percussive_checked_before_controller() {
        // "pad" (percussive) wins over "launch" (controller)
        assert_eq!(classify(&output("Launchpad Mini", "")), DeviceKind::Percussive);
        assert_eq!(classify(&output("Alesis Nitro", "")), DeviceKind::Percussive);
        assert_eq!(classify(&output("Yamaha DTX402", "")), DeviceKind::Percussive);
    }

    #[test]
    fn test_controller_and_defaults() {
        assert_eq!(classify(&output("Behringer DJ Mixer", "")), DeviceKind::Controller);
        assert_eq!(classify(&output("Maschine Mk3", "NI")), DeviceKind::Controller);
        assert_eq!(classify(&output("USB MIDI Device", "")), DeviceKind::Melodic);
        assert_eq!(classify(&output("Yamaha P-125", "")), DeviceKind::Melodic);
        assert!(!is_lighting_capable(&output("Digital Piano", "Kawai")));
    }

    #[test]
    fn test_extra_patterns() {
        let extra = PatternSet {
            percussive: vec!["Octapad".into()],
            lighting: vec!["  Glow ".into()],
            ..Default::default()
        };
        let classifier = Classifier::with_patterns(&extra);

        let ep = classifier.describe("a", "SPD OCTAPAD", "", Direction::Input);
        assert_eq!(ep.kind, DeviceKind::Percussive);

        let ep = classifier.describe("b", "GlowKeys", "", Direction::Output);
        assert!(ep.lighting);
        assert!(!Endpoint::new("b", "GlowKeys", "", Direction::Output).lighting);
    }

    proptest! {
        #[test]
        fn prop_classifier_is_total_and_deterministic(name in ".{0,40}", manufacturer in ".{0,20}") {
            let ep = output(&name, &manufacturer);
            let first = classify(&ep);
            prop_assert_eq!(first, classify(&ep));

            let lower = format!("{} {}", name.to_lowercase(), manufacturer.to_lowercase());
            let expected = name.to_lowercase().contains("lumi")
                || name.to_lowercase().contains("roli")
                || manufacturer.to_lowercase().contains("lumi")
                || manufacturer.to_lowercase().contains("roli");
            prop_assert_eq!(is_lighting_capable(&ep), expected, "{}", lower);
        }
    }
}
