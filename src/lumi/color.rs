//! RGB colors, the named palette and rainbow generation

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// An 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from possibly out-of-range components, clamping each to 0-255
    pub fn clamped(r: i32, g: i32, b: i32) -> Self {
        Self {
            r: r.clamp(0, 255) as u8,
            g: g.clamp(0, 255) as u8,
            b: b.clamp(0, 255) as u8,
        }
    }

    /// Convert HSL (all components 0.0-1.0) to RGB
    pub fn from_hsl(h: f32, s: f32, l: f32) -> Self {
        let (r, g, b) = if s == 0.0 {
            (l, l, l)
        } else {
            let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
            let p = 2.0 * l - q;
            (
                hue_to_channel(p, q, h + 1.0 / 3.0),
                hue_to_channel(p, q, h),
                hue_to_channel(p, q, h - 1.0 / 3.0),
            )
        };

        Self::clamped(
            (r * 255.0).round() as i32,
            (g * 255.0).round() as i32,
            (b * 255.0).round() as i32,
        )
    }
}

fn hue_to_channel(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        return p + (q - p) * 6.0 * t;
    }
    if t < 1.0 / 2.0 {
        return q;
    }
    if t < 2.0 / 3.0 {
        return p + (q - p) * (2.0 / 3.0 - t) * 6.0;
    }
    p
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Named colors used by the trainer
pub mod palette {
    use super::Rgb;

    pub const OFF: Rgb = Rgb::new(0, 0, 0);
    pub const GREEN: Rgb = Rgb::new(0, 127, 0);
    pub const RED: Rgb = Rgb::new(127, 0, 0);
    pub const WHITE: Rgb = Rgb::new(127, 127, 127);
    pub const DARK_RED: Rgb = Rgb::new(64, 0, 0);
    pub const GREY: Rgb = Rgb::new(64, 64, 64);
    pub const CYAN: Rgb = Rgb::new(0, 255, 255);
    pub const BRIGHT_WHITE: Rgb = Rgb::new(255, 255, 255);
    /// Resting scale color; the 1 in green is what the LUMI app sends
    pub const BRIGHT_BLUE: Rgb = Rgb::new(0, 1, 255);

    /// Full-intensity pulse colors for answer feedback
    pub const CORRECT: Rgb = Rgb::new(0, 255, 0);
    pub const INCORRECT: Rgb = Rgb::new(255, 0, 0);

    pub fn by_name(name: &str) -> Option<Rgb> {
        let color = match name.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "off" | "black" => OFF,
            "green" => GREEN,
            "red" => RED,
            "white" => WHITE,
            "darkred" => DARK_RED,
            "grey" | "gray" => GREY,
            "cyan" => CYAN,
            "brightwhite" => BRIGHT_WHITE,
            "brightblue" | "blue" => BRIGHT_BLUE,
            _ => return None,
        };
        Some(color)
    }
}

impl FromStr for Rgb {
    type Err = ProtocolError;

    /// Accepts a palette name, `#rrggbb`, or `r,g,b`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(color) = palette::by_name(s) {
            return Ok(color);
        }

        let trimmed = s.trim();
        if let Some(digits) = trimmed.strip_prefix('#') {
            let bytes = hex::decode(digits).map_err(|_| ProtocolError::lookup("color", s))?;
            if let [r, g, b] = bytes[..] {
                return Ok(Rgb::new(r, g, b));
            }
            return Err(ProtocolError::lookup("color", s));
        }

        let parts: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if let [r, g, b] = parts[..] {
            let parse = |v: &str| v.parse::<i32>().map_err(|_| ProtocolError::lookup("color", s));
            return Ok(Rgb::clamped(parse(r)?, parse(g)?, parse(b)?));
        }

        Err(ProtocolError::lookup("color", s))
    }
}

/// Evenly spaced hues around the color wheel at 60% lightness
pub fn rainbow(steps: usize) -> Vec<Rgb> {
    (0..steps)
        .map(|i| Rgb::from_hsl(i as f32 / steps as f32, 1.0, 0.6))
        .collect()
}
