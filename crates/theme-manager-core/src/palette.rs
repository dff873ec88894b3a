//! Color palettes derived from wallpapers.
//!
//! A `Palette` is exactly sixteen indexed colors (`color0`..`color15`) plus
//! the `background`, `foreground` and `cursor` roles. It parses pywal's
//! `colors.json` and serializes to a compact form for the palette cache.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExtractionError;

/// Number of indexed colors in a palette.
pub const PALETTE_SIZE: usize = 16;

// Fixed bright colors for slots 9-15, used when `theme.standard_bright_colors`
// is on. Slots 0-8 stay wallpaper-derived.
const STANDARD_BRIGHTS: [(usize, &str); 7] = [
    (9, "#ff4444"),
    (10, "#44ff44"),
    (11, "#ffff44"),
    (12, "#4444ff"),
    (13, "#ff44ff"),
    (14, "#44ffff"),
    (15, "#ffffff"),
];

// Luminance below which a background counts as dark.
const DARK_LUMINANCE_THRESHOLD: f64 = 0.179;

/// Parse a hex color string to an RGB tuple. Returns None if invalid.
///
/// Accepts `#rrggbb`, `#rgb`, and either form without the leading `#`.
pub fn parse_hex_color(color: &str) -> Option<(u8, u8, u8)> {
    let color = color.trim().trim_start_matches('#');

    // Expand shorthand (e.g., "fff" -> "ffffff")
    let color = if color.len() == 3 {
        color.chars().flat_map(|c| [c, c]).collect::<String>()
    } else {
        color.to_string()
    };

    if color.len() != 6 || !color.is_ascii() {
        return None;
    }

    let r = u8::from_str_radix(&color[0..2], 16).ok()?;
    let g = u8::from_str_radix(&color[2..4], 16).ok()?;
    let b = u8::from_str_radix(&color[4..6], 16).ok()?;

    Some((r, g, b))
}

/// Calculate relative luminance per WCAG formula (0.0 = black, 1.0 = white).
pub fn relative_luminance(r: u8, g: u8, b: u8) -> f64 {
    fn channel(c: u8) -> f64 {
        let c_srgb = c as f64 / 255.0;
        if c_srgb <= 0.03928 {
            c_srgb / 12.92
        } else {
            ((c_srgb + 0.055) / 1.055).powf(2.4)
        }
    }

    0.2126 * channel(r) + 0.7152 * channel(g) + 0.0722 * channel(b)
}

/// A normalized sRGB color, displayed as lowercase `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn parse(s: &str) -> Option<Self> {
        parse_hex_color(s).map(|(r, g, b)| Self { r, g, b })
    }

    /// Hex without the leading `#`.
    pub fn strip(&self) -> String {
        format!("{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn luminance(&self) -> f64 {
        relative_luminance(self.r, self.g, self.b)
    }

    pub fn is_dark(&self) -> bool {
        self.luminance() < DARK_LUMINANCE_THRESHOLD
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Rgb {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgb::parse(&value).ok_or_else(|| format!("invalid hex color '{}'", value))
    }
}

impl From<Rgb> for String {
    fn from(value: Rgb) -> Self {
        value.to_string()
    }
}

/// Named role colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialColors {
    pub background: Rgb,
    pub foreground: Rgb,
    pub cursor: Rgb,
}

/// Sixteen indexed colors plus role colors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Palette {
    pub colors: [Rgb; PALETTE_SIZE],
    pub special: SpecialColors,
}

impl Palette {
    /// Build a palette whose roles follow the usual convention
    /// (background = color0, foreground = cursor = color7).
    pub fn from_colors(colors: [Rgb; PALETTE_SIZE]) -> Self {
        let special = SpecialColors {
            background: colors[0],
            foreground: colors[7],
            cursor: colors[7],
        };
        Self { colors, special }
    }

    /// Parse pywal's `colors.json`.
    ///
    /// All sixteen `colors.colorN` entries are required. Missing roles under
    /// `special` fall back to color0/color7/color7.
    pub fn from_pywal_json(json: &str) -> Result<Self, ExtractionError> {
        let root: Value = serde_json::from_str(json)
            .map_err(|e| ExtractionError::MalformedOutput(format!("invalid JSON: {}", e)))?;

        let colors_obj = root
            .get("colors")
            .and_then(Value::as_object)
            .ok_or_else(|| ExtractionError::MalformedOutput("missing 'colors' table".into()))?;

        let mut colors = [Rgb::new(0, 0, 0); PALETTE_SIZE];
        for (i, slot) in colors.iter_mut().enumerate() {
            let key = format!("color{}", i);
            let raw = colors_obj
                .get(&key)
                .and_then(Value::as_str)
                .ok_or_else(|| ExtractionError::MalformedOutput(format!("missing {}", key)))?;
            *slot = Rgb::parse(raw).ok_or_else(|| {
                ExtractionError::MalformedOutput(format!("{}: invalid color '{}'", key, raw))
            })?;
        }

        let mut palette = Self::from_colors(colors);
        if let Some(special) = root.get("special") {
            let role = |name: &str| -> Result<Option<Rgb>, ExtractionError> {
                match special.get(name).and_then(Value::as_str) {
                    None => Ok(None),
                    Some(raw) => Rgb::parse(raw).map(Some).ok_or_else(|| {
                        ExtractionError::MalformedOutput(format!(
                            "special.{}: invalid color '{}'",
                            name, raw
                        ))
                    }),
                }
            };
            if let Some(c) = role("background")? {
                palette.special.background = c;
            }
            if let Some(c) = role("foreground")? {
                palette.special.foreground = c;
            }
            if let Some(c) = role("cursor")? {
                palette.special.cursor = c;
            }
        }

        Ok(palette)
    }

    /// Indexed color by slot, or None past color15.
    pub fn color(&self, index: usize) -> Option<Rgb> {
        self.colors.get(index).copied()
    }

    /// Replace slots 9-15 with fixed bright colors.
    pub fn with_standard_brights(mut self) -> Self {
        for (index, hex) in STANDARD_BRIGHTS {
            if let Some(c) = Rgb::parse(hex) {
                self.colors[index] = c;
            }
        }
        self
    }

    /// Whether the background role is a dark color.
    pub fn is_dark(&self) -> bool {
        self.special.background.is_dark()
    }

    /// Human-friendly aliases for template authors.
    pub fn semantic_colors(&self) -> Vec<(&'static str, Rgb)> {
        let c = &self.colors;
        vec![
            ("red", c[1]),
            ("green", c[2]),
            ("yellow", c[3]),
            ("blue", c[4]),
            ("magenta", c[5]),
            ("cyan", c[6]),
            ("foreground_dim", c[8]),
            ("bright_red", c[9]),
            ("bright_green", c[10]),
            ("bright_yellow", c[11]),
            ("bright_blue", c[12]),
            ("bright_magenta", c[13]),
            ("bright_cyan", c[14]),
            ("foreground_bright", c[15]),
        ]
    }
}
