// Color parsing and helpers for button fills

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use idisplay_transport::Rgb;

/// Placeholder fill that layouts use for "nothing assigned"
pub const PLACEHOLDER: Rgb = Rgb::new(0x2a, 0x2a, 0x2a);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid color {0:?} (expected #rrggbb or a color name)")]
pub struct ColorError(pub String);

/// Parse "#RRGGBB" (or a few common names) into a color
pub fn parse_color(s: &str) -> Result<Rgb, ColorError> {
    let err = || ColorError(s.to_string());
    if let Some(hex) = s.strip_prefix('#') {
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(err());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
        return Ok(Rgb::new(channel(0)?, channel(2)?, channel(4)?));
    }
    match s.to_ascii_lowercase().as_str() {
        "black" => Ok(Rgb::BLACK),
        "white" => Ok(Rgb::new(255, 255, 255)),
        "red" => Ok(Rgb::new(255, 0, 0)),
        "green" => Ok(Rgb::new(0, 255, 0)),
        "blue" => Ok(Rgb::new(0, 0, 255)),
        "yellow" => Ok(Rgb::new(255, 255, 0)),
        "cyan" => Ok(Rgb::new(0, 255, 255)),
        "magenta" => Ok(Rgb::new(255, 0, 255)),
        _ => Err(err()),
    }
}

/// Lowercase "#rrggbb"
pub fn to_hex(color: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r, color.g, color.b)
}

/// Uniformly random color
pub fn random_color() -> Rgb {
    let mut rng = rand::thread_rng();
    Rgb::new(rng.gen(), rng.gen(), rng.gen())
}

/// Pure black is sent as (1, 0, 0)
///
/// Only applied to colors coming from config files and the command line.
// TODO: check on hardware whether firmware still mis-renders an all-zero fill
pub fn legacy_black_fixup(color: Rgb) -> Rgb {
    if color == Rgb::BLACK {
        Rgb::new(1, 0, 0)
    } else {
        color
    }
}

/// Serde wrapper storing a color as its hex string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(pub Rgb);

impl TryFrom<String> for HexColor {
    type Error = ColorError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        parse_color(&s).map(HexColor)
    }
}

impl From<HexColor> for String {
    fn from(c: HexColor) -> String {
        to_hex(c.0)
    }
}

impl FromStr for HexColor {
    type Err = ColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_color(s).map(HexColor)
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_hex(self.0))
    }
}
