//! Conversions between hex, RGB and HSL color representations.
//!
//! The canonical form of a color is a lowercase `#rrggbb` string. Integer
//! HSL values (`h` in whole degrees, `s`/`l` in whole percent) are what the
//! adjustment sliders and the `hsl(...)` display format work with.
//!
//! All rounding is half-up. Because the integer HSL triple is coarser than
//! 8-bit RGB, `hex -> Hsl -> hex` can drift by up to 5 per channel; the
//! unrounded path through [`rgb_to_hsl_precise`] stays within 1.

use std::fmt;
use std::str::FromStr;

use palette::{FromColor, Srgb};
use serde::{Deserialize, Serialize};

use crate::error::PaletteError;

/// Floating-point HSL in the sRGB standard, as computed by `palette`.
pub type HslF = palette::Hsl<palette::encoding::Srgb, f64>;

/// HSL with hue in whole degrees `[0, 360)` and saturation/lightness in whole percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hsl {
    pub h: u16,
    pub s: u8,
    pub l: u8,
}

impl Hsl {
    /// Validates like [`hsl_to_hex`] and rounds each component half-up.
    pub fn try_new(h: f64, s: f64, l: f64) -> Result<Hsl, PaletteError> {
        check_hsl(h, s, l)?;
        Ok(Hsl {
            h: h.round() as u16 % 360,
            s: s.round() as u8,
            l: l.round() as u8,
        })
    }

    /// Returns a copy with one channel replaced.
    ///
    /// The other channels are carried over untouched, so hue and saturation
    /// survive a pass through gray, black or white.
    pub fn with(self, channel: HslChannel, value: f64) -> Result<Hsl, PaletteError> {
        let (h, s, l) = (f64::from(self.h), f64::from(self.s), f64::from(self.l));
        match channel {
            HslChannel::Hue => Hsl::try_new(value, s, l),
            HslChannel::Saturation => Hsl::try_new(h, value, l),
            HslChannel::Lightness => Hsl::try_new(h, s, value),
        }
    }

    pub fn to_hex(self) -> Result<String, PaletteError> {
        hsl_to_hex(f64::from(self.h), f64::from(self.s), f64::from(self.l))
    }
}

impl fmt::Display for Hsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hsl({}, {}%, {}%)", self.h, self.s, self.l)
    }
}

/// Display formats offered for a palette color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColorFormat {
    #[default]
    Hex,
    Rgb,
    Hsl,
}

impl FromStr for ColorFormat {
    type Err = PaletteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hex" => Ok(ColorFormat::Hex),
            "rgb" => Ok(ColorFormat::Rgb),
            "hsl" => Ok(ColorFormat::Hsl),
            _ => Err(PaletteError::Config(format!(
                "unknown color format {s:?} (expected HEX, RGB or HSL)"
            ))),
        }
    }
}

impl fmt::Display for ColorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorFormat::Hex => "HEX",
            ColorFormat::Rgb => "RGB",
            ColorFormat::Hsl => "HSL",
        };
        f.write_str(name)
    }
}

/// One of the three HSL sliders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HslChannel {
    Hue,
    Saturation,
    Lightness,
}

impl FromStr for HslChannel {
    type Err = PaletteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h" | "hue" => Ok(HslChannel::Hue),
            "s" | "saturation" => Ok(HslChannel::Saturation),
            "l" | "lightness" => Ok(HslChannel::Lightness),
            _ => Err(PaletteError::Config(format!("unknown HSL channel {s:?}"))),
        }
    }
}

/// Parses `#rrggbb` or `rrggbb` (either case) into 8-bit sRGB.
///
/// Shorthand (`#abc`), alpha suffixes and anything that is not exactly six
/// hex digits are rejected rather than clamped.
pub fn parse_hex(input: &str) -> Result<Srgb<u8>, PaletteError> {
    let hex = input.strip_prefix('#').unwrap_or(input);
    if hex.len() != 6 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(PaletteError::InvalidFormat(input.to_string()));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| PaletteError::InvalidFormat(input.to_string()))
    };
    Ok(Srgb::new(channel(0)?, channel(2)?, channel(4)?))
}

/// Formats 8-bit sRGB as canonical `#rrggbb`.
pub fn to_hex(color: Srgb<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", color.red, color.green, color.blue)
}

/// Normalizes any accepted hex spelling to the canonical form.
pub fn canonical_hex(input: &str) -> Result<String, PaletteError> {
    parse_hex(input).map(to_hex)
}

pub fn rgb_to_hsl_precise(color: Srgb<u8>) -> HslF {
    HslF::from_color(color.into_format::<f64>())
}

pub fn hsl_precise_to_rgb(hsl: HslF) -> Srgb<u8> {
    let rgb = Srgb::<f64>::from_color(hsl);
    Srgb::new(to_byte(rgb.red), to_byte(rgb.green), to_byte(rgb.blue))
}

fn to_byte(component: f64) -> u8 {
    (component * 255.0).round().clamp(0.0, 255.0) as u8
}

pub fn hex_to_hsl(hex: &str) -> Result<Hsl, PaletteError> {
    let hsl = rgb_to_hsl_precise(parse_hex(hex)?);
    let h = hsl.hue.into_positive_degrees().round() as u16 % 360;
    let s = (hsl.saturation * 100.0).round().clamp(0.0, 100.0) as u8;
    let l = (hsl.lightness * 100.0).round().clamp(0.0, 100.0) as u8;
    Ok(Hsl { h, s, l })
}

/// Converts HSL (`h` in degrees, `s`/`l` in percent) to canonical hex.
///
/// Values outside `h ∈ [0, 360)`, `s, l ∈ [0, 100]` are rejected.
pub fn hsl_to_hex(h: f64, s: f64, l: f64) -> Result<String, PaletteError> {
    check_hsl(h, s, l)?;
    let hsl = HslF::new(h, s / 100.0, l / 100.0);
    Ok(to_hex(hsl_precise_to_rgb(hsl)))
}

fn check_hsl(h: f64, s: f64, l: f64) -> Result<(), PaletteError> {
    if !(0.0..360.0).contains(&h) {
        return Err(PaletteError::OutOfRange {
            component: "hue",
            value: h,
            max: 360.0,
        });
    }
    for (component, value) in [("saturation", s), ("lightness", l)] {
        if !(0.0..=100.0).contains(&value) {
            return Err(PaletteError::OutOfRange {
                component,
                value,
                max: 100.0,
            });
        }
    }
    Ok(())
}

pub fn format_rgb(color: Srgb<u8>) -> String {
    format!("rgb({}, {}, {})", color.red, color.green, color.blue)
}

/// Renders a hex color in the requested display format.
pub fn convert_color(hex: &str, format: ColorFormat) -> Result<String, PaletteError> {
    match format {
        ColorFormat::Hex => canonical_hex(hex),
        ColorFormat::Rgb => parse_hex(hex).map(format_rgb),
        ColorFormat::Hsl => hex_to_hsl(hex).map(|hsl| hsl.to_string()),
    }
}

/// One-shot edit: replaces one HSL channel of `hex` and returns the new color.
///
/// The starting HSL is derived from `hex`, so a gray has no hue left to
/// restore. Repeated slider moves should keep an [`Hsl`] and use [`Hsl::with`].
pub fn adjust(hex: &str, channel: HslChannel, value: f64) -> Result<String, PaletteError> {
    hex_to_hsl(hex)?.with(channel, value)?.to_hex()
}
