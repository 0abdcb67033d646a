//! Dominant-color extraction by exact pixel frequency.
//!
//! Every pixel of the decoded image is counted once, keyed on its RGB value
//! (alpha is ignored). Colors are ranked by count, ties going to the color
//! seen first in row-major scan order, and the top `max_colors` are kept.

use std::collections::HashMap;
use std::fmt;
use std::future::{self, Future};

use image::error::ImageError;
use image::{Rgba, RgbaImage};
use palette::Srgb;
use serde::{Deserialize, Deserializer, Serialize};

use crate::color::{canonical_hex, to_hex};
use crate::error::PaletteError;

/// Number of colors kept when nothing else is configured.
pub const DEFAULT_MAX_COLORS: usize = 6;

/// Ordered list of canonical `#rrggbb` colors, most representative first.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct Palette(Vec<String>);

impl Palette {
    /// Builds a palette from hex strings, normalizing each to canonical form.
    pub fn from_hex<I, S>(colors: I) -> Result<Self, PaletteError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        colors
            .into_iter()
            .map(|c| canonical_hex(c.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Palette)
    }

    pub fn colors(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }

    pub fn join(&self, sep: &str) -> String {
        self.0.join(sep)
    }
}

impl<'a> IntoIterator for &'a Palette {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for Palette {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(", "))
    }
}

impl<'de> Deserialize<'de> for Palette {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let colors = Vec::<String>::deserialize(deserializer)?;
        Palette::from_hex(&colors).map_err(serde::de::Error::custom)
    }
}

/// Something that can turn encoded image bytes into an RGBA pixel buffer.
///
/// Decoding is modelled as a single-shot future: it either yields the whole
/// buffer or fails, there is no partial result.
pub trait PixelSource {
    fn decode(&self, bytes: &[u8]) -> impl Future<Output = Result<RgbaImage, PaletteError>>;
}

/// Decodes with the `image` crate's built-in codecs (PNG, JPEG, GIF, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageSource;

impl ImageSource {
    /// Decodes synchronously at native resolution.
    pub fn decode_now(&self, bytes: &[u8]) -> Result<RgbaImage, PaletteError> {
        let img = image::load_from_memory(bytes).map_err(|e| {
            let err = match e {
                ImageError::Limits(limits) => PaletteError::ContextUnavailable(limits.to_string()),
                other => PaletteError::DecodeFailed(other.to_string()),
            };
            tracing::warn!(error = %err, len = bytes.len(), "image decode failed");
            err
        })?;
        Ok(img.to_rgba8())
    }
}

impl PixelSource for ImageSource {
    fn decode(&self, bytes: &[u8]) -> impl Future<Output = Result<RgbaImage, PaletteError>> {
        future::ready(self.decode_now(bytes))
    }
}

/// Wraps an already-decoded RGBA buffer (e.g. canvas `ImageData`).
pub fn rgba_to_image(width: u32, height: u32, data: Vec<u8>) -> Result<RgbaImage, PaletteError> {
    let len = data.len();
    RgbaImage::from_raw(width, height, data).ok_or_else(|| {
        PaletteError::ContextUnavailable(format!(
            "{len} bytes cannot back a {width}x{height} RGBA surface"
        ))
    })
}

/// Ranks the colors of `img` by pixel count and keeps the top `max_colors`.
pub fn dominant_colors(img: &RgbaImage, max_colors: usize) -> Palette {
    // packed rgb -> (count, first-seen rank)
    let mut counts: HashMap<u32, (u64, usize)> = HashMap::new();

    for &Rgba([r, g, b, _]) in img.pixels() {
        let key = u32::from_be_bytes([0, r, g, b]);
        let next = counts.len();
        counts.entry(key).or_insert((0, next)).0 += 1;
    }

    let mut ranked: Vec<(u32, u64, usize)> = counts
        .into_iter()
        .map(|(key, (count, first))| (key, count, first))
        .collect();
    ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked.truncate(max_colors);

    Palette(
        ranked
            .into_iter()
            .map(|(key, _, _)| {
                let [_, r, g, b] = key.to_be_bytes();
                to_hex(Srgb::new(r, g, b))
            })
            .collect(),
    )
}

/// Palette extraction over a pluggable [`PixelSource`].
#[derive(Debug, Clone)]
pub struct Extractor<S = ImageSource> {
    source: S,
    max_colors: usize,
}

impl Default for Extractor<ImageSource> {
    fn default() -> Self {
        Extractor::new(ImageSource)
    }
}

impl<S: PixelSource> Extractor<S> {
    pub fn new(source: S) -> Self {
        Extractor {
            source,
            max_colors: DEFAULT_MAX_COLORS,
        }
    }

    pub fn with_max_colors(mut self, max_colors: usize) -> Self {
        self.max_colors = max_colors;
        self
    }

    /// Decodes `bytes` and returns its dominant colors.
    ///
    /// Fails with `DecodeFailed` or `ContextUnavailable`; no partial palette
    /// is ever produced.
    pub async fn extract(&self, bytes: &[u8]) -> Result<Palette, PaletteError> {
        let pixels = self.source.decode(bytes).await?;
        Ok(self.extract_pixels(&pixels))
    }

    pub fn extract_pixels(&self, pixels: &RgbaImage) -> Palette {
        let palette = dominant_colors(pixels, self.max_colors);
        tracing::debug!(
            width = pixels.width(),
            height = pixels.height(),
            colors = palette.len(),
            "extracted palette"
        );
        palette
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    fn image_from(pixels: &[[u8; 4]], width: u32) -> RgbaImage {
        let height = pixels.len() as u32 / width;
        RgbaImage::from_raw(width, height, pixels.concat()).unwrap()
    }

    fn png_bytes(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png).unwrap();
        buf
    }

    const RED: [u8; 4] = [255, 0, 0, 255];
    const GREEN: [u8; 4] = [0, 255, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];

    #[test]
    fn most_frequent_color_ranks_first() {
        let img = image_from(&[RED, RED, BLUE], 3);
        assert_eq!(dominant_colors(&img, 6).colors(), ["#ff0000", "#0000ff"]);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        let img = image_from(&[BLUE, GREEN, RED, RED, GREEN, BLUE], 6);
        assert_eq!(
            dominant_colors(&img, 6).colors(),
            ["#0000ff", "#00ff00", "#ff0000"]
        );
    }

    #[test]
    fn alpha_does_not_split_colors() {
        let img = image_from(&[[10, 20, 30, 0], [10, 20, 30, 128], BLUE], 3);
        assert_eq!(dominant_colors(&img, 6).colors(), ["#0a141e", "#0000ff"]);
    }

    #[test]
    fn palette_is_capped() {
        let pixels: Vec<[u8; 4]> = (0..10u8).map(|i| [i, i, i, 255]).collect();
        let img = image_from(&pixels, 10);
        let palette = dominant_colors(&img, DEFAULT_MAX_COLORS);
        assert_eq!(palette.len(), 6);
        assert_eq!(palette.colors()[0], "#000000");
        assert_eq!(palette.colors()[5], "#050505");
    }

    #[test]
    fn empty_image_yields_empty_palette() {
        let img = RgbaImage::new(0, 0);
        assert!(dominant_colors(&img, 6).is_empty());
    }

    #[test]
    fn rgba_to_image_rejects_short_buffers() {
        assert!(matches!(
            rgba_to_image(2, 2, vec![0; 15]),
            Err(PaletteError::ContextUnavailable(_))
        ));
        assert_eq!(rgba_to_image(2, 2, vec![0; 16]).unwrap().dimensions(), (2, 2));
    }

    #[tokio::test]
    async fn extract_decodes_png() {
        let bytes = png_bytes(&image_from(&[GREEN, RED, GREEN, GREEN], 2));
        let palette = Extractor::new(ImageSource).extract(&bytes).await.unwrap();
        assert_eq!(palette.colors(), ["#00ff00", "#ff0000"]);
    }

    #[tokio::test]
    async fn extract_respects_configured_cap() {
        let bytes = png_bytes(&image_from(&[GREEN, RED, GREEN, BLUE], 2));
        let palette = Extractor::new(ImageSource)
            .with_max_colors(1)
            .extract(&bytes)
            .await
            .unwrap();
        assert_eq!(palette.colors(), ["#00ff00"]);
    }

    #[tokio::test]
    async fn garbage_bytes_fail_to_decode() {
        let err = Extractor::new(ImageSource)
            .extract(b"definitely not an image")
            .await
            .unwrap_err();
        assert!(matches!(err, PaletteError::DecodeFailed(_)), "got {err:?}");
    }

    #[test]
    fn palette_deserialization_validates_and_normalizes() {
        let palette: Palette = serde_json::from_str(r##"["#FF0000", "00ff00"]"##).unwrap();
        assert_eq!(palette.colors(), ["#ff0000", "#00ff00"]);
        assert!(serde_json::from_str::<Palette>(r#"["red"]"#).is_err());
        assert_eq!(serde_json::to_string(&palette).unwrap(), r##"["#ff0000","#00ff00"]"##);
    }
}
