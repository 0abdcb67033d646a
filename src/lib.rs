use wasm_bindgen::prelude::*;
use js_sys::{Array, Object, Promise, Reflect, Uint8Array};

pub mod color;
pub mod config;
pub mod error;
pub mod extract;
pub mod history;
#[cfg(feature = "native-bin")]
pub mod logging;
pub mod share;
pub mod storage;

pub use color::{ColorFormat, Hsl, HslChannel, adjust, convert_color, hex_to_hsl, hsl_to_hex};
pub use config::Config;
pub use error::{PaletteError, StorageError};
pub use extract::{Extractor, ImageSource, Palette, PixelSource, dominant_colors};
pub use history::{HistoryEntry, HistoryLog, HistoryStore};
pub use share::{palette_from_query, palette_from_url, share_qr_png, share_url};

const MAX_COLORS: usize = extract::DEFAULT_MAX_COLORS;

// ------------------------------------------------------------
// JS conversion helpers
// ------------------------------------------------------------

fn js_err(e: PaletteError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn palette_to_js(palette: &Palette) -> Array {
    palette.iter().map(|c| JsValue::from_str(c)).collect()
}

fn palette_from_js(colors: &Array) -> Result<Palette, JsValue> {
    let mut tmp = Vec::new();
    for val in colors.iter() {
        let s = val
            .as_string()
            .ok_or_else(|| JsValue::from_str("Palette values must be strings"))?;
        tmp.push(s);
    }
    Palette::from_hex(tmp).map_err(js_err)
}

#[cfg(target_arch = "wasm32")]
fn report(context: &str, err: &PaletteError) {
    tracing::warn!(error = %err, "{context}");
    web_sys::console::error_1(&JsValue::from_str(&format!("{context}: {err}")));
}

#[cfg(not(target_arch = "wasm32"))]
fn report(context: &str, err: &PaletteError) {
    tracing::warn!(error = %err, "{context}");
}

// ------------------------------------------------------------
// Extraction
// ------------------------------------------------------------

/// Decode `input` (PNG/JPEG/GIF bytes) and resolve with its dominant colors,
/// most frequent first, as an array of `#rrggbb` strings.
///
/// Decoding runs on the calling thread, so the returned promise is already
/// settled. It rejects with a message when the image cannot be decoded.
#[wasm_bindgen(js_name = extractColors)]
pub fn extract_colors(input: Vec<u8>) -> Promise {
    let result = ImageSource
        .decode_now(&input)
        .map(|pixels| dominant_colors(&pixels, MAX_COLORS));

    let mut settle = |resolve: js_sys::Function, reject: js_sys::Function| {
        let outcome = match &result {
            Ok(palette) => resolve.call1(&JsValue::NULL, &palette_to_js(palette)),
            Err(e) => {
                report("Error extracting colors", e);
                reject.call1(&JsValue::NULL, &JsValue::from_str(&e.to_string()))
            }
        };
        if let Err(e) = outcome {
            tracing::warn!("promise callback threw: {e:?}");
        }
    };
    Promise::new(&mut settle)
}

/// Dominant colors of an already-decoded RGBA buffer, e.g. `ImageData.data`
/// read from a 2D canvas.
#[wasm_bindgen(js_name = extractColorsFromRgba)]
pub fn extract_colors_from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Array, JsValue> {
    let pixels = extract::rgba_to_image(width, height, data).map_err(js_err)?;
    Ok(palette_to_js(&dominant_colors(&pixels, MAX_COLORS)))
}

// ------------------------------------------------------------
// Color conversion
// ------------------------------------------------------------

fn hsl_to_js(hsl: Hsl) -> Result<Object, JsValue> {
    let result = Object::new();
    Reflect::set(&result, &JsValue::from_str("h"), &JsValue::from(hsl.h))?;
    Reflect::set(&result, &JsValue::from_str("s"), &JsValue::from(hsl.s))?;
    Reflect::set(&result, &JsValue::from_str("l"), &JsValue::from(hsl.l))?;
    Ok(result)
}

fn hsl_from_js(value: &JsValue) -> Result<Hsl, JsValue> {
    let component = |key: &str| -> Result<f64, JsValue> {
        Reflect::get(value, &JsValue::from_str(key))?
            .as_f64()
            .ok_or_else(|| JsValue::from_str(&format!("HSL field `{key}` must be a number")))
    };
    Hsl::try_new(component("h")?, component("s")?, component("l")?).map_err(js_err)
}

/// Returns `{ h, s, l }` for a hex color.
#[wasm_bindgen(js_name = hexToHsl)]
pub fn hex_to_hsl_js(hex: &str) -> Result<Object, JsValue> {
    hsl_to_js(hex_to_hsl(hex).map_err(js_err)?)
}

#[wasm_bindgen(js_name = hslToHex)]
pub fn hsl_to_hex_js(h: f64, s: f64, l: f64) -> Result<String, JsValue> {
    hsl_to_hex(h, s, l).map_err(js_err)
}

/// `format` is one of `HEX`, `RGB`, `HSL`.
#[wasm_bindgen(js_name = convertColor)]
pub fn convert_color_js(hex: &str, format: &str) -> Result<String, JsValue> {
    let format: ColorFormat = format.parse().map_err(js_err)?;
    convert_color(hex, format).map_err(js_err)
}

/// `channel` is `h`, `s` or `l` (or `hue`, `saturation`, `lightness`).
#[wasm_bindgen(js_name = adjustColor)]
pub fn adjust_color_js(hex: &str, channel: &str, value: f64) -> Result<String, JsValue> {
    let channel: HslChannel = channel.parse().map_err(js_err)?;
    adjust(hex, channel, value).map_err(js_err)
}

/// Slider update on held state: takes `{ h, s, l }`, returns the new
/// `{ h, s, l, hex }` with one channel replaced and the others kept.
#[wasm_bindgen(js_name = adjustHsl)]
pub fn adjust_hsl_js(hsl: &JsValue, channel: &str, value: f64) -> Result<Object, JsValue> {
    let channel: HslChannel = channel.parse().map_err(js_err)?;
    let next = hsl_from_js(hsl)?.with(channel, value).map_err(js_err)?;
    let result = hsl_to_js(next)?;
    let hex = next.to_hex().map_err(js_err)?;
    Reflect::set(&result, &JsValue::from_str("hex"), &JsValue::from_str(&hex))?;
    Ok(result)
}

// ------------------------------------------------------------
// Sharing
// ------------------------------------------------------------

#[wasm_bindgen(js_name = shareUrl)]
pub fn share_url_js(base: &str, colors: Array) -> Result<String, JsValue> {
    let palette = palette_from_js(&colors)?;
    share_url(base, &palette).map_err(js_err)
}

/// Palette carried by a `location.search` string, or `undefined`.
#[wasm_bindgen(js_name = paletteFromQuery)]
pub fn palette_from_query_js(query: &str) -> Result<Option<Array>, JsValue> {
    let palette = palette_from_query(query).map_err(js_err)?;
    Ok(palette.as_ref().map(palette_to_js))
}

/// PNG bytes of a QR code for `url`, `size` pixels square (default 200).
#[wasm_bindgen(js_name = shareQrPng)]
pub fn share_qr_png_js(url: &str, size: Option<u32>) -> Result<Uint8Array, JsValue> {
    let png = share_qr_png(url, size.unwrap_or(share::DEFAULT_QR_SIZE)).map_err(js_err)?;
    Ok(Uint8Array::from(png.as_slice()))
}

// ------------------------------------------------------------
// Cookie-backed history (browser only)
// ------------------------------------------------------------

#[cfg(target_arch = "wasm32")]
fn cookie_history() -> HistoryStore<storage::CookieStorage> {
    HistoryStore::new(storage::CookieStorage)
}

#[cfg(target_arch = "wasm32")]
fn entry_to_js(entry: &HistoryEntry) -> Result<JsValue, JsValue> {
    let json = serde_json::to_string(entry).map_err(|e| JsValue::from_str(&e.to_string()))?;
    js_sys::JSON::parse(&json)
}

/// Records a palette and returns the stored entry `{ colors, timestamp, name? }`.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = saveToHistory)]
pub fn save_to_history(colors: Array, name: Option<String>) -> Result<JsValue, JsValue> {
    let palette = palette_from_js(&colors)?;
    let entry = cookie_history().save(palette, name).map_err(|e| {
        let err = PaletteError::from(e);
        report("Error saving to history", &err);
        js_err(err)
    })?;
    entry_to_js(&entry)
}

/// The history log, newest first. Never throws; unreadable state is `[]`.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = getHistory)]
pub fn get_history() -> Array {
    let log = cookie_history().load();
    log.iter().filter_map(|entry| entry_to_js(entry).ok()).collect()
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = clearHistory)]
pub fn clear_history() -> Result<(), JsValue> {
    cookie_history()
        .clear()
        .map_err(|e| js_err(PaletteError::from(e)))
}

/// Returns whether an entry with `timestamp` existed.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(js_name = renamePalette)]
pub fn rename_palette(timestamp: f64, new_name: &str) -> Result<bool, JsValue> {
    cookie_history()
        .rename(timestamp as i64, new_name)
        .map_err(|e| js_err(PaletteError::from(e)))
}
