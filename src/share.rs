//! Share links and their QR code.
//!
//! A palette travels as `?palette=<hex>,<hex>,...` with the joined value
//! percent-encoded, so `#` becomes `%23` and `,` becomes `%2C`.

use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};
use qrcode::QrCode;
use url::{Url, form_urlencoded};

use crate::error::PaletteError;
use crate::extract::Palette;

pub const SHARE_PARAM: &str = "palette";
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_QR_SIZE: u32 = 200;

/// Modules of light border around the symbol (ISO/IEC 18004 minimum).
const QUIET_ZONE: usize = 4;

/// Builds the share link for `palette` on top of `base`.
///
/// Any query already on `base` is kept; the `palette` parameter is appended.
pub fn share_url(base: &str, palette: &Palette) -> Result<String, PaletteError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair(SHARE_PARAM, &palette.join(","));
    Ok(url.into())
}

/// Reconstructs a palette from a query string (with or without leading `?`).
///
/// Returns `Ok(None)` when the `palette` parameter is missing or empty.
pub fn palette_from_query(query: &str) -> Result<Option<Palette>, PaletteError> {
    let query = query.strip_prefix('?').unwrap_or(query);
    let Some((_, value)) = form_urlencoded::parse(query.as_bytes()).find(|(k, _)| k == SHARE_PARAM)
    else {
        return Ok(None);
    };
    if value.is_empty() {
        return Ok(None);
    }
    Palette::from_hex(value.split(',').map(str::trim)).map(Some)
}

pub fn palette_from_url(url: &str) -> Result<Option<Palette>, PaletteError> {
    let url = Url::parse(url)?;
    palette_from_query(url.query().unwrap_or_default())
}

/// Renders `data` as a QR code PNG of exactly `size` x `size` pixels.
pub fn share_qr_png(data: &str, size: u32) -> Result<Vec<u8>, PaletteError> {
    let qr = render_qr(data, size)?;
    let mut buf = Vec::new();
    qr.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| PaletteError::QrEncode(format!("PNG encode error: {e}")))?;
    Ok(buf)
}

pub fn render_qr(data: &str, size: u32) -> Result<GrayImage, PaletteError> {
    let code = QrCode::new(data.as_bytes()).map_err(|e| PaletteError::QrEncode(e.to_string()))?;
    let modules = code.width();
    let colors = code.to_colors();
    let span = (modules + 2 * QUIET_ZONE) as u64;
    let size_px = u64::from(size.max(1));

    // Nearest-neighbour sample the module grid onto the fixed pixel canvas.
    let module_at = |px: u32| (u64::from(px) * span / size_px) as usize;
    Ok(GrayImage::from_fn(size, size, |x, y| {
        let (mx, my) = (module_at(x), module_at(y));
        let inside = (QUIET_ZONE..QUIET_ZONE + modules).contains(&mx)
            && (QUIET_ZONE..QUIET_ZONE + modules).contains(&my);
        let dark = inside
            && colors[(my - QUIET_ZONE) * modules + (mx - QUIET_ZONE)] == qrcode::Color::Dark;
        Luma([if dark { 0 } else { 255 }])
    }))
}
