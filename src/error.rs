//! Error types shared by the color, extraction, history and share layers.

use thiserror::Error;

pub use crate::storage::StorageError;

/// Errors produced by palette operations.
#[derive(Debug, Error)]
pub enum PaletteError {
    /// A color string was not a well-formed 6-digit hex triplet.
    #[error("invalid hex color: {0:?}")]
    InvalidFormat(String),

    /// An HSL component was outside its accepted domain.
    #[error("{component} value {value} is out of range (max {max})")]
    OutOfRange {
        component: &'static str,
        value: f64,
        max: f64,
    },

    /// The byte stream could not be decoded as a raster image.
    #[error("unable to decode image: {0}")]
    DecodeFailed(String),

    /// The pixel buffer backing a decode could not be acquired.
    #[error("pixel surface unavailable: {0}")]
    ContextUnavailable(String),

    #[error("invalid share url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("qr encoding failed: {0}")]
    QrEncode(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
