//! Runtime configuration, read from TOML.
//!
//! Every section and field is optional; missing values take the defaults
//! the browser app ships with.
//!
//! ```toml
//! [extract]
//! max_colors = 6
//!
//! [history]
//! max_entries = 50
//! max_age_days = 365
//!
//! [share]
//! base_url = "https://palette.example"
//! qr_size = 200
//!
//! [log]
//! level = "debug"
//! format = "json"
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PaletteError;
use crate::extract::DEFAULT_MAX_COLORS;
use crate::history::{HISTORY_SLOT, MAX_HISTORY_ITEMS};
use crate::share::{DEFAULT_BASE_URL, DEFAULT_QR_SIZE};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub extract: ExtractConfig,
    pub history: HistoryConfig,
    pub share: ShareConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    pub max_colors: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_colors: DEFAULT_MAX_COLORS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_entries: usize,
    pub max_age_days: u64,
    /// Storage slot (cookie name / file stem) holding the log.
    pub slot: String,
    /// Directory for file-backed history; `None` means the platform data dir.
    pub dir: Option<PathBuf>,
}

impl HistoryConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_days.saturating_mul(24 * 60 * 60))
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_entries: MAX_HISTORY_ITEMS,
            max_age_days: 365,
            slot: HISTORY_SLOT.to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    pub base_url: String,
    /// Edge length of the rendered QR code in pixels.
    pub qr_size: u32,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            qr_size: DEFAULT_QR_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = PaletteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(PaletteError::Config(format!(
                "unknown log format {s:?} (expected pretty or json)"
            ))),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Pretty => f.write_str("pretty"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level filter; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self, PaletteError> {
        let config: Config =
            toml::from_str(raw).map_err(|e| PaletteError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_file(path: &std::path::Path) -> Result<Self, PaletteError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PaletteError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), PaletteError> {
        if self.extract.max_colors == 0 {
            return Err(PaletteError::Config("extract.max_colors must be at least 1".into()));
        }
        if self.history.max_entries == 0 {
            return Err(PaletteError::Config("history.max_entries must be at least 1".into()));
        }
        if self.history.slot.is_empty()
            || !self
                .history
                .slot
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PaletteError::Config(format!(
                "history.slot {:?} must be non-empty and use only [A-Za-z0-9_-]",
                self.history.slot
            )));
        }
        if self.share.qr_size == 0 {
            return Err(PaletteError::Config("share.qr_size must be at least 1".into()));
        }
        url::Url::parse(&self.share.base_url)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.extract.max_colors, 6);
        assert_eq!(config.history.max_entries, 50);
        assert_eq!(config.history.max_age(), Duration::from_secs(365 * 86_400));
        assert_eq!(config.share.qr_size, 200);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [history]
            max_entries = 10

            [log]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.history.max_entries, 10);
        assert_eq!(config.history.slot, HISTORY_SLOT);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn zero_caps_are_rejected() {
        assert!(Config::from_toml_str("[extract]\nmax_colors = 0").is_err());
        assert!(Config::from_toml_str("[history]\nmax_entries = 0").is_err());
        assert!(Config::from_toml_str("[share]\nqr_size = 0").is_err());
    }

    #[test]
    fn bad_slot_and_base_url_are_rejected() {
        assert!(Config::from_toml_str("[history]\nslot = \"a=b; path\"").is_err());
        assert!(matches!(
            Config::from_toml_str("[share]\nbase_url = \"not a url\""),
            Err(PaletteError::InvalidUrl(_))
        ));
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        assert!(matches!(
            Config::from_toml_str("[extract\n"),
            Err(PaletteError::Config(_))
        ));
    }

    #[test]
    fn log_format_parses() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
