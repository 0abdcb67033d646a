//! Named key-value slots with an expiry, the medium the history log lives in.

use std::collections::HashMap;
use std::time::Duration;

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The medium did not keep the value, typically because it is too large.
    #[error("storage rejected a {bytes}-byte value for slot {key:?}")]
    Rejected { key: String, bytes: usize },

    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// A string-valued slot store. Each write replaces the whole slot.
pub trait Storage {
    /// Returns the slot's value, or `None` if it is absent or expired.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the slot; it expires `max_age` after this write.
    fn write(&mut self, key: &str, value: &str, max_age: Duration) -> Result<(), StorageError>;

    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// Per-cookie budget (name, `=` and value) that browsers are required to honour.
pub const COOKIE_MAX_BYTES: usize = 4096;

/// Octets that may not appear raw in a cookie value, plus `%` itself.
/// Non-ASCII is always escaped by `utf8_percent_encode`.
const COOKIE_VALUE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b',')
    .add(b';')
    .add(b'\\')
    .add(b'%');

/// Escapes `value` for use as a cookie value, leaving JSON punctuation such
/// as `[`, `{`, `:` and `#` as is.
pub fn encode_cookie_value(value: &str) -> String {
    utf8_percent_encode(value, COOKIE_VALUE).to_string()
}

/// Fails with `Rejected` unless `stored` is exactly what was written.
pub fn confirm_write(key: &str, value: &str, stored: Option<&str>) -> Result<(), StorageError> {
    if stored == Some(value) {
        Ok(())
    } else {
        Err(StorageError::Rejected {
            key: key.to_string(),
            bytes: value.len(),
        })
    }
}

/// Process-local storage; expiry is not tracked.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    slots: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.slots.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &str, _max_age: Duration) -> Result<(), StorageError> {
        self.slots.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.slots.remove(key);
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use file::FileStorage;

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use std::fs;
    use std::io::ErrorKind;
    use std::path::{Path, PathBuf};
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use serde::{Deserialize, Serialize};

    use super::{Storage, StorageError};

    #[derive(Serialize, Deserialize)]
    struct Envelope {
        expires_at: u64,
        value: String,
    }

    fn now_millis() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// One JSON file per slot under `dir`.
    ///
    /// Files are written to a sibling temp path and renamed into place, so a
    /// reader sees either the previous slot or the new one.
    #[derive(Debug, Clone)]
    pub struct FileStorage {
        dir: PathBuf,
    }

    impl FileStorage {
        pub fn new(dir: impl Into<PathBuf>) -> Self {
            FileStorage { dir: dir.into() }
        }

        pub fn dir(&self) -> &Path {
            &self.dir
        }

        fn slot_path(&self, key: &str) -> PathBuf {
            self.dir.join(format!("{key}.json"))
        }
    }

    impl Storage for FileStorage {
        fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            let raw = match fs::read_to_string(self.slot_path(key)) {
                Ok(raw) => raw,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let envelope: Envelope = serde_json::from_str(&raw)?;
            if envelope.expires_at <= now_millis() {
                tracing::debug!(key, "storage slot expired");
                return Ok(None);
            }
            Ok(Some(envelope.value))
        }

        fn write(&mut self, key: &str, value: &str, max_age: Duration) -> Result<(), StorageError> {
            fs::create_dir_all(&self.dir)?;
            let envelope = Envelope {
                expires_at: now_millis().saturating_add(max_age.as_millis() as u64),
                value: value.to_string(),
            };
            let path = self.slot_path(key);
            let tmp = path.with_extension("json.tmp");
            fs::write(&tmp, serde_json::to_vec(&envelope)?)?;
            fs::rename(&tmp, &path)?;
            tracing::debug!(key, path = %path.display(), bytes = value.len(), "storage slot written");
            Ok(())
        }

        fn remove(&mut self, key: &str) -> Result<(), StorageError> {
            match fs::remove_file(self.slot_path(key)) {
                Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            }
        }
    }
}

#[cfg(target_arch = "wasm32")]
pub use cookie::CookieStorage;

#[cfg(target_arch = "wasm32")]
mod cookie {
    use std::time::Duration;

    use percent_encoding::percent_decode_str;
    use wasm_bindgen::JsCast;
    use web_sys::HtmlDocument;

    use super::{COOKIE_MAX_BYTES, Storage, StorageError, confirm_write, encode_cookie_value};

    /// Slots stored as `document.cookie` entries scoped to `path=/`.
    ///
    /// Browsers drop an oversized cookie without raising, so every write is
    /// read back and a mismatch is reported as `Rejected`.
    #[derive(Debug, Clone, Default)]
    pub struct CookieStorage;

    fn document() -> Result<HtmlDocument, StorageError> {
        web_sys::window()
            .and_then(|w| w.document())
            .and_then(|d| d.dyn_into::<HtmlDocument>().ok())
            .ok_or_else(|| StorageError::Unavailable("no html document".into()))
    }

    fn set_cookie(cookie: &str) -> Result<(), StorageError> {
        document()?
            .set_cookie(cookie)
            .map_err(|e| StorageError::Unavailable(format!("{e:?}")))
    }

    impl Storage for CookieStorage {
        fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            let cookies = document()?
                .cookie()
                .map_err(|e| StorageError::Unavailable(format!("{e:?}")))?;
            let prefix = format!("{key}=");
            let Some(raw) = cookies
                .split(';')
                .map(str::trim)
                .find_map(|c| c.strip_prefix(prefix.as_str()))
            else {
                return Ok(None);
            };
            let value = percent_decode_str(raw)
                .decode_utf8()
                .map_err(|e| StorageError::Unavailable(format!("cookie is not utf-8: {e}")))?;
            Ok(Some(value.into_owned()))
        }

        fn write(&mut self, key: &str, value: &str, max_age: Duration) -> Result<(), StorageError> {
            let encoded = encode_cookie_value(value);
            if key.len() + 1 + encoded.len() > COOKIE_MAX_BYTES {
                tracing::warn!(key, bytes = encoded.len(), "cookie value over budget");
                return Err(StorageError::Rejected {
                    key: key.to_string(),
                    bytes: value.len(),
                });
            }
            set_cookie(&format!(
                "{key}={encoded}; max-age={}; path=/",
                max_age.as_secs()
            ))?;
            confirm_write(key, value, self.read(key)?.as_deref())
        }

        fn remove(&mut self, key: &str) -> Result<(), StorageError> {
            set_cookie(&format!("{key}=; max-age=0; path=/"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn memory_storage_replaces_and_removes() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.read("slot").unwrap(), None);
        storage.write("slot", "one", DAY).unwrap();
        storage.write("slot", "two", DAY).unwrap();
        assert_eq!(storage.read("slot").unwrap().as_deref(), Some("two"));
        storage.remove("slot").unwrap();
        assert_eq!(storage.read("slot").unwrap(), None);
    }

    #[test]
    fn cookie_encoding_escapes_only_illegal_octets() {
        let json = r##"[{"colors":["#a1b2c3"],"timestamp":1000,"name":"Sea; 50%"}]"##;
        let encoded = encode_cookie_value(json);
        assert_eq!(
            encoded,
            "[{%22colors%22:[%22#a1b2c3%22]%2C%22timestamp%22:1000%2C%22name%22:%22Sea%3B%2050%25%22}]"
        );
        let decoded = percent_encoding::percent_decode_str(&encoded).decode_utf8().unwrap();
        assert_eq!(decoded, json);
        assert_eq!(encode_cookie_value("é"), "%C3%A9");
    }

    #[test]
    fn confirm_write_flags_dropped_values() {
        assert!(confirm_write("slot", "new", Some("new")).is_ok());
        assert!(matches!(
            confirm_write("slot", "new", Some("old")),
            Err(StorageError::Rejected { bytes: 3, .. })
        ));
        assert!(matches!(
            confirm_write("slot", "new", None),
            Err(StorageError::Rejected { .. })
        ));
    }

    #[test]
    fn file_storage_round_trips_a_slot() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path().join("nested"));
        storage.write("history", r#"[{"a":1}]"#, DAY).unwrap();
        assert_eq!(storage.read("history").unwrap().as_deref(), Some(r#"[{"a":1}]"#));
        assert!(!dir.path().join("nested/history.json.tmp").exists());
    }

    #[test]
    fn file_storage_treats_expired_slot_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path());
        storage.write("history", "[]", Duration::ZERO).unwrap();
        assert_eq!(storage.read("history").unwrap(), None);
    }

    #[test]
    fn file_storage_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path());
        storage.remove("missing").unwrap();
        storage.write("slot", "x", DAY).unwrap();
        storage.remove("slot").unwrap();
        assert_eq!(storage.read("slot").unwrap(), None);
    }

    #[test]
    fn file_storage_surfaces_corrupt_envelopes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("slot.json"), "not json").unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(matches!(storage.read("slot"), Err(StorageError::Json(_))));
    }
}
