//! Persisted log of generated palettes, newest first.
//!
//! The whole log lives in a single storage slot as a JSON array. Every
//! mutation reads the slot, edits the log and rewrites the slot in full.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::HistoryConfig;
use crate::extract::Palette;
use crate::storage::{Storage, StorageError};

pub const HISTORY_SLOT: &str = "color-extractor-history";
pub const MAX_HISTORY_ITEMS: usize = 50;
pub const HISTORY_MAX_AGE: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub colors: Palette,
    /// Creation time in unix milliseconds; unique within a log.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

pub type HistoryLog = Vec<HistoryEntry>;

/// Source of entry timestamps, in unix milliseconds.
pub trait Clock {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(target_arch = "wasm32")]
    fn now_millis(&self) -> i64 {
        js_sys::Date::now() as i64
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn now_millis(&self) -> i64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

fn normalize_name(name: Option<String>) -> Option<String> {
    name.filter(|n| !n.trim().is_empty())
}

/// The only way to read or mutate the history log.
#[derive(Debug)]
pub struct HistoryStore<S, C = SystemClock> {
    storage: S,
    clock: C,
    slot: String,
    max_entries: usize,
    max_age: Duration,
}

impl<S: Storage> HistoryStore<S, SystemClock> {
    pub fn new(storage: S) -> Self {
        HistoryStore::with_clock(storage, SystemClock)
    }
}

impl<S: Storage, C: Clock> HistoryStore<S, C> {
    pub fn with_clock(storage: S, clock: C) -> Self {
        HistoryStore {
            storage,
            clock,
            slot: HISTORY_SLOT.to_string(),
            max_entries: MAX_HISTORY_ITEMS,
            max_age: HISTORY_MAX_AGE,
        }
    }

    pub fn configure(mut self, config: &HistoryConfig) -> Self {
        self.slot = config.slot.clone();
        self.max_entries = config.max_entries;
        self.max_age = config.max_age();
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Reads the persisted log. Absent or malformed data yields an empty log.
    pub fn load(&self) -> HistoryLog {
        let raw = match self.storage.read(&self.slot) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, slot = %self.slot, "history unreadable, starting empty");
                return Vec::new();
            }
        };
        match serde_json::from_str::<HistoryLog>(&raw) {
            Ok(mut log) => {
                log.truncate(self.max_entries);
                log
            }
            Err(e) => {
                tracing::warn!(error = %e, slot = %self.slot, "history is malformed, starting empty");
                Vec::new()
            }
        }
    }

    /// Prepends a new entry, evicts beyond the cap and persists the log.
    ///
    /// When the medium rejects the log as too large (a cookie jar holds far
    /// fewer than 50 palettes) the oldest entries are dropped until it fits.
    /// The new entry itself is always kept, so a successful return means it
    /// is persisted.
    pub fn save(
        &mut self,
        colors: Palette,
        name: Option<String>,
    ) -> Result<HistoryEntry, StorageError> {
        let mut log = self.load();
        let now = self.clock.now_millis();
        let timestamp = match log.first() {
            Some(newest) if newest.timestamp >= now => newest.timestamp + 1,
            _ => now,
        };
        let entry = HistoryEntry {
            colors,
            timestamp,
            name: normalize_name(name),
        };
        log.insert(0, entry.clone());
        log.truncate(self.max_entries);
        self.persist_shedding(log)?;
        Ok(entry)
    }

    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.storage.remove(&self.slot)?;
        tracing::debug!(slot = %self.slot, "history cleared");
        Ok(())
    }

    /// Renames the first entry with `timestamp`; returns whether one matched.
    ///
    /// Nothing is written when no entry matches.
    pub fn rename(&mut self, timestamp: i64, new_name: &str) -> Result<bool, StorageError> {
        let mut log = self.load();
        let Some(entry) = log.iter_mut().find(|e| e.timestamp == timestamp) else {
            return Ok(false);
        };
        entry.name = normalize_name(Some(new_name.to_string()));
        self.persist(&log)?;
        Ok(true)
    }

    pub fn get(&self, timestamp: i64) -> Option<HistoryEntry> {
        self.load().into_iter().find(|e| e.timestamp == timestamp)
    }

    fn persist(&mut self, log: &[HistoryEntry]) -> Result<(), StorageError> {
        let json = serde_json::to_string(log)?;
        self.storage.write(&self.slot, &json, self.max_age)
    }

    fn persist_shedding(&mut self, mut log: HistoryLog) -> Result<(), StorageError> {
        loop {
            match self.persist(&log) {
                Err(StorageError::Rejected { bytes, .. }) if log.len() > 1 => {
                    log.pop();
                    tracing::warn!(
                        bytes,
                        kept = log.len(),
                        slot = %self.slot,
                        "history too large for storage, dropping oldest entry"
                    );
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::storage::{MemoryStorage, confirm_write};

    /// Silently drops values over `limit` bytes, the way a browser treats an
    /// oversized cookie, then reads the slot back.
    struct SizeCappedStorage {
        inner: MemoryStorage,
        limit: usize,
    }

    impl Storage for SizeCappedStorage {
        fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
            self.inner.read(key)
        }

        fn write(&mut self, key: &str, value: &str, max_age: Duration) -> Result<(), StorageError> {
            if value.len() <= self.limit {
                self.inner.write(key, value, max_age)?;
            }
            confirm_write(key, value, self.inner.read(key)?.as_deref())
        }

        fn remove(&mut self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key)
        }
    }

    fn capped_store(limit: usize) -> HistoryStore<SizeCappedStorage, StepClock> {
        let storage = SizeCappedStorage {
            inner: MemoryStorage::new(),
            limit,
        };
        HistoryStore::with_clock(storage, StepClock(Cell::new(1_700_000_000_000)))
    }

    /// Advances by one second per reading.
    struct StepClock(Cell<i64>);

    impl Clock for StepClock {
        fn now_millis(&self) -> i64 {
            let now = self.0.get();
            self.0.set(now + 1000);
            now
        }
    }

    struct FrozenClock(i64);

    impl Clock for FrozenClock {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }

    fn store() -> HistoryStore<MemoryStorage, StepClock> {
        HistoryStore::with_clock(MemoryStorage::new(), StepClock(Cell::new(1_700_000_000_000)))
    }

    fn palette(i: u32) -> Palette {
        Palette::from_hex([format!("#{i:06x}")]).unwrap()
    }

    #[test]
    fn save_prepends_newest_first() {
        let mut history = store();
        history.save(palette(1), None).unwrap();
        history.save(palette(2), Some("second".into())).unwrap();

        let log = history.load();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].colors, palette(2));
        assert_eq!(log[0].name.as_deref(), Some("second"));
        assert_eq!(log[1].colors, palette(1));
        assert!(log[0].timestamp > log[1].timestamp);
    }

    #[test]
    fn cap_evicts_oldest_entry() {
        let mut history = store();
        let first = history.save(palette(0), None).unwrap();
        for i in 1..=MAX_HISTORY_ITEMS as u32 {
            history.save(palette(i), None).unwrap();
        }

        let log = history.load();
        assert_eq!(log.len(), MAX_HISTORY_ITEMS);
        assert_eq!(log[0].colors, palette(MAX_HISTORY_ITEMS as u32));
        assert_eq!(log[MAX_HISTORY_ITEMS - 1].colors, palette(1));
        assert!(log.iter().all(|e| e.timestamp != first.timestamp));
        assert!(log.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
    }

    #[test]
    fn timestamps_stay_unique_when_clock_stalls() {
        let mut history = HistoryStore::with_clock(MemoryStorage::new(), FrozenClock(42));
        let a = history.save(palette(1), None).unwrap();
        let b = history.save(palette(2), None).unwrap();
        assert_eq!(a.timestamp, 42);
        assert_eq!(b.timestamp, 43);
    }

    #[test]
    fn rename_only_touches_name() {
        let mut history = store();
        history.save(palette(1), None).unwrap();
        let target = history.save(palette(2), Some("old".into())).unwrap();
        history.save(palette(3), None).unwrap();
        let before = history.load();

        assert!(history.rename(target.timestamp, "new").unwrap());

        let after = history.load();
        assert_eq!(after.len(), before.len());
        assert_eq!(after[1].timestamp, target.timestamp);
        assert_eq!(after[1].colors, target.colors);
        assert_eq!(after[1].name.as_deref(), Some("new"));
        assert_eq!(after[0], before[0]);
        assert_eq!(after[2], before[2]);
    }

    #[test]
    fn rename_without_match_is_a_no_op() {
        let mut history = store();
        history.save(palette(1), Some("kept".into())).unwrap();
        let before = history.storage().read(HISTORY_SLOT).unwrap();
        assert!(!history.rename(-1, "ignored").unwrap());
        assert_eq!(history.storage().read(HISTORY_SLOT).unwrap(), before);
    }

    #[test]
    fn blank_names_are_stored_as_absent() {
        let mut history = store();
        let entry = history.save(palette(1), Some("   ".into())).unwrap();
        assert_eq!(entry.name, None);
        let raw = history.storage().read(HISTORY_SLOT).unwrap().unwrap();
        assert!(!raw.contains("name"), "got {raw}");
    }

    #[test]
    fn clear_empties_the_log() {
        let mut history = store();
        history.save(palette(1), None).unwrap();
        history.clear().unwrap();
        assert!(history.load().is_empty());
    }

    #[test]
    fn corrupt_slot_loads_as_empty() {
        for raw in ["not json", "{\"colors\":[]}", r#"[{"colors":["zzz"],"timestamp":1}]"#] {
            let mut storage = MemoryStorage::new();
            storage.write(HISTORY_SLOT, raw, HISTORY_MAX_AGE).unwrap();
            let history = HistoryStore::with_clock(storage, FrozenClock(0));
            assert!(history.load().is_empty(), "expected empty log for {raw:?}");
        }
    }

    #[test]
    fn save_overwrites_corrupt_slot() {
        let mut storage = MemoryStorage::new();
        storage.write(HISTORY_SLOT, "garbage", HISTORY_MAX_AGE).unwrap();
        let mut history = HistoryStore::with_clock(storage, FrozenClock(7));
        history.save(palette(1), None).unwrap();
        assert_eq!(history.load().len(), 1);
    }

    #[test]
    fn persisted_layout_matches_wire_format() {
        let mut history = HistoryStore::with_clock(MemoryStorage::new(), FrozenClock(1000));
        history
            .save(Palette::from_hex(["#a1b2c3"]).unwrap(), Some("Sea".into()))
            .unwrap();
        let raw = history.storage().read(HISTORY_SLOT).unwrap().unwrap();
        assert_eq!(raw, r##"[{"colors":["#a1b2c3"],"timestamp":1000,"name":"Sea"}]"##);
    }

    #[test]
    fn configured_cap_and_slot_are_honoured() {
        let config = HistoryConfig {
            max_entries: 2,
            slot: "custom".into(),
            ..HistoryConfig::default()
        };
        let mut history = store().configure(&config);
        for i in 0..5 {
            history.save(palette(i), None).unwrap();
        }
        assert_eq!(history.load().len(), 2);
        assert!(history.storage().read(HISTORY_SLOT).unwrap().is_none());
        assert!(history.storage().read("custom").unwrap().is_some());
    }

    #[test]
    fn oversized_log_sheds_oldest_entries_and_keeps_the_new_one() {
        let mut history = capped_store(1000);
        for i in 0..30 {
            let entry = history.save(palette(i), None).unwrap();
            assert_eq!(history.load().first(), Some(&entry), "save {i} was not persisted");
        }

        let log = history.load();
        assert!(log.len() > 1 && log.len() < 30, "kept {}", log.len());
        assert_eq!(log[0].colors, palette(29));
        assert!(log.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
        let raw = history.storage().read(HISTORY_SLOT).unwrap().unwrap();
        assert!(raw.len() <= 1000);
    }

    #[test]
    fn entry_that_can_never_fit_is_an_error() {
        let mut history = capped_store(10);
        assert!(matches!(
            history.save(palette(1), None),
            Err(StorageError::Rejected { .. })
        ));
        assert!(history.load().is_empty());
    }

    #[test]
    fn rejected_rename_leaves_log_untouched() {
        let mut history = capped_store(200);
        let entry = history.save(palette(1), Some("short".into())).unwrap();
        let long_name = "x".repeat(300);
        assert!(matches!(
            history.rename(entry.timestamp, &long_name),
            Err(StorageError::Rejected { .. })
        ));
        assert_eq!(history.load(), vec![entry]);
    }

    #[test]
    fn get_finds_entry_by_timestamp() {
        let mut history = store();
        let entry = history.save(palette(9), None).unwrap();
        assert_eq!(history.get(entry.timestamp), Some(entry));
        assert_eq!(history.get(0), None);
    }
}
