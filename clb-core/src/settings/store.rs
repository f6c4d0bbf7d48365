//! Settings persistence
//!
//! Each settings block is stored as one named record, keyed by the owning
//! process or sensor name. Records use an explicit, versioned JSON schema
//! rather than the in-memory layout of the block:
//!
//! ```json
//! {"schema":1,"collection":"bme280Sensor","values":{"bme280sensorfitted":"yes"}}
//! ```
//!
//! Values are stored in their display text form and restored through the
//! same parse/validate path the console uses. A value that is absent, does
//! not parse, or fails its validator is replaced by the field default, so a
//! record written by an older build still loads.
//!
//! ## Backends
//!
//! - [`MemoryStore`]: in-memory map, always available
//! - [`FileStore`]: one `<name>.json` file per record in a directory (std)

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};

use super::SettingsBlock;
use crate::constants::SETTINGS_SCHEMA_VERSION;
use crate::errors::StoreError;

/// Byte-level storage primitives
///
/// Implementations only move opaque records; encoding is handled by
/// [`SettingsRecord`].
pub trait SettingsStore {
    /// Read the record stored under `name`, `None` if there is none.
    fn load(&mut self, name: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the record stored under `name`.
    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Remove every record.
    fn wipe(&mut self) -> Result<(), StoreError>;

    /// Names of all stored records.
    fn names(&self) -> Result<Vec<String>, StoreError>;
}

/// Versioned persisted form of one settings block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsRecord {
    pub schema: u32,
    pub collection: String,
    pub values: BTreeMap<String, String>,
}

/// What happened when a record was applied to a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Every value came from storage
    Loaded,
    /// The record existed but this many values fell back to defaults
    PartiallyDefaulted(usize),
    /// No record, or an unreadable one; the whole block is at defaults
    Defaulted,
}

impl LoadOutcome {
    /// True when the stored record should be rewritten.
    pub fn needs_save(self) -> bool {
        !matches!(self, LoadOutcome::Loaded)
    }
}

impl SettingsRecord {
    /// Capture the current values of a block.
    pub fn capture(block: &dyn SettingsBlock) -> Self {
        Self {
            schema: SETTINGS_SCHEMA_VERSION,
            collection: block.collection().name.to_string(),
            values: block.values_text(),
        }
    }

    /// Write the record's values into a block.
    ///
    /// Every item is visited: stored values go through `set_from_text`, and
    /// items that are missing or rejected are reset to their default.
    /// Returns how many items were defaulted.
    pub fn apply(&self, block: &mut dyn SettingsBlock) -> usize {
        let mut defaulted = 0;
        for item in block.collection().items {
            let restored = match self.values.get(item.key) {
                Some(text) => block.set_from_text(item.key, text).is_ok(),
                None => false,
            };
            if !restored {
                block.reset(item.key);
                defaulted += 1;
            }
        }
        defaulted
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(self).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    /// Decode a record, rejecting other schema versions.
    pub fn from_bytes(name: &str, bytes: &[u8]) -> Result<Self, StoreError> {
        let record: SettingsRecord =
            serde_json::from_slice(bytes).map_err(|_| StoreError::Corrupt(name.to_string()))?;
        if record.schema != SETTINGS_SCHEMA_VERSION {
            return Err(StoreError::Corrupt(name.to_string()));
        }
        Ok(record)
    }
}

/// Persist one block under `name`, returning the record size in bytes.
pub fn save_block(
    store: &mut dyn SettingsStore,
    name: &str,
    block: &dyn SettingsBlock,
) -> Result<usize, StoreError> {
    let bytes = SettingsRecord::capture(block).to_bytes()?;
    store.save(name, &bytes)?;
    Ok(bytes.len())
}

/// Restore one block from the record stored under `name`.
///
/// A missing or corrupt record resets the block to defaults and is reported
/// as [`LoadOutcome::Defaulted`]; only backend failures are errors.
pub fn load_block(
    store: &mut dyn SettingsStore,
    name: &str,
    block: &mut dyn SettingsBlock,
) -> Result<LoadOutcome, StoreError> {
    let record = match store.load(name)? {
        Some(bytes) => SettingsRecord::from_bytes(name, &bytes).ok(),
        None => None,
    };

    match record {
        Some(record) => match record.apply(block) {
            0 => Ok(LoadOutcome::Loaded),
            n => Ok(LoadOutcome::PartiallyDefaulted(n)),
        },
        None => {
            block.reset_all();
            Ok(LoadOutcome::Defaulted)
        }
    }
}

/// In-memory store
///
/// Clones share nothing; use one instance per kernel.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    records: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored bytes, for inspection.
    pub fn record(&self, name: &str) -> Option<&[u8]> {
        self.records.get(name).map(Vec::as_slice)
    }

    /// Replace raw stored bytes, bypassing encoding.
    pub fn insert_raw(&mut self, name: &str, bytes: &[u8]) {
        self.records.insert(name.to_string(), bytes.to_vec());
    }
}

impl SettingsStore for MemoryStore {
    fn load(&mut self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.get(name).cloned())
    }

    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.records.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn wipe(&mut self) -> Result<(), StoreError> {
        self.records.clear();
        Ok(())
    }

    fn names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.records.keys().cloned().collect())
    }
}

/// Directory-backed store, one `<name>.json` file per record
#[cfg(feature = "std")]
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: std::path::PathBuf,
}

#[cfg(feature = "std")]
impl FileStore {
    const EXTENSION: &'static str = "json";

    /// Use `dir` for records, creating it if needed.
    pub fn open(dir: impl Into<std::path::PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.join(name).with_extension(Self::EXTENSION)
    }
}

#[cfg(feature = "std")]
impl SettingsStore for FileStore {
    fn load(&mut self, name: &str) -> Result<Option<Vec<u8>>, StoreError> {
        match std::fs::read(self.path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    fn save(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        std::fs::write(self.path(name), bytes).map_err(|e| StoreError::Io(e.to_string()))
    }

    fn wipe(&mut self) -> Result<(), StoreError> {
        for name in self.names()? {
            std::fs::remove_file(self.path(&name)).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        Ok(())
    }

    fn names(&self) -> Result<Vec<String>, StoreError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StoreError::Io(e.to_string()))?;
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::Io(e.to_string()))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(Self::EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::validators;

    crate::settings_block! {
        pub struct StoredSettings => "stored", "Store test block" {
            active: bool = true => "storedactive", "Active";
            samples: i32 = 10 => "storedsamples", "Samples", validate = validators::positive;
            name: String = String::new() => "storedname", "Name";
        }
    }

    #[test]
    fn save_then_load_reproduces_values() {
        let mut store = MemoryStore::new();
        let mut original = StoredSettings::default();
        original.set_from_text("storedactive", "no").unwrap();
        original.set_from_text("storedsamples", "3").unwrap();
        original.set_from_text("storedname", "porch light").unwrap();

        save_block(&mut store, "stored", &original).unwrap();

        let mut restored = StoredSettings { active: true, samples: 0, name: String::new() };
        assert_eq!(load_block(&mut store, "stored", &mut restored), Ok(LoadOutcome::Loaded));
        assert_eq!(restored, original);
    }

    #[test]
    fn missing_record_resets_to_defaults() {
        let mut store = MemoryStore::new();
        let mut block = StoredSettings { active: false, samples: 99, name: "x".into() };
        assert_eq!(load_block(&mut store, "stored", &mut block), Ok(LoadOutcome::Defaulted));
        assert_eq!(block, StoredSettings::default());
    }

    #[test]
    fn rejected_value_falls_back_to_default() {
        let mut store = MemoryStore::new();
        store.insert_raw(
            "stored",
            br#"{"schema":1,"collection":"stored","values":{"storedactive":"no","storedsamples":"-4"}}"#,
        );

        let mut block = StoredSettings::default();
        let outcome = load_block(&mut store, "stored", &mut block).unwrap();
        assert_eq!(outcome, LoadOutcome::PartiallyDefaulted(2));
        assert!(!block.active);
        assert_eq!(block.samples, 10);
        assert!(outcome.needs_save());
    }

    #[test]
    fn other_schema_versions_are_corrupt() {
        let mut store = MemoryStore::new();
        store.insert_raw("stored", br#"{"schema":0,"collection":"stored","values":{}}"#);
        let mut block = StoredSettings::default();
        assert_eq!(load_block(&mut store, "stored", &mut block), Ok(LoadOutcome::Defaulted));

        assert!(SettingsRecord::from_bytes("stored", b"not json").is_err());
    }

    #[test]
    fn wipe_clears_everything() {
        let mut store = MemoryStore::new();
        save_block(&mut store, "a", &StoredSettings::default()).unwrap();
        save_block(&mut store, "b", &StoredSettings::default()).unwrap();
        assert_eq!(store.names().unwrap().len(), 2);

        store.wipe().unwrap();
        assert!(store.names().unwrap().is_empty());
    }
}
