use std::collections::BTreeMap;
use std::path::PathBuf;

use confusion_core::CalibrationBaseline;
use parking_lot::Mutex;
use thiserror::Error;

/// Key under which the calibration baseline is persisted.
pub const CALIBRATION_KEY: &str = "confusionCalibration";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store JSON failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Opaque string key/value persistence.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// A single JSON object on disk mapping keys to string values.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// A file that is not a JSON object of strings opens as an empty store;
    /// its bytes are kept next to it with a `.corrupt` suffix.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(err) => {
                    let backup = path.with_extension("json.corrupt");
                    tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable store");
                    if let Err(err) = std::fs::write(&backup, &bytes) {
                        tracing::warn!(path = %backup.display(), error = %err, "failed to keep corrupt store copy");
                    }
                    BTreeMap::new()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    /// Memory is only updated once the file write succeeded.
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}

/// Reads the persisted baseline. Unreadable or malformed values are treated
/// as "not calibrated".
pub fn load_baseline(store: &dyn KeyValueStore) -> Option<CalibrationBaseline> {
    let raw = match store.get(CALIBRATION_KEY) {
        Ok(raw) => raw?,
        Err(err) => {
            tracing::warn!(error = %err, "failed to read calibration");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(baseline) => Some(baseline),
        Err(err) => {
            tracing::warn!(error = %err, "ignoring malformed calibration");
            None
        }
    }
}

pub fn save_baseline(store: &dyn KeyValueStore, baseline: &CalibrationBaseline) -> Result<(), StoreError> {
    store.set(CALIBRATION_KEY, &serde_json::to_string(baseline)?)
}

pub fn clear_baseline(store: &dyn KeyValueStore) -> Result<(), StoreError> {
    store.remove(CALIBRATION_KEY)
}
