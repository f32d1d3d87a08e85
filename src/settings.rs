//! Persisted key-value settings scoped to the application instance.
//!
//! Every other component reads and writes through [`SettingsStore`]: the
//! device token and auth secret, the custom App ID, the enterprise endpoint
//! and the keep-alive override. Writes are atomic at key granularity; the
//! token and auth secret are always written in the same call sequence by
//! their owner, so no cross-key transaction is needed.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde_json::Value;
use tracing::error;

/// Abstract persisted settings store.
///
/// Passing `None` as a value removes the key. Implementations must be safe to
/// share across tasks.
pub trait SettingsStore: Send + Sync + 'static {
    fn get_string(&self, key: &str) -> Option<String>;
    fn set_string(&self, key: &str, value: Option<&str>);
    fn get_i64(&self, key: &str) -> Option<i64>;
    fn set_i64(&self, key: &str, value: Option<i64>);
}

/// In-memory store for tests and embedders that manage persistence themselves.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, Value>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }

    fn write(&self, key: &str, value: Option<Value>) {
        let mut values = self
            .values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match value {
            Some(value) => {
                values.insert(key.to_string(), value);
            }
            None => {
                values.remove(key);
            }
        }
    }
}

impl SettingsStore for MemorySettings {
    fn get_string(&self, key: &str) -> Option<String> {
        self.read(key).and_then(|v| v.as_str().map(str::to_owned))
    }

    fn set_string(&self, key: &str, value: Option<&str>) {
        self.write(key, value.map(|v| Value::String(v.to_string())));
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.read(key).and_then(|v| v.as_i64())
    }

    fn set_i64(&self, key: &str, value: Option<i64>) {
        self.write(key, value.map(Value::from));
    }
}

/// File-backed store: a single JSON document rewritten on every change.
///
/// The document is written to a temp file first and renamed into place, so a
/// crash mid-write never leaves a truncated settings file behind. Write
/// failures are logged rather than surfaced; the in-memory view stays
/// authoritative for the lifetime of the process.
#[derive(Debug)]
pub struct FileSettings {
    path: PathBuf,
    values: RwLock<serde_json::Map<String, Value>>,
}

impl FileSettings {
    /// Opens (or creates) the settings file at the platform config location,
    /// e.g. `~/.config/pushy/settings.json` on Linux.
    pub fn open_default() -> io::Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no config directory"))?
            .join("pushy");
        fs::create_dir_all(&dir)?;
        Self::open(dir.join("settings.json"))
    }

    /// Opens the settings file at an explicit path. A missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => serde_json::Map::new(),
            Err(e) => return Err(e),
        };
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, key: &str, value: Option<Value>) {
        let mut values = self
            .values
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match value {
            Some(value) => {
                values.insert(key.to_string(), value);
            }
            None => {
                values.remove(key);
            }
        }
        if let Err(e) = persist(&self.path, &values) {
            error!(path = %self.path.display(), error = %e, "failed to persist settings");
        }
    }

    fn read(&self, key: &str) -> Option<Value> {
        self.values
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()
    }
}

fn persist(path: &Path, values: &serde_json::Map<String, Value>) -> io::Result<()> {
    let bytes = serde_json::to_vec_pretty(values)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

impl SettingsStore for FileSettings {
    fn get_string(&self, key: &str) -> Option<String> {
        self.read(key).and_then(|v| v.as_str().map(str::to_owned))
    }

    fn set_string(&self, key: &str, value: Option<&str>) {
        self.update(key, value.map(|v| Value::String(v.to_string())));
    }

    fn get_i64(&self, key: &str) -> Option<i64> {
        self.read(key).and_then(|v| v.as_i64())
    }

    fn set_i64(&self, key: &str, value: Option<i64>) {
        self.update(key, value.map(Value::from));
    }
}
