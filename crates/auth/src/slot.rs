//! Local persistent key-value slot (survives restarts on one device).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use crate::config::AuthConfig;

/// Key holding the cached identity JSON.
pub const CACHED_IDENTITY_KEY: &str = "bioboxsys_user";

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("slot io error for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid slot key '{0}'")]
    InvalidKey(String),

    #[error("slot lock poisoned")]
    Poisoned,

    #[error("no data directory available for the local slot")]
    NoDataDir,
}

/// String key-value storage scoped to one device.
///
/// Called synchronously under the session lock, from async tasks. Keep
/// implementations to small local reads and writes.
pub trait LocalSlot: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SlotError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SlotError>;
    fn remove(&self, key: &str) -> Result<(), SlotError>;
}

/// Process-local slot for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemorySlot {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalSlot for MemorySlot {
    fn get(&self, key: &str) -> Result<Option<String>, SlotError> {
        let values = self.values.lock().map_err(|_| SlotError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SlotError> {
        let mut values = self.values.lock().map_err(|_| SlotError::Poisoned)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SlotError> {
        let mut values = self.values.lock().map_err(|_| SlotError::Poisoned)?;
        values.remove(key);
        Ok(())
    }
}

/// Slot persisted as one file per key under a directory.
///
/// Writes go through a temporary file and a rename so a crash never leaves a
/// half-written value behind.
#[derive(Debug, Clone)]
pub struct FileSlot {
    dir: PathBuf,
}

impl FileSlot {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<platform data dir>/bioboxsys`.
    pub fn in_data_dir() -> Result<Self, SlotError> {
        let base = dirs::data_dir().ok_or(SlotError::NoDataDir)?;
        Ok(Self::new(base.join("bioboxsys")))
    }

    /// Slot in `config.slot_dir`, else the platform data directory.
    pub fn for_config(config: &AuthConfig) -> Result<Self, SlotError> {
        match &config.slot_dir {
            Some(dir) => Ok(Self::new(dir.clone())),
            None => Self::in_data_dir(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, SlotError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(SlotError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl LocalSlot for FileSlot {
    fn get(&self, key: &str) -> Result<Option<String>, SlotError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SlotError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SlotError> {
        let path = self.path_for(key)?;
        let io = |source| SlotError::Io {
            key: key.to_string(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(io)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(io)?;
        std::fs::rename(&tmp, &path).map_err(io)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SlotError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SlotError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_slot_set_get_remove() {
        let slot = MemorySlot::new();
        assert_eq!(slot.get(CACHED_IDENTITY_KEY).unwrap(), None);

        slot.set(CACHED_IDENTITY_KEY, "{}").unwrap();
        assert_eq!(slot.get(CACHED_IDENTITY_KEY).unwrap().as_deref(), Some("{}"));

        slot.remove(CACHED_IDENTITY_KEY).unwrap();
        assert_eq!(slot.get(CACHED_IDENTITY_KEY).unwrap(), None);
    }

    #[test]
    fn file_slot_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("profile");

        FileSlot::new(&nested).set(CACHED_IDENTITY_KEY, r#"{"id":"1"}"#).unwrap();

        let reopened = FileSlot::new(&nested);
        assert_eq!(
            reopened.get(CACHED_IDENTITY_KEY).unwrap().as_deref(),
            Some(r#"{"id":"1"}"#)
        );
        assert!(!nested.join("bioboxsys_user.json.tmp").exists());

        reopened.remove(CACHED_IDENTITY_KEY).unwrap();
        assert_eq!(reopened.get(CACHED_IDENTITY_KEY).unwrap(), None);
        // Removing twice is fine.
        reopened.remove(CACHED_IDENTITY_KEY).unwrap();
    }

    #[test]
    fn file_slot_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let slot = FileSlot::new(dir.path());
        assert!(matches!(slot.get("../etc/passwd"), Err(SlotError::InvalidKey(_))));
        assert!(matches!(slot.set("", "x"), Err(SlotError::InvalidKey(_))));
        assert!(matches!(slot.remove(".hidden"), Err(SlotError::InvalidKey(_))));
    }

    #[test]
    fn configured_dir_wins() {
        let config = AuthConfig {
            slot_dir: Some(PathBuf::from("/var/lib/bioboxsys")),
            ..AuthConfig::default()
        };
        let slot = FileSlot::for_config(&config).unwrap();
        assert_eq!(slot.dir(), Path::new("/var/lib/bioboxsys"));
    }
}
