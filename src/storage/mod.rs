//! Durable key-value storage behind the snapshot slot.

pub mod snapshot;

use log::debug;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use uuid::Uuid;

use crate::error::StorageError;

pub use snapshot::{PersistenceSnapshotter, SnapshotRecord};

/// A string-keyed durable store
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

/// One file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys become file names; keep them to a safe alphabet
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Write then rename so a crash never leaves half a snapshot. Every
        // writer stages to its own file; the last rename wins.
        let staging = path.with_extension(format!("json.{}.tmp", Uuid::new_v4()));
        if let Err(e) = fs::write(&staging, value).and_then(|_| fs::rename(&staging, &path)) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        debug!("Wrote {} bytes to {}", value.len(), path.display());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store. Clones share the same entries.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, String>>>,
    available: Rc<Cell<bool>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            entries: Rc::default(),
            available: Rc::new(Cell::new(true)),
        }
    }

    /// Make every call fail as if the medium went away
    pub fn set_available(&self, available: bool) {
        self.available.set(available);
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.available.get() {
            Ok(())
        } else {
            Err(StorageError::Unavailable)
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check()?;
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check()?;
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.check()?;
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("nested"));
        assert_eq!(store.get("chessGame").unwrap(), None);

        store.set("chessGame", "{\"a\":1}").unwrap();
        assert_eq!(store.get("chessGame").unwrap().as_deref(), Some("{\"a\":1}"));

        store.set("chessGame", "{\"a\":2}").unwrap();
        assert_eq!(store.get("chessGame").unwrap().as_deref(), Some("{\"a\":2}"));

        store.remove("chessGame").unwrap();
        store.remove("chessGame").unwrap();
        assert_eq!(store.get("chessGame").unwrap(), None);
    }

    #[test]
    fn concurrent_writers_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let writers: Vec<_> = (0..4)
            .map(|n| {
                let mut store = FileStore::new(dir.path());
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.set("chessGame", &format!("{n}-{i}")).unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let store = FileStore::new(dir.path());
        assert!(store.get("chessGame").unwrap().unwrap().ends_with("-49"));
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn file_store_sanitises_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let path = store.path_for("../escape");
        assert_eq!(path.parent(), Some(dir.path()));
    }

    #[test]
    fn memory_store_can_be_switched_off() {
        let mut store = MemoryStore::new();
        store.set("k", "v").unwrap();
        store.set_available(false);
        assert!(matches!(store.get("k"), Err(StorageError::Unavailable)));
        assert!(store.set("k", "w").is_err());
        store.set_available(true);
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
