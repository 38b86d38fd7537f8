use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::game::utils::epoch_millis;
use crate::models::GameState;
use crate::storage::KeyValueStore;

const PROBE_KEY: &str = "__storage_test__";

/// The persisted copy of the latest game
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    #[serde(flatten)]
    pub state: GameState,
    pub id: String,
    /// Epoch millis of the save
    pub timestamp: u64,
}

/// Single-slot, best-effort persistence of the game state.
///
/// Every failure is logged and swallowed. Callers get `false` or `None`.
pub struct PersistenceSnapshotter {
    storage: Box<dyn KeyValueStore>,
    key: String,
}

impl PersistenceSnapshotter {
    pub fn new(storage: Box<dyn KeyValueStore>, config: &StorageConfig) -> Self {
        // Only one slot is ever kept, whatever the history limit
        debug!(
            "Snapshot slot {} (history limit {})",
            config.key, config.max_history
        );
        PersistenceSnapshotter {
            storage,
            key: config.key.clone(),
        }
    }

    /// Probe the medium with a throwaway write
    pub fn is_available(&mut self) -> bool {
        match self
            .storage
            .set(PROBE_KEY, "test")
            .and_then(|_| self.storage.remove(PROBE_KEY))
        {
            Ok(()) => true,
            Err(e) => {
                debug!("Storage probe failed: {}", e);
                false
            }
        }
    }

    /// Overwrite the slot with `state`. Returns whether the write landed.
    pub fn save(&mut self, state: &GameState) -> bool {
        if !self.is_available() {
            warn!("Storage is not available, skipping save");
            return false;
        }

        let record = SnapshotRecord {
            state: state.clone(),
            id: Uuid::new_v4().to_string(),
            timestamp: epoch_millis(),
        };
        let encoded = match serde_json::to_string(&record) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!("Failed to encode snapshot: {}", e);
                return false;
            }
        };

        match self.storage.set(&self.key, &encoded) {
            Ok(()) => {
                debug!(
                    "Saved snapshot {} ({} moves)",
                    record.id,
                    state.move_history.len()
                );
                true
            }
            Err(e) => {
                warn!("Failed to save game: {}", e);
                false
            }
        }
    }

    /// The last saved record, or `None` if nothing usable is stored
    pub fn load(&self) -> Option<SnapshotRecord> {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to load game: {}", e);
                return None;
            }
        };
        match serde_json::from_str::<SnapshotRecord>(&raw) {
            Ok(record) => {
                info!("Loaded snapshot {} saved at {}", record.id, record.timestamp);
                Some(record)
            }
            Err(e) => {
                warn!("Ignoring unreadable snapshot: {}", e);
                None
            }
        }
    }
}
