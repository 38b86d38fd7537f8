//! Runtime configuration.
//!
//! Consolidates all environment variable reads. Every value has a default so a
//! bare `chess_sync` launch serves a local surface on port 8080.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_PUBLIC_WS: &str = "ws://127.0.0.1:8080";
pub const DEFAULT_SHARE_BASE: &str = "http://127.0.0.1:8080/";
pub const DEFAULT_STORAGE_DIR: &str = ".chess_sync";
pub const DEFAULT_STORAGE_KEY: &str = "chessGame";
pub const DEFAULT_MAX_HISTORY: usize = 10;
pub const DEFAULT_STATIC_DIR: &str = "./static";

/// Complete configuration for a sync surface
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// HTTP bind address for the surface server
    pub bind: SocketAddr,
    /// Websocket base a remote peer uses to reach this host
    pub public_ws: String,
    /// Origin and path that share links are built on
    pub share_base: String,
    /// Storage settings for the snapshot slot
    pub storage: StorageConfig,
    /// Directory the board-view widget is served from
    pub static_dir: PathBuf,
}

/// Snapshot storage settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding the durable key-value files
    pub dir: PathBuf,
    /// Key of the single snapshot slot
    pub key: String,
    /// Maximum retained snapshots. Read but not acted on: one slot is kept.
    pub max_history: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            key: DEFAULT_STORAGE_KEY.to_string(),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            public_ws: DEFAULT_PUBLIC_WS.to_string(),
            share_base: DEFAULT_SHARE_BASE.to_string(),
            storage: StorageConfig::default(),
            static_dir: PathBuf::from(DEFAULT_STATIC_DIR),
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `CHESS_SYNC_BIND`: surface server bind address (default: 127.0.0.1:8080)
    /// - `CHESS_SYNC_PUBLIC_WS`: websocket base advertised to peers (default: ws://127.0.0.1:8080)
    /// - `CHESS_SYNC_SHARE_BASE`: base address of share links (default: http://127.0.0.1:8080/)
    /// - `CHESS_SYNC_STORAGE_DIR`: snapshot directory (default: .chess_sync)
    /// - `CHESS_SYNC_STORAGE_KEY`: snapshot slot key (default: chessGame)
    /// - `CHESS_SYNC_MAX_HISTORY`: snapshot history limit (default: 10)
    /// - `CHESS_SYNC_STATIC_DIR`: board-view asset directory (default: ./static)
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address or history limit do not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an injectable variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = lookup("CHESS_SYNC_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse().map_err(|_| ConfigError::InvalidValue {
            name: "CHESS_SYNC_BIND",
            value: bind_raw.clone(),
        })?;

        let max_history = match lookup("CHESS_SYNC_MAX_HISTORY") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "CHESS_SYNC_MAX_HISTORY",
                value: raw,
            })?,
            None => DEFAULT_MAX_HISTORY,
        };

        Ok(Self {
            bind,
            public_ws: lookup("CHESS_SYNC_PUBLIC_WS")
                .unwrap_or_else(|| DEFAULT_PUBLIC_WS.to_string())
                .trim_end_matches('/')
                .to_string(),
            share_base: lookup("CHESS_SYNC_SHARE_BASE")
                .unwrap_or_else(|| DEFAULT_SHARE_BASE.to_string()),
            storage: StorageConfig {
                dir: lookup("CHESS_SYNC_STORAGE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR)),
                key: lookup("CHESS_SYNC_STORAGE_KEY")
                    .unwrap_or_else(|| DEFAULT_STORAGE_KEY.to_string()),
                max_history,
            },
            static_dir: lookup("CHESS_SYNC_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
        })
    }
}
