//! Error taxonomy for the synchronization core.
//!
//! Nothing here is fatal. Rejections leave state untouched, transport and
//! storage failures degrade the session, malformed peer frames are dropped.

use thiserror::Error;

/// A mutation the game state store refused. State is unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("unreadable move: {0}")]
    MalformedMove(String),

    #[error("invalid position: {0}")]
    InvalidPosition(String),

    #[error("nothing to undo")]
    EmptyHistory,

    #[error("illegal history entry {index}: {notation}")]
    IllegalHistoryEntry { index: usize, notation: String },
}

/// Errors raised at the intent boundary of the session controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("not your turn")]
    NotYourTurn,

    #[error("not your piece")]
    NotYourPiece,

    #[error("no piece on {0}")]
    NoPiece(String),

    #[error("invalid square: {0}")]
    InvalidSquare(String),

    #[error("game is already over")]
    GameOver,

    #[error("peer is not connected")]
    NotConnected,

    #[error("invalid game link")]
    InvalidLink,

    #[error("room code is empty")]
    EmptyRoomCode,

    #[error("no saved game")]
    NoSavedGame,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures reported by a peer transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("peer channel is not open")]
    NotOpen,

    #[error("unknown room: {0}")]
    UnknownRoom(String),

    #[error("unknown link: {0}")]
    UnknownLink(String),

    #[error("transport failure: {0}")]
    Failed(String),
}

/// Failures of the durable key-value medium.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable")]
    Unavailable,

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Invalid configuration values read from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value: {value}")]
    InvalidValue { name: &'static str, value: String },
}
