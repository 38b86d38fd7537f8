use actix::Addr;
use futures::channel::mpsc::UnboundedSender;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chess_sync::config::SyncConfig;
use chess_sync::session::PeerEvent;

use crate::websocket::peer_socket::PeerSocket;

/// Application state shared between connections
pub struct AppState {
    pub config: SyncConfig,
    /// Hosts currently advertising, by room id
    pub rooms: Mutex<HashMap<String, UnboundedSender<PeerEvent>>>,
    /// Inbound peer sockets, by link id
    pub links: Mutex<HashMap<String, Addr<PeerSocket>>>,
}

impl AppState {
    pub fn new(config: SyncConfig) -> Self {
        AppState {
            config,
            rooms: Mutex::new(HashMap::new()),
            links: Mutex::new(HashMap::new()),
        }
    }
}

/// Lock a registry, ignoring poisoning
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
