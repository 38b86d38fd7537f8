pub mod app_state;
pub mod handler;
pub mod peer_socket;
pub mod transport;

pub use app_state::AppState;
pub use handler::{peer_index, ws_index};
