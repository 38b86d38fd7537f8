pub mod rules;
pub mod store;
pub mod utils;

pub use rules::{Position, START_FEN};
pub use store::GameStateStore;
