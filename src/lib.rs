//! Keeps several chess surfaces converged on one authoritative game.
//!
//! A [`session::SessionController`] owns the game store and the peer
//! session, and fans every state change out over an [`events::EventBus`]
//! to persistence, share-link rewriting and peer forwarding.

pub mod config;
pub mod error;
pub mod events;
pub mod game;
pub mod models;
pub mod session;
pub mod share_link;
pub mod storage;
