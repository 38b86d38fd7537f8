pub mod controller;
pub mod loopback;
pub mod peer;

pub use controller::{Session, SessionController, Startup};
pub use loopback::{LoopbackHub, LoopbackInbox, LoopbackTransport};
pub use peer::{ConnectionPhase, LinkId, PeerEvent, PeerSessionManager, PeerTransport, RoomCode};
