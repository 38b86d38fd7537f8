//! Peer connection lifecycle and the peer wire protocol.
//!
//! The transport only knows how to move text frames. [`PeerSessionManager`]
//! owns the phase machine on top of it:
//!
//! ```text
//! host:  Idle -> Advertising -> Connected -> Closed | Errored
//! guest: Idle -> Connecting  -> Connected -> Closed | Errored
//! ```
//!
//! Sending is fire-and-forget. Nothing is queued, acknowledged or retried.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TransportError;
use crate::models::{MoveRecord, PeerMessage, WireMove};

/// Opaque identifier of an advertised host endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one inbound connection attempt on a host
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkId(pub String);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    #[default]
    Idle,
    Advertising,
    Connecting,
    Connected,
    Closed,
    Errored,
}

impl ConnectionPhase {
    /// Whether the transport holds anything that needs closing
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionPhase::Advertising | ConnectionPhase::Connecting | ConnectionPhase::Connected
        )
    }
}

/// What a transport reports back, one event at a time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    /// The host endpoint is reachable under `room`
    Advertising { room: RoomCode },
    /// A guest wants in
    Incoming { link: LinkId },
    /// The guest's channel to the host is open
    Open,
    Data(String),
    Closed,
    Error(String),
}

/// The external peer-networking layer.
///
/// Calls start work; outcomes come back later as [`PeerEvent`]s.
pub trait PeerTransport {
    fn advertise(&mut self) -> Result<(), TransportError>;
    fn connect(&mut self, room: &RoomCode) -> Result<(), TransportError>;
    fn accept(&mut self, link: &LinkId) -> Result<(), TransportError>;
    fn refuse(&mut self, link: &LinkId);
    fn send(&mut self, frame: &str) -> Result<(), TransportError>;
    fn close(&mut self);
}

/// What the controller has to act on after a transport event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerSignal {
    Nothing,
    Advertising(RoomCode),
    Connected,
    Remote(PeerMessage),
    Closed,
    Errored(String),
}

pub struct PeerSessionManager {
    transport: Box<dyn PeerTransport>,
    phase: ConnectionPhase,
    room: Option<RoomCode>,
    link: Option<LinkId>,
}

impl PeerSessionManager {
    pub fn new(transport: Box<dyn PeerTransport>) -> Self {
        PeerSessionManager {
            transport,
            phase: ConnectionPhase::Idle,
            room: None,
            link: None,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn room(&self) -> Option<&RoomCode> {
        self.room.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionPhase::Connected
    }

    /// Start advertising as a host
    pub fn host(&mut self) -> Result<(), TransportError> {
        self.disconnect();
        match self.transport.advertise() {
            Ok(()) => {
                self.phase = ConnectionPhase::Advertising;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to advertise: {}", e);
                self.fail();
                Err(e)
            }
        }
    }

    /// Dial a host as a guest
    pub fn join(&mut self, room: RoomCode) -> Result<(), TransportError> {
        self.disconnect();
        match self.transport.connect(&room) {
            Ok(()) => {
                info!("Connecting to room {}", room);
                self.room = Some(room);
                self.phase = ConnectionPhase::Connecting;
                Ok(())
            }
            Err(e) => {
                warn!("Failed to connect to room {}: {}", room, e);
                self.fail();
                Err(e)
            }
        }
    }

    /// Tear the channel down. Later transport events are ignored.
    pub fn disconnect(&mut self) {
        if self.phase.is_active() {
            info!("Closing peer session ({:?})", self.phase);
            self.transport.close();
            self.phase = ConnectionPhase::Closed;
        }
        self.room = None;
        self.link = None;
    }

    pub fn handle(&mut self, event: PeerEvent) -> PeerSignal {
        match (self.phase, event) {
            (ConnectionPhase::Advertising, PeerEvent::Advertising { room }) => {
                info!("Advertising room {}", room);
                self.room = Some(room.clone());
                PeerSignal::Advertising(room)
            }
            (ConnectionPhase::Advertising, PeerEvent::Incoming { link }) => {
                if let Err(e) = self.transport.accept(&link) {
                    warn!("Failed to accept {}: {}", link, e);
                    self.fail();
                    return PeerSignal::Errored(e.to_string());
                }
                info!("Accepted guest {}", link);
                self.link = Some(link);
                self.phase = ConnectionPhase::Connected;
                PeerSignal::Connected
            }
            (_, PeerEvent::Incoming { link }) => {
                // Only one live connection per session
                info!("Refusing guest {} ({:?})", link, self.phase);
                self.transport.refuse(&link);
                PeerSignal::Nothing
            }
            (ConnectionPhase::Connecting, PeerEvent::Open) => {
                info!("Connected to room {:?}", self.room);
                self.phase = ConnectionPhase::Connected;
                PeerSignal::Connected
            }
            (ConnectionPhase::Connected, PeerEvent::Data(frame)) => {
                match serde_json::from_str::<PeerMessage>(&frame) {
                    Ok(message) => PeerSignal::Remote(message),
                    Err(e) => {
                        debug!("Ignoring malformed peer frame {:?}: {}", frame, e);
                        PeerSignal::Nothing
                    }
                }
            }
            (phase, PeerEvent::Closed) if phase.is_active() => {
                info!("Peer closed the channel");
                self.release(ConnectionPhase::Closed);
                PeerSignal::Closed
            }
            (phase, PeerEvent::Error(reason)) if phase.is_active() => {
                warn!("Peer channel error: {}", reason);
                self.release(ConnectionPhase::Errored);
                PeerSignal::Errored(reason)
            }
            (phase, event) => {
                debug!("Ignoring {:?} while {:?}", event, phase);
                PeerSignal::Nothing
            }
        }
    }

    /// Send a message if the channel is open. Returns whether it went out.
    pub fn send(&mut self, message: &PeerMessage) -> bool {
        if !self.is_connected() {
            return false;
        }
        let frame = match serde_json::to_string(message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode peer message: {}", e);
                return false;
            }
        };
        match self.transport.send(&frame) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send peer message: {}", e);
                false
            }
        }
    }

    pub fn send_move(&mut self, record: &MoveRecord) -> bool {
        self.send(&PeerMessage::Move {
            mv: WireMove::from(record),
        })
    }

    pub fn send_undo(&mut self) -> bool {
        self.send(&PeerMessage::Undo)
    }

    pub fn send_reset(&mut self) -> bool {
        self.send(&PeerMessage::Reset)
    }

    fn release(&mut self, phase: ConnectionPhase) {
        self.transport.close();
        self.phase = phase;
        self.link = None;
    }

    fn fail(&mut self) {
        self.transport.close();
        self.phase = ConnectionPhase::Errored;
        self.room = None;
    }
}
