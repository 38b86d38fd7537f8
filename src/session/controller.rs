//! Top-level orchestration of one session.
//!
//! The controller owns the game store and the peer manager, routes intents
//! to the store, and installs the side effects that follow a state change
//! (persistence, address rewriting, peer forwarding) as bus subscribers.

use anyhow::anyhow;
use chess::Square;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::rc::Rc;
use std::str::FromStr;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::events::{BusEvent, EventKind, Notice, SessionBus, SessionEvent, SubscriptionId};
use crate::game::rules::Position;
use crate::game::GameStateStore;
use crate::models::{GameState, Mode, MoveCandidate, MoveRecord, Origin, PeerMessage, PlayerColor, Role};
use crate::session::peer::{
    ConnectionPhase, PeerEvent, PeerSessionManager, PeerSignal, PeerTransport, RoomCode,
};
use crate::share_link::{AddressBar, ShareLinkCodec};
use crate::storage::{KeyValueStore, PersistenceSnapshotter, SnapshotRecord};

const INVALID_LINK_TEXT: &str = "Invalid game URL. Please check the URL and try again.";

/// Read-only view of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub mode: Mode,
    pub phase: ConnectionPhase,
    pub room: Option<RoomCode>,
}

/// What [`SessionController::initialize`] found
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Startup {
    /// The startup link carried a position and it was loaded
    pub loaded_link: bool,
    pub saved_game: Option<SnapshotRecord>,
}

pub struct SessionController {
    bus: Rc<SessionBus>,
    store: GameStateStore,
    peer: Rc<RefCell<PeerSessionManager>>,
    snapshots: Rc<RefCell<PersistenceSnapshotter>>,
    codec: ShareLinkCodec,
    address: Rc<RefCell<AddressBar>>,
    subscriptions: Vec<SubscriptionId>,
}

impl SessionController {
    pub fn new(
        config: &SyncConfig,
        transport: Box<dyn PeerTransport>,
        storage: Box<dyn KeyValueStore>,
    ) -> Self {
        let bus = Rc::new(SessionBus::new());
        SessionController {
            store: GameStateStore::new(bus.clone()),
            bus,
            peer: Rc::new(RefCell::new(PeerSessionManager::new(transport))),
            snapshots: Rc::new(RefCell::new(PersistenceSnapshotter::new(
                storage,
                &config.storage,
            ))),
            codec: ShareLinkCodec::new(&config.share_base),
            address: Rc::new(RefCell::new(AddressBar::new(&config.share_base))),
            subscriptions: Vec::new(),
        }
    }

    /// Bus carrying every session event. Surfaces subscribe here.
    pub fn bus(&self) -> &Rc<SessionBus> {
        &self.bus
    }

    /// Install the side-effect subscribers and pick up any shared or saved
    /// game. Calling it twice does not double the subscribers.
    pub fn initialize(&mut self, startup_link: Option<&str>) -> Startup {
        if self.subscriptions.is_empty() {
            self.install_subscribers();
        }

        let saved_game = self.snapshots.borrow().load();
        let loaded_link = match startup_link {
            Some(link) if self.codec.decode(link).is_some() => self.load_from_url(link).is_ok(),
            _ => false,
        };
        if !loaded_link {
            self.announce();
        }

        info!(
            "Session initialized (link loaded: {}, saved game: {})",
            loaded_link,
            saved_game.is_some()
        );
        Startup {
            loaded_link,
            saved_game,
        }
    }

    /// Disconnect and drop every subscriber this controller installed
    pub fn teardown(&mut self) {
        self.peer.borrow_mut().disconnect();
        for id in self.subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
        info!("Session torn down");
    }

    fn install_subscribers(&mut self) {
        let snapshots = self.snapshots.clone();
        self.subscriptions
            .push(self.bus.subscribe(EventKind::StateChanged, move |event| {
                let SessionEvent::StateChanged(state) = event else {
                    return Ok(());
                };
                if !state.move_history.is_empty() {
                    // Best effort; the snapshotter logs its own failures
                    snapshots
                        .try_borrow_mut()
                        .map_err(|_| anyhow!("snapshotter is busy"))?
                        .save(state);
                }
                Ok(())
            }));

        let address = self.address.clone();
        self.subscriptions
            .push(self.bus.subscribe(EventKind::StateChanged, move |event| {
                if let SessionEvent::StateChanged(state) = event {
                    if state.game_mode == Mode::UrlReplay {
                        address.borrow_mut().set_position(&state.fen);
                    }
                }
                Ok(())
            }));

        for kind in [EventKind::MoveApplied, EventKind::MoveUndone, EventKind::GameReset] {
            let peer = self.peer.clone();
            self.subscriptions.push(self.bus.subscribe(kind, move |event| {
                let mut peer = peer
                    .try_borrow_mut()
                    .map_err(|_| anyhow!("peer manager is busy"))?;
                let sent = match event {
                    SessionEvent::MoveApplied {
                        record,
                        origin: Origin::Local,
                    } => peer.send_move(record),
                    SessionEvent::MoveUndone {
                        origin: Origin::Local,
                    } => peer.send_undo(),
                    SessionEvent::GameReset {
                        origin: Origin::Local,
                    } => peer.send_reset(),
                    // Remote mutations are never echoed back
                    _ => return Ok(()),
                };
                if sent {
                    debug!("Forwarded {:?} to peer", event.kind());
                }
                Ok(())
            }));
        }
    }

    pub fn session(&self) -> Session {
        let peer = self.peer.borrow();
        Session {
            mode: self.store.mode(),
            phase: peer.phase(),
            room: peer.room().cloned(),
        }
    }

    pub fn state(&self) -> GameState {
        self.store.current_state()
    }

    /// Play on this device with both colours
    pub fn start_local(&mut self) {
        self.leave_online();
        self.enter_mode(Mode::Local, PlayerColor::White);
        self.announce();
    }

    /// Host an online game as white
    pub fn create_room(&mut self) -> Result<(), SyncError> {
        let advertised = self.peer.borrow_mut().host();
        if let Err(e) = advertised {
            self.connection_failed("Connection error");
            return Err(e.into());
        }

        self.enter_mode(Mode::Online(Role::Host), PlayerColor::White);
        self.store.reset(Origin::Local);
        self.publish(SessionEvent::ConnectionChanged(ConnectionPhase::Advertising));
        Ok(())
    }

    /// Join a host's room as black
    pub fn join_room(&mut self, room: &str) -> Result<(), SyncError> {
        let room = room.trim();
        if room.is_empty() {
            self.publish(SessionEvent::Notice(Notice::error("Please enter a room code")));
            return Err(SyncError::EmptyRoomCode);
        }

        let joined = self.peer.borrow_mut().join(RoomCode(room.to_string()));
        if let Err(e) = joined {
            self.connection_failed("Failed to connect");
            return Err(e.into());
        }

        self.enter_mode(Mode::Online(Role::Guest), PlayerColor::Black);
        self.store.reset(Origin::Local);
        self.publish(SessionEvent::ConnectionChanged(ConnectionPhase::Connecting));
        self.publish(SessionEvent::Notice(Notice::info("Connecting...")));
        Ok(())
    }

    /// Load the position carried by a share link
    pub fn load_from_url(&mut self, link: &str) -> Result<(), SyncError> {
        let Some(fen) = self.codec.decode(link) else {
            self.publish(SessionEvent::Notice(Notice::error(INVALID_LINK_TEXT)));
            return Err(SyncError::InvalidLink);
        };
        if let Err(e) = Position::from_fen(&fen) {
            warn!("Share link carries an invalid position: {}", e);
            self.publish(SessionEvent::Notice(Notice::error(INVALID_LINK_TEXT)));
            return Err(e.into());
        }

        self.leave_online();
        self.enter_mode(Mode::UrlReplay, PlayerColor::White);
        self.store.load_from_position(&fen)?;
        Ok(())
    }

    /// Drop the peer connection and fall back to local play
    pub fn disconnect(&mut self) {
        self.leave_online();
        if self.store.mode() != Mode::Local {
            self.enter_mode(Mode::Local, PlayerColor::White);
        }
    }

    pub fn back_to_menu(&mut self) {
        self.leave_online();
        self.enter_mode(Mode::Local, PlayerColor::White);
        self.store.reset(Origin::Local);
        self.address.borrow_mut().clear();
    }

    pub fn request_move(&mut self, candidate: MoveCandidate) -> Result<MoveRecord, SyncError> {
        self.ensure_mutable()?;
        if self.store.state().is_game_over {
            return Err(SyncError::GameOver);
        }

        let from = self.source_square(&candidate)?;
        let position = self.store.position();
        let piece = position
            .color_on(from)
            .ok_or_else(|| SyncError::NoPiece(from.to_string()))?;
        let turn = position.side_to_move();
        let controlling = match self.store.mode() {
            Mode::Online(role) => {
                if turn != role.color() {
                    return Err(SyncError::NotYourTurn);
                }
                role.color()
            }
            Mode::Local | Mode::UrlReplay => turn,
        };
        if piece != controlling {
            return Err(SyncError::NotYourPiece);
        }

        Ok(self.store.apply_move(&candidate, Origin::Local)?)
    }

    pub fn request_undo(&mut self) -> Result<MoveRecord, SyncError> {
        self.ensure_mutable()?;
        Ok(self.store.undo(Origin::Local)?)
    }

    pub fn request_reset(&mut self) -> Result<(), SyncError> {
        self.ensure_mutable()?;
        self.store.reset(Origin::Local);
        if self.store.mode() == Mode::UrlReplay {
            self.address.borrow_mut().clear();
        }
        Ok(())
    }

    /// Replay the saved game. An online game comes back as local play.
    pub fn resume_saved_game(&mut self) -> Result<GameState, SyncError> {
        let record = self.snapshots.borrow().load().ok_or(SyncError::NoSavedGame)?;
        let saved = record.state;
        // Validate before touching the session
        Position::from_fen(&saved.start_fen)?;

        self.leave_online();
        let (mode, color) = match saved.game_mode {
            Mode::Online(_) | Mode::Local => (Mode::Local, PlayerColor::White),
            Mode::UrlReplay => (Mode::UrlReplay, saved.player_color),
        };
        self.enter_mode(mode, color);
        self.store
            .load_from_history_at(&saved.start_fen, &saved.move_history)?;
        info!("Resumed saved game {} ({} moves)", record.id, saved.move_history.len());
        Ok(self.store.current_state())
    }

    pub fn saved_game(&self) -> Option<SnapshotRecord> {
        self.snapshots.borrow().load()
    }

    pub fn legal_destinations(&self, square: &str) -> Result<Vec<String>, SyncError> {
        let square = Square::from_str(&square.trim().to_lowercase())
            .map_err(|_| SyncError::InvalidSquare(square.to_string()))?;
        Ok(self.store.legal_destinations(square))
    }

    /// Link that reopens the current position
    pub fn share_link(&self) -> String {
        self.codec.encode(&self.store.state().fen)
    }

    /// Address the surface should show
    pub fn current_link(&self) -> String {
        self.address.borrow().href()
    }

    /// Feed one transport event through the peer manager
    pub fn handle_peer_event(&mut self, event: PeerEvent) {
        let signal = self.peer.borrow_mut().handle(event);
        match signal {
            PeerSignal::Nothing => {}
            PeerSignal::Advertising(room) => {
                self.publish(SessionEvent::RoomAdvertised(room));
                self.publish(SessionEvent::Notice(Notice::info("Waiting for opponent...")));
            }
            PeerSignal::Connected => {
                self.publish(SessionEvent::ConnectionChanged(ConnectionPhase::Connected));
                self.publish(SessionEvent::Notice(Notice::success("Connected")));
            }
            PeerSignal::Remote(message) => self.apply_remote(message),
            PeerSignal::Closed => {
                self.connection_lost(ConnectionPhase::Closed, Notice::error("Disconnected"))
            }
            PeerSignal::Errored(reason) => self.connection_lost(
                ConnectionPhase::Errored,
                Notice::error(format!("Connection error: {reason}")),
            ),
        }
    }

    fn apply_remote(&mut self, message: PeerMessage) {
        match message {
            PeerMessage::Move { mv } => {
                if let Err(e) = self.store.apply_move(&mv.candidate(), Origin::Remote) {
                    // No resync protocol; the sides stay apart until a reset
                    warn!("Peer move {}{} rejected: {}", mv.from, mv.to, e);
                }
            }
            PeerMessage::Undo => {
                if let Err(e) = self.store.undo(Origin::Remote) {
                    debug!("Peer undo ignored: {}", e);
                }
            }
            PeerMessage::Reset => self.store.reset(Origin::Remote),
        }
    }

    fn ensure_mutable(&self) -> Result<(), SyncError> {
        if self.store.mode().is_online() && !self.peer.borrow().is_connected() {
            return Err(SyncError::NotConnected);
        }
        Ok(())
    }

    fn source_square(&self, candidate: &MoveCandidate) -> Result<Square, SyncError> {
        match candidate.source() {
            Some(name) => Square::from_str(&name.trim().to_lowercase())
                .map_err(|_| SyncError::InvalidSquare(name.to_string())),
            None => Ok(self.store.position().parse_move(candidate)?.get_source()),
        }
    }

    fn enter_mode(&mut self, mode: Mode, color: PlayerColor) {
        self.store.set_mode(mode, color);
        info!("Mode is now {}", mode);
        self.publish(SessionEvent::ModeChanged(mode));
    }

    /// Close any live peer channel. Returns to local play if the session
    /// was online.
    fn leave_online(&mut self) {
        let was_active = self.peer.borrow().phase().is_active();
        self.peer.borrow_mut().disconnect();
        if was_active {
            self.publish(SessionEvent::ConnectionChanged(ConnectionPhase::Closed));
        }
        if self.store.mode().is_online() {
            self.enter_mode(Mode::Local, PlayerColor::White);
        }
    }

    fn connection_failed(&mut self, text: &str) {
        self.publish(SessionEvent::ConnectionChanged(ConnectionPhase::Errored));
        self.publish(SessionEvent::Notice(Notice::error(text)));
        if self.store.mode().is_online() {
            self.enter_mode(Mode::Local, PlayerColor::White);
        }
    }

    fn connection_lost(&mut self, phase: ConnectionPhase, notice: Notice) {
        self.publish(SessionEvent::ConnectionChanged(phase));
        self.publish(SessionEvent::Notice(notice));
        if self.store.mode().is_online() {
            self.enter_mode(Mode::Local, PlayerColor::White);
        }
    }

    /// Re-send the current state, e.g. after a mode switch
    fn announce(&self) {
        self.publish(SessionEvent::StateChanged(self.store.current_state()));
    }

    fn publish(&self, event: SessionEvent) {
        self.bus.publish(&event);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.peer.borrow_mut().disconnect();
    }
}
