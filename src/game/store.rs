use chess::Square;
use log::{debug, info, warn};
use std::rc::Rc;

use crate::error::Rejection;
use crate::events::{SessionBus, SessionEvent};
use crate::game::rules::Position;
use crate::game::utils::epoch_millis;
use crate::models::{GameState, LastMove, Mode, MoveCandidate, MoveRecord, Origin, PlayerColor};

/// Number of times a position must occur for a repetition draw
const REPETITION_LIMIT: usize = 3;

/// Sole owner and mutator of the authoritative game.
///
/// Every successful mutation rebuilds the cached [`GameState`] and publishes
/// its events on the shared bus before returning. A rejected mutation
/// publishes nothing and leaves the game exactly as it was.
pub struct GameStateStore {
    bus: Rc<SessionBus>,
    start: Position,
    position: Position,
    /// Positions before each applied move, for undo
    previous: Vec<Position>,
    history: Vec<MoveRecord>,
    /// Hash of the start position and of every position reached since
    seen: Vec<u64>,
    mode: Mode,
    player_color: PlayerColor,
    last_move: Option<LastMove>,
    state: GameState,
}

impl GameStateStore {
    pub fn new(bus: Rc<SessionBus>) -> Self {
        let start = Position::default();
        let mut store = GameStateStore {
            bus,
            start,
            position: start,
            previous: Vec::new(),
            history: Vec::new(),
            seen: vec![start.hash()],
            mode: Mode::Local,
            player_color: PlayerColor::White,
            last_move: None,
            state: placeholder_state(),
        };
        store.state = store.build_state();
        store
    }

    pub fn current_state(&self) -> GameState {
        self.state.clone()
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn player_color(&self) -> PlayerColor {
        self.player_color
    }

    pub fn legal_destinations(&self, square: Square) -> Vec<String> {
        self.position.legal_destinations(square)
    }

    /// Record the session mode in future snapshots. Publishes nothing.
    pub fn set_mode(&mut self, mode: Mode, player_color: PlayerColor) {
        self.mode = mode;
        self.player_color = player_color;
        self.state.game_mode = mode;
        self.state.player_color = player_color;
    }

    /// Validate and play a move
    pub fn apply_move(
        &mut self,
        candidate: &MoveCandidate,
        origin: Origin,
    ) -> Result<MoveRecord, Rejection> {
        let chess_move = self.position.parse_move(candidate).map_err(|e| {
            debug!("Rejected {:?} move {}: {}", origin, candidate, e);
            e
        })?;
        let (record, next) = self.position.play(chess_move);

        self.previous.push(self.position);
        self.position = next;
        self.seen.push(next.hash());
        self.last_move = Some(record.last_move());
        self.history.push(record.clone());
        self.state = self.build_state();

        debug!("Applied {} ({:?})", record.san, origin);
        self.bus.publish(&SessionEvent::MoveApplied {
            record: record.clone(),
            origin,
        });
        self.bus.publish(&SessionEvent::StateChanged(self.state.clone()));
        Ok(record)
    }

    /// Take back the last move
    pub fn undo(&mut self, origin: Origin) -> Result<MoveRecord, Rejection> {
        let (Some(record), Some(before)) = (self.history.pop(), self.previous.pop()) else {
            return Err(Rejection::EmptyHistory);
        };

        self.position = before;
        self.seen.pop();
        self.last_move = self.history.last().map(MoveRecord::last_move);
        self.state = self.build_state();

        debug!("Undid {} ({:?})", record.san, origin);
        self.bus.publish(&SessionEvent::MoveUndone { origin });
        self.bus.publish(&SessionEvent::StateChanged(self.state.clone()));
        Ok(record)
    }

    /// Back to the standard starting position with an empty history
    pub fn reset(&mut self, origin: Origin) {
        self.commit(Position::default(), Position::default(), Vec::new(), Vec::new());
        info!("Game reset ({:?})", origin);
        self.bus.publish(&SessionEvent::GameReset { origin });
        self.bus.publish(&SessionEvent::StateChanged(self.state.clone()));
    }

    /// Start over from an arbitrary position with an empty history
    pub fn load_from_position(&mut self, fen: &str) -> Result<(), Rejection> {
        let position = Position::from_fen(fen).map_err(|e| {
            warn!("Refusing to load position: {}", e);
            e
        })?;
        self.commit(position, position, Vec::new(), Vec::new());
        info!("Loaded position {}", self.state.fen);
        self.bus.publish(&SessionEvent::StateChanged(self.state.clone()));
        Ok(())
    }

    /// Replay moves from the standard starting position
    pub fn load_from_history(&mut self, moves: &[String]) -> Result<(), Rejection> {
        self.load_from_history_at(&Position::default().to_fen(), moves)
    }

    /// Replay moves from `start_fen`. The game is only replaced when every
    /// move is legal.
    pub fn load_from_history_at(&mut self, start_fen: &str, moves: &[String]) -> Result<(), Rejection> {
        let start = Position::from_fen(start_fen)?;

        let mut scratch = start;
        let mut previous = Vec::with_capacity(moves.len());
        let mut history = Vec::with_capacity(moves.len());
        for (index, notation) in moves.iter().enumerate() {
            let chess_move = scratch
                .parse_move(&MoveCandidate::notation(notation))
                .map_err(|_| Rejection::IllegalHistoryEntry {
                    index,
                    notation: notation.clone(),
                })?;
            let (record, next) = scratch.play(chess_move);
            previous.push(scratch);
            history.push(record);
            scratch = next;
        }

        self.commit(start, scratch, previous, history);
        info!("Replayed {} moves", self.history.len());
        self.bus.publish(&SessionEvent::StateChanged(self.state.clone()));
        Ok(())
    }

    fn commit(
        &mut self,
        start: Position,
        position: Position,
        previous: Vec<Position>,
        history: Vec<MoveRecord>,
    ) {
        self.seen = std::iter::once(start.hash())
            .chain(previous.iter().skip(1).map(Position::hash))
            .chain((!history.is_empty()).then(|| position.hash()))
            .collect();
        self.start = start;
        self.position = position;
        self.previous = previous;
        self.last_move = history.last().map(MoveRecord::last_move);
        self.history = history;
        self.state = self.build_state();
    }

    fn is_threefold_repetition(&self) -> bool {
        let current = self.position.hash();
        self.seen.iter().filter(|&&h| h == current).count() >= REPETITION_LIMIT
    }

    fn build_state(&self) -> GameState {
        let position = &self.position;
        let is_checkmate = position.is_checkmate();
        let is_stalemate = position.is_stalemate();
        let is_draw = is_stalemate
            || position.is_fifty_move_draw()
            || position.has_insufficient_material()
            || self.is_threefold_repetition();

        GameState {
            fen: position.to_fen(),
            turn: position.side_to_move(),
            move_history: self.history.iter().map(|r| r.san.clone()).collect(),
            is_check: position.is_check(),
            is_checkmate,
            is_stalemate,
            is_draw,
            is_game_over: is_checkmate || is_draw,
            game_mode: self.mode,
            player_color: self.player_color,
            last_move: self.last_move.clone(),
            start_fen: self.start.to_fen(),
            updated_at: epoch_millis(),
        }
    }
}

fn placeholder_state() -> GameState {
    GameState {
        fen: String::new(),
        turn: PlayerColor::White,
        move_history: Vec::new(),
        is_check: false,
        is_checkmate: false,
        is_stalemate: false,
        is_draw: false,
        is_game_over: false,
        game_mode: Mode::Local,
        player_color: PlayerColor::White,
        last_move: None,
        start_fen: String::new(),
        updated_at: 0,
    }
}
