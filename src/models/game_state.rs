use chess::Color;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of the board, serialised as "white" / "black"
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlayerColor {
    White,
    Black,
}

impl PlayerColor {
    pub fn opposite(self) -> Self {
        match self {
            PlayerColor::White => PlayerColor::Black,
            PlayerColor::Black => PlayerColor::White,
        }
    }
}

impl From<Color> for PlayerColor {
    fn from(color: Color) -> Self {
        match color {
            Color::White => PlayerColor::White,
            Color::Black => PlayerColor::Black,
        }
    }
}

impl From<PlayerColor> for Color {
    fn from(color: PlayerColor) -> Self {
        match color {
            PlayerColor::White => Color::White,
            PlayerColor::Black => Color::Black,
        }
    }
}

impl fmt::Display for PlayerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlayerColor::White => write!(f, "white"),
            PlayerColor::Black => write!(f, "black"),
        }
    }
}

/// Role in an online session. Fixed for the lifetime of the session.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Host,
    Guest,
}

impl Role {
    /// The host plays white, the guest black.
    pub fn color(self) -> PlayerColor {
        match self {
            Role::Host => PlayerColor::White,
            Role::Guest => PlayerColor::Black,
        }
    }
}

/// Delivery mode of the session
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Local,
    Online(Role),
    UrlReplay,
}

impl Mode {
    pub fn is_online(self) -> bool {
        matches!(self, Mode::Online(_))
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Local => write!(f, "Local Play"),
            Mode::Online(Role::Host) => write!(f, "Online Play (host)"),
            Mode::Online(Role::Guest) => write!(f, "Online Play (guest)"),
            Mode::UrlReplay => write!(f, "URL Play"),
        }
    }
}

/// Where a mutation came from. Remote mutations are never sent back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// Last move information
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LastMove {
    pub from: String,
    pub to: String,
}

/// A move accepted by the rules engine
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    pub from: String,
    pub to: String,
    pub san: String,
    pub color: PlayerColor,
    /// Lowercase piece letter of the mover
    pub piece: char,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<char>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured: Option<char>,
    pub before: String,
    pub after: String,
}

impl MoveRecord {
    pub fn last_move(&self) -> LastMove {
        LastMove {
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

/// A move someone wants to make, before the rules engine has seen it
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum MoveCandidate {
    /// Source and target squares, e.g. from a drag and drop
    Squares {
        from: String,
        to: String,
        #[serde(default)]
        promotion: Option<String>,
    },
    /// SAN ("Nf3") or coordinate ("g1f3") notation
    Notation(String),
}

impl MoveCandidate {
    pub fn squares(from: &str, to: &str) -> Self {
        MoveCandidate::Squares {
            from: from.to_string(),
            to: to.to_string(),
            promotion: None,
        }
    }

    pub fn notation(text: &str) -> Self {
        MoveCandidate::Notation(text.to_string())
    }

    /// Source square, when the candidate names one directly
    pub fn source(&self) -> Option<&str> {
        match self {
            MoveCandidate::Squares { from, .. } => Some(from),
            MoveCandidate::Notation(_) => None,
        }
    }
}

impl fmt::Display for MoveCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveCandidate::Squares {
                from,
                to,
                promotion,
            } => write!(f, "{from}{to}{}", promotion.as_deref().unwrap_or("")),
            MoveCandidate::Notation(text) => write!(f, "{text}"),
        }
    }
}

/// Immutable snapshot of the authoritative game
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub fen: String,
    pub turn: PlayerColor,
    pub move_history: Vec<String>,
    pub is_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate: bool,
    pub is_draw: bool,
    pub is_game_over: bool,
    pub game_mode: Mode,
    pub player_color: PlayerColor,
    pub last_move: Option<LastMove>,
    /// Position the move history is replayed from
    pub start_fen: String,
    /// Epoch millis of the mutation that produced this snapshot
    pub updated_at: u64,
}
