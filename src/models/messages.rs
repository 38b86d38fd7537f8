use serde::{Deserialize, Serialize};

use crate::events::{NoticeLevel, SessionEvent};
use crate::game::utils::get_game_status;
use crate::models::game_state::{GameState, LastMove, Mode, MoveCandidate, MoveRecord};
use crate::session::peer::ConnectionPhase;

/// Move payload on the peer wire
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WireMove {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub san: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub piece: Option<String>,
}

impl From<&MoveRecord> for WireMove {
    fn from(record: &MoveRecord) -> Self {
        WireMove {
            from: record.from.clone(),
            to: record.to.clone(),
            promotion: record.promotion.map(|p| p.to_string()),
            san: Some(record.san.clone()),
            color: Some(record.color.to_string()),
            piece: Some(record.piece.to_string()),
        }
    }
}

impl WireMove {
    /// What the receiving side hands to its own rules engine
    pub fn candidate(&self) -> MoveCandidate {
        MoveCandidate::Squares {
            from: self.from.clone(),
            to: self.to.clone(),
            promotion: self.promotion.clone(),
        }
    }
}

/// Message exchanged between peers: `{ "type": "move" | "undo" | "reset", "move"?: {...} }`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PeerMessage {
    Move {
        #[serde(rename = "move")]
        mv: WireMove,
    },
    Undo,
    Reset,
}

/// Intent sent from a browser surface to the server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SurfaceIntent {
    StartLocal,
    CreateRoom,
    JoinRoom { room: String },
    LoadFromUrl { url: String },
    Move {
        from: String,
        to: String,
        #[serde(default)]
        promotion: Option<String>,
    },
    Undo,
    Reset,
    Disconnect,
    BackToMenu,
    LegalMoves { square: String },
    ShareLink,
    ResumeSavedGame,
}

/// Message sent from server to a browser surface
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ServerMessage {
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<GameState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<ConnectionPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_moves: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_move: Option<LastMove>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_status: Option<String>,
}

impl ServerMessage {
    pub fn new(message_type: &str) -> Self {
        ServerMessage {
            message_type: message_type.to_string(),
            ..Default::default()
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        ServerMessage {
            error: Some(text.into()),
            ..ServerMessage::new("error")
        }
    }
}

impl From<&SessionEvent> for ServerMessage {
    fn from(event: &SessionEvent) -> Self {
        match event {
            SessionEvent::StateChanged(state) => ServerMessage {
                game_status: Some(get_game_status(state)),
                last_move: state.last_move.clone(),
                state: Some(state.clone()),
                ..ServerMessage::new("state_changed")
            },
            SessionEvent::MoveApplied { record, .. } => ServerMessage {
                last_move: Some(record.last_move()),
                info: Some(record.san.clone()),
                ..ServerMessage::new("move_made")
            },
            SessionEvent::MoveUndone { .. } => ServerMessage::new("move_undone"),
            SessionEvent::GameReset { .. } => ServerMessage::new("game_reset"),
            SessionEvent::ModeChanged(mode) => ServerMessage {
                mode: Some(*mode),
                info: Some(mode.to_string()),
                ..ServerMessage::new("mode_changed")
            },
            SessionEvent::ConnectionChanged(phase) => ServerMessage {
                phase: Some(*phase),
                ..ServerMessage::new("connection_changed")
            },
            SessionEvent::RoomAdvertised(room) => ServerMessage {
                room: Some(room.to_string()),
                ..ServerMessage::new("room_created")
            },
            SessionEvent::Notice(notice) => match notice.level {
                NoticeLevel::Error => ServerMessage::error(notice.text.clone()),
                NoticeLevel::Info | NoticeLevel::Success => ServerMessage {
                    info: Some(notice.text.clone()),
                    ..ServerMessage::new("notice")
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Notice;
    use crate::game::GameStateStore;
    use crate::models::Origin;
    use std::rc::Rc;

    #[test]
    fn peer_messages_use_the_documented_shape() {
        let msg = PeerMessage::Move {
            mv: WireMove {
                from: "e2".into(),
                to: "e4".into(),
                promotion: None,
                san: Some("e4".into()),
                color: None,
                piece: None,
            },
        };
        let json: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "move");
        assert_eq!(json["move"]["from"], "e2");
        assert_eq!(json["move"]["san"], "e4");

        let undo = serde_json::to_string(&PeerMessage::Undo).unwrap();
        assert_eq!(undo, r#"{"type":"undo"}"#);
    }

    #[test]
    fn unknown_fields_are_tolerated() {
        let msg: PeerMessage = serde_json::from_str(
            r#"{"type":"move","move":{"from":"g1","to":"f3","flags":"n","lan":"g1f3"},"v":2}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            PeerMessage::Move {
                mv: WireMove {
                    from: "g1".into(),
                    to: "f3".into(),
                    promotion: None,
                    san: None,
                    color: None,
                    piece: None,
                }
            }
        );
    }

    #[test]
    fn malformed_peer_messages_fail_to_parse() {
        assert!(serde_json::from_str::<PeerMessage>(r#"{"type":"chat"}"#).is_err());
        assert!(serde_json::from_str::<PeerMessage>(r#"{"type":"move"}"#).is_err());
        assert!(serde_json::from_str::<PeerMessage>(r#"{"move":{"from":"e2","to":"e4"}}"#).is_err());
    }

    #[test]
    fn surface_intents_parse() {
        let squares: SurfaceIntent =
            serde_json::from_str(r#"{"action":"move","from":"e7","to":"e8","promotion":"n"}"#)
                .unwrap();
        assert_eq!(
            squares,
            SurfaceIntent::Move {
                from: "e7".into(),
                to: "e8".into(),
                promotion: Some("n".into()),
            }
        );

        let join: SurfaceIntent =
            serde_json::from_str(r#"{"action":"join_room","room":"abc"}"#).unwrap();
        assert_eq!(join, SurfaceIntent::JoinRoom { room: "abc".into() });
    }

    #[test]
    fn session_events_become_surface_messages() {
        let mut store = GameStateStore::new(Rc::new(crate::events::SessionBus::new()));
        store
            .apply_move(&MoveCandidate::squares("e2", "e4"), Origin::Local)
            .unwrap();
        let state = store.current_state();

        let msg = ServerMessage::from(&SessionEvent::StateChanged(state));
        assert_eq!(msg.message_type, "state_changed");
        assert_eq!(msg.game_status.as_deref(), Some("black_turn"));
        assert_eq!(msg.last_move.map(|m| m.to), Some("e4".to_string()));

        let json = serde_json::to_value(ServerMessage::from(&SessionEvent::ConnectionChanged(
            ConnectionPhase::Connected,
        )))
        .unwrap();
        assert_eq!(json["phase"], "connected");
        assert!(json.get("state").is_none());

        let err = ServerMessage::from(&SessionEvent::Notice(Notice::error("Disconnected")));
        assert_eq!(err.message_type, "error");
        assert_eq!(err.error.as_deref(), Some("Disconnected"));
    }
}
