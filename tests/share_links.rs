mod common;

use proptest::prelude::*;

use chess_sync::error::SyncError;
use chess_sync::game::{Position, START_FEN};
use chess_sync::models::{Mode, MoveCandidate, PlayerColor};
use chess_sync::session::LoopbackHub;
use chess_sync::share_link::ShareLinkCodec;

use common::Surface;

#[test]
fn malformed_fragment_decodes_to_none() {
    let codec = ShareLinkCodec::new("https://x/y");
    assert_eq!(codec.decode("https://x/y#not a valid url fragment%"), None);
}

#[test]
fn shared_position_opens_in_url_mode() {
    let hub = LoopbackHub::new();
    let mut sharer = Surface::new(&hub);
    for m in ["e4", "e5", "Nf3"] {
        sharer
            .controller
            .request_move(MoveCandidate::notation(m))
            .unwrap();
    }
    let link = sharer.controller.share_link();

    let mut viewer = Surface::new(&hub);
    viewer.controller.load_from_url(&link).unwrap();
    let state = viewer.controller.state();
    assert_eq!(viewer.controller.session().mode, Mode::UrlReplay);
    assert_eq!(state.fen, sharer.controller.state().fen);
    assert!(state.move_history.is_empty());
    assert_eq!(viewer.controller.current_link(), link);

    // Playing on rewrites the address
    viewer
        .controller
        .request_move(MoveCandidate::notation("Nc6"))
        .unwrap();
    let moved = viewer.controller.current_link();
    assert_ne!(moved, link);
    let codec = ShareLinkCodec::new("http://127.0.0.1:8080/");
    assert_eq!(codec.decode(&moved), Some(viewer.controller.state().fen));

    viewer.controller.back_to_menu();
    assert_eq!(viewer.controller.session().mode, Mode::Local);
    assert_eq!(viewer.controller.current_link(), "http://127.0.0.1:8080/");
    assert_eq!(viewer.controller.state().fen, START_FEN);
}

#[test]
fn invalid_link_is_reported() {
    let hub = LoopbackHub::new();
    let mut surface = Surface::new(&hub);
    assert_eq!(
        surface.controller.load_from_url("https://x/y"),
        Err(SyncError::InvalidLink)
    );
    assert!(surface.events.borrow().iter().any(|e| matches!(
        e,
        chess_sync::events::SessionEvent::Notice(n) if n.text.starts_with("Invalid game URL")
    )));
}

#[test]
fn links_without_both_kings_are_refused() {
    let hub = LoopbackHub::new();
    let mut surface = Surface::new(&hub);
    surface
        .controller
        .request_move(MoveCandidate::notation("e4"))
        .unwrap();
    let codec = ShareLinkCodec::new("http://127.0.0.1:8080/");

    for fen in [
        "8/8/8/8/8/8/8/8 w - - 0 1",
        "4k3/8/8/8/8/8/8/8 w - - 0 1",
        "8/8/8/8/8/8/8/4K3 b - - 0 1",
        "88888888/8/8/8/8/8/8/8 w - - 0 1",
        "/////// w - - 0 1",
        "P3k3/8/8/8/8/8/8/4K3 w - - 0 1",
    ] {
        assert!(
            matches!(
                surface.controller.load_from_url(&codec.encode(fen)),
                Err(SyncError::Rejected(_))
            ),
            "{fen}"
        );
    }
    assert_eq!(surface.controller.session().mode, Mode::Local);
    assert_eq!(surface.controller.state().move_history, vec!["e4"]);
}

#[test]
fn huge_move_numbers_keep_playing() {
    let hub = LoopbackHub::new();
    let mut surface = Surface::new(&hub);
    let codec = ShareLinkCodec::new("http://127.0.0.1:8080/");
    surface
        .controller
        .load_from_url(&codec.encode("4k3/8/8/8/8/8/4P3/4K3 b - - 0 4294967295"))
        .unwrap();

    surface
        .controller
        .request_move(MoveCandidate::squares("e8", "d8"))
        .unwrap();
    let fen = surface.controller.state().fen;
    assert!(fen.ends_with(" 1 4294967295"), "{fen}");
    assert!(Position::from_fen(&fen).is_ok());
    assert_eq!(codec.decode(&surface.controller.current_link()), Some(fen));
}

/// Positions reached by playing `picks` as indices into the legal move list
fn position_after(picks: &[usize]) -> Position {
    let mut position = Position::default();
    for pick in picks {
        let moves: Vec<_> = chess::MoveGen::new_legal(position.board()).collect();
        if moves.is_empty() {
            break;
        }
        position = position.apply(moves[pick % moves.len()]);
    }
    position
}

proptest! {
    #[test]
    fn share_links_round_trip(picks in prop::collection::vec(any::<usize>(), 0..60)) {
        let fen = position_after(&picks).to_fen();
        let codec = ShareLinkCodec::new("https://chess.example/play");
        let link = codec.encode(&fen);
        prop_assert!(!link[link.find('#').unwrap() + 1..].contains(' '));
        prop_assert_eq!(codec.decode(&link), Some(fen));
    }

    #[test]
    fn history_length_tracks_accepted_moves(picks in prop::collection::vec(any::<usize>(), 0..40)) {
        let hub = LoopbackHub::new();
        let mut surface = Surface::new(&hub);
        let mut played = Vec::new();
        for pick in picks {
            let current = Position::from_fen(&surface.controller.state().fen).unwrap();
            let moves: Vec<_> = chess::MoveGen::new_legal(current.board()).collect();
            if moves.is_empty() || surface.controller.state().is_game_over {
                break;
            }
            let mv = moves[pick % moves.len()];
            let candidate = MoveCandidate::Squares {
                from: mv.get_source().to_string(),
                to: mv.get_dest().to_string(),
                promotion: mv.get_promotion().map(|p| match p {
                    chess::Piece::Knight => "n".to_string(),
                    chess::Piece::Bishop => "b".to_string(),
                    chess::Piece::Rook => "r".to_string(),
                    _ => "q".to_string(),
                }),
            };
            let record = surface.controller.request_move(candidate).unwrap();
            played.push(record.san);
        }
        let state = surface.controller.state();
        prop_assert_eq!(&state.move_history, &played);
        let expected = if played.len() % 2 == 0 { PlayerColor::White } else { PlayerColor::White.opposite() };
        prop_assert_eq!(state.turn, expected);

        // Undo restores the position before the last move
        if !played.is_empty() {
            let before = surface.controller.request_undo().unwrap().before;
            prop_assert_eq!(surface.controller.state().fen, before);
            prop_assert_eq!(surface.controller.state().move_history.len(), played.len() - 1);
        }
    }
}
