//! Rules-engine adapter over the `chess` crate.
//!
//! `chess::Board` answers legality and check/mate questions. This module adds
//! what the board does not track or print: move clocks, full FEN output,
//! standard algebraic notation, and lenient move parsing.

use chess::{Board, BoardStatus, ChessMove, Color, File, MoveGen, Piece, Rank, Square};
use std::str::FromStr;

use crate::error::Rejection;
use crate::game::utils::{has_insufficient_material, pawn_direction, piece_from_letter, piece_letter};
use crate::models::{MoveCandidate, MoveRecord, PlayerColor};

/// Standard starting position
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Half-moves without a capture or pawn move after which the game is drawn
const FIFTY_MOVE_LIMIT: u32 = 100;

/// A board plus the clocks FEN carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    board: Board,
    halfmove_clock: u32,
    fullmove_number: u32,
}

impl Default for Position {
    fn default() -> Self {
        Position {
            board: Board::default(),
            halfmove_clock: 0,
            fullmove_number: 1,
        }
    }
}

impl Position {
    /// Parse and validate a FEN string. The clock fields are optional.
    pub fn from_fen(fen: &str) -> Result<Self, Rejection> {
        let invalid = || Rejection::InvalidPosition(fen.to_string());

        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() < 4 || fields.len() > 6 {
            return Err(invalid());
        }

        // The board parser must only ever see one king per side
        if !placement_is_valid(fields[0])
            || !matches!(fields[1], "w" | "b")
            || !castling_is_valid(fields[2])
            || !en_passant_is_valid(fields[3], fields[1])
        {
            return Err(invalid());
        }

        let core = format!("{} {} {} {} 0 1", fields[0], fields[1], fields[2], fields[3]);
        let board = Board::from_str(&core).map_err(|_| invalid())?;

        let halfmove_clock = match fields.get(4) {
            Some(raw) => parse_clock(raw).ok_or_else(invalid)?,
            None => 0,
        };
        let fullmove_number = match fields.get(5) {
            Some(raw) => parse_clock(raw).ok_or_else(invalid)?,
            None => 1,
        };
        if fullmove_number == 0 {
            return Err(invalid());
        }

        Ok(Position {
            board,
            halfmove_clock,
            fullmove_number,
        })
    }

    /// Full six-field FEN
    pub fn to_fen(&self) -> String {
        let mut fen = String::with_capacity(90);

        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                let square = Square::make_square(Rank::from_index(rank), File::from_index(file));
                match (self.board.piece_on(square), self.board.color_on(square)) {
                    (Some(piece), Some(color)) => {
                        if empty > 0 {
                            fen.push_str(&empty.to_string());
                            empty = 0;
                        }
                        let letter = piece_letter(piece);
                        fen.push(if color == Color::White {
                            letter.to_ascii_uppercase()
                        } else {
                            letter
                        });
                    }
                    _ => empty += 1,
                }
            }
            if empty > 0 {
                fen.push_str(&empty.to_string());
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(match self.board.side_to_move() {
            Color::White => 'w',
            Color::Black => 'b',
        });

        fen.push(' ');
        let white = self.board.castle_rights(Color::White);
        let black = self.board.castle_rights(Color::Black);
        let mut castling = String::new();
        if white.has_kingside() {
            castling.push('K');
        }
        if white.has_queenside() {
            castling.push('Q');
        }
        if black.has_kingside() {
            castling.push('k');
        }
        if black.has_queenside() {
            castling.push('q');
        }
        if castling.is_empty() {
            castling.push('-');
        }
        fen.push_str(&castling);

        fen.push(' ');
        match self.en_passant_target() {
            Some(square) => fen.push_str(&square.to_string()),
            None => fen.push('-'),
        }

        fen.push_str(&format!(" {} {}", self.halfmove_clock, self.fullmove_number));
        fen
    }

    /// Square a capturing pawn lands on. The board tracks the pawn that
    /// just double-stepped, one rank further on.
    fn en_passant_target(&self) -> Option<Square> {
        let pawn = self.board.en_passant()?;
        let rank = pawn.get_rank().to_index() as i8 + pawn_direction(self.board.side_to_move());
        if !(0..8).contains(&rank) {
            return None;
        }
        Some(Square::make_square(
            Rank::from_index(rank as usize),
            pawn.get_file(),
        ))
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn side_to_move(&self) -> PlayerColor {
        self.board.side_to_move().into()
    }

    /// Zobrist hash of placement, side, castling and en-passant state
    pub fn hash(&self) -> u64 {
        self.board.get_hash()
    }

    pub fn color_on(&self, square: Square) -> Option<PlayerColor> {
        self.board.color_on(square).map(PlayerColor::from)
    }

    pub fn is_check(&self) -> bool {
        self.board.checkers().popcnt() > 0
    }

    pub fn is_checkmate(&self) -> bool {
        self.board.status() == BoardStatus::Checkmate
    }

    pub fn is_stalemate(&self) -> bool {
        self.board.status() == BoardStatus::Stalemate
    }

    pub fn is_fifty_move_draw(&self) -> bool {
        self.halfmove_clock >= FIFTY_MOVE_LIMIT
    }

    pub fn has_insufficient_material(&self) -> bool {
        has_insufficient_material(&self.board)
    }

    /// Target squares reachable by the piece on `square`
    pub fn legal_destinations(&self, square: Square) -> Vec<String> {
        let mut targets: Vec<String> = Vec::new();
        for chess_move in MoveGen::new_legal(&self.board) {
            if chess_move.get_source() == square {
                let dest = chess_move.get_dest().to_string();
                // Promotions yield one move per piece, all to the same square
                if !targets.contains(&dest) {
                    targets.push(dest);
                }
            }
        }
        targets
    }

    /// Resolve a candidate to a legal move in this position
    pub fn parse_move(&self, candidate: &MoveCandidate) -> Result<ChessMove, Rejection> {
        match candidate {
            MoveCandidate::Squares {
                from,
                to,
                promotion,
            } => {
                let promotion = parse_promotion(promotion.as_deref(), candidate)?;
                self.find_move(parse_square(from, candidate)?, parse_square(to, candidate)?, promotion)
                    .ok_or_else(|| Rejection::IllegalMove(candidate.to_string()))
            }
            MoveCandidate::Notation(text) => self.parse_notation(text.trim()),
        }
    }

    fn parse_notation(&self, text: &str) -> Result<ChessMove, Rejection> {
        if text.is_empty() {
            return Err(Rejection::MalformedMove(text.to_string()));
        }

        let wanted = strip_annotations(&text.replace('0', "O"));
        for chess_move in MoveGen::new_legal(&self.board) {
            if strip_annotations(&self.san(chess_move)) == wanted {
                return Ok(chess_move);
            }
        }

        // Coordinate notation: e2e4, e7e8q
        if text.is_ascii() && (text.len() == 4 || text.len() == 5) {
            let candidate = MoveCandidate::Squares {
                from: text[0..2].to_string(),
                to: text[2..4].to_string(),
                promotion: text.get(4..5).map(str::to_string),
            };
            if let Ok(chess_move) = self.parse_move(&candidate) {
                return Ok(chess_move);
            }
        }

        Err(Rejection::IllegalMove(text.to_string()))
    }

    fn find_move(&self, from: Square, to: Square, promotion: Option<Piece>) -> Option<ChessMove> {
        MoveGen::new_legal(&self.board).find(|m| {
            m.get_source() == from
                && m.get_dest() == to
                && match (promotion, m.get_promotion()) {
                    (Some(wanted), Some(actual)) => wanted == actual,
                    // Promote to a queen unless told otherwise
                    (None, Some(actual)) => actual == Piece::Queen,
                    (_, None) => true,
                }
        })
    }

    /// Standard algebraic notation for a legal move in this position
    pub fn san(&self, chess_move: ChessMove) -> String {
        let from = chess_move.get_source();
        let to = chess_move.get_dest();
        let Some(piece) = self.board.piece_on(from) else {
            return chess_move.to_string();
        };

        let mut san = String::new();
        if piece == Piece::King && from.get_file().to_index().abs_diff(to.get_file().to_index()) == 2 {
            san.push_str(if to.get_file() == File::G { "O-O" } else { "O-O-O" });
        } else {
            let capture = self.captured_piece(chess_move).is_some();
            if piece == Piece::Pawn {
                if capture {
                    san.push(file_letter(from));
                }
            } else {
                san.push(piece_letter(piece).to_ascii_uppercase());
                san.push_str(&self.disambiguation(chess_move, piece));
            }
            if capture {
                san.push('x');
            }
            san.push_str(&to.to_string());
            if let Some(promotion) = chess_move.get_promotion() {
                san.push('=');
                san.push(piece_letter(promotion).to_ascii_uppercase());
            }
        }

        let after = self.board.make_move_new(chess_move);
        if after.status() == BoardStatus::Checkmate {
            san.push('#');
        } else if after.checkers().popcnt() > 0 {
            san.push('+');
        }
        san
    }

    fn disambiguation(&self, chess_move: ChessMove, piece: Piece) -> String {
        let from = chess_move.get_source();
        let rivals: Vec<Square> = MoveGen::new_legal(&self.board)
            .filter(|m| {
                m.get_dest() == chess_move.get_dest()
                    && m.get_source() != from
                    && self.board.piece_on(m.get_source()) == Some(piece)
            })
            .map(|m| m.get_source())
            .collect();

        if rivals.is_empty() {
            return String::new();
        }
        if rivals.iter().all(|sq| sq.get_file() != from.get_file()) {
            return file_letter(from).to_string();
        }
        if rivals.iter().all(|sq| sq.get_rank() != from.get_rank()) {
            return (from.get_rank().to_index() + 1).to_string();
        }
        from.to_string()
    }

    fn captured_piece(&self, chess_move: ChessMove) -> Option<Piece> {
        if let Some(victim) = self.board.piece_on(chess_move.get_dest()) {
            return Some(victim);
        }
        let from = chess_move.get_source();
        let is_pawn = self.board.piece_on(from) == Some(Piece::Pawn);
        // A pawn changing file onto an empty square captured en passant
        if is_pawn && from.get_file() != chess_move.get_dest().get_file() {
            return Some(Piece::Pawn);
        }
        None
    }

    /// Play a legal move, advancing the clocks
    pub fn apply(&self, chess_move: ChessMove) -> Position {
        let resets_clock = self.board.piece_on(chess_move.get_source()) == Some(Piece::Pawn)
            || self.captured_piece(chess_move).is_some();
        let fullmove_number = match self.board.side_to_move() {
            Color::Black => self.fullmove_number.saturating_add(1),
            Color::White => self.fullmove_number,
        };

        Position {
            board: self.board.make_move_new(chess_move),
            halfmove_clock: if resets_clock {
                0
            } else {
                self.halfmove_clock.saturating_add(1)
            },
            fullmove_number,
        }
    }

    /// Describe a legal move and return the position it leads to
    pub fn play(&self, chess_move: ChessMove) -> (MoveRecord, Position) {
        let next = self.apply(chess_move);
        let piece = self
            .board
            .piece_on(chess_move.get_source())
            .map(piece_letter)
            .unwrap_or('p');
        let record = MoveRecord {
            from: chess_move.get_source().to_string(),
            to: chess_move.get_dest().to_string(),
            san: self.san(chess_move),
            color: self.side_to_move(),
            piece,
            promotion: chess_move.get_promotion().map(piece_letter),
            captured: self.captured_piece(chess_move).map(piece_letter),
            before: self.to_fen(),
            after: next.to_fen(),
        };
        (record, next)
    }
}

/// Eight ranks of eight files, legal piece letters only, one king per
/// side and no pawns on the back ranks
fn placement_is_valid(placement: &str) -> bool {
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return false;
    }

    let mut white_kings = 0;
    let mut black_kings = 0;
    for (index, rank) in ranks.iter().enumerate() {
        let back_rank = index == 0 || index == 7;
        let mut files = 0u32;
        for c in rank.chars() {
            match c {
                '1'..='8' => files += c.to_digit(10).unwrap_or(0),
                'K' => {
                    white_kings += 1;
                    files += 1;
                }
                'k' => {
                    black_kings += 1;
                    files += 1;
                }
                'P' | 'p' if back_rank => return false,
                'P' | 'p' | 'N' | 'n' | 'B' | 'b' | 'R' | 'r' | 'Q' | 'q' => files += 1,
                _ => return false,
            }
            if files > 8 {
                return false;
            }
        }
        if files != 8 {
            return false;
        }
    }
    white_kings == 1 && black_kings == 1
}

fn castling_is_valid(castling: &str) -> bool {
    if castling == "-" {
        return true;
    }
    !castling.is_empty()
        && castling.chars().all(|c| "KQkq".contains(c))
        && castling
            .char_indices()
            .all(|(i, c)| !castling[i + c.len_utf8()..].contains(c))
}

/// `-` or a target square on the rank the side to move captures onto
fn en_passant_is_valid(target: &str, side: &str) -> bool {
    if target == "-" {
        return true;
    }
    let mut chars = target.chars();
    let (Some(file), Some(rank), None) = (chars.next(), chars.next(), chars.next()) else {
        return false;
    };
    let expected_rank = if side == "w" { '6' } else { '3' };
    ('a'..='h').contains(&file) && rank == expected_rank
}

/// Plain decimal digits only
fn parse_clock(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Parse a square name such as "e4", in either case
pub fn parse_square(name: &str, candidate: &MoveCandidate) -> Result<Square, Rejection> {
    Square::from_str(&name.trim().to_lowercase())
        .map_err(|_| Rejection::MalformedMove(candidate.to_string()))
}

fn parse_promotion(
    promotion: Option<&str>,
    candidate: &MoveCandidate,
) -> Result<Option<Piece>, Rejection> {
    let Some(text) = promotion.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    let mut chars = text.chars();
    match (chars.next().and_then(piece_from_letter), chars.next()) {
        (Some(piece @ (Piece::Knight | Piece::Bishop | Piece::Rook | Piece::Queen)), None) => {
            Ok(Some(piece))
        }
        _ => Err(Rejection::MalformedMove(candidate.to_string())),
    }
}

fn strip_annotations(san: &str) -> String {
    san.trim_end_matches(['+', '#', '!', '?']).to_string()
}

fn file_letter(square: Square) -> char {
    (b'a' + square.get_file().to_index() as u8) as char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_all(moves: &[&str]) -> Position {
        let mut position = Position::default();
        for text in moves {
            let chess_move = position
                .parse_move(&MoveCandidate::notation(text))
                .unwrap_or_else(|e| panic!("{text}: {e}"));
            position = position.apply(chess_move);
        }
        position
    }

    fn san_of(position: &Position, from: &str, to: &str) -> String {
        let chess_move = position.parse_move(&MoveCandidate::squares(from, to)).unwrap();
        position.san(chess_move)
    }

    #[test]
    fn start_position_round_trips_through_fen() {
        assert_eq!(Position::default().to_fen(), START_FEN);
        assert_eq!(Position::from_fen(START_FEN).unwrap(), Position::default());
    }

    #[test]
    fn fen_tracks_clocks_and_en_passant() {
        let position = play_all(&["e4"]);
        // No black pawn can take on e3, so no target is written
        assert_eq!(
            position.to_fen(),
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );

        let position = play_all(&["e4", "Nf6", "e5", "d5"]);
        assert_eq!(
            position.to_fen(),
            "rnbqkb1r/ppp1pppp/5n2/3pP3/8/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 3"
        );

        let position = play_all(&["Nf3", "Nf6", "Ng1"]);
        assert!(position.to_fen().ends_with(" b KQkq - 3 2"));
    }

    #[test]
    fn invalid_fen_is_rejected() {
        assert!(Position::from_fen("").is_err());
        assert!(Position::from_fen("not a fen at all").is_err());
        assert!(Position::from_fen("8/8/8/8/8/8/8/8 w - - 0 1").is_err());
        assert!(Position::from_fen(&START_FEN.replace(" 0 1", " x 1")).is_err());
        assert!(Position::from_fen(&START_FEN.replace(" 0 1", " 0 0")).is_err());
    }

    #[test]
    fn placement_is_checked_before_the_board_sees_it() {
        for fen in [
            "8/8/8/8/8/8/8/8 w - - 0 1",
            "4k3/8/8/8/8/8/8/8 w - - 0 1",
            "8/8/8/8/8/8/8/4K3 w - - 0 1",
            "4k3/8/8/8/8/8/8/3KK3 w - - 0 1",
            "88888888/8/8/8/8/8/8/8 w - - 0 1",
            "/////// w - - 0 1",
            "4k3/8/8/8/8/8/8/4K3/8 w - - 0 1",
            "4k3/8/8/8/8/8/8/4K4 w - - 0 1",
            "4k3/8/8/8/8/8/8/4KX2 w - - 0 1",
            "P3k3/8/8/8/8/8/8/4K3 w - - 0 1",
            "4k3/8/8/8/8/8/8/p3K3 w - - 0 1",
        ] {
            assert!(
                matches!(Position::from_fen(fen), Err(Rejection::InvalidPosition(_))),
                "{fen}"
            );
        }
    }

    #[test]
    fn other_fields_are_checked() {
        let base = "4k3/8/8/8/8/8/4P3/4K3";
        for rest in [
            "x - - 0 1",
            "w KK - 0 1",
            "w Kx - 0 1",
            "w - z9 0 1",
            "w - e9 0 1",
            "w - e3 0 1",
            "b - e6 0 1",
            "w - - +1 1",
            "w - - 0 -1",
        ] {
            assert!(Position::from_fen(&format!("{base} {rest}")).is_err(), "{rest}");
        }
        assert!(Position::from_fen(&format!("{base} w - - 0 1")).is_ok());
    }

    #[test]
    fn clocks_saturate_instead_of_overflowing() {
        let position =
            Position::from_fen("4k3/8/8/8/8/8/4P3/4K3 b - - 4294967295 4294967295").unwrap();
        let chess_move = position.parse_move(&MoveCandidate::squares("e8", "d8")).unwrap();
        let next = position.apply(chess_move);
        let fen = next.to_fen();
        assert!(fen.ends_with(" w - - 4294967295 4294967295"), "{fen}");
        assert_eq!(Position::from_fen(&fen).unwrap(), next);
    }

    #[test]
    fn fen_without_clocks_is_accepted() {
        let position =
            Position::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq -").unwrap();
        assert_eq!(position.to_fen(), START_FEN);
    }

    #[test]
    fn san_covers_the_common_shapes() {
        let start = Position::default();
        assert_eq!(san_of(&start, "e2", "e4"), "e4");
        assert_eq!(san_of(&start, "g1", "f3"), "Nf3");

        let position = play_all(&["e4", "d5"]);
        assert_eq!(san_of(&position, "e4", "d5"), "exd5");

        let position = play_all(&["e4", "e5", "Nf3", "Nc6", "Bc4", "Nf6"]);
        assert_eq!(san_of(&position, "e1", "g1"), "O-O");

        let scholars = play_all(&["e4", "e5", "Bc4", "Nc6", "Qh5", "Nf6"]);
        assert_eq!(san_of(&scholars, "h5", "f7"), "Qxf7#");

        let position = play_all(&["e4", "f5"]);
        assert_eq!(san_of(&position, "d1", "h5"), "Qh5+");
    }

    #[test]
    fn san_disambiguates_by_file_then_rank() {
        let position = Position::from_fen("4k3/8/8/8/8/8/4K3/R6R w - - 0 1").unwrap();
        assert_eq!(san_of(&position, "a1", "d1"), "Rad1");

        let position = Position::from_fen("4k3/8/8/R7/8/8/8/R3K3 w - - 0 1").unwrap();
        assert_eq!(san_of(&position, "a1", "a3"), "R1a3");
    }

    #[test]
    fn promotion_defaults_to_queen() {
        let position = Position::from_fen("8/4P3/8/8/8/8/k7/4K3 w - - 0 1").unwrap();
        let queen = position.parse_move(&MoveCandidate::squares("e7", "e8")).unwrap();
        assert_eq!(queen.get_promotion(), Some(Piece::Queen));
        assert_eq!(position.san(queen), "e8=Q");

        let knight = position
            .parse_move(&MoveCandidate::Squares {
                from: "e7".into(),
                to: "e8".into(),
                promotion: Some("n".into()),
            })
            .unwrap();
        assert_eq!(knight.get_promotion(), Some(Piece::Knight));
    }

    #[test]
    fn notation_accepts_san_and_coordinates() {
        let start = Position::default();
        let san = start.parse_move(&MoveCandidate::notation("Nf3")).unwrap();
        let uci = start.parse_move(&MoveCandidate::notation("g1f3")).unwrap();
        assert_eq!(san, uci);

        let castled = play_all(&["e4", "e5", "Nf3", "Nc6", "Bc4", "Nf6", "0-0"]);
        assert_eq!(castled.side_to_move(), PlayerColor::Black);
    }

    #[test]
    fn illegal_and_malformed_moves_are_rejected() {
        let start = Position::default();
        assert!(matches!(
            start.parse_move(&MoveCandidate::squares("e2", "e5")),
            Err(Rejection::IllegalMove(_))
        ));
        assert!(matches!(
            start.parse_move(&MoveCandidate::squares("z9", "e4")),
            Err(Rejection::MalformedMove(_))
        ));
        assert!(start.parse_move(&MoveCandidate::notation("Ke2")).is_err());
        assert!(start.parse_move(&MoveCandidate::notation("")).is_err());
    }

    #[test]
    fn legal_destinations_for_highlighting() {
        let start = Position::default();
        let mut knight = start.legal_destinations(Square::G1);
        knight.sort();
        assert_eq!(knight, vec!["f3".to_string(), "h3".to_string()]);
        assert!(start.legal_destinations(Square::E4).is_empty());
    }

    #[test]
    fn status_flags_follow_the_board() {
        let mate = play_all(&["f3", "e5", "g4", "Qh4"]);
        assert!(mate.is_check());
        assert!(mate.is_checkmate());

        let stalemate = Position::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        assert!(stalemate.is_stalemate());
        assert!(!stalemate.is_check());

        let fifty = Position::from_fen("4k3/8/8/8/8/8/8/R3K3 w - - 100 80").unwrap();
        assert!(fifty.is_fifty_move_draw());
    }
}
