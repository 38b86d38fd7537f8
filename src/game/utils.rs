use chess::{Board, Color, Piece, Square};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{GameState, PlayerColor};

/// Lowercase letter for a piece, as used in move records
pub fn piece_letter(piece: Piece) -> char {
    match piece {
        Piece::Pawn => 'p',
        Piece::Knight => 'n',
        Piece::Bishop => 'b',
        Piece::Rook => 'r',
        Piece::Queen => 'q',
        Piece::King => 'k',
    }
}

/// Piece named by a letter in either case
pub fn piece_from_letter(letter: char) -> Option<Piece> {
    match letter.to_ascii_lowercase() {
        'p' => Some(Piece::Pawn),
        'n' => Some(Piece::Knight),
        'b' => Some(Piece::Bishop),
        'r' => Some(Piece::Rook),
        'q' => Some(Piece::Queen),
        'k' => Some(Piece::King),
        _ => None,
    }
}

/// Get the game status as a string
pub fn get_game_status(state: &GameState) -> String {
    if state.is_checkmate {
        // The side to move is the one that got mated
        match state.turn {
            PlayerColor::White => "black_wins".to_string(),
            PlayerColor::Black => "white_wins".to_string(),
        }
    } else if state.is_stalemate {
        "stalemate".to_string()
    } else if state.is_draw {
        "draw".to_string()
    } else if state.is_check {
        "check".to_string()
    } else {
        format!("{}_turn", state.turn)
    }
}

/// Check if the board has insufficient material for checkmate
pub fn has_insufficient_material(board: &Board) -> bool {
    let mut knights = 0;
    let mut bishops_on_light = 0;
    let mut bishops_on_dark = 0;

    for square in *board.combined() {
        let Some(piece) = board.piece_on(square) else {
            continue;
        };
        match piece {
            // Kings are always present
            Piece::King => {}
            Piece::Knight => knights += 1,
            Piece::Bishop => {
                if is_light_square(square) {
                    bishops_on_light += 1;
                } else {
                    bishops_on_dark += 1;
                }
            }
            Piece::Pawn | Piece::Rook | Piece::Queen => return false,
        }
    }

    let bishops = bishops_on_light + bishops_on_dark;

    // King vs King
    if knights == 0 && bishops == 0 {
        return true;
    }

    // King and minor piece vs King
    if knights + bishops == 1 {
        return true;
    }

    // Kings and bishops only, all bishops on the same square colour
    knights == 0 && (bishops_on_light == 0 || bishops_on_dark == 0)
}

fn is_light_square(square: Square) -> bool {
    (square.get_rank().to_index() + square.get_file().to_index()) % 2 == 1
}

/// Milliseconds since the Unix epoch
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Direction a pawn of this colour advances in, as a rank delta
pub fn pawn_direction(color: Color) -> i8 {
    match color {
        Color::White => 1,
        Color::Black => -1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn board(fen: &str) -> Board {
        Board::from_str(fen).unwrap()
    }

    #[test]
    fn bare_kings_are_insufficient() {
        assert!(has_insufficient_material(&board("8/8/4k3/8/8/3K4/8/8 w - - 0 1")));
    }

    #[test]
    fn single_minor_is_insufficient() {
        assert!(has_insufficient_material(&board("8/8/4k3/8/8/3KN3/8/8 w - - 0 1")));
        assert!(has_insufficient_material(&board("8/8/4kb2/8/8/3K4/8/8 w - - 0 1")));
    }

    #[test]
    fn same_coloured_bishops_are_insufficient() {
        // c1 and f4 are both dark squares
        assert!(has_insufficient_material(&board("8/8/4k3/8/5b2/3K4/8/2B5 w - - 0 1")));
        // c1 dark, c2 light
        assert!(!has_insufficient_material(&board("8/8/4k3/8/8/3K4/2b5/2B5 w - - 0 1")));
    }

    #[test]
    fn heavy_pieces_or_pawns_are_sufficient() {
        assert!(!has_insufficient_material(&board("8/8/4k3/8/8/3K4/4P3/8 w - - 0 1")));
        assert!(!has_insufficient_material(&board("8/8/4k3/8/8/3K4/8/R7 w - - 0 1")));
        assert!(!has_insufficient_material(&Board::default()));
    }

    #[test]
    fn two_knights_are_not_flagged() {
        assert!(!has_insufficient_material(&board("8/8/4k3/8/8/3KNN2/8/8 w - - 0 1")));
    }
}
