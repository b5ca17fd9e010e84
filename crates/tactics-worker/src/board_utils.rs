/// Board utility functions for tactical detection

use chess::{BitBoard, Board, ChessMove, Color, File, MoveGen, Piece, Rank, Square, EMPTY};

/// Pawn attack squares (just the diagonal attacks, not pushes)
pub fn pawn_attacks(square: Square, color: Color) -> BitBoard {
    let file = square.get_file().to_index();
    let rank = square.get_rank().to_index();

    let target_rank = match color {
        Color::White if rank < 7 => rank + 1,
        Color::Black if rank > 0 => rank - 1,
        _ => return EMPTY,
    };

    let mut result = EMPTY;
    for target_file in [file.checked_sub(1), Some(file + 1).filter(|f| *f < 8)]
        .into_iter()
        .flatten()
    {
        result |= BitBoard::from_square(Square::make_square(
            Rank::from_index(target_rank),
            File::from_index(target_file),
        ));
    }
    result
}

/// Get all pieces of a given color that attack a square
pub fn attackers(board: &Board, color: Color, square: Square) -> BitBoard {
    let occupied = *board.combined();
    let color_pieces = *board.color_combined(color);

    let diagonal = *board.pieces(Piece::Bishop) | *board.pieces(Piece::Queen);
    let orthogonal = *board.pieces(Piece::Rook) | *board.pieces(Piece::Queen);

    // Pawns: reverse lookup from the target square with the opposite color
    let result = (pawn_attacks(square, !color) & *board.pieces(Piece::Pawn))
        | (chess::get_knight_moves(square) & *board.pieces(Piece::Knight))
        | (chess::get_king_moves(square) & *board.pieces(Piece::King))
        | (chess::get_bishop_moves(square, occupied) & diagonal)
        | (chess::get_rook_moves(square, occupied) & orthogonal);

    result & color_pieces
}

/// Pieces of `color` pinned to their own king, whichever side is to move.
pub fn pinned_pieces(board: &Board, color: Color) -> BitBoard {
    let king_sq = board.king_square(color);
    let occupied = *board.combined();
    let enemy = *board.color_combined(!color);

    let diagonal = (*board.pieces(Piece::Bishop) | *board.pieces(Piece::Queen)) & enemy;
    let orthogonal = (*board.pieces(Piece::Rook) | *board.pieces(Piece::Queen)) & enemy;

    let mut pinned = EMPTY;
    for pinner_sq in diagonal | orthogonal {
        if chess::line(king_sq, pinner_sq) == EMPTY {
            continue;
        }
        let is_diagonal = is_diagonal(king_sq, pinner_sq);
        let slides_that_way = if is_diagonal {
            diagonal & BitBoard::from_square(pinner_sq) != EMPTY
        } else {
            orthogonal & BitBoard::from_square(pinner_sq) != EMPTY
        };
        if !slides_that_way {
            continue;
        }

        let blockers = chess::between(king_sq, pinner_sq) & occupied;
        if blockers.popcnt() == 1 && blockers & *board.color_combined(color) != EMPTY {
            pinned |= blockers;
        }
    }
    pinned
}

fn is_diagonal(a: Square, b: Square) -> bool {
    let file_diff = (a.get_file().to_index() as i32 - b.get_file().to_index() as i32).abs();
    let rank_diff = (a.get_rank().to_index() as i32 - b.get_rank().to_index() as i32).abs();
    file_diff == rank_diff
}

/// King moving two files
pub fn is_castling(board: &Board, mv: ChessMove) -> bool {
    board.piece_on(mv.get_source()) == Some(Piece::King)
        && (mv.get_source().get_file().to_index() as i32
            - mv.get_dest().get_file().to_index() as i32)
            .abs()
            == 2
}

/// Pieces on the board, kings and pawns included
pub fn piece_count(board: &Board) -> u32 {
    board.combined().popcnt()
}

/// Number of legal moves for the side to move
pub fn legal_move_count(board: &Board) -> usize {
    MoveGen::new_legal(board).len()
}
