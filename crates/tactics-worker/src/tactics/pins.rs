/// Pin detectors: pin

use chess::{Piece, EMPTY};

use super::MovePair;
use crate::board_utils::pinned_pieces;

/// Pin: after the move some opponent piece other than the king is pinned
/// to its king
pub fn pin(pair: &MovePair) -> bool {
    let pinned = pinned_pieces(&pair.after, !pair.mover()) & !*pair.after.pieces(Piece::King);
    pinned != EMPTY
}
