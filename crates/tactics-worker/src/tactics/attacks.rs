/// Attack-based detectors: fork

use chess::Piece;

use super::MovePair;

/// Fork: the moved knight attacks two or more of the opponent's queens and rooks
pub fn fork(pair: &MovePair) -> bool {
    let dest = pair.mv.get_dest();
    if pair.after.piece_on(dest) != Some(Piece::Knight) {
        return false;
    }

    let opponent = !pair.mover();
    let targets = (*pair.after.pieces(Piece::Queen) | *pair.after.pieces(Piece::Rook))
        & *pair.after.color_combined(opponent);

    (chess::get_knight_moves(dest) & targets).popcnt() >= 2
}
