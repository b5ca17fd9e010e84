/// Line geometry detectors: discovered_attack

use chess::{BitBoard, EMPTY};

use super::MovePair;
use crate::board_utils::{attackers, is_castling};

/// Discovered attack: an opponent piece gains an attacker other than the
/// piece that moved. Discovered checks count.
pub fn discovered_attack(pair: &MovePair) -> bool {
    if is_castling(&pair.before, pair.mv) {
        return false;
    }

    let mover = pair.mover();
    let moved = BitBoard::from_square(pair.mv.get_dest());

    for target in *pair.after.color_combined(!mover) {
        let gained = attackers(&pair.after, mover, target)
            & !attackers(&pair.before, mover, target)
            & !moved;
        if gained != EMPTY {
            return true;
        }
    }
    false
}
