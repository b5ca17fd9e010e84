/// Simple detectors: mate, check

use chess::BoardStatus;

use super::MovePair;

/// The move leaves the opponent checkmated
pub fn mate(pair: &MovePair) -> bool {
    pair.after.status() == BoardStatus::Checkmate
}

/// The move leaves the opponent in check
pub fn check(pair: &MovePair) -> bool {
    pair.after.checkers().popcnt() > 0
}
