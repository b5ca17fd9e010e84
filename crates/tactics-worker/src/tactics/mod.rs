/// Tactical detectors for single moves
/// Each detector looks at the position before a move and the position after it

pub mod attacks;
pub mod line_geometry;
pub mod pins;
pub mod simple;

use chess::{Board, ChessMove, Color};

use crate::annotation::TacticalTag;

/// A move with the positions on either side of it
#[derive(Debug, Clone, Copy)]
pub struct MovePair {
    pub before: Board,
    pub after: Board,
    pub mv: ChessMove,
}

impl MovePair {
    /// `mv` must be legal in `before`
    pub fn new(before: &Board, mv: ChessMove) -> Self {
        Self {
            before: *before,
            after: before.make_move_new(mv),
            mv,
        }
    }

    pub fn mover(&self) -> Color {
        self.before.side_to_move()
    }
}

pub fn detects_mate(board: &Board, mv: ChessMove) -> bool {
    simple::mate(&MovePair::new(board, mv))
}

pub fn gives_check(board: &Board, mv: ChessMove) -> bool {
    simple::check(&MovePair::new(board, mv))
}

pub fn is_fork(board: &Board, mv: ChessMove) -> bool {
    attacks::fork(&MovePair::new(board, mv))
}

pub fn is_pin(board: &Board, mv: ChessMove) -> bool {
    pins::pin(&MovePair::new(board, mv))
}

pub fn is_discovered_attack(board: &Board, mv: ChessMove) -> bool {
    line_geometry::discovered_attack(&MovePair::new(board, mv))
}

/// First matching motif in priority order: mate, check, fork, pin,
/// discovered attack.
pub fn detect(board: &Board, mv: ChessMove) -> Option<TacticalTag> {
    let pair = MovePair::new(board, mv);

    let detectors: [(fn(&MovePair) -> bool, TacticalTag); 5] = [
        (simple::mate, TacticalTag::Mate),
        (simple::check, TacticalTag::Check),
        (attacks::fork, TacticalTag::Fork),
        (pins::pin, TacticalTag::Pin),
        (line_geometry::discovered_attack, TacticalTag::DiscoveredAttack),
    ];

    detectors
        .into_iter()
        .find(|(detector, _)| detector(&pair))
        .map(|(_, tag)| tag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::movetext::parse_uci_move;
    use std::str::FromStr;

    fn tag(fen: &str, uci: &str) -> Option<TacticalTag> {
        let board = Board::from_str(fen).unwrap();
        let mv = parse_uci_move(uci).unwrap();
        detect(&board, mv)
    }

    #[test]
    fn test_back_rank_mate_outranks_check() {
        assert_eq!(
            tag("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1", "a1a8"),
            Some(TacticalTag::Mate)
        );
    }

    #[test]
    fn test_plain_check() {
        assert_eq!(
            tag("4k3/8/8/8/8/8/8/3QK3 w - - 0 1", "d1h5"),
            Some(TacticalTag::Check)
        );
    }

    #[test]
    fn test_knight_fork_of_queen_and_rook() {
        assert_eq!(
            tag("r3q1k1/8/8/1N6/8/8/8/7K w - - 0 1", "b5c7"),
            Some(TacticalTag::Fork)
        );
    }

    #[test]
    fn test_bishop_pin_against_king() {
        assert_eq!(
            tag("4k3/8/2n5/8/8/8/8/4KB2 w - - 0 1", "f1b5"),
            Some(TacticalTag::Pin)
        );
    }

    #[test]
    fn test_bishop_uncovers_rook_on_queen() {
        assert_eq!(
            tag("3qk3/8/8/8/8/3B4/8/3RK3 w - - 0 1", "d3h7"),
            Some(TacticalTag::DiscoveredAttack)
        );
    }

    #[test]
    fn test_single_detectors_match_their_positions() {
        let board = |fen: &str| Board::from_str(fen).unwrap();
        let mv = |uci: &str| parse_uci_move(uci).unwrap();

        let mate = board("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1");
        assert!(detects_mate(&mate, mv("a1a8")));
        assert!(gives_check(&mate, mv("a1a8")));
        assert!(!detects_mate(&mate, mv("a1a7")));

        let fork = board("r3q1k1/8/8/1N6/8/8/8/7K w - - 0 1");
        assert!(is_fork(&fork, mv("b5c7")));
        assert!(!is_fork(&fork, mv("b5d4")));

        let pin = board("4k3/8/2n5/8/8/8/8/4KB2 w - - 0 1");
        assert!(is_pin(&pin, mv("f1b5")));
        assert!(!is_pin(&pin, mv("f1d3")));

        let discovered = board("3qk3/8/8/8/8/3B4/8/3RK3 w - - 0 1");
        assert!(is_discovered_attack(&discovered, mv("d3h7")));
        assert!(!gives_check(&discovered, mv("d3h7")));
    }

    #[test]
    fn test_quiet_opening_move_has_no_tag() {
        assert_eq!(tag(&Board::default().to_string(), "e2e4"), None);
        assert_eq!(tag(&Board::default().to_string(), "g1f3"), None);
    }
}
