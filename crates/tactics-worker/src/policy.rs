//! Per-ply analysis policy: whether to ask the engine at all, and if so how
//! deep and how many candidate lines.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Opening,
    Middlegame,
    Endgame,
}

impl GamePhase {
    /// Classify by pieces left on the board, kings and pawns included.
    pub fn from_piece_count(pieces: u32) -> Self {
        match pieces {
            24.. => GamePhase::Opening,
            12..=23 => GamePhase::Middlegame,
            _ => GamePhase::Endgame,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Plies at or below this index are never analyzed
    pub opening_move_threshold: usize,
    /// Positions with this many legal moves or fewer are near-forced
    pub min_branching_for_analysis: usize,
    /// Depth used when a tactical pattern is already obvious
    pub shallow_depth: u8,
    pub opening_depth: u8,
    pub middlegame_depth: u8,
    pub endgame_depth: u8,
    /// Above this branching factor the engine reports several candidate lines
    pub complex_branching: usize,
    pub complex_candidate_count: u8,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            opening_move_threshold: 6,
            min_branching_for_analysis: 4,
            shallow_depth: 8,
            opening_depth: 10,
            middlegame_depth: 14,
            endgame_depth: 16,
            complex_branching: 10,
            complex_candidate_count: 3,
        }
    }
}

impl PolicyConfig {
    pub fn depth_for(&self, phase: GamePhase) -> u8 {
        match phase {
            GamePhase::Opening => self.opening_depth,
            GamePhase::Middlegame => self.middlegame_depth,
            GamePhase::Endgame => self.endgame_depth,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OpeningWindow,
    NearForced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDecision {
    Skip(SkipReason),
    Analyze { depth: u8, candidate_count: u8 },
}

/// Decide how to analyze the ply `move_index` (1-based). Pure: the same
/// inputs always give the same decision.
pub fn select_search_parameters(
    config: &PolicyConfig,
    move_index: usize,
    branching_factor: usize,
    phase: GamePhase,
    has_obvious_pattern: bool,
) -> SearchDecision {
    if move_index <= config.opening_move_threshold {
        return SearchDecision::Skip(SkipReason::OpeningWindow);
    }
    if has_obvious_pattern {
        return SearchDecision::Analyze {
            depth: config.shallow_depth,
            candidate_count: 1,
        };
    }
    if branching_factor <= config.min_branching_for_analysis {
        return SearchDecision::Skip(SkipReason::NearForced);
    }

    let candidate_count = if branching_factor > config.complex_branching {
        config.complex_candidate_count
    } else {
        1
    };

    SearchDecision::Analyze {
        depth: config.depth_for(phase),
        candidate_count,
    }
}
