//! Output rows of the analysis pass and their closed vocabularies.

use std::fmt;

use chess::Color;
use serde::{Deserialize, Serialize};

/// Which player made a move. White is the first player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opponent(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

/// Tactical motif attached to a move. `MissedBest` is set by the classifier
/// when the engine's best line was clearly better than the move played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TacticalTag {
    Mate,
    Check,
    Fork,
    Pin,
    DiscoveredAttack,
    MissedBest,
}

impl TacticalTag {
    pub fn as_str(self) -> &'static str {
        match self {
            TacticalTag::Mate => "mate",
            TacticalTag::Check => "check",
            TacticalTag::Fork => "fork",
            TacticalTag::Pin => "pin",
            TacticalTag::DiscoveredAttack => "discovered_attack",
            TacticalTag::MissedBest => "missed_best",
        }
    }
}

impl fmt::Display for TacticalTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Move quality, ordered by severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ErrorLabel {
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
}

impl ErrorLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorLabel::Good => "good",
            ErrorLabel::Inaccuracy => "inaccuracy",
            ErrorLabel::Mistake => "mistake",
            ErrorLabel::Blunder => "blunder",
        }
    }
}

impl fmt::Display for ErrorLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analyzed move worth keeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveAnnotation {
    pub game_id: i64,
    /// 1-based ply within the mainline
    pub move_index: usize,
    /// The side that played the move
    pub side_to_move: Side,
    pub position_before_fen: String,
    /// Move in UCI notation
    pub move_played: String,
    pub move_san: Option<String>,
    pub tactical_tag: Option<TacticalTag>,
    pub error_label: ErrorLabel,
    /// Quality change for the mover, in centipawns (positive = improved)
    pub score_delta: i32,
    pub search_depth: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Analyzed,
    FailedButMarked,
}

/// What the orchestrator knows about one game of the worklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameAnalysisRecord {
    pub game_id: i64,
    pub status: AnalysisStatus,
    /// `None` when the game failed before any annotation could be produced
    pub annotations: Option<Vec<MoveAnnotation>>,
}

impl GameAnalysisRecord {
    pub fn annotation_count(&self) -> usize {
        self.annotations.as_ref().map_or(0, Vec::len)
    }
}
