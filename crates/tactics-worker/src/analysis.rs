/// Move classification from before/after evaluations. Pure functions only.
/// (No board or engine process dependencies)

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::annotation::{ErrorLabel, Side, TacticalTag};
use crate::engine::{EvaluationResult, Score};
use crate::error::WorkerError;

/// Centipawn-loss bands and the missed-best gap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierThresholds {
    /// Loss up to this is still a good move
    pub good: i32,
    pub inaccuracy: i32,
    pub mistake: i32,
    /// Best line must beat the played move by more than this to tag `missed_best`
    pub missed_best_gap: i32,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            good: 50,
            inaccuracy: 150,
            mistake: 500,
            missed_best_gap: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub tactical_tag: Option<TacticalTag>,
    pub error_label: ErrorLabel,
    /// Mover-relative change in centipawns; negative means the move lost ground
    pub score_delta: i32,
    /// The evaluations could not be compared and neutral values were used
    pub anomaly: bool,
}

impl Classification {
    /// Worth an annotation row: tagged, or anything worse than good
    pub fn is_noteworthy(&self) -> bool {
        self.tactical_tag.is_some() || self.error_label != ErrorLabel::Good
    }
}

/// Score as seen by White. `to_move` is the side to move in the evaluated position.
fn white_relative(score: Score, to_move: Side) -> i32 {
    match to_move {
        Side::White => score.to_cp(),
        Side::Black => -score.to_cp(),
    }
}

pub fn label_for_loss(loss: i32, thresholds: &ClassifierThresholds) -> ErrorLabel {
    if loss <= thresholds.good {
        ErrorLabel::Good
    } else if loss <= thresholds.inaccuracy {
        ErrorLabel::Inaccuracy
    } else if loss <= thresholds.mistake {
        ErrorLabel::Mistake
    } else {
        ErrorLabel::Blunder
    }
}

/// Classify one move from the evaluations of the positions before and
/// after it. `mover` is the side that played the move.
pub fn classify(
    eval_before: &EvaluationResult,
    eval_after: &EvaluationResult,
    mover: Side,
    pre_detected: Option<TacticalTag>,
    thresholds: &ClassifierThresholds,
) -> Result<Classification, WorkerError> {
    let before = eval_before
        .score
        .ok_or(WorkerError::ClassificationAnomaly("no score before the move"))?;
    let after = eval_after
        .score
        .ok_or(WorkerError::ClassificationAnomaly("no score after the move"))?;

    // Before the move the mover is to move; after it, the opponent is
    let mut score_before = white_relative(before, mover);
    let mut score_after = white_relative(after, mover.opponent());
    if mover == Side::Black {
        score_before = -score_before;
        score_after = -score_after;
    }

    let score_delta = score_after - score_before;
    let error_label = label_for_loss((-score_delta).max(0), thresholds);

    let tactical_tag =
        pre_detected.or_else(|| missed_best(eval_before, score_after, thresholds));

    Ok(Classification {
        tactical_tag,
        error_label,
        score_delta,
        anomaly: false,
    })
}

/// The best candidate line is scored for the mover, who was to move.
fn missed_best(
    eval_before: &EvaluationResult,
    played: i32,
    thresholds: &ClassifierThresholds,
) -> Option<TacticalTag> {
    let best = eval_before.best_line()?.score?.to_cp();
    (best - played > thresholds.missed_best_gap).then_some(TacticalTag::MissedBest)
}

/// `classify`, falling back to a neutral result flagged as an anomaly so a
/// single bad evaluation never aborts a game.
pub fn classify_or_neutral(
    eval_before: &EvaluationResult,
    eval_after: &EvaluationResult,
    mover: Side,
    pre_detected: Option<TacticalTag>,
    thresholds: &ClassifierThresholds,
) -> Classification {
    match classify(eval_before, eval_after, mover, pre_detected, thresholds) {
        Ok(classification) => classification,
        Err(e) => {
            warn!(error = %e, "Using neutral classification");
            Classification {
                tactical_tag: pre_detected,
                error_label: ErrorLabel::Good,
                score_delta: 0,
                anomaly: true,
            }
        }
    }
}
