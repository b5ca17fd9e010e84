//! Walks a single game's mainline ply by ply, asks the engine about the
//! plies the policy selects, and collects annotations for noteworthy moves.

use chess::Board;
use chess_core::{decode_movetext, DecodedMove, GameRecord};
use tracing::{debug, info, warn};

use crate::analysis::classify_or_neutral;
use crate::annotation::{MoveAnnotation, Side};
use crate::board_utils::{legal_move_count, piece_count};
use crate::config::AnalysisConfig;
use crate::engine::Engine;
use crate::error::WorkerError;
use crate::eval_cache::EvalCache;
use crate::policy::{select_search_parameters, GamePhase, SearchDecision};
use crate::tactics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    NotStarted,
    /// Currently at this 1-based ply
    Walking { ply: usize },
    Finished,
}

/// Everything one game walk produced. A walk that hit an error keeps the
/// annotations gathered before it.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub annotations: Vec<MoveAnnotation>,
    pub analyzed_plies: usize,
    pub skipped_plies: usize,
    pub anomalies: u32,
    /// Engine searches actually run (cache misses)
    pub engine_calls: u64,
    pub cache_hits: u64,
    pub error: Option<WorkerError>,
}

impl WalkOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

pub struct GameWalker<'a> {
    config: &'a AnalysisConfig,
    state: WalkState,
    cache: EvalCache,
    engine_ready: bool,
}

impl<'a> GameWalker<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self {
            config,
            state: WalkState::NotStarted,
            cache: EvalCache::new(),
            engine_ready: false,
        }
    }

    pub fn state(&self) -> WalkState {
        self.state
    }

    /// Walk the whole mainline of `game`. Never panics on bad input: a
    /// movetext that cannot be decoded ends the walk with `InvalidGameData`.
    pub async fn walk<E: Engine>(&mut self, engine: &mut E, game: &GameRecord) -> WalkOutcome {
        let mut outcome = WalkOutcome::default();

        let moves = match decode_movetext(&game.movetext) {
            Ok(moves) => moves,
            Err(e) => {
                warn!(game_id = game.id, error = %e, "Undecodable movetext");
                self.state = WalkState::Finished;
                outcome.error = Some(e.into());
                return outcome;
            }
        };

        let mut board = Board::default();
        for decoded in &moves {
            self.state = WalkState::Walking { ply: decoded.ply };
            if let Err(e) = self.step(engine, game.id, &board, decoded, &mut outcome).await {
                warn!(game_id = game.id, ply = decoded.ply, error = %e, "Game walk aborted");
                outcome.error = Some(e);
                break;
            }
            board = board.make_move_new(decoded.mv);
        }

        self.state = WalkState::Finished;
        outcome.engine_calls = self.cache.misses();
        outcome.cache_hits = self.cache.hits();

        info!(
            game_id = game.id,
            plies = moves.len(),
            analyzed = outcome.analyzed_plies,
            skipped = outcome.skipped_plies,
            annotations = outcome.annotations.len(),
            engine_calls = outcome.engine_calls,
            "Game walk finished"
        );
        outcome
    }

    async fn step<E: Engine>(
        &mut self,
        engine: &mut E,
        game_id: i64,
        board: &Board,
        decoded: &DecodedMove,
        outcome: &mut WalkOutcome,
    ) -> Result<(), WorkerError> {
        let branching = legal_move_count(board);
        let phase = GamePhase::from_piece_count(piece_count(board));
        let pre_tag = tactics::detect(board, decoded.mv);

        let decision = select_search_parameters(
            &self.config.policy,
            decoded.ply,
            branching,
            phase,
            pre_tag.is_some(),
        );
        let (depth, candidate_count) = match decision {
            SearchDecision::Skip(reason) => {
                debug!(game_id, ply = decoded.ply, ?reason, "Ply skipped");
                outcome.skipped_plies += 1;
                return Ok(());
            }
            SearchDecision::Analyze {
                depth,
                candidate_count,
            } => (depth, candidate_count),
        };

        if !self.engine_ready {
            engine.new_game().await?;
            self.engine_ready = true;
        }

        let fen_before = board.to_string();
        let eval_before = self
            .cache
            .get_or_compute(&fen_before, depth, candidate_count, || {
                engine.evaluate(&fen_before, depth, candidate_count)
            })
            .await?;

        let fen_after = board.make_move_new(decoded.mv).to_string();
        let eval_after = self
            .cache
            .get_or_compute(&fen_after, depth, 1, || engine.evaluate(&fen_after, depth, 1))
            .await?;

        let mover = Side::from(board.side_to_move());
        let classification = classify_or_neutral(
            &eval_before,
            &eval_after,
            mover,
            pre_tag,
            &self.config.thresholds,
        );

        outcome.analyzed_plies += 1;
        if classification.anomaly {
            outcome.anomalies += 1;
        }

        if classification.is_noteworthy() {
            outcome.annotations.push(MoveAnnotation {
                game_id,
                move_index: decoded.ply,
                side_to_move: mover,
                position_before_fen: fen_before,
                move_played: decoded.uci.clone(),
                move_san: decoded.san.clone(),
                tactical_tag: classification.tactical_tag,
                error_label: classification.error_label,
                score_delta: classification.score_delta,
                search_depth: depth,
            });
        }
        Ok(())
    }
}

/// Walk one game with a fresh per-game cache.
pub async fn analyze_game<E: Engine>(
    engine: &mut E,
    config: &AnalysisConfig,
    game: &GameRecord,
) -> WalkOutcome {
    GameWalker::new(config).walk(engine, game).await
}
