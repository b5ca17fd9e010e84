#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chess::Board;
use chess_core::decode_movetext;
use tactics_worker::annotation::MoveAnnotation;
use tactics_worker::engine::{CandidateLine, Engine, EngineFactory, EvaluationResult, Score};
use tactics_worker::error::WorkerError;
use tactics_worker::eval_cache::normalize_fen;
use tactics_worker::store::{FeatureStore, MemoryStore};

/// Scholar's mate: the seventh ply is Qxf7#.
pub const SCHOLARS_MATE: &str = "1. e4 e5 2. Bc4 Nc6 3. Qh5 Nf6 4. Qxf7#";

/// Italian game ending in 4. Ng5, the seventh ply.
pub const ITALIAN_NG5: &str = "1. e4 e5 2. Nf3 Nc6 3. Bc4 Nf6 4. Ng5";

/// FEN after playing `movetext` from the start position.
pub fn fen_after(movetext: &str) -> String {
    let mut board = Board::default();
    for decoded in decode_movetext(movetext).expect("valid movetext") {
        board = board.make_move_new(decoded.mv);
    }
    board.to_string()
}

/// Counters shared by every engine a factory hands out.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub evaluations: AtomicUsize,
    pub new_games: AtomicUsize,
    pub spawns: AtomicUsize,
    pub quits: AtomicUsize,
    /// (fen, depth, candidate_count) per evaluation
    pub requests: Mutex<Vec<(String, u8, u8)>>,
}

impl EngineStats {
    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    pub fn spawns(&self) -> usize {
        self.spawns.load(Ordering::SeqCst)
    }

    pub fn quits(&self) -> usize {
        self.quits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<(String, u8, u8)> {
        self.requests.lock().unwrap().clone()
    }
}

/// What a scripted engine answers.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Score per normalized FEN; missing positions get `default_score`
    pub scores: HashMap<String, Option<Score>>,
    pub default_score: Option<Score>,
    /// The n-th evaluation overall (1-based) times out
    pub fail_on_evaluation: Option<usize>,
    /// Every evaluation sleeps this long first
    pub delay: Option<Duration>,
}

impl Script {
    pub fn level() -> Self {
        Self {
            default_score: Some(Score::Centipawns(0)),
            ..Self::default()
        }
    }

    /// Score the position after `movetext`
    pub fn score_after(mut self, movetext: &str, score: Option<Score>) -> Self {
        self.scores.insert(normalize_fen(&fen_after(movetext)), score);
        self
    }
}

pub struct ScriptedEngine {
    script: Arc<Script>,
    stats: Arc<EngineStats>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> (Self, Arc<EngineStats>) {
        let stats = Arc::new(EngineStats::default());
        let engine = Self {
            script: Arc::new(script),
            stats: stats.clone(),
        };
        (engine, stats)
    }
}

impl Engine for ScriptedEngine {
    async fn evaluate(
        &mut self,
        fen: &str,
        depth: u8,
        candidate_count: u8,
    ) -> Result<EvaluationResult, WorkerError> {
        let n = self.stats.evaluations.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats
            .requests
            .lock()
            .unwrap()
            .push((fen.to_string(), depth, candidate_count));

        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }
        if self.script.fail_on_evaluation == Some(n) {
            return Err(WorkerError::EngineTimeout(Duration::from_secs(30)));
        }

        let score = self
            .script
            .scores
            .get(&normalize_fen(fen))
            .copied()
            .unwrap_or(self.script.default_score);

        Ok(EvaluationResult {
            score,
            best_move: Some("a2a3".into()),
            candidate_lines: score
                .map(|s| {
                    vec![CandidateLine {
                        rank: 1,
                        uci_move: "a2a3".into(),
                        score: Some(s),
                    }]
                })
                .unwrap_or_default(),
            search_depth: depth,
        })
    }

    async fn new_game(&mut self) -> Result<(), WorkerError> {
        self.stats.new_games.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn quit(&mut self) {
        self.stats.quits.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct ScriptedFactory {
    script: Arc<Script>,
    pub stats: Arc<EngineStats>,
    /// Refuse to spawn after this many engines
    pub spawn_limit: Option<usize>,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Self {
        Self {
            script: Arc::new(script),
            stats: Arc::new(EngineStats::default()),
            spawn_limit: None,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            spawn_limit: Some(0),
            ..Self::new(Script::level())
        }
    }
}

impl EngineFactory for ScriptedFactory {
    type Engine = ScriptedEngine;

    async fn spawn(&self) -> Result<ScriptedEngine, WorkerError> {
        let spawned = self.stats.spawns.load(Ordering::SeqCst);
        if self.spawn_limit.is_some_and(|limit| spawned >= limit) {
            return Err(WorkerError::EngineUnavailable("no engine binary".into()));
        }
        self.stats.spawns.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedEngine {
            script: self.script.clone(),
            stats: self.stats.clone(),
        })
    }
}

/// Memory store whose annotation writes fail for chosen games.
#[derive(Clone)]
pub struct FlakyStore {
    pub inner: MemoryStore,
    failing: Arc<HashSet<i64>>,
}

impl FlakyStore {
    pub fn new(inner: MemoryStore, failing: &[i64]) -> Self {
        Self {
            inner,
            failing: Arc::new(failing.iter().copied().collect()),
        }
    }
}

impl FeatureStore for FlakyStore {
    async fn analyzed_ids(&self, candidates: &[i64]) -> Result<HashSet<i64>, WorkerError> {
        self.inner.analyzed_ids(candidates).await
    }

    async fn save_annotations(
        &self,
        game_id: i64,
        annotations: &[MoveAnnotation],
    ) -> Result<(), WorkerError> {
        if self.failing.contains(&game_id) {
            return Err(WorkerError::StoreWriteFailure("disk full".into()));
        }
        self.inner.save_annotations(game_id, annotations).await
    }

    async fn mark_analyzed(&self, game_id: i64) -> Result<(), WorkerError> {
        self.inner.mark_analyzed(game_id).await
    }
}
