//! Engine seam: everything the analysis pass needs from a chess engine,
//! plus the per-chunk pool of engine instances.

use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::WorkerError;

/// Centipawn magnitude used for forced mates.
pub const MATE_SCORE: i32 = 10_000;

/// Engine score, from the perspective of the side to move in the
/// evaluated position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    Centipawns(i32),
    /// Mate in N moves (positive = side to move mates, 0 or negative = gets mated)
    Mate(i32),
}

impl Score {
    /// Collapse to a centipawn scale. Mate in n maps to 10000 - 10n so that
    /// faster mates rank higher.
    pub fn to_cp(self) -> i32 {
        match self {
            Score::Centipawns(cp) => cp,
            Score::Mate(m) if m > 0 => MATE_SCORE - m * 10,
            Score::Mate(m) => -MATE_SCORE - m * 10,
        }
    }
}

/// One multi-PV line: its rank (1 = best), first move and score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLine {
    pub rank: u8,
    pub uci_move: String,
    pub score: Option<Score>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Score of the principal line, `None` if the engine never reported one
    pub score: Option<Score>,
    pub best_move: Option<String>,
    /// Ordered by rank
    pub candidate_lines: Vec<CandidateLine>,
    pub search_depth: u8,
}

impl EvaluationResult {
    pub fn best_line(&self) -> Option<&CandidateLine> {
        self.candidate_lines.first()
    }
}

/// A running analysis engine. One instance serves one worker at a time.
pub trait Engine: Send {
    /// Search `fen` to `depth`, reporting up to `candidate_count` lines.
    fn evaluate(
        &mut self,
        fen: &str,
        depth: u8,
        candidate_count: u8,
    ) -> impl Future<Output = Result<EvaluationResult, WorkerError>> + Send;

    /// Reset engine state between games.
    fn new_game(&mut self) -> impl Future<Output = Result<(), WorkerError>> + Send {
        async { Ok(()) }
    }

    /// Terminate the engine. Must not fail.
    fn quit(&mut self) -> impl Future<Output = ()> + Send;
}

/// Creates engine instances for the pool.
pub trait EngineFactory: Send + Sync + 'static {
    type Engine: Engine + 'static;

    fn spawn(&self) -> impl Future<Output = Result<Self::Engine, WorkerError>> + Send;
}

/// Engines owned by one chunk of work. Every engine handed out is tracked
/// here so that `shutdown` reaches all of them, including ones whose worker
/// task was aborted.
pub struct EnginePool<E> {
    engines: Vec<Arc<Mutex<E>>>,
}

impl<E: Engine + 'static> EnginePool<E> {
    /// Spawn up to `size` engines. Fails only if none could be started.
    pub async fn spawn<F>(factory: &F, size: usize) -> Result<Self, WorkerError>
    where
        F: EngineFactory<Engine = E>,
    {
        let mut engines = Vec::with_capacity(size);
        let mut last_error = None;

        for engine_id in 0..size {
            match factory.spawn().await {
                Ok(engine) => {
                    info!(engine_id, "Engine ready");
                    engines.push(Arc::new(Mutex::new(engine)));
                }
                Err(e) => {
                    warn!(engine_id, error = %e, "Failed to start engine");
                    last_error = Some(e);
                }
            }
        }

        if engines.is_empty() {
            return Err(last_error
                .unwrap_or_else(|| WorkerError::EngineUnavailable("empty engine pool".into())));
        }

        Ok(Self { engines })
    }

    pub fn engines(&self) -> &[Arc<Mutex<E>>] {
        &self.engines
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Quit every engine. Callers must make sure no worker still holds a lock.
    pub async fn shutdown(self) {
        for engine in self.engines {
            engine.lock().await.quit().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_mate_scores_rank_faster_mates_higher() {
        assert_eq!(Score::Mate(1).to_cp(), 9990);
        assert_eq!(Score::Mate(3).to_cp(), 9970);
        assert_eq!(Score::Mate(-2).to_cp(), -9980);
        assert_eq!(Score::Mate(0).to_cp(), -10000);
        assert_eq!(Score::Centipawns(-35).to_cp(), -35);
    }

    struct NullEngine {
        quits: Arc<AtomicUsize>,
    }

    impl Engine for NullEngine {
        async fn evaluate(
            &mut self,
            _fen: &str,
            depth: u8,
            _candidate_count: u8,
        ) -> Result<EvaluationResult, WorkerError> {
            Ok(EvaluationResult {
                score: Some(Score::Centipawns(0)),
                best_move: None,
                candidate_lines: vec![],
                search_depth: depth,
            })
        }

        async fn quit(&mut self) {
            self.quits.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FlakyFactory {
        spawned: AtomicUsize,
        fail_first: usize,
        quits: Arc<AtomicUsize>,
    }

    impl EngineFactory for FlakyFactory {
        type Engine = NullEngine;

        async fn spawn(&self) -> Result<NullEngine, WorkerError> {
            let n = self.spawned.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(WorkerError::EngineUnavailable("no binary".into()));
            }
            Ok(NullEngine {
                quits: self.quits.clone(),
            })
        }
    }

    fn factory(fail_first: usize) -> FlakyFactory {
        FlakyFactory {
            spawned: AtomicUsize::new(0),
            fail_first,
            quits: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[tokio::test]
    async fn test_pool_shutdown_quits_every_engine() {
        let factory = factory(0);
        let pool = EnginePool::spawn(&factory, 3).await.unwrap();
        assert_eq!(pool.len(), 3);
        pool.shutdown().await;
        assert_eq!(factory.quits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_pool_tolerates_partial_spawn_failure() {
        let factory = factory(1);
        let pool = EnginePool::spawn(&factory, 2).await.unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test]
    async fn test_pool_fails_when_no_engine_starts() {
        let factory = factory(usize::MAX);
        let err = EnginePool::spawn(&factory, 2).await.err().unwrap();
        assert!(matches!(err, WorkerError::EngineUnavailable(_)));
    }
}
