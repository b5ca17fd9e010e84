//! Batch orchestration: filters the worklist, splits it into chunks, runs
//! each chunk on a fresh engine pool, and persists every game's outcome.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chess_core::GameRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::analyzer::{analyze_game, WalkOutcome};
use crate::annotation::{AnalysisStatus, GameAnalysisRecord, MoveAnnotation};
use crate::config::AnalysisConfig;
use crate::engine::{Engine, EngineFactory, EnginePool};
use crate::error::WorkerError;
use crate::store::{FeatureStore, WorklistFilter, WorklistSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    pub max_workers: usize,
    pub chunk_size: usize,
    /// Stop after this many games have been pulled from the worklist source
    pub max_games: Option<usize>,
    /// Ignore the analyzed markers and analyze everything again
    pub force_reprocess: bool,
    /// Mark failed games analyzed so they are not retried forever
    pub mark_on_failure: bool,
    /// How long in-flight games may run after cancellation
    pub grace_period: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_workers: 2,
            chunk_size: 50,
            max_games: None,
            force_reprocess: false,
            mark_on_failure: true,
            grace_period: Duration::from_secs(10),
        }
    }
}

/// Run totals. `processed + failed` is the number of games attempted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub processed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub annotations: u64,
    pub anomalies: u64,
    pub interrupted: bool,
}

impl Summary {
    pub fn attempted(&self) -> u64 {
        self.processed + self.failed
    }

    /// Percentage of attempted games that were fully analyzed
    pub fn success_rate(&self) -> f64 {
        if self.attempted() == 0 {
            return 100.0;
        }
        100.0 * self.processed as f64 / self.attempted() as f64
    }

    fn record(&mut self, record: &GameAnalysisRecord) {
        match record.status {
            AnalysisStatus::Analyzed => self.processed += 1,
            AnalysisStatus::FailedButMarked | AnalysisStatus::Pending => self.failed += 1,
        }
        self.annotations += record.annotation_count() as u64;
    }

    fn merge(&mut self, other: &Summary) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.annotations += other.annotations;
        self.anomalies += other.anomalies;
        self.interrupted |= other.interrupted;
    }
}

/// One finished game handed from a worker back to the orchestrator
struct GameOutcome {
    game_id: i64,
    walk: WalkOutcome,
}

type WorkQueue = Arc<StdMutex<VecDeque<GameRecord>>>;

pub struct BatchOrchestrator<S, F> {
    store: S,
    factory: Arc<F>,
    analysis: Arc<AnalysisConfig>,
    options: BatchOptions,
    shutdown: watch::Receiver<bool>,
}

impl<S, F> BatchOrchestrator<S, F>
where
    S: FeatureStore,
    F: EngineFactory,
{
    /// `shutdown` flips to `true` when the run should stop.
    pub fn new(
        store: S,
        factory: F,
        analysis: AnalysisConfig,
        options: BatchOptions,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            factory: Arc::new(factory),
            analysis: Arc::new(analysis),
            options,
            shutdown,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Analyze an explicit worklist.
    pub async fn run(&self, worklist: Vec<GameRecord>) -> Result<Summary, WorkerError> {
        let mut summary = Summary::default();
        let pending = self.drop_analyzed(worklist, &mut summary).await?;
        let chunk_size = self.options.chunk_size.max(1);

        info!(
            pending = pending.len(),
            skipped = summary.skipped,
            chunk_size,
            "Starting batch"
        );

        for (chunk_index, chunk) in pending.chunks(chunk_size).enumerate() {
            if self.is_cancelled() {
                summary.interrupted = true;
                break;
            }
            if self.process_chunk(chunk_index, chunk.to_vec(), &mut summary).await? {
                summary.interrupted = true;
                break;
            }
        }

        info!(
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            annotations = summary.annotations,
            interrupted = summary.interrupted,
            "Batch finished"
        );
        Ok(summary)
    }

    /// Page through `source` and analyze each page as it arrives.
    pub async fn run_from_source<W: WorklistSource>(
        &self,
        source: &W,
        filter: &WorklistFilter,
    ) -> Result<Summary, WorkerError> {
        let mut summary = Summary::default();
        let mut after_id = None;
        let mut fetched = 0usize;
        let page_size = self.options.chunk_size.max(1);

        loop {
            if self.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            let limit = match self.options.max_games {
                Some(max) => page_size.min(max.saturating_sub(fetched)),
                None => page_size,
            };
            if limit == 0 {
                break;
            }

            let page = source.fetch_page(filter, after_id, limit).await?;
            if page.is_empty() {
                break;
            }
            fetched += page.len();
            after_id = page.last().map(|g| g.id);

            let page_summary = self.run(page).await?;
            summary.merge(&page_summary);
            if page_summary.interrupted {
                break;
            }
        }

        Ok(summary)
    }

    /// Remove games that are already analyzed, counting them as skipped.
    async fn drop_analyzed(
        &self,
        games: Vec<GameRecord>,
        summary: &mut Summary,
    ) -> Result<Vec<GameRecord>, WorkerError> {
        if self.options.force_reprocess || games.is_empty() {
            return Ok(games);
        }

        let ids: Vec<i64> = games.iter().map(|g| g.id).collect();
        let analyzed: HashSet<i64> = self.store.analyzed_ids(&ids).await?;
        let before = games.len();
        let pending: Vec<GameRecord> = games
            .into_iter()
            .filter(|g| !analyzed.contains(&g.id))
            .collect();
        summary.skipped += (before - pending.len()) as u64;
        Ok(pending)
    }

    /// Run one chunk on its own engine pool. Returns whether the chunk was
    /// cut short by cancellation.
    async fn process_chunk(
        &self,
        chunk_index: usize,
        games: Vec<GameRecord>,
        summary: &mut Summary,
    ) -> Result<bool, WorkerError> {
        // Another run may have finished some of these since the worklist was read
        let games = self.drop_analyzed(games, summary).await?;
        if games.is_empty() {
            return Ok(false);
        }

        let workers = self.options.max_workers.max(1).min(games.len());
        info!(chunk_index, games = games.len(), workers, "Processing chunk");

        let pool = EnginePool::spawn(&*self.factory, workers).await?;
        let queue: WorkQueue = Arc::new(StdMutex::new(VecDeque::from(games)));
        let (results_tx, mut results) = mpsc::channel::<GameOutcome>(pool.len());

        let mut tasks = JoinSet::new();
        for (worker_id, engine) in pool.engines().iter().enumerate() {
            tasks.spawn(worker_loop(
                worker_id,
                engine.clone(),
                self.factory.clone(),
                queue.clone(),
                self.analysis.clone(),
                results_tx.clone(),
                self.shutdown.clone(),
            ));
        }
        drop(results_tx);

        let mut shutdown = self.shutdown.clone();
        let mut interrupted = false;
        loop {
            tokio::select! {
                outcome = results.recv() => match outcome {
                    Some(outcome) => self.record_outcome(outcome, summary).await,
                    None => break,
                },
                _ = cancelled(&mut shutdown) => {
                    interrupted = true;
                    break;
                }
            }
        }

        if interrupted {
            info!(
                grace_secs = self.options.grace_period.as_secs_f64(),
                "Cancellation requested, draining in-flight games"
            );
            let drain = async {
                while let Some(outcome) = results.recv().await {
                    self.record_outcome(outcome, summary).await;
                }
            };
            if tokio::time::timeout(self.options.grace_period, drain)
                .await
                .is_err()
            {
                warn!("Grace period elapsed, abandoning in-flight games");
                tasks.abort_all();
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    error!(error = %e, "Worker task panicked");
                }
            }
        }

        pool.shutdown().await;
        info!(chunk_index, "Chunk finished, engines shut down");
        Ok(interrupted)
    }

    /// Persist one game's result and fold it into the summary.
    async fn record_outcome(&self, outcome: GameOutcome, summary: &mut Summary) {
        let GameOutcome { game_id, walk } = outcome;
        summary.anomalies += walk.anomalies as u64;

        let record = match walk.error {
            None => self.persist_success(game_id, walk.annotations).await,
            Some(e) => {
                error!(
                    game_id,
                    error = %e,
                    partial = walk.annotations.len(),
                    "Game analysis failed"
                );
                self.persist_failure(game_id, walk.annotations).await
            }
        };

        summary.record(&record);
    }

    async fn persist_success(
        &self,
        game_id: i64,
        annotations: Vec<MoveAnnotation>,
    ) -> GameAnalysisRecord {
        let stored = match self.store.save_annotations(game_id, &annotations).await {
            Ok(()) => self.store.mark_analyzed(game_id).await,
            Err(e) => Err(e),
        };

        match stored {
            Ok(()) => {
                info!(game_id, annotations = annotations.len(), "Game analyzed");
                GameAnalysisRecord {
                    game_id,
                    status: AnalysisStatus::Analyzed,
                    annotations: Some(annotations),
                }
            }
            Err(e) => {
                error!(game_id, error = %e, "Failed to store annotations");
                let status = self.mark_failed(game_id).await;
                GameAnalysisRecord {
                    game_id,
                    status,
                    annotations: None,
                }
            }
        }
    }

    async fn persist_failure(
        &self,
        game_id: i64,
        annotations: Vec<MoveAnnotation>,
    ) -> GameAnalysisRecord {
        let mut saved = None;
        if !annotations.is_empty() {
            match self.store.save_annotations(game_id, &annotations).await {
                Ok(()) => saved = Some(annotations),
                Err(e) => error!(game_id, error = %e, "Failed to store partial annotations"),
            }
        }

        let status = self.mark_failed(game_id).await;
        GameAnalysisRecord {
            game_id,
            status,
            annotations: saved,
        }
    }

    /// Single best-effort mark for a failed game, if configured.
    async fn mark_failed(&self, game_id: i64) -> AnalysisStatus {
        if !self.options.mark_on_failure {
            return AnalysisStatus::Pending;
        }
        match self.store.mark_analyzed(game_id).await {
            Ok(()) => AnalysisStatus::FailedButMarked,
            Err(e) => {
                error!(game_id, error = %e, "Failed to mark game analyzed");
                AnalysisStatus::Pending
            }
        }
    }
}

/// Resolves once the shutdown flag is set. Never resolves if the sender is gone.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Pull games off the shared queue until it is empty or the run is cancelled.
/// The worker holds its engine for its whole lifetime.
async fn worker_loop<F: EngineFactory>(
    worker_id: usize,
    engine: Arc<Mutex<F::Engine>>,
    factory: Arc<F>,
    queue: WorkQueue,
    analysis: Arc<AnalysisConfig>,
    results: mpsc::Sender<GameOutcome>,
    shutdown: watch::Receiver<bool>,
) {
    let mut engine = engine.lock().await;

    loop {
        if *shutdown.borrow() {
            break;
        }
        let Some(game) = queue.lock().ok().and_then(|mut q| q.pop_front()) else {
            break;
        };

        let walk = analyze_game(&mut *engine, &analysis, &game).await;
        let engine_failed = walk
            .error
            .as_ref()
            .is_some_and(WorkerError::is_engine_failure);

        if results
            .send(GameOutcome {
                game_id: game.id,
                walk,
            })
            .await
            .is_err()
        {
            break;
        }

        if engine_failed {
            warn!(worker_id, "Replacing failed engine");
            engine.quit().await;
            match factory.spawn().await {
                Ok(fresh) => *engine = fresh,
                Err(e) => {
                    error!(worker_id, error = %e, "Could not replace engine, worker stopping");
                    break;
                }
            }
        }
    }
}
