//! Persistence seams: where worklists come from and where annotations go.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chess_core::GameRecord;

use crate::annotation::MoveAnnotation;
use crate::error::WorkerError;

/// Sink for analysis results, keyed by game id.
pub trait FeatureStore: Send + Sync {
    /// Which of `candidates` are already marked analyzed
    fn analyzed_ids(
        &self,
        candidates: &[i64],
    ) -> impl Future<Output = Result<HashSet<i64>, WorkerError>> + Send;

    /// Replace any earlier annotations of the game with `annotations`
    fn save_annotations(
        &self,
        game_id: i64,
        annotations: &[MoveAnnotation],
    ) -> impl Future<Output = Result<(), WorkerError>> + Send;

    fn mark_analyzed(&self, game_id: i64) -> impl Future<Output = Result<(), WorkerError>> + Send;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorklistFilter {
    /// Only games from this source (e.g. a site or import batch)
    pub source: Option<String>,
    /// Also list games that are already marked analyzed
    pub include_analyzed: bool,
}

/// Paged listing of games to analyze, in ascending id order.
pub trait WorklistSource: Send + Sync {
    /// Up to `limit` games with id greater than `after_id`
    fn fetch_page(
        &self,
        filter: &WorklistFilter,
        after_id: Option<i64>,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<GameRecord>, WorkerError>> + Send;
}

#[derive(Debug, Clone)]
struct StoredGame {
    source: String,
    movetext: String,
}

#[derive(Debug, Default)]
struct MemoryState {
    games: BTreeMap<i64, StoredGame>,
    annotations: HashMap<i64, Vec<MoveAnnotation>>,
    analyzed: HashSet<i64>,
    saves: usize,
}

/// In-process store for dry runs and tests. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_game(&self, id: i64, source: &str, movetext: &str) {
        if let Ok(mut state) = self.state.lock() {
            state.games.insert(
                id,
                StoredGame {
                    source: source.to_string(),
                    movetext: movetext.to_string(),
                },
            );
        }
    }

    pub fn annotations(&self, game_id: i64) -> Option<Vec<MoveAnnotation>> {
        self.state.lock().ok()?.annotations.get(&game_id).cloned()
    }

    pub fn is_analyzed(&self, game_id: i64) -> bool {
        self.state
            .lock()
            .map(|s| s.analyzed.contains(&game_id))
            .unwrap_or(false)
    }

    pub fn analyzed_count(&self) -> usize {
        self.state.lock().map(|s| s.analyzed.len()).unwrap_or(0)
    }

    /// Number of `save_annotations` calls so far
    pub fn save_count(&self) -> usize {
        self.state.lock().map(|s| s.saves).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, WorkerError> {
        self.state
            .lock()
            .map_err(|_| WorkerError::StoreWriteFailure("memory store lock poisoned".into()))
    }
}

impl FeatureStore for MemoryStore {
    async fn analyzed_ids(&self, candidates: &[i64]) -> Result<HashSet<i64>, WorkerError> {
        let state = self.lock()?;
        Ok(candidates
            .iter()
            .copied()
            .filter(|id| state.analyzed.contains(id))
            .collect())
    }

    async fn save_annotations(
        &self,
        game_id: i64,
        annotations: &[MoveAnnotation],
    ) -> Result<(), WorkerError> {
        let mut state = self.lock()?;
        state.saves += 1;
        state.annotations.insert(game_id, annotations.to_vec());
        Ok(())
    }

    async fn mark_analyzed(&self, game_id: i64) -> Result<(), WorkerError> {
        self.lock()?.analyzed.insert(game_id);
        Ok(())
    }
}

impl WorklistSource for MemoryStore {
    async fn fetch_page(
        &self,
        filter: &WorklistFilter,
        after_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<GameRecord>, WorkerError> {
        let state = self.lock()?;
        let start = after_id.map_or(i64::MIN, |id| id.saturating_add(1));
        Ok(state
            .games
            .range(start..)
            .filter(|(id, game)| {
                filter.source.as_ref().map_or(true, |s| *s == game.source)
                    && (filter.include_analyzed || !state.analyzed.contains(id))
            })
            .take(limit)
            .map(|(id, game)| GameRecord::new(*id, game.movetext.clone()))
            .collect())
    }
}
