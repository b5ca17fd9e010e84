//! Per-game memo of engine evaluations.
//!
//! Transpositions and repeated requests within one game reuse the first
//! result instead of searching again.

use std::collections::HashMap;
use std::future::Future;

use crate::engine::EvaluationResult;
use crate::error::WorkerError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    position: String,
    depth: u8,
    candidate_count: u8,
}

#[derive(Debug, Default)]
pub struct EvalCache {
    entries: HashMap<CacheKey, EvaluationResult>,
    hits: u64,
    misses: u64,
}

impl EvalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached result for this request, or run `compute` and keep
    /// its result. Failed computations are not cached.
    pub async fn get_or_compute<F, Fut>(
        &mut self,
        fen: &str,
        depth: u8,
        candidate_count: u8,
        compute: F,
    ) -> Result<EvaluationResult, WorkerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<EvaluationResult, WorkerError>>,
    {
        let key = CacheKey {
            position: normalize_fen(fen),
            depth,
            candidate_count,
        };

        if let Some(hit) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(hit.clone());
        }

        self.misses += 1;
        let result = compute().await?;
        self.entries.insert(key, result.clone());
        Ok(result)
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Number of times `compute` actually ran
    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Strips move counters from FEN, keeping only position + side + castling + ep.
pub fn normalize_fen(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}
