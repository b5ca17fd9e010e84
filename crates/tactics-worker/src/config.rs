//! Worker configuration from environment variables

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::analysis::ClassifierThresholds;
use crate::error::WorkerError;
use crate::orchestrator::BatchOptions;
use crate::policy::PolicyConfig;
use crate::stockfish::EngineOptions;
use crate::store::WorklistFilter;

/// Everything the per-game walk depends on
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub policy: PolicyConfig,
    pub thresholds: ClassifierThresholds,
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// Postgres connection URL
    pub database_url: String,

    /// Stockfish binary and per-process settings
    pub engine: EngineOptions,

    /// Worker pool, chunking and failure handling
    pub batch: BatchOptions,

    pub analysis: AnalysisConfig,

    /// Only analyze games from this source
    pub source_filter: Option<String>,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, WorkerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load from any key lookup; `load` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url =
            lookup("DATABASE_URL").ok_or(WorkerError::Config("DATABASE_URL not set"))?;

        let engine_defaults = EngineOptions::default();
        let engine = EngineOptions {
            path: lookup("STOCKFISH_PATH").unwrap_or(engine_defaults.path),
            threads: parse_or(&lookup, "ENGINE_THREADS", engine_defaults.threads),
            hash_mb: parse_or(&lookup, "ENGINE_HASH_MB", engine_defaults.hash_mb),
            timeout: Duration::from_secs(parse_or(
                &lookup,
                "ENGINE_TIMEOUT_SECS",
                engine_defaults.timeout.as_secs(),
            )),
        };

        let batch_defaults = BatchOptions::default();
        let mut max_workers = parse_or(&lookup, "MAX_WORKERS", batch_defaults.max_workers);
        if max_workers == 0 {
            return Err(WorkerError::Config("MAX_WORKERS must be at least 1"));
        }
        let cores = num_cpus::get();
        if max_workers > cores {
            warn!(max_workers, cores, "More workers than cores, clamping");
            max_workers = cores;
        }

        let chunk_size = parse_or(&lookup, "CHUNK_SIZE", batch_defaults.chunk_size);
        if chunk_size == 0 {
            return Err(WorkerError::Config("CHUNK_SIZE must be at least 1"));
        }

        let batch = BatchOptions {
            max_workers,
            chunk_size,
            max_games: lookup("MAX_GAMES").and_then(|v| v.parse().ok()),
            force_reprocess: flag_or(&lookup, "FORCE_REPROCESS", batch_defaults.force_reprocess),
            mark_on_failure: flag_or(&lookup, "MARK_ON_FAILURE", batch_defaults.mark_on_failure),
            grace_period: Duration::from_secs(parse_or(
                &lookup,
                "GRACE_PERIOD_SECS",
                batch_defaults.grace_period.as_secs(),
            )),
        };

        let p = PolicyConfig::default();
        let policy = PolicyConfig {
            opening_move_threshold: parse_or(&lookup, "OPENING_MOVE_THRESHOLD", p.opening_move_threshold),
            min_branching_for_analysis: parse_or(&lookup, "MIN_BRANCHING", p.min_branching_for_analysis),
            shallow_depth: parse_or(&lookup, "SHALLOW_DEPTH", p.shallow_depth),
            opening_depth: parse_or(&lookup, "OPENING_DEPTH", p.opening_depth),
            middlegame_depth: parse_or(&lookup, "MIDDLEGAME_DEPTH", p.middlegame_depth),
            endgame_depth: parse_or(&lookup, "ENDGAME_DEPTH", p.endgame_depth),
            ..p
        };

        let t = ClassifierThresholds::default();
        let thresholds = ClassifierThresholds {
            missed_best_gap: parse_or(&lookup, "MISSED_BEST_GAP", t.missed_best_gap),
            ..t
        };

        Ok(Self {
            database_url,
            engine,
            batch,
            analysis: AnalysisConfig { policy, thresholds },
            source_filter: lookup("SOURCE_FILTER").filter(|s| !s.is_empty()),
        })
    }

    pub fn worklist_filter(&self) -> WorklistFilter {
        WorklistFilter {
            source: self.source_filter.clone(),
            include_analyzed: self.batch.force_reprocess,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn flag_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("1" | "true" | "yes") => true,
        Some("0" | "false" | "no") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, WorkerError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_database_url_required() {
        let err = load(&[]).err().unwrap();
        assert!(matches!(err, WorkerError::Config(_)));
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/games")]).unwrap();
        assert_eq!(config.engine.path, "/usr/local/bin/stockfish");
        assert_eq!(config.engine.timeout, Duration::from_secs(30));
        assert_eq!(config.batch.chunk_size, 50);
        assert!(config.batch.mark_on_failure);
        assert!(!config.batch.force_reprocess);
        assert_eq!(config.analysis, AnalysisConfig::default());
        assert!(config.source_filter.is_none());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/games"),
            ("CHUNK_SIZE", "10"),
            ("MIDDLEGAME_DEPTH", "18"),
            ("ENDGAME_DEPTH", "deep"),
            ("FORCE_REPROCESS", "yes"),
            ("MARK_ON_FAILURE", "0"),
            ("SOURCE_FILTER", "lichess"),
            ("MAX_WORKERS", "1"),
        ])
        .unwrap();
        assert_eq!(config.batch.chunk_size, 10);
        assert_eq!(config.analysis.policy.middlegame_depth, 18);
        assert_eq!(config.analysis.policy.endgame_depth, 16);
        assert_eq!(config.batch.max_workers, 1);
        assert!(!config.batch.mark_on_failure);

        let filter = config.worklist_filter();
        assert_eq!(filter.source.as_deref(), Some("lichess"));
        assert!(filter.include_analyzed);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let err = load(&[("DATABASE_URL", "postgres://x"), ("CHUNK_SIZE", "0")])
            .err()
            .unwrap();
        assert!(matches!(err, WorkerError::Config(_)));
    }

    #[test]
    fn test_workers_clamped_to_cores() {
        let config = load(&[("DATABASE_URL", "postgres://x"), ("MAX_WORKERS", "100000")]).unwrap();
        assert!(config.batch.max_workers <= num_cpus::get());
    }
}
