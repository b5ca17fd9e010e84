//! Postgres adapter for the worklist and the annotation store

use std::collections::HashSet;
use std::time::Duration;

use chess_core::GameRecord;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::annotation::MoveAnnotation;
use crate::error::WorkerError;
use crate::store::{FeatureStore, WorklistFilter, WorklistSource};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with a pool sized for the given worker count
    pub async fn connect(database_url: &str, workers: usize) -> Result<Self, WorkerError> {
        let pool_size = (workers + 2) as u32; // headroom for the orchestrator's writes
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .connect(database_url)
            .await?;
        info!(pool_size, "Database connection pool established");
        Ok(Self { pool })
    }

    /// Create the tables the worker reads and writes if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), WorkerError> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Fetch specific games by id, in id order
    pub async fn fetch_games(&self, ids: &[i64]) -> Result<Vec<GameRecord>, WorkerError> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, movetext FROM games WHERE id = ANY($1) ORDER BY id")
                .bind(ids)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, movetext)| GameRecord::new(id, movetext))
            .collect())
    }
}

fn write_failure(e: sqlx::Error) -> WorkerError {
    WorkerError::StoreWriteFailure(e.to_string())
}

impl FeatureStore for PgStore {
    async fn analyzed_ids(&self, candidates: &[i64]) -> Result<HashSet<i64>, WorkerError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM games WHERE id = ANY($1) AND analyzed_at IS NOT NULL")
                .bind(candidates)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn save_annotations(
        &self,
        game_id: i64,
        annotations: &[MoveAnnotation],
    ) -> Result<(), WorkerError> {
        let mut tx = self.pool.begin().await.map_err(write_failure)?;

        // Delete old annotations
        sqlx::query("DELETE FROM move_annotations WHERE game_id = $1")
            .bind(game_id)
            .execute(&mut *tx)
            .await
            .map_err(write_failure)?;

        for annotation in annotations {
            sqlx::query(
                r#"INSERT INTO move_annotations (
                    game_id, move_index, side_to_move, position_before_fen,
                    move_played, move_san, tactical_tag, error_label,
                    score_delta, search_depth
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"#,
            )
            .bind(game_id)
            .bind(annotation.move_index as i32)
            .bind(annotation.side_to_move.as_str())
            .bind(&annotation.position_before_fen)
            .bind(&annotation.move_played)
            .bind(annotation.move_san.as_deref())
            .bind(annotation.tactical_tag.map(|t| t.as_str()))
            .bind(annotation.error_label.as_str())
            .bind(annotation.score_delta)
            .bind(annotation.search_depth as i16)
            .execute(&mut *tx)
            .await
            .map_err(write_failure)?;
        }

        tx.commit().await.map_err(write_failure)?;
        Ok(())
    }

    async fn mark_analyzed(&self, game_id: i64) -> Result<(), WorkerError> {
        sqlx::query("UPDATE games SET analyzed_at = NOW() WHERE id = $1")
            .bind(game_id)
            .execute(&self.pool)
            .await
            .map_err(write_failure)?;
        Ok(())
    }
}

impl WorklistSource for PgStore {
    async fn fetch_page(
        &self,
        filter: &WorklistFilter,
        after_id: Option<i64>,
        limit: usize,
    ) -> Result<Vec<GameRecord>, WorkerError> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"SELECT id, movetext FROM games
            WHERE ($1::TEXT IS NULL OR source = $1)
              AND ($2 OR analyzed_at IS NULL)
              AND id > $3
            ORDER BY id
            LIMIT $4"#,
        )
        .bind(filter.source.as_deref())
        .bind(filter.include_analyzed)
        .bind(after_id.unwrap_or(i64::MIN))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, movetext)| GameRecord::new(id, movetext))
            .collect())
    }
}

const SCHEMA_SQL: &str = r#"
-- Games to analyze (normally filled by the import pipeline)
CREATE TABLE IF NOT EXISTS games (
    id          BIGSERIAL PRIMARY KEY,
    source      TEXT NOT NULL,
    movetext    TEXT NOT NULL,
    analyzed_at TIMESTAMPTZ,
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_games_source ON games (source);
CREATE INDEX IF NOT EXISTS idx_games_pending
    ON games (id) WHERE analyzed_at IS NULL;

-- One row per noteworthy move
CREATE TABLE IF NOT EXISTS move_annotations (
    game_id             BIGINT NOT NULL REFERENCES games(id) ON DELETE CASCADE,
    move_index          INTEGER NOT NULL,
    side_to_move        TEXT NOT NULL,
    position_before_fen TEXT NOT NULL,
    move_played         TEXT NOT NULL,
    move_san            TEXT,
    tactical_tag        TEXT,
    error_label         TEXT NOT NULL,
    score_delta         INTEGER NOT NULL,
    search_depth        SMALLINT NOT NULL,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (game_id, move_index)
);

CREATE INDEX IF NOT EXISTS idx_move_annotations_tag
    ON move_annotations (tactical_tag) WHERE tactical_tag IS NOT NULL;
"#;
