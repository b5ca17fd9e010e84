//! Worker error types

use std::time::Duration;

use chess_core::MovetextError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    Config(&'static str),

    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Engine gave no answer within {0:?}")]
    EngineTimeout(Duration),

    #[error("Invalid game data: {0}")]
    InvalidGameData(#[from] MovetextError),

    #[error("Classification anomaly: {0}")]
    ClassificationAnomaly(&'static str),

    #[error("Store write failure: {0}")]
    StoreWriteFailure(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl WorkerError {
    /// The engine process is stuck or gone; the worker should get a new one.
    pub fn is_engine_failure(&self) -> bool {
        matches!(
            self,
            WorkerError::EngineUnavailable(_) | WorkerError::EngineTimeout(_)
        )
    }
}
