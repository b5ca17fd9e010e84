pub use chess;

pub mod analysis;
pub mod analyzer;
pub mod annotation;
pub mod board_utils;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod eval_cache;
pub mod orchestrator;
pub mod policy;
pub mod stockfish;
pub mod store;
pub mod tactics;
