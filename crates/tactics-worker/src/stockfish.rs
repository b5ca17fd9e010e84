//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, warn};

use crate::engine::{CandidateLine, Engine, EngineFactory, EvaluationResult, Score};
use crate::error::WorkerError;

const QUIT_WAIT: Duration = Duration::from_secs(2);

/// How to launch and configure a Stockfish process
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub path: String,
    pub threads: u32,
    pub hash_mb: u32,
    /// Upper bound for any single engine exchange (handshake or search)
    pub timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            path: "/usr/local/bin/stockfish".to_string(),
            threads: 1,
            hash_mb: 256,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    timeout: Duration,
    multipv: u8,
    /// Set after a timed-out search; stale output must be drained first
    needs_sync: bool,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process and initialize UCI
    pub async fn new(options: &EngineOptions) -> Result<Self, WorkerError> {
        let mut process = Command::new(&options.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                WorkerError::EngineUnavailable(format!(
                    "Failed to spawn {}: {e}",
                    options.path
                ))
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| WorkerError::EngineUnavailable("stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| WorkerError::EngineUnavailable("stdout not captured".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout: BufReader::new(stdout),
            timeout: options.timeout,
            multipv: 1,
            needs_sync: false,
        };

        let deadline = Instant::now() + options.timeout;
        engine.send("uci").await?;
        engine.wait_for("uciok", deadline).await?;

        engine
            .send(&format!("setoption name Threads value {}", options.threads))
            .await?;
        engine
            .send(&format!("setoption name Hash value {}", options.hash_mb))
            .await?;
        engine.send("setoption name UCI_AnalyseMode value true").await?;
        engine.send("isready").await?;
        engine.wait_for("readyok", deadline).await?;

        Ok(engine)
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), WorkerError> {
        debug!(cmd, "SF <");
        self.stdin
            .write_all(format!("{cmd}\n").as_bytes())
            .await
            .map_err(|e| WorkerError::EngineUnavailable(format!("Failed to write to Stockfish: {e}")))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| WorkerError::EngineUnavailable(format!("Failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Read one line, failing once `deadline` has passed
    async fn read_line(&mut self, deadline: Instant) -> Result<String, WorkerError> {
        let mut line = String::new();
        let read = timeout_at(deadline, self.stdout.read_line(&mut line))
            .await
            .map_err(|_| WorkerError::EngineTimeout(self.timeout))?
            .map_err(|e| WorkerError::EngineUnavailable(format!("Failed to read from Stockfish: {e}")))?;
        if read == 0 {
            return Err(WorkerError::EngineUnavailable(
                "Stockfish closed its output".into(),
            ));
        }
        let trimmed = line.trim().to_string();
        debug!(line = trimmed.as_str(), "SF >");
        Ok(trimmed)
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str, deadline: Instant) -> Result<(), WorkerError> {
        loop {
            if self.read_line(deadline).await? == expected {
                return Ok(());
            }
        }
    }

    async fn sync(&mut self, deadline: Instant) -> Result<(), WorkerError> {
        self.send("isready").await?;
        self.wait_for("readyok", deadline).await
    }

    async fn search(
        &mut self,
        fen: &str,
        depth: u8,
        candidate_count: u8,
        deadline: Instant,
    ) -> Result<EvaluationResult, WorkerError> {
        if self.needs_sync {
            self.sync(deadline).await?;
            self.needs_sync = false;
        }

        let multipv = candidate_count.max(1);
        if multipv != self.multipv {
            self.send(&format!("setoption name MultiPV value {multipv}"))
                .await?;
            self.multipv = multipv;
        }

        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go depth {depth}")).await?;

        let mut search = SearchState::new(multipv);
        loop {
            let line = self.read_line(deadline).await?;
            if let Some(rest) = line.strip_prefix("bestmove") {
                let best = rest.split_whitespace().next();
                return Ok(search.finish(best));
            }
            if let Some(info) = parse_info(&line) {
                search.update(info);
            }
        }
    }
}

impl Engine for StockfishEngine {
    async fn evaluate(
        &mut self,
        fen: &str,
        depth: u8,
        candidate_count: u8,
    ) -> Result<EvaluationResult, WorkerError> {
        let deadline = Instant::now() + self.timeout;
        let result = self.search(fen, depth, candidate_count, deadline).await;
        if let Err(WorkerError::EngineTimeout(_)) = &result {
            warn!(fen, depth, "Search timed out, stopping engine");
            let _ = self.send("stop").await;
            self.needs_sync = true;
        }
        result
    }

    async fn new_game(&mut self) -> Result<(), WorkerError> {
        let deadline = Instant::now() + self.timeout;
        self.send("ucinewgame").await?;
        self.needs_sync = false;
        self.sync(deadline).await
    }

    /// Send quit command and wait for process to exit
    async fn quit(&mut self) {
        let _ = self.send("quit").await;
        if timeout(QUIT_WAIT, self.process.wait()).await.is_err() {
            warn!("Stockfish ignored quit, killing it");
            let _ = self.process.start_kill();
            let _ = self.process.wait().await;
        }
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Spawns configured Stockfish processes for the engine pool
#[derive(Debug, Clone)]
pub struct StockfishFactory {
    options: EngineOptions,
}

impl StockfishFactory {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }
}

impl EngineFactory for StockfishFactory {
    type Engine = StockfishEngine;

    async fn spawn(&self) -> Result<StockfishEngine, WorkerError> {
        StockfishEngine::new(&self.options).await
    }
}

/// The parts of a UCI `info` line we care about
#[derive(Debug, Clone, PartialEq, Eq)]
struct InfoLine {
    multipv: u8,
    depth: u8,
    score: Score,
    first_move: Option<String>,
}

/// Parse an `info` line carrying an exact score. Bound scores and
/// `info string` chatter are ignored.
fn parse_info(line: &str) -> Option<InfoLine> {
    let mut tokens = line.split_whitespace();
    if tokens.next()? != "info" {
        return None;
    }

    let mut multipv = 1;
    let mut depth = 0;
    let mut score = None;
    let mut first_move = None;

    while let Some(token) = tokens.next() {
        match token {
            "string" => return None,
            "depth" => depth = tokens.next()?.parse().ok()?,
            "multipv" => multipv = tokens.next()?.parse().ok()?,
            "score" => {
                let kind = tokens.next()?;
                let value: i32 = tokens.next()?.parse().ok()?;
                score = Some(match kind {
                    "cp" => Score::Centipawns(value),
                    "mate" => Score::Mate(value),
                    _ => return None,
                });
            }
            "lowerbound" | "upperbound" => return None,
            "pv" => {
                first_move = tokens.next().map(str::to_string);
                break;
            }
            _ => {}
        }
    }

    Some(InfoLine {
        multipv,
        depth,
        score: score?,
        first_move,
    })
}

#[derive(Debug, Clone, Default)]
struct LineState {
    depth: u8,
    score: Option<Score>,
    first_move: Option<String>,
}

/// Latest info per multi-PV slot during one search
struct SearchState {
    lines: Vec<LineState>,
}

impl SearchState {
    fn new(multipv: u8) -> Self {
        Self {
            lines: vec![LineState::default(); multipv as usize],
        }
    }

    fn update(&mut self, info: InfoLine) {
        let Some(slot) = (info.multipv as usize)
            .checked_sub(1)
            .and_then(|idx| self.lines.get_mut(idx))
        else {
            return;
        };
        slot.depth = info.depth;
        slot.score = Some(info.score);
        if info.first_move.is_some() {
            slot.first_move = info.first_move;
        }
    }

    fn finish(self, best: Option<&str>) -> EvaluationResult {
        let score = self.lines.first().and_then(|l| l.score);
        let search_depth = self.lines.first().map_or(0, |l| l.depth);
        let candidate_lines = self
            .lines
            .into_iter()
            .enumerate()
            .filter_map(|(idx, line)| {
                Some(CandidateLine {
                    rank: idx as u8 + 1,
                    uci_move: line.first_move?,
                    score: line.score,
                })
            })
            .collect();

        EvaluationResult {
            score,
            best_move: best.filter(|m| *m != "(none)").map(str::to_string),
            candidate_lines,
            search_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_cp_with_pv() {
        let info = parse_info(
            "info depth 14 seldepth 20 multipv 2 score cp -37 nodes 1000 nps 50000 pv e7e5 g1f3",
        )
        .unwrap();
        assert_eq!(info.multipv, 2);
        assert_eq!(info.depth, 14);
        assert_eq!(info.score, Score::Centipawns(-37));
        assert_eq!(info.first_move.as_deref(), Some("e7e5"));
    }

    #[test]
    fn test_parse_info_mate_without_pv() {
        let info = parse_info("info depth 0 score mate 0").unwrap();
        assert_eq!(info.multipv, 1);
        assert_eq!(info.score, Score::Mate(0));
        assert!(info.first_move.is_none());
    }

    #[test]
    fn test_parse_info_ignores_bounds_and_strings() {
        assert!(parse_info("info depth 10 score cp 20 lowerbound nodes 5 pv e2e4").is_none());
        assert!(parse_info("info string NNUE evaluation using nn.nnue").is_none());
        assert!(parse_info("info depth 5 currmove e2e4 currmovenumber 1").is_none());
    }

    #[test]
    fn test_search_state_keeps_latest_line_per_rank() {
        let mut search = SearchState::new(2);
        for line in [
            "info depth 1 multipv 1 score cp 10 pv d2d4",
            "info depth 1 multipv 2 score cp 5 pv e2e4",
            "info depth 2 multipv 1 score cp 25 pv e2e4 e7e5",
            "info depth 2 multipv 2 score cp 12 pv d2d4 d7d5",
            "info depth 2 multipv 3 score cp 0 pv a2a3",
        ] {
            search.update(parse_info(line).unwrap());
        }

        let result = search.finish(Some("e2e4"));
        assert_eq!(result.score, Some(Score::Centipawns(25)));
        assert_eq!(result.search_depth, 2);
        assert_eq!(result.best_move.as_deref(), Some("e2e4"));
        assert_eq!(result.candidate_lines.len(), 2);
        assert_eq!(result.candidate_lines[1].uci_move, "d2d4");
        assert_eq!(result.candidate_lines[1].rank, 2);
    }

    #[test]
    fn test_finish_in_terminal_position() {
        let mut search = SearchState::new(1);
        search.update(parse_info("info depth 0 score mate 0").unwrap());
        let result = search.finish(Some("(none)"));
        assert_eq!(result.score, Some(Score::Mate(0)));
        assert!(result.best_move.is_none());
        assert!(result.candidate_lines.is_empty());
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let options = EngineOptions {
            path: "/nonexistent/stockfish".to_string(),
            ..EngineOptions::default()
        };
        let err = StockfishEngine::new(&options).await.err().unwrap();
        assert!(matches!(err, WorkerError::EngineUnavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_silent_process_times_out_handshake() {
        // `cat` echoes our commands but never says uciok
        let options = EngineOptions {
            path: "cat".to_string(),
            timeout: Duration::from_millis(200),
            ..EngineOptions::default()
        };
        let err = StockfishEngine::new(&options).await.err().unwrap();
        assert!(matches!(err, WorkerError::EngineTimeout(_)));
    }
}
