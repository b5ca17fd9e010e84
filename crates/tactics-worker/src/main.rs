//! Tactical Analysis Worker
//!
//! Walks unanalyzed games with a pool of native Stockfish processes, tags
//! tactical moves and mistakes, and stores the annotations in Postgres.

use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use tactics_worker::config::WorkerConfig;
use tactics_worker::db::PgStore;
use tactics_worker::orchestrator::BatchOrchestrator;
use tactics_worker::stockfish::StockfishFactory;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Analyze games that are already marked analyzed
    #[arg(long)]
    force_reprocess: bool,

    /// Only analyze games from this source
    #[arg(long)]
    source: Option<String>,

    /// Stop after this many games
    #[arg(long)]
    max_games: Option<usize>,

    /// Number of engine workers (clamped to the core count)
    #[arg(long)]
    workers: Option<usize>,

    /// Games per chunk; each chunk gets a fresh engine pool
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: Option<u64>,

    /// Analyze only these game ids, e.g. --games 123,456
    #[arg(long, value_delimiter = ',')]
    games: Option<Vec<i64>>,
}

impl Args {
    /// Command-line values win over the environment
    fn apply(&self, config: &mut WorkerConfig) {
        if self.force_reprocess {
            config.batch.force_reprocess = true;
        }
        if let Some(source) = &self.source {
            config.source_filter = Some(source.clone());
        }
        if let Some(max) = self.max_games {
            config.batch.max_games = Some(max);
        }
        if let Some(workers) = self.workers {
            config.batch.max_workers = workers.clamp(1, num_cpus::get());
        }
        if let Some(chunk) = self.chunk_size {
            config.batch.chunk_size = chunk as usize;
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local dev
    let _ = dotenvy::dotenv();

    let mut config = WorkerConfig::load()?;
    args.apply(&mut config);

    info!(
        stockfish_path = %config.engine.path,
        workers = config.batch.max_workers,
        chunk_size = config.batch.chunk_size,
        force_reprocess = config.batch.force_reprocess,
        "Worker config loaded"
    );

    let store = PgStore::connect(&config.database_url, config.batch.max_workers).await?;
    store.ensure_schema().await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested, finishing in-flight games");
        let _ = shutdown_tx.send(true);
    });

    let filter = config.worklist_filter();
    let orchestrator = BatchOrchestrator::new(
        store.clone(),
        StockfishFactory::new(config.engine.clone()),
        config.analysis.clone(),
        config.batch.clone(),
        shutdown_rx,
    );

    let summary = match args.games.as_deref().filter(|ids| !ids.is_empty()) {
        Some(ids) => {
            info!(count = ids.len(), "Analyzing selected games");
            let games = store.fetch_games(ids).await?;
            orchestrator.run(games).await?
        }
        None => orchestrator.run_from_source(&store, &filter).await?,
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!(
        processed = summary.processed,
        skipped = summary.skipped,
        failed = summary.failed,
        annotations = summary.annotations,
        anomalies = summary.anomalies,
        success_rate = summary.success_rate(),
        interrupted = summary.interrupted,
        "Run complete"
    );

    if summary.attempted() > 0 && summary.processed == 0 {
        anyhow::bail!("all {} attempted games failed", summary.failed);
    }
    Ok(())
}
