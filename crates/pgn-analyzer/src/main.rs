//! analyze-pgn
//!
//! Analyzes every position of every game in a PGN file with lc0 and writes a
//! JSON report with the full candidate ranking for each played move.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};

use chess_core::pgn::read_games;
use pgn_analyzer::config::DEFAULT_CONFIG_PATH;
use pgn_analyzer::{analyzer, AnalysisConfig, ConfigOverrides, EngineSession};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// PGN file to analyze
    pgn: PathBuf,

    /// Output JSON file
    output: PathBuf,

    /// JSON config describing the engine and search
    #[arg(long, env = "LC0_ANALYSIS_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Engine command-line arguments as KEY=VALUE; replaces extra_args
    #[arg(long = "lc0-args", num_args = 0.., value_name = "KEY=VALUE")]
    lc0_args: Option<Vec<String>>,

    /// Extra engine argument as KEY=VALUE, appended to extra_args
    #[arg(long = "lc0", value_name = "KEY=VALUE")]
    lc0: Vec<String>,

    /// Override any config value, e.g. --set search.value=10
    /// (--set search.type=infinite searches until the engine stops)
    #[arg(long, value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Search N nodes per position
    #[arg(long, group = "budget")]
    nodes: Option<u64>,

    /// Search N milliseconds per position
    #[arg(long, group = "budget")]
    movetime: Option<u64>,

    /// Search to depth N
    #[arg(long, group = "budget")]
    depth: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        let search = match (self.nodes, self.movetime, self.depth) {
            (Some(n), _, _) => Some(("nodes".to_string(), n)),
            (_, Some(ms), _) => Some(("movetime".to_string(), ms)),
            (_, _, Some(d)) => Some(("depth".to_string(), d)),
            _ => None,
        };
        ConfigOverrides {
            lc0_args: self.lc0_args.clone(),
            lc0: self.lc0.clone(),
            set: self.set.clone(),
            search,
        }
    }
}

async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Load .env file for local runs
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config = AnalysisConfig::load(&cli.config, &cli.overrides())?;

    let pgn = File::open(&cli.pgn).with_context(|| format!("Cannot open {}", cli.pgn.display()))?;
    let games = read_games(BufReader::new(pgn))?;
    if games.is_empty() {
        warn!(pgn = %cli.pgn.display(), "No games found in PGN");
        return Ok(());
    }
    info!(games = games.len(), "PGN loaded");

    let mut session =
        EngineSession::start(&config.lc0_path, &config.engine_args(), config.handshake_timeout)
            .await?;
    session.configure(&config.options).await?;
    info!("Engine ready");

    if let Some(dir) = cli.output.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create {}", dir.display()))?;
    }
    let out = File::create(&cli.output)
        .with_context(|| format!("Cannot create {}", cli.output.display()))?;

    let result = analyzer::run(
        &mut session,
        &games,
        &config.settings(),
        BufWriter::new(out),
        interrupted(),
    )
    .await;
    session.shutdown().await;

    if let Err(e) = &result {
        if e.is_fatal_to_session() {
            error!(
                error = %e,
                output = %cli.output.display(),
                "Engine session lost, report keeps the completed games"
            );
        }
    }
    let written = result?;
    info!(written, output = %cli.output.display(), "Done");
    Ok(())
}
