//! Position driver: walks every game ply by ply through the engine session.

use std::future::Future;
use std::io::Write;

use chess_core::{GameMetadata, GameRecord, Ply};
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::engine::{EngineSession, SearchBudget};
use crate::error::AnalysisError;
use crate::output::GameWriter;
use crate::ranking::{reconcile, Candidate, Evaluation};
use crate::recovery::{recover, FocusedSearch, RecoveryOutcome};
use crate::stats;

/// Per-run search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisSettings {
    pub budget: SearchBudget,
    /// Candidates kept per position.
    pub max_candidates: usize,
    /// MultiPV value the engine runs with outside focused searches.
    pub multipv: u32,
}

/// Analysis of one position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoveRecord {
    pub ply: u32,
    pub fen: String,
    pub to_move: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_visits: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visits_on_better: Option<u64>,
    pub played_move: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub candidate_moves: Vec<Candidate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameReport {
    /// 1-based position of the game in the input.
    pub game_index: usize,
    #[serde(flatten)]
    pub metadata: GameMetadata,
    pub moves: Vec<MoveRecord>,
}

/// Search one position and assemble its record.
pub async fn analyze_position<W, R>(
    session: &mut EngineSession<W, R>,
    ply: &Ply,
    settings: &AnalysisSettings,
) -> Result<MoveRecord, AnalysisError>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    let transcript = session.query(&ply.fen, settings.budget, None).await?;
    let search = stats::extract(&transcript, &ply.position);
    let mut result = reconcile(
        &search.bounded,
        &search.verbose,
        &ply.san,
        settings.max_candidates,
    );

    let request = FocusedSearch {
        fen: &ply.fen,
        board: &ply.position,
        played_san: &ply.san,
        played_uci: &ply.uci,
        budget: settings.budget,
        multipv: settings.multipv,
    };
    if let RecoveryOutcome::Recovered(wdl) = recover(session, &request, &mut result).await? {
        debug!(ply = ply.number, ?wdl, "Recovered WDL for played move");
    }

    debug!(
        ply = ply.number,
        played = %ply.san,
        best = transcript.best_move().unwrap_or("-"),
        rank = result.evaluation.as_ref().map(|e| e.rank),
        candidates = result.candidates.len(),
        "Position analyzed"
    );

    Ok(MoveRecord {
        ply: ply.number,
        fen: ply.fen.clone(),
        to_move: ply.to_move.to_string(),
        total_visits: result.total_visits,
        visits_on_better: result.visits_on_better,
        played_move: ply.san.clone(),
        evaluation: result.evaluation,
        candidate_moves: result.candidates,
    })
}

/// Analyze every recorded ply of one game.
pub async fn analyze_game<W, R>(
    session: &mut EngineSession<W, R>,
    game_index: usize,
    game: &GameRecord,
    settings: &AnalysisSettings,
) -> Result<GameReport, AnalysisError>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    info!(
        game_index,
        white = %game.metadata.white,
        black = %game.metadata.black,
        plies = game.plies.len(),
        "Starting analysis"
    );

    if let Some(mv) = &game.illegal_move {
        warn!(game_index, illegal_move = %mv, "Game record stops at an illegal move");
    }

    let mut moves = Vec::with_capacity(game.plies.len());
    for ply in &game.plies {
        moves.push(analyze_position(session, ply, settings).await?);
    }

    info!(game_index, positions = moves.len(), "Game analyzed");

    Ok(GameReport {
        game_index,
        metadata: game.metadata.clone(),
        moves,
    })
}

/// Analyze all games in order, appending each finished report to `out`.
///
/// The report envelope is closed even when a session error or `stop` ends
/// the run early; the game in progress at that point is dropped. Returns the
/// number of games written.
pub async fn run<W, R, O, S>(
    session: &mut EngineSession<W, R>,
    games: &[GameRecord],
    settings: &AnalysisSettings,
    out: O,
    stop: S,
) -> Result<usize, AnalysisError>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
    O: Write,
    S: Future<Output = ()>,
{
    let mut writer = GameWriter::new(out)?;
    let outcome = tokio::select! {
        outcome = write_all_games(session, games, settings, &mut writer) => Some(outcome),
        _ = stop => None,
    };
    let written = writer.written();
    let closed = writer.finish();

    match outcome {
        Some(outcome) => outcome?,
        None => warn!(written, "Interrupted, report closed after completed games"),
    }
    closed?;
    Ok(written)
}

async fn write_all_games<W, R, O>(
    session: &mut EngineSession<W, R>,
    games: &[GameRecord],
    settings: &AnalysisSettings,
    writer: &mut GameWriter<O>,
) -> Result<(), AnalysisError>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
    O: Write,
{
    for (i, game) in games.iter().enumerate() {
        let report = analyze_game(session, i + 1, game, settings).await?;
        writer.write_game(&report)?;
        info!(completed = i + 1, total = games.len(), "Progress saved");
    }
    Ok(())
}
