//! Second search for a played move that fell outside the MultiPV window.
//!
//! The verbose report never carries WDL, so a played move outside the top-K
//! list has no outcome estimate. A search restricted to that move with
//! `MultiPV 1` fills the gap.

use shakmaty::Chess;
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, warn};

use crate::engine::{EngineSession, SearchBudget};
use crate::error::AnalysisError;
use crate::ranking::Reconciliation;
use crate::stats::{self, Wdl};

/// What to re-search and how to put the engine back afterwards.
#[derive(Debug, Clone, Copy)]
pub struct FocusedSearch<'a> {
    pub fen: &'a str,
    pub board: &'a Chess,
    /// Key the played move has in the tables (SAN).
    pub played_san: &'a str,
    pub played_uci: &'a str,
    pub budget: SearchBudget,
    /// MultiPV value to restore once the focused search is done.
    pub multipv: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No evaluation, or it already had WDL.
    NotNeeded,
    Recovered(Wdl),
    /// The focused search reported no WDL either.
    Missing,
}

/// Fill in the played move's WDL when the main search did not report one.
///
/// Only the WDL of the evaluation and of the matching candidate are touched.
pub async fn recover<W, R>(
    session: &mut EngineSession<W, R>,
    request: &FocusedSearch<'_>,
    result: &mut Reconciliation,
) -> Result<RecoveryOutcome, AnalysisError>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    let Some(evaluation) = result.evaluation.as_mut() else {
        return Ok(RecoveryOutcome::NotNeeded);
    };
    if evaluation.wdl.is_some() {
        return Ok(RecoveryOutcome::NotNeeded);
    }

    debug!(played = request.played_san, "Running focused search for WDL");

    session.set_option("MultiPV", "1").await?;
    let transcript = session
        .query(request.fen, request.budget, Some(request.played_uci))
        .await?;
    session
        .set_option("MultiPV", &request.multipv.to_string())
        .await?;

    let focused = stats::extract(&transcript, request.board);
    let Some(wdl) = focused
        .bounded
        .get(request.played_san)
        .and_then(|entry| entry.wdl)
    else {
        warn!(
            played = request.played_san,
            fen = request.fen,
            "Focused search reported no WDL"
        );
        return Ok(RecoveryOutcome::Missing);
    };

    evaluation.wdl = Some(wdl);
    if let Some(candidate) = result
        .candidates
        .iter_mut()
        .find(|c| c.mv == request.played_san)
    {
        candidate.wdl = Some(wdl);
    }

    Ok(RecoveryOutcome::Recovered(wdl))
}
