//! Merge the bounded and verbose tables into one ranked candidate list.

use std::cmp::Ordering;

use serde::Serialize;

use crate::stats::{BoundedEntry, MoveTable, VerboseEntry, Wdl};

/// One move in the ranked list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    #[serde(rename = "move")]
    pub mv: String,
    pub rank: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visits: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wdl: Option<Wdl>,
}

/// How the played move fared; a [`Candidate`] without the move name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub rank: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visits: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wdl: Option<Wdl>,
}

impl From<&Candidate> for Evaluation {
    fn from(c: &Candidate) -> Self {
        Self {
            rank: c.rank,
            visits: c.visits,
            policy: c.policy,
            q_value: c.q_value,
            wdl: c.wdl,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconciliation {
    /// Ranked and truncated to capacity.
    pub candidates: Vec<Candidate>,
    pub evaluation: Option<Evaluation>,
    pub total_visits: Option<u64>,
    pub visits_on_better: Option<u64>,
}

/// Search effort first, then value, then prior.
fn by_effort(a: &Candidate, b: &Candidate) -> Ordering {
    let visits = b.visits.unwrap_or(0).cmp(&a.visits.unwrap_or(0));
    let q = b
        .q_value
        .unwrap_or(f64::NEG_INFINITY)
        .partial_cmp(&a.q_value.unwrap_or(f64::NEG_INFINITY))
        .unwrap_or(Ordering::Equal);
    let policy = b
        .policy
        .unwrap_or(0.0)
        .partial_cmp(&a.policy.unwrap_or(0.0))
        .unwrap_or(Ordering::Equal);
    visits.then(q).then(policy)
}

/// Rank every move either table knows about and locate `played` in the
/// result. The played move's figures come from the full ranking even when
/// truncation to `capacity` drops it from the candidate list.
pub fn reconcile(
    bounded: &MoveTable<BoundedEntry>,
    verbose: &MoveTable<VerboseEntry>,
    played: &str,
    capacity: usize,
) -> Reconciliation {
    let mut ranked: Vec<Candidate> = bounded
        .iter()
        .map(|(mv, _)| mv)
        .chain(verbose.iter().map(|(mv, _)| mv).filter(|mv| !bounded.contains(mv)))
        .map(|mv| {
            let stats = verbose.get(mv);
            Candidate {
                mv: mv.to_string(),
                rank: 0,
                visits: stats.map(|s| s.visits),
                policy: stats.map(|s| s.policy),
                q_value: stats.and_then(|s| s.q_value),
                wdl: bounded.get(mv).and_then(|b| b.wdl),
            }
        })
        .collect();

    ranked.sort_by(by_effort);
    for (i, c) in ranked.iter_mut().enumerate() {
        c.rank = i as u32 + 1;
    }

    let played_at = ranked.iter().position(|c| c.mv == played);
    let evaluation = played_at.map(|i| Evaluation::from(&ranked[i]));
    let visits_on_better = match played_at {
        Some(i) if verbose.contains(played) => {
            Some(ranked[..i].iter().filter_map(|c| c.visits).sum())
        }
        _ => None,
    };
    let total_visits = (!verbose.is_empty()).then(|| verbose.total_visits());

    ranked.truncate(capacity);

    Reconciliation {
        candidates: ranked,
        evaluation,
        total_visits,
        visits_on_better,
    }
}
