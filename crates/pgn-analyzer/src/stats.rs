//! Extraction of per-move statistics from an engine transcript.
//!
//! Two kinds of lines matter:
//!
//! - MultiPV progress lines (`info ... multipv 2 ... wdl 512 301 187 ... pv g1f3 ...`),
//!   which give the bounded top-K list and its WDL triples.
//! - `VerboseMoveStats` lines (`info string g1f3 (159 ) N: 61 (+ 2) (P: 12.30%) ... (Q: 0.03411) ...`),
//!   which cover every move the engine looked at.
//!
//! Anything else is ignored.

use std::collections::HashMap;
use std::sync::LazyLock;

use chess_core::notation::uci_to_san;
use regex::Regex;
use serde::{Deserialize, Serialize};
use shakmaty::Chess;
use tracing::trace;

use crate::engine::Transcript;

static MULTIPV_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"multipv (\d+)").unwrap());
static WDL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"wdl (\d+) (\d+) (\d+)").unwrap());
static PV_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" pv (.+)$").unwrap());
static VERBOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"info string ([a-h][1-8][a-h][1-8][qrbn]?)",
        r".*?N:\s+(\d+)",
        r".*?\(P:\s+([\d.]+)%\)",
        r".*?\(Q:\s+([-\d.]+)\)",
    ))
    .unwrap()
});

/// Win/draw/loss in permille, serialized as `[w, d, l]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wdl(pub u32, pub u32, pub u32);

/// A move from the engine's MultiPV report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundedEntry {
    /// `multipv` index of the last line that mentioned this move. Kept for
    /// reference only; ranking never reads it.
    pub index: u32,
    pub wdl: Option<Wdl>,
}

/// A move from the engine's verbose per-move report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerboseEntry {
    pub visits: u64,
    /// Prior probability, 0–1.
    pub policy: f64,
    pub q_value: Option<f64>,
}

/// Move-keyed table that remembers the order keys were first seen in.
#[derive(Debug, Clone)]
pub struct MoveTable<T> {
    order: Vec<String>,
    entries: HashMap<String, T>,
}

impl<T> Default for MoveTable<T> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
        }
    }
}

impl<T> MoveTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, mv: &str) -> Option<&T> {
        self.entries.get(mv)
    }

    pub fn contains(&self, mv: &str) -> bool {
        self.entries.contains_key(mv)
    }

    /// Insert or overwrite; an existing key keeps its original position.
    pub fn insert(&mut self, mv: impl Into<String>, entry: T) {
        let mv = mv.into();
        if !self.entries.contains_key(&mv) {
            self.order.push(mv.clone());
        }
        self.entries.insert(mv, entry);
    }

    pub fn entry_or_default(&mut self, mv: impl Into<String>) -> &mut T
    where
        T: Default,
    {
        let mv = mv.into();
        if !self.entries.contains_key(&mv) {
            self.order.push(mv.clone());
        }
        self.entries.entry(mv).or_default()
    }

    /// Entries in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> + '_ {
        self.order
            .iter()
            .filter_map(move |mv| self.entries.get(mv).map(|e| (mv.as_str(), e)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl MoveTable<VerboseEntry> {
    pub fn total_visits(&self) -> u64 {
        self.entries.values().map(|e| e.visits).sum()
    }
}

/// The two tables pulled out of one transcript.
#[derive(Debug, Clone, Default)]
pub struct SearchStats {
    pub bounded: MoveTable<BoundedEntry>,
    pub verbose: MoveTable<VerboseEntry>,
}

/// Parse a transcript. Moves are keyed by SAN in `board`; a move that cannot
/// be translated keeps its UCI text as key.
pub fn extract(transcript: &Transcript, board: &Chess) -> SearchStats {
    let mut stats = SearchStats::default();

    for line in transcript.lines() {
        if let Some((uci, entry)) = parse_verbose_line(line) {
            stats.verbose.insert(move_key(board, uci), entry);
        } else if let Some((index, uci, wdl)) = parse_multipv_line(line) {
            let entry = stats.bounded.entry_or_default(move_key(board, uci));
            entry.index = index;
            if wdl.is_some() {
                entry.wdl = wdl;
            }
        }
    }

    stats
}

fn move_key(board: &Chess, uci: &str) -> String {
    match uci_to_san(board, uci) {
        Ok(san) => san,
        Err(e) => {
            trace!(uci, error = %e, "Keeping engine move encoding");
            uci.to_string()
        }
    }
}

/// `(multipv index, first pv move, wdl)` from a progress line.
fn parse_multipv_line(line: &str) -> Option<(u32, &str, Option<Wdl>)> {
    if !line.contains("multipv") {
        return None;
    }

    let index = MULTIPV_RE.captures(line)?[1].parse().ok()?;
    let pv = PV_RE.captures(line)?.get(1)?.as_str();
    let first_move = pv.split_whitespace().next()?;
    let wdl = parse_wdl(line);

    Some((index, first_move, wdl))
}

fn parse_wdl(line: &str) -> Option<Wdl> {
    let caps = WDL_RE.captures(line)?;
    Some(Wdl(
        caps[1].parse().ok()?,
        caps[2].parse().ok()?,
        caps[3].parse().ok()?,
    ))
}

fn parse_verbose_line(line: &str) -> Option<(&str, VerboseEntry)> {
    if !line.contains("info string") {
        return None;
    }

    let caps = VERBOSE_RE.captures(line)?;
    let uci = caps.get(1)?.as_str();
    let visits = caps[2].parse().ok()?;
    let policy_pct: f64 = caps[3].parse().ok()?;
    let q_value = caps[4].parse::<f64>().ok().map(|q| round_to(q, 5));

    Some((
        uci,
        VerboseEntry {
            visits,
            policy: round_to(policy_pct / 100.0, 4),
            q_value,
        },
    ))
}

fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10f64.powi(digits);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERBOSE_D2D4: &str = "info string d2d4  (293 ) N:     151 (+ 3) (P: 14.50%) (WL:  0.01898) (D:  0.461) (M: 130.6) (Q:  0.01898) (U: 0.05014) (S:  0.06912) (V:  0.0171)";
    const VERBOSE_E2E4: &str = "info string e2e4  (322 ) N:     390 (+ 8) (P: 17.31%) (WL:  0.02913) (D:  0.452) (M: 131.1) (Q:  0.029134) (U: 0.02741) (S:  0.05654) (V:  0.0254)";
    const NODE_LINE: &str = "info string node  ( 20) N:     800 (+ 0) (P: 100.00%) (WL:  0.02461) (D:  0.457) (Q:  0.02461) (V:  0.0261)";

    fn transcript(lines: &[&str]) -> Transcript {
        Transcript::from_lines(lines.iter().copied())
    }

    #[test]
    fn test_parse_verbose_line() {
        let (uci, entry) = parse_verbose_line(VERBOSE_E2E4).unwrap();
        assert_eq!(uci, "e2e4");
        assert_eq!(entry.visits, 390);
        assert_eq!(entry.policy, 0.1731);
        assert_eq!(entry.q_value, Some(0.02913));
    }

    #[test]
    fn test_node_summary_line_is_not_a_move() {
        assert!(parse_verbose_line(NODE_LINE).is_none());
    }

    #[test]
    fn test_parse_multipv_line() {
        let line = "info depth 5 seldepth 12 time 300 nodes 800 score cp 21 wdl 61 892 47 hashfull 0 nps 2666 tbhits 0 multipv 2 pv d2d4 d7d5 c2c4";
        let (index, mv, wdl) = parse_multipv_line(line).unwrap();
        assert_eq!(index, 2);
        assert_eq!(mv, "d2d4");
        assert_eq!(wdl, Some(Wdl(61, 892, 47)));
    }

    #[test]
    fn test_multipv_line_needs_pv() {
        assert!(parse_multipv_line("info depth 5 multipv 1 score cp 20").is_none());
    }

    #[test]
    fn test_extract_keys_by_san_and_keeps_both_tables() {
        let board = Chess::default();
        let stats = extract(
            &transcript(&[
                "info depth 3 multipv 1 score cp 25 wdl 70 880 50 pv e2e4 e7e5",
                "info depth 3 multipv 2 score cp 20 pv d2d4 d7d5",
                VERBOSE_D2D4,
                VERBOSE_E2E4,
                NODE_LINE,
                "bestmove e2e4",
            ]),
            &board,
        );

        assert_eq!(stats.bounded.len(), 2);
        assert_eq!(stats.bounded.get("e4").unwrap().wdl, Some(Wdl(70, 880, 50)));
        assert_eq!(stats.bounded.get("d4").unwrap().wdl, None);
        assert_eq!(stats.bounded.get("d4").unwrap().index, 2);

        let verbose: Vec<&str> = stats.verbose.iter().map(|(mv, _)| mv).collect();
        assert_eq!(verbose, vec!["d4", "e4"]);
        assert_eq!(stats.verbose.total_visits(), 541);
    }

    #[test]
    fn test_extract_last_update_wins() {
        let board = Chess::default();
        let stats = extract(
            &transcript(&[
                "info depth 1 multipv 1 wdl 10 20 970 pv e2e4",
                "info depth 2 multipv 1 wdl 30 40 930 pv e2e4",
                "info depth 3 multipv 1 pv e2e4",
                "info string e2e4  (322 ) N:      12 (+ 0) (P: 17.31%) (Q:  0.1)",
                "info string e2e4  (322 ) N:      40 (+ 0) (P: 17.31%) (Q:  0.2)",
            ]),
            &board,
        );

        // a later line without wdl keeps the earlier triple
        assert_eq!(stats.bounded.get("e4").unwrap().wdl, Some(Wdl(30, 40, 930)));
        let e4 = stats.verbose.get("e4").unwrap();
        assert_eq!(e4.visits, 40);
        assert_eq!(e4.q_value, Some(0.2));
        assert_eq!(stats.verbose.len(), 1);
    }

    #[test]
    fn test_extract_falls_back_to_raw_move() {
        let board = Chess::default();
        let stats = extract(
            &transcript(&[
                "info depth 1 multipv 1 wdl 1 2 997 pv e2e5",
                "info string a7a5  (1 ) N:       3 (+ 0) (P: 1.00%) (Q: -0.5)",
            ]),
            &board,
        );

        assert!(stats.bounded.contains("e2e5"));
        assert_eq!(stats.verbose.get("a7a5").unwrap().q_value, Some(-0.5));
    }

    #[test]
    fn test_extract_ignores_chatter() {
        let board = Chess::default();
        let stats = extract(
            &transcript(&[
                "",
                "info string Loading weights file",
                "id name Lc0",
                "info depth 1 multipv x pv e2e4",
                "bestmove e2e4",
            ]),
            &board,
        );
        assert!(stats.bounded.is_empty());
        assert!(stats.verbose.is_empty());
    }

    #[test]
    fn test_unparseable_q_is_absent() {
        let (_, entry) =
            parse_verbose_line("info string g1f3  (159 ) N: 5 (+ 0) (P: 9.99%) (Q: -)").unwrap();
        assert_eq!(entry.q_value, None);
        assert_eq!(entry.policy, 0.0999);
    }

    #[test]
    fn test_move_table_keeps_first_seen_order() {
        let mut table = MoveTable::new();
        table.insert("b", 1);
        table.insert("a", 2);
        table.insert("b", 3);
        let items: Vec<(&str, &i32)> = table.iter().collect();
        assert_eq!(items, vec![("b", &3), ("a", &2)]);
    }
}
