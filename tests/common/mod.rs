//! Scripted in-process UCI engine for pipeline tests.

use std::sync::{Arc, Mutex};

use pgn_analyzer::EngineSession;
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Position};
use tokio::io::{
    duplex, split, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, ReadHalf, WriteHalf,
};
use tokio::task::JoinHandle;

pub type TestSession = EngineSession<WriteHalf<DuplexStream>, BufReader<ReadHalf<DuplexStream>>>;

/// A `go` command together with the engine state it was issued in.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub fen: String,
    pub multipv: u32,
    pub searchmoves: Option<String>,
}

/// Every command the engine received, in order.
pub type CommandLog = Arc<Mutex<Vec<String>>>;

/// Spawn a fake engine answering searches with `respond`. Returning `None`
/// from `respond` makes the engine hang up.
pub fn spawn_engine<F>(mut respond: F) -> (TestSession, CommandLog, JoinHandle<()>)
where
    F: FnMut(&SearchRequest) -> Option<Vec<String>> + Send + 'static,
{
    let (client, server) = duplex(1 << 16);
    let (client_read, client_write) = split(client);
    let (server_read, mut server_write) = split(server);
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&log);

    let handle = tokio::spawn(async move {
        let mut lines = BufReader::new(server_read).lines();
        let mut fen = String::new();
        let mut multipv = 1u32;

        while let Ok(Some(cmd)) = lines.next_line().await {
            seen.lock().unwrap().push(cmd.clone());

            let reply: Vec<String> = if cmd == "uci" {
                vec!["id name FakeZero".into(), "id author tests".into(), "uciok".into()]
            } else if cmd == "isready" {
                vec!["readyok".into()]
            } else if cmd == "quit" {
                break;
            } else if let Some(value) = cmd.strip_prefix("setoption name MultiPV value ") {
                multipv = value.parse().unwrap();
                Vec::new()
            } else if let Some(rest) = cmd.strip_prefix("position fen ") {
                fen = rest.to_string();
                Vec::new()
            } else if cmd.starts_with("go ") {
                let request = SearchRequest {
                    fen: fen.clone(),
                    multipv,
                    searchmoves: cmd
                        .split_once(" searchmoves ")
                        .map(|(_, mv)| mv.to_string()),
                };
                match respond(&request) {
                    Some(lines) => lines,
                    None => break,
                }
            } else {
                Vec::new()
            };

            for line in reply {
                server_write
                    .write_all(format!("{line}\n").as_bytes())
                    .await
                    .unwrap();
            }
        }
    });

    let session = EngineSession::from_io(client_write, BufReader::new(client_read));
    (session, log, handle)
}

/// Legal moves of `fen` in UCI, sorted; the synthetic engine prefers them in
/// this order.
pub fn preference_order(fen: &str) -> Vec<String> {
    let pos: Chess = fen
        .parse::<Fen>()
        .unwrap()
        .into_position(CastlingMode::Standard)
        .unwrap();
    let mut moves: Vec<String> = pos
        .legal_moves()
        .into_iter()
        .map(|m| m.to_uci(CastlingMode::Standard).to_string())
        .collect();
    moves.sort();
    moves
}

pub fn synthetic_visits(index: usize) -> u64 {
    (200u64.saturating_sub(4 * index as u64)).max(1)
}

pub fn synthetic_wdl(index: usize) -> (u32, u32, u32) {
    let win = 300u32.saturating_sub(10 * index as u32);
    (win, 600, 1000 - 600 - win)
}

/// Deterministic lc0-like output: MultiPV lines for the first `multipv`
/// preferred moves, a verbose line for every legal move, then `bestmove`.
pub fn synthetic_search(request: &SearchRequest) -> Vec<String> {
    let order = preference_order(&request.fen);
    let mut lines = vec!["info depth 1 seldepth 2 time 5 nodes 1 score cp 12 nps 200".to_string()];

    let searched: Vec<(usize, &String)> = match &request.searchmoves {
        Some(only) => order.iter().enumerate().filter(|(_, m)| *m == only).collect(),
        None => order.iter().enumerate().collect(),
    };

    for (k, (i, mv)) in searched.iter().take(request.multipv as usize).enumerate() {
        let (w, d, l) = synthetic_wdl(*i);
        lines.push(format!(
            "info depth 4 seldepth 9 time 120 nodes {} score cp {} wdl {w} {d} {l} hashfull 0 nps 5000 tbhits 0 multipv {} pv {mv} e7e5",
            synthetic_visits(*i),
            20 - *i as i32,
            k + 1,
        ));
    }

    for (i, mv) in searched.iter().rev() {
        lines.push(format!(
            "info string {mv}  ({i} ) N: {:>7} (+ 0) (P: {:5.2}%) (WL:  0.01000) (D:  0.600) (M: 100.0) (Q: {:8.5}) (U: 0.01) (S:  0.1) (V:  0.0100)",
            synthetic_visits(*i),
            20.0 - *i as f64 * 0.25,
            0.1 - *i as f64 * 0.01,
        ));
    }
    lines.push(
        "info string node  ( 20) N:     800 (+ 0) (P: 100.00%) (WL:  0.02) (D:  0.45) (Q:  0.02) (V:  0.02)"
            .to_string(),
    );

    let best = searched.first().map(|(_, m)| m.as_str()).unwrap_or("0000");
    lines.push(format!("bestmove {best}"));
    lines
}
