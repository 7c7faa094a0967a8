use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Color};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMetadata {
    pub event: String,
    pub site: String,
    pub date: String,
    pub round: String,
    pub white: String,
    pub white_elo: Option<u32>,
    pub black: String,
    pub black_elo: Option<u32>,
    pub result: String, // "1-0", "0-1", "1/2-1/2", "*"
    pub eco: String,
}

/// One half-move of a game together with the position it was played from.
#[derive(Debug, Clone)]
pub struct Ply {
    /// 1-based half-move number within the game.
    pub number: u32,
    pub fen: String,
    pub position: Chess,
    pub to_move: Color,
    /// Played move in SAN, including the `+`/`#` suffix.
    pub san: String,
    pub uci: String,
}

#[derive(Debug, Clone, Default)]
pub struct GameRecord {
    pub metadata: GameMetadata,
    pub plies: Vec<Ply>,
    /// First movetext token that could not be played; the mainline stops there.
    pub illegal_move: Option<String>,
}
