//! Game records, PGN reading and move notation shared by the analysis crates.

pub mod game_data;
pub mod notation;
pub mod pgn;

pub use game_data::{GameMetadata, GameRecord, Ply};
