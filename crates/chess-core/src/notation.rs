//! UCI ↔ SAN conversion on top of shakmaty.

use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Move};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotationError {
    #[error("Invalid UCI move: {0}")]
    InvalidUci(String),

    #[error("Illegal move {0} in position")]
    Illegal(String),
}

/// Convert a UCI move to SAN (with check suffix) in the given position.
pub fn uci_to_san(pos: &Chess, uci: &str) -> Result<String, NotationError> {
    let uci_move: UciMove = uci
        .parse()
        .map_err(|_| NotationError::InvalidUci(uci.to_string()))?;
    let legal_move = uci_move
        .to_move(pos)
        .map_err(|_| NotationError::Illegal(uci.to_string()))?;
    Ok(SanPlus::from_move(pos.clone(), legal_move).to_string())
}

/// UCI text for a legal move, standard castling (`e1g1`).
pub fn move_to_uci(m: Move) -> String {
    m.to_uci(CastlingMode::Standard).to_string()
}
