//! Analysis error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    /// The engine process could not be started or is gone.
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    /// An expected marker line never arrived.
    #[error("Engine protocol error: {0}")]
    EngineProtocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("PGN error: {0}")]
    Pgn(#[from] chess_core::pgn::PgnError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AnalysisError {
    /// Session-level failures end the run; nothing after them can be trusted.
    pub fn is_fatal_to_session(&self) -> bool {
        matches!(
            self,
            AnalysisError::EngineUnavailable(_) | AnalysisError::EngineProtocol(_)
        )
    }
}
