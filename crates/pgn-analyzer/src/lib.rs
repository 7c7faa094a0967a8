//! Engine-driven analysis of recorded chess games.
//!
//! Every position of every game is searched by an lc0-style UCI engine; the
//! engine's MultiPV and verbose per-move reports are merged into a full
//! ranking of candidate moves, and the played move is located in it.

pub mod analyzer;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod ranking;
pub mod recovery;
pub mod stats;

pub use analyzer::{AnalysisSettings, GameReport, MoveRecord};
pub use config::{AnalysisConfig, ConfigOverrides};
pub use engine::{EngineSession, SearchBudget, Transcript};
pub use error::AnalysisError;
