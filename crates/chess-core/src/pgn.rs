//! PGN reading with pgn-reader; every mainline move is replayed with shakmaty
//! so each ply carries its starting FEN and both notations of the move.

use std::io::Read;
use std::ops::ControlFlow;

use pgn_reader::{RawTag, Reader, SanPlus, Visitor};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position};
use thiserror::Error;

use crate::game_data::{GameMetadata, GameRecord, Ply};
use crate::notation::move_to_uci;

#[derive(Error, Debug)]
pub enum PgnError {
    #[error("PGN read error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FEN tag in game {game}: {fen}")]
    InvalidFen { game: usize, fen: String },
}

/// Tags collected during header parsing.
#[derive(Default)]
struct GameTags {
    metadata: GameMetadata,
    fen: Option<String>,
}

/// State during movetext parsing.
struct GameState {
    board: Chess,
    record: GameRecord,
}

/// Visitor that records the mainline of each game.
#[derive(Default)]
struct GameCollector {
    games_seen: usize,
}

fn parse_elo(value: &str) -> Option<u32> {
    value.trim().parse().ok()
}

impl Visitor for GameCollector {
    type Tags = GameTags;
    type Movetext = GameState;
    type Output = Result<GameRecord, PgnError>;

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, GameTags> {
        self.games_seen += 1;
        ControlFlow::Continue(GameTags {
            metadata: GameMetadata {
                result: "*".to_string(),
                ..GameMetadata::default()
            },
            fen: None,
        })
    }

    fn tag(
        &mut self,
        tags: &mut GameTags,
        name: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let value = value.decode_utf8_lossy().into_owned();
        let meta = &mut tags.metadata;
        match name {
            b"Event" => meta.event = value,
            b"Site" => meta.site = value,
            b"Date" => meta.date = value,
            b"Round" => meta.round = value,
            b"White" => meta.white = value,
            b"Black" => meta.black = value,
            b"WhiteElo" => meta.white_elo = parse_elo(&value),
            b"BlackElo" => meta.black_elo = parse_elo(&value),
            b"Result" => meta.result = value,
            b"ECO" => meta.eco = value,
            b"FEN" => tags.fen = Some(value),
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, tags: GameTags) -> ControlFlow<Self::Output, GameState> {
        let board = match tags.fen {
            None => Chess::default(),
            Some(fen) => {
                let parsed = fen
                    .parse::<Fen>()
                    .ok()
                    .and_then(|f| f.into_position::<Chess>(CastlingMode::Standard).ok());
                match parsed {
                    Some(board) => board,
                    None => {
                        return ControlFlow::Break(Err(PgnError::InvalidFen {
                            game: self.games_seen,
                            fen,
                        }))
                    }
                }
            }
        };

        ControlFlow::Continue(GameState {
            board,
            record: GameRecord {
                metadata: tags.metadata,
                ..GameRecord::default()
            },
        })
    }

    fn san(&mut self, state: &mut GameState, san_plus: SanPlus) -> ControlFlow<Self::Output> {
        if state.record.illegal_move.is_some() {
            return ControlFlow::Continue(());
        }

        match san_plus.san.to_move(&state.board) {
            Ok(mv) => {
                let fen = Fen::from_position(&state.board, EnPassantMode::Legal).to_string();
                let position = state.board.clone();
                let to_move = state.board.turn();
                let uci = move_to_uci(mv);
                let san = SanPlus::from_move_and_play_unchecked(&mut state.board, mv).to_string();
                let number = state.record.plies.len() as u32 + 1;
                state.record.plies.push(Ply {
                    number,
                    fen,
                    position,
                    to_move,
                    san,
                    uci,
                });
            }
            Err(_) => {
                state.record.illegal_move = Some(san_plus.to_string());
            }
        }

        ControlFlow::Continue(())
    }

    fn end_game(&mut self, state: GameState) -> Self::Output {
        Ok(state.record)
    }
}

/// Read every game from a PGN source.
pub fn read_games<R: Read>(source: R) -> Result<Vec<GameRecord>, PgnError> {
    let mut reader = Reader::new(source);
    let mut collector = GameCollector::default();
    let mut games = Vec::new();

    while let Some(game) = reader.read_game(&mut collector)? {
        games.push(game?);
    }

    Ok(games)
}
