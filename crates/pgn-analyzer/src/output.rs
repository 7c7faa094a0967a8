//! Incremental writer for the `{"games": [...]}` report.
//!
//! The envelope is opened up front and every game is flushed as soon as it is
//! written, so an interrupted run still leaves the finished games on disk.
//! [`GameWriter::finish`] closes the envelope.

use std::io::Write;

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::AnalysisError;

const GAME_INDENT: &str = "    ";

pub struct GameWriter<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> GameWriter<W> {
    /// Write the opening of the envelope.
    pub fn new(mut out: W) -> Result<Self, AnalysisError> {
        out.write_all(b"{\n  \"games\": [\n")?;
        out.flush()?;
        Ok(Self { out, written: 0 })
    }

    pub fn write_game<T: Serialize>(&mut self, game: &T) -> Result<(), AnalysisError> {
        let mut body = Vec::new();
        let mut ser =
            serde_json::Serializer::with_formatter(&mut body, PrettyFormatter::with_indent(b"  "));
        game.serialize(&mut ser)?;
        let body = String::from_utf8_lossy(&body);

        if self.written > 0 {
            self.out.write_all(b",\n")?;
        }
        for (i, line) in body.lines().enumerate() {
            if i > 0 {
                self.out.write_all(b"\n")?;
            }
            if !line.is_empty() {
                self.out.write_all(GAME_INDENT.as_bytes())?;
                self.out.write_all(line.as_bytes())?;
            }
        }
        self.out.flush()?;

        self.written += 1;
        Ok(())
    }

    /// Games written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Close the envelope and hand back the sink.
    pub fn finish(mut self) -> Result<W, AnalysisError> {
        self.out.write_all(b"\n  ]\n}\n")?;
        self.out.flush()?;
        Ok(self.out)
    }
}
