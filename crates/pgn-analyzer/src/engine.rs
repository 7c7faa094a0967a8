//! UCI engine session over a child process (async I/O)

use std::fmt;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::AnalysisError;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(120);

/// Grace period between `quit` and killing the process.
const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Computation granted to a single `go` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBudget {
    Nodes(u64),
    MoveTime(u64),
    Depth(u32),
    Infinite,
}

impl SearchBudget {
    /// Build a budget from the `go` keyword and its value.
    pub fn from_kind(kind: &str, value: u64) -> Option<Self> {
        match kind {
            "nodes" => Some(SearchBudget::Nodes(value)),
            "movetime" => Some(SearchBudget::MoveTime(value)),
            "depth" => u32::try_from(value).ok().map(SearchBudget::Depth),
            "infinite" => Some(SearchBudget::Infinite),
            _ => None,
        }
    }
}

impl fmt::Display for SearchBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchBudget::Nodes(n) => write!(f, "nodes {n}"),
            SearchBudget::MoveTime(ms) => write!(f, "movetime {ms}"),
            SearchBudget::Depth(d) => write!(f, "depth {d}"),
            SearchBudget::Infinite => f.write_str("infinite"),
        }
    }
}

/// Lines read from the engine for one command, terminator line included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> + '_ {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Move named on the `bestmove` line, if the transcript ends with one.
    pub fn best_move(&self) -> Option<&str> {
        let mut tokens = self.lines.last()?.split_whitespace();
        tokens.find(|t| *t == "bestmove")?;
        tokens.next()
    }
}

/// What the read loop is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Awaiting {
    Identification,
    Readiness,
    Completion,
}

impl Awaiting {
    fn terminator(self) -> &'static str {
        match self {
            Awaiting::Identification => "uciok",
            Awaiting::Readiness => "readyok",
            Awaiting::Completion => "bestmove",
        }
    }

    /// Error for a stream that ended before the terminator arrived.
    fn lost(self, detail: &str) -> AnalysisError {
        match self {
            Awaiting::Completion => AnalysisError::EngineUnavailable(format!(
                "{detail} while waiting for `{}`",
                self.terminator()
            )),
            _ => AnalysisError::EngineProtocol(format!(
                "{detail} before `{}`",
                self.terminator()
            )),
        }
    }
}

/// A UCI engine reached through a pair of byte streams.
///
/// Every method takes `&mut self`, so at most one command is in flight. Once
/// the stream breaks the session is dead and every later call fails with
/// [`AnalysisError::EngineUnavailable`].
pub struct EngineSession<W = ChildStdin, R = BufReader<ChildStdout>> {
    process: Option<Child>,
    stdin: W,
    stdout: R,
    alive: bool,
    handshake_timeout: Duration,
}

impl EngineSession {
    /// Spawn the engine and run the `uci` handshake.
    pub async fn start(
        path: &Path,
        args: &[String],
        handshake_timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let mut process = Command::new(path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                AnalysisError::EngineUnavailable(format!(
                    "Failed to spawn {}: {e}",
                    path.display()
                ))
            })?;

        let (stdin, stdout) = match (process.stdin.take(), process.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = process.start_kill();
                return Err(AnalysisError::EngineUnavailable(
                    "Failed to open engine stdio".into(),
                ));
            }
        };

        let mut session = EngineSession::from_io(stdin, BufReader::new(stdout))
            .with_handshake_timeout(handshake_timeout);
        session.process = Some(process);
        session.handshake().await?;

        Ok(session)
    }
}

impl<W: AsyncWrite + Unpin, R: AsyncBufRead + Unpin> EngineSession<W, R> {
    pub fn from_io(stdin: W, stdout: R) -> Self {
        Self {
            process: None,
            stdin,
            stdout,
            alive: true,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_handshake_timeout(mut self, limit: Duration) -> Self {
        self.handshake_timeout = limit;
        self
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// `uci` → `uciok`
    pub async fn handshake(&mut self) -> Result<Transcript, AnalysisError> {
        self.send("uci").await?;
        self.wait_for(Awaiting::Identification).await
    }

    /// Send every option in order, then block until the engine is ready.
    pub async fn configure(&mut self, options: &[(String, String)]) -> Result<(), AnalysisError> {
        for (name, value) in options {
            self.set_option(name, value).await?;
        }
        self.send("isready").await?;
        self.wait_for(Awaiting::Readiness).await?;
        Ok(())
    }

    /// Send a single `setoption` without waiting for readyok.
    pub async fn set_option(&mut self, name: &str, value: &str) -> Result<(), AnalysisError> {
        self.send(&format!("setoption name {name} value {value}")).await
    }

    /// Search `fen` and return everything the engine printed up to `bestmove`.
    pub async fn query(
        &mut self,
        fen: &str,
        budget: SearchBudget,
        restrict_to: Option<&str>,
    ) -> Result<Transcript, AnalysisError> {
        self.send(&format!("position fen {fen}")).await?;
        let go = match restrict_to {
            Some(mv) => format!("go {budget} searchmoves {mv}"),
            None => format!("go {budget}"),
        };
        self.send(&go).await?;
        self.wait_for(Awaiting::Completion).await
    }

    /// Send `quit` and wait for the process to exit.
    pub async fn shutdown(mut self) {
        if self.alive {
            let _ = self.send("quit").await;
        }

        if let Some(mut child) = self.process.take() {
            match timeout(EXIT_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => debug!(%status, "Engine exited"),
                Ok(Err(e)) => warn!(error = %e, "Failed to wait for engine exit"),
                Err(_) => {
                    warn!("Engine ignored quit, killing it");
                    let _ = child.kill().await;
                }
            }
        }
    }

    async fn send(&mut self, cmd: &str) -> Result<(), AnalysisError> {
        if !self.alive {
            return Err(AnalysisError::EngineUnavailable(
                "engine process is no longer running".into(),
            ));
        }

        debug!(cmd, "engine <");
        if let Err(e) = self.write_line(cmd).await {
            self.alive = false;
            return Err(AnalysisError::EngineUnavailable(format!(
                "Failed to write to engine: {e}"
            )));
        }
        Ok(())
    }

    async fn write_line(&mut self, cmd: &str) -> std::io::Result<()> {
        self.stdin.write_all(cmd.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await
    }

    /// Handshake markers are bounded by the handshake timeout; searches are
    /// bounded only by their budget.
    async fn wait_for(&mut self, awaiting: Awaiting) -> Result<Transcript, AnalysisError> {
        if awaiting == Awaiting::Completion {
            return self.read_through(awaiting).await;
        }

        let limit = self.handshake_timeout;
        match timeout(limit, self.read_through(awaiting)).await {
            Ok(result) => result,
            Err(_) => {
                self.alive = false;
                Err(AnalysisError::EngineProtocol(format!(
                    "timed out after {}s waiting for `{}`",
                    limit.as_secs_f64(),
                    awaiting.terminator()
                )))
            }
        }
    }

    async fn read_through(&mut self, awaiting: Awaiting) -> Result<Transcript, AnalysisError> {
        if !self.alive {
            return Err(AnalysisError::EngineUnavailable(
                "engine process is no longer running".into(),
            ));
        }

        let terminator = awaiting.terminator();
        let mut lines = Vec::new();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match self.stdout.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    self.alive = false;
                    return Err(awaiting.lost("engine closed its output"));
                }
                Ok(_) => {}
                Err(e) => {
                    self.alive = false;
                    return Err(awaiting.lost(&format!("failed to read from engine ({e})")));
                }
            }

            let line = String::from_utf8_lossy(&buf).trim().to_string();
            trace!(line = %line, "engine >");
            let done = line.contains(terminator);
            lines.push(line);
            if done {
                return Ok(Transcript { lines });
            }
        }
    }
}

impl<W, R> Drop for EngineSession<W, R> {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        if let Some(child) = self.process.as_mut() {
            let _ = child.start_kill();
        }
    }
}
