//! Stockfish UCI driver
//!
//! Keeps a single engine process alive for the whole run and evaluates one
//! FEN at a time to a fixed depth.

use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use crate::engine_error;
use crate::errors::Result;

/// Engine settings used for every evaluated position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub stockfish_path: String,
    pub depth: u8,
    /// Optional cap on thinking time per position
    pub movetime_ms: Option<u64>,
    pub threads: Option<u8>,
    pub hash_size_mb: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stockfish_path: "stockfish".to_string(), // Assume stockfish in PATH
            depth: 12,
            movetime_ms: None,
            threads: Some(1),
            hash_size_mb: Some(64),
        }
    }
}

/// Engine score from the point of view of the side to move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Score {
    Centipawns(i32),
    /// Moves to mate; negative when the side to move is getting mated,
    /// 0 when it already is
    Mate(i32),
}

impl Score {
    pub const MATE_VALUE: i32 = 10_000;

    /// Collapse to centipawns, mapping mate-in-n to ±(10000 − 10n)
    pub fn to_centipawns(self) -> i32 {
        match self {
            Score::Centipawns(cp) => cp,
            Score::Mate(n) if n > 0 => Self::MATE_VALUE - n * 10,
            Score::Mate(n) => -Self::MATE_VALUE - n * 10,
        }
    }

    /// Same score seen from the other side
    pub fn flip(self) -> Self {
        match self {
            Score::Centipawns(cp) => Score::Centipawns(-cp),
            Score::Mate(n) => Score::Mate(-n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: Score,
    /// Engine's preferred move in UCI notation
    pub best_move: Option<String>,
    pub depth: u32,
}

/// Anything that can score a position
pub trait PositionEvaluator {
    fn evaluate(&mut self, fen: &str) -> Result<Evaluation>;

    /// Called before the first position of each game
    fn new_game(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<E: PositionEvaluator + ?Sized> PositionEvaluator for Box<E> {
    fn evaluate(&mut self, fen: &str) -> Result<Evaluation> {
        (**self).evaluate(fen)
    }

    fn new_game(&mut self) -> Result<()> {
        (**self).new_game()
    }
}

/// Fields of a UCI `info` line that matter for scoring
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InfoLine {
    pub depth: Option<u32>,
    pub score: Option<Score>,
    pub multipv: Option<u32>,
}

/// Parse a UCI `info` line. Bound scores (`lowerbound`/`upperbound`) are
/// dropped since they are not exact.
pub fn parse_info(line: &str) -> Option<InfoLine> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("info") {
        return None;
    }

    let mut info = InfoLine::default();
    let mut bound = false;

    while let Some(token) = tokens.next() {
        match token {
            "depth" => info.depth = tokens.next().and_then(|t| t.parse().ok()),
            "multipv" => info.multipv = tokens.next().and_then(|t| t.parse().ok()),
            "score" => {
                let kind = tokens.next();
                let value = tokens.next().and_then(|t| t.parse::<i32>().ok());
                info.score = match (kind, value) {
                    (Some("cp"), Some(cp)) => Some(Score::Centipawns(cp)),
                    (Some("mate"), Some(n)) => Some(Score::Mate(n)),
                    _ => None,
                };
            }
            "lowerbound" | "upperbound" => bound = true,
            // Everything after these is free text or a move list
            "pv" | "string" => break,
            _ => {}
        }
    }

    if bound {
        info.score = None;
    }
    Some(info)
}

/// Move from a `bestmove` line; `None` for `(none)` or any other line
pub fn parse_bestmove(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("bestmove") {
        return None;
    }
    tokens
        .next()
        .filter(|m| *m != "(none)" && m.len() >= 4)
        .map(str::to_string)
}

/// Stockfish process speaking UCI over stdin/stdout
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    config: EngineConfig,
    name: Option<String>,
    closed: bool,
}

impl StockfishEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let mut process = Command::new(&config.stockfish_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                engine_error!("Failed to start Stockfish at '{}': {}", config.stockfish_path, e)
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| engine_error!("Failed to get stdin"))?;

        let stdout = BufReader::new(
            process
                .stdout
                .take()
                .ok_or_else(|| engine_error!("Failed to get stdout"))?,
        );

        let mut engine = Self {
            process,
            stdin,
            stdout,
            config,
            name: None,
            closed: false,
        };

        engine.initialize()?;
        tracing::info!(
            engine = engine.name().unwrap_or("unknown"),
            depth = engine.config.depth,
            "engine ready"
        );

        Ok(engine)
    }

    /// `id name` reported during the handshake
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn initialize(&mut self) -> Result<()> {
        self.send_command("uci")?;

        loop {
            let response = self.read_response()?;
            if let Some(name) = response.strip_prefix("id name ") {
                self.name = Some(name.to_string());
            }
            if response == "uciok" {
                break;
            }
        }

        if let Some(threads) = self.config.threads {
            self.send_command(&format!("setoption name Threads value {}", threads))?;
        }

        if let Some(hash_size) = self.config.hash_size_mb {
            self.send_command(&format!("setoption name Hash value {}", hash_size))?;
        }

        self.send_command("setoption name Ponder value false")?;
        self.wait_ready()
    }

    fn wait_ready(&mut self) -> Result<()> {
        self.send_command("isready")?;
        loop {
            if self.read_response()? == "readyok" {
                return Ok(());
            }
        }
    }

    fn send_command(&mut self, command: &str) -> Result<()> {
        tracing::trace!(command, "uci >");
        writeln!(self.stdin, "{}", command)
            .map_err(|e| engine_error!("Send failed: {}", e))?;
        self.stdin
            .flush()
            .map_err(|e| engine_error!("Flush failed: {}", e))?;
        Ok(())
    }

    fn read_response(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| engine_error!("Read failed: {}", e))?;
        if read == 0 {
            return Err(engine_error!("Engine closed its output"));
        }
        Ok(line.trim().to_string())
    }

    fn go_command(&self) -> String {
        let mut go = format!("go depth {}", self.config.depth);
        if let Some(movetime) = self.config.movetime_ms {
            go.push_str(&format!(" movetime {}", movetime));
        }
        go
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.send_command("quit")?;
        self.process
            .wait()
            .map_err(|e| engine_error!("Failed to close: {}", e))?;
        Ok(())
    }
}

impl PositionEvaluator for StockfishEngine {
    fn evaluate(&mut self, fen: &str) -> Result<Evaluation> {
        self.send_command(&format!("position fen {}", fen))?;
        let go = self.go_command();
        self.send_command(&go)?;

        let mut score = None;
        let mut depth = 0;

        loop {
            let response = self.read_response()?;

            if let Some(info) = parse_info(&response) {
                // Only the principal line counts when MultiPV is on
                if info.multipv.map_or(true, |pv| pv == 1) {
                    if let Some(s) = info.score {
                        score = Some(s);
                        depth = info.depth.unwrap_or(depth);
                    }
                }
            } else if response.starts_with("bestmove") {
                let best_move = parse_bestmove(&response);
                let score = score
                    .ok_or_else(|| engine_error!("No score reported for position {}", fen))?;
                return Ok(Evaluation {
                    score,
                    best_move,
                    depth,
                });
            }
        }
    }

    fn new_game(&mut self) -> Result<()> {
        self.send_command("ucinewgame")?;
        self.wait_ready()
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        if self.close().is_err() {
            let _ = self.process.kill();
        }
    }
}
