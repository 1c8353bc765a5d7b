//! # Chess Mistake Analysis
//!
//! Fetches a chess.com player's games over a date range, replays every game
//! through Stockfish and reports where the player loses the most ground:
//! opening, middlegame or endgame.
//!
//! ## Features
//!
//! - **Monthly archive fetching**: chess.com public API, per-month failures
//!   tolerated, games filtered to the requested days in any UTC offset
//! - **Engine review**: centipawn loss per move with inaccuracy, mistake and
//!   blunder thresholds
//! - **Stage breakdown**: early / middle / endgame statistics and the worst
//!   moves of the period
//! - **JSON report**: metadata, aggregated analysis and the raw game list
//!
//! ## Quick Start
//!
//! ```no_run
//! use chess_mistake_analysis::chess_com::ChessComClient;
//! use chess_mistake_analysis::config::{AnalysisConfig, DateRange};
//! use chess_mistake_analysis::engine::StockfishEngine;
//! use chess_mistake_analysis::pipeline;
//!
//! # fn main() -> chess_mistake_analysis::Result<()> {
//! let range = DateRange::parse("2026-01-01", "2026-01-31")?;
//! let config = AnalysisConfig::new("jay_fh", range);
//!
//! let client = ChessComClient::new(config.archive.clone())?;
//! let engine = StockfishEngine::new(config.engine.clone())?;
//!
//! let outcome = pipeline::run(&config, &client, engine)?;
//! println!("Report written to {}", outcome.output_path.display());
//! # Ok(())
//! # }
//! ```

// Core modules
pub mod errors;
pub mod config;

// Collaborators
pub mod chess_com;
pub mod engine;
pub mod games;
pub mod pgn;

// Analysis and output
pub mod mistakes;
pub mod pipeline;
pub mod report;

// Re-export commonly used types
pub use config::{AnalysisConfig, DateRange};
pub use engine::{Evaluation, PositionEvaluator, Score, StockfishEngine};
pub use errors::{AnalysisError, Result};
pub use games::{fetch_games, FetchReport, GameRecord, GameSource};
pub use mistakes::{GameStage, MistakeAnalysis, MistakeAnalyzer, MoveClassification};
pub use pipeline::{run, RunOutcome};
pub use report::AnalysisReport;
