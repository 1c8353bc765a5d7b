use chess_mistake_analysis::chess_com::{ArchiveConfig, ChessComClient, DEFAULT_API_BASE_URL};
use chess_mistake_analysis::config::{parse_utc_offset, AnalysisConfig, DateRange};
use chess_mistake_analysis::engine::{EngineConfig, StockfishEngine};
use chess_mistake_analysis::errors::resilience::RetryConfig;
use chess_mistake_analysis::mistakes::{AnalyzerSettings, MistakeThresholds};
use chess_mistake_analysis::{pipeline, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stockfish mistake analysis of a chess.com player's games",
    long_about = None
)]
struct Cli {
    /// chess.com username
    #[arg(short, long, env = "CHESS_USERNAME")]
    username: String,

    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    start: String,

    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    end: String,

    /// Timezone label stored in the report
    #[arg(long, default_value = "UTC")]
    timezone: String,

    /// Offset used to decide which day a game ended on, e.g. +07:00
    #[arg(long, default_value = "+00:00", allow_hyphen_values = true)]
    utc_offset: String,

    /// Path to the Stockfish binary
    #[arg(long, env = "STOCKFISH_PATH", default_value = "stockfish")]
    stockfish: String,

    /// Search depth per position
    #[arg(short, long, default_value = "12")]
    depth: u8,

    /// Optional time cap per position in milliseconds
    #[arg(long)]
    movetime: Option<u64>,

    #[arg(long, default_value = "1")]
    threads: u8,

    /// Engine hash size in MB
    #[arg(long, default_value = "64")]
    hash: u32,

    /// Analyse only the most recent N eligible games
    #[arg(long)]
    max_games: Option<usize>,

    /// Number of worst moves kept in the report
    #[arg(long, default_value = "10")]
    worst: usize,

    /// Output file (defaults to a name derived from user and dates)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    #[arg(long, default_value = DEFAULT_API_BASE_URL)]
    api_base_url: String,

    /// Attempts per month on rate limiting or server errors
    #[arg(long, default_value = "3")]
    retries: u32,

    #[arg(long, default_value = "50")]
    inaccuracy: i32,

    #[arg(long, default_value = "100")]
    mistake: i32,

    #[arg(long, default_value = "300")]
    blunder: i32,

    /// Moves up to this number count as early game
    #[arg(long, default_value = "10")]
    opening_moves: u32,

    /// Hide the per-game progress bar
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    fn into_config(self) -> Result<AnalysisConfig> {
        let range = DateRange::parse(&self.start, &self.end)?;
        let mut config = AnalysisConfig::new(self.username, range);

        config.timezone = self.timezone;
        config.utc_offset = parse_utc_offset(&self.utc_offset)?;
        config.archive = ArchiveConfig {
            base_url: self.api_base_url,
            retry: RetryConfig {
                max_attempts: self.retries.max(1),
                ..RetryConfig::default()
            },
            ..ArchiveConfig::default()
        };
        config.engine = EngineConfig {
            stockfish_path: self.stockfish,
            depth: self.depth,
            movetime_ms: self.movetime,
            threads: Some(self.threads),
            hash_size_mb: Some(self.hash),
        };
        config.analyzer = AnalyzerSettings {
            thresholds: MistakeThresholds {
                inaccuracy: self.inaccuracy,
                mistake: self.mistake,
                blunder: self.blunder,
            },
            opening_moves: self.opening_moves,
            max_games: self.max_games,
            worst_mistakes: self.worst,
            show_progress: !self.no_progress,
        };
        config.output = self.output;
        config.output_dir = self.output_dir;

        config.validate()?;
        if config.timezone_label_ignored() {
            tracing::warn!(
                timezone = %config.timezone,
                "timezone is only a label; games are filtered at +00:00 unless --utc-offset is set"
            );
        }
        Ok(config)
    }
}

fn run(cli: Cli) -> Result<PathBuf> {
    println!("{}", "=".repeat(60));
    println!("STOCKFISH MISTAKE ANALYSIS");
    println!("{}", "=".repeat(60));

    let config = cli.into_config()?;

    println!("\n1. Initializing services...");
    let client = ChessComClient::new(config.archive.clone())?;
    let engine = StockfishEngine::new(config.engine.clone())?;
    println!(
        "   ✓ Services initialized ({}, depth {})",
        engine.name().unwrap_or("UCI engine"),
        engine.config().depth
    );

    let outcome = pipeline::run(&config, &client, engine)?;

    println!("\n{}", "=".repeat(60));
    println!("✓ ANALYSIS COMPLETE!");
    println!("{}", "=".repeat(60));
    tracing::info!(
        total_games = outcome.total_games,
        analyzed_games = outcome.analyzed_games,
        "run finished"
    );

    Ok(outcome.output_path)
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chess_mistake_analysis=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()) {
        Ok(path) => println!("\nSuccess! File saved at: {}", path.display()),
        Err(error) => {
            tracing::error!(%error, "analysis failed");
            eprintln!("\n✗ Error: {}", error);
            std::process::exit(1);
        }
    }
}
