/// Stockfish integration
///
/// Runs against a real engine when one is available (`STOCKFISH_PATH` or
/// `stockfish` on the PATH) and skips quietly otherwise.
use chess_mistake_analysis::engine::{EngineConfig, StockfishEngine};
use chess_mistake_analysis::mistakes::{AnalyzerSettings, MistakeAnalyzer, MoveClassification};
use chess_mistake_analysis::{GameRecord, PositionEvaluator, Score};

fn engine_config() -> EngineConfig {
    EngineConfig {
        stockfish_path: std::env::var("STOCKFISH_PATH").unwrap_or_else(|_| "stockfish".to_string()),
        depth: 8,
        movetime_ms: Some(500),
        threads: Some(1),
        hash_size_mb: Some(16),
    }
}

fn start_engine() -> Option<StockfishEngine> {
    match StockfishEngine::new(engine_config()) {
        Ok(engine) => Some(engine),
        Err(e) => {
            println!("⚠️  Stockfish not available, skipping: {}", e);
            None
        }
    }
}

#[test]
fn test_evaluates_known_positions() {
    let Some(mut engine) = start_engine() else {
        return;
    };

    // Starting position is roughly equal
    let start = engine
        .evaluate("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")
        .unwrap();
    match start.score {
        Score::Centipawns(cp) => assert!(cp.abs() < 100, "start position scored {}", cp),
        Score::Mate(n) => panic!("start position scored as mate in {}", n),
    }
    assert!(start.best_move.is_some());

    // King + Rook vs King is winning for White
    let rook_up = engine.evaluate("8/8/8/8/8/8/8/R3K2k w - - 0 1").unwrap();
    assert!(rook_up.score.to_centipawns() > 300);

    // Back-rank mate in one
    let mate = engine.evaluate("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1").unwrap();
    assert_eq!(mate.score, Score::Mate(1));
    assert_eq!(mate.best_move.as_deref(), Some("a1a8"));

    engine.new_game().unwrap();
    engine.close().unwrap();
}

#[test]
fn test_hanging_queen_is_a_blunder() {
    let Some(engine) = start_engine() else {
        return;
    };

    let mut game = GameRecord {
        url: "https://www.chess.com/game/live/1".to_string(),
        pgn: "1. e4 e5 2. Qh5 Nc6 3. Qxe5+ Nxe5 0-1".to_string(),
        end_time: 1_767_312_000,
        ..GameRecord::default()
    };
    game.white.username = "jay_fh".to_string();
    game.black.username = "opponent".to_string();

    let settings = AnalyzerSettings {
        show_progress: false,
        ..AnalyzerSettings::default()
    };
    let mut analyzer = MistakeAnalyzer::new(engine, settings);
    let analysis = analyzer.analyze_game(&game, "jay_fh").unwrap();

    let qxe5 = analysis.moves.last().unwrap();
    assert_eq!(qxe5.played, "Qxe5+");
    assert_eq!(qxe5.classification, MoveClassification::Blunder);
}
