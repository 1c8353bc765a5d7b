//! Engine-backed mistake aggregation.
//!
//! Every move the player made is scored by comparing the engine evaluation
//! before and after it, both from the player's side of the board. The drop
//! (centipawn loss) is classified against [`MistakeThresholds`] and bucketed
//! by game stage.

use chess::{Board, BoardStatus, Color, Piece};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;

use crate::engine::{Evaluation, PositionEvaluator, Score};
use crate::errors::{AnalysisError, Result};
use crate::games::GameRecord;
use crate::pgn::{self, PlyRecord};
use crate::{add_context, validation_error};

/// Evaluations beyond this are treated as "winning anyway"
pub const CP_CLAMP: i32 = 1_000;

/// Non-pawn material (both sides, N/B 3, R 5, Q 9) at or below which the
/// game counts as an endgame
pub const ENDGAME_MATERIAL: u32 = 26;

/// Centipawn-loss cut-offs for each classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MistakeThresholds {
    pub inaccuracy: i32,
    pub mistake: i32,
    pub blunder: i32,
}

impl Default for MistakeThresholds {
    fn default() -> Self {
        Self {
            inaccuracy: 50,
            mistake: 100,
            blunder: 300,
        }
    }
}

impl MistakeThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.inaccuracy <= 0 || self.inaccuracy >= self.mistake || self.mistake >= self.blunder {
            return Err(validation_error!(
                "thresholds",
                format!("{}/{}/{}", self.inaccuracy, self.mistake, self.blunder),
                "0 < inaccuracy < mistake < blunder"
            ));
        }
        Ok(())
    }

    pub fn classify(&self, cp_loss: i32) -> MoveClassification {
        if cp_loss >= self.blunder {
            MoveClassification::Blunder
        } else if cp_loss >= self.mistake {
            MoveClassification::Mistake
        } else if cp_loss >= self.inaccuracy {
            MoveClassification::Inaccuracy
        } else {
            MoveClassification::Good
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveClassification {
    Good,
    Inaccuracy,
    Mistake,
    Blunder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStage {
    Early,
    Middle,
    Endgame,
}

impl GameStage {
    pub const ALL: [GameStage; 3] = [GameStage::Early, GameStage::Middle, GameStage::Endgame];

    pub fn as_str(&self) -> &'static str {
        match self {
            GameStage::Early => "early",
            GameStage::Middle => "middle",
            GameStage::Endgame => "endgame",
        }
    }
}

impl fmt::Display for GameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sum of knight, bishop, rook and queen values for both sides
pub fn non_pawn_material(board: &Board) -> u32 {
    [
        (Piece::Knight, 3),
        (Piece::Bishop, 3),
        (Piece::Rook, 5),
        (Piece::Queen, 9),
    ]
    .iter()
    .map(|(piece, value)| board.pieces(*piece).popcnt() * value)
    .sum()
}

/// Stage of the game a move was played in.
///
/// Moves up to `opening_moves` are early. After that the position decides:
/// little material left, or queens off with at most six pieces, is an
/// endgame.
pub fn game_stage(board: &Board, move_number: u32, opening_moves: u32) -> GameStage {
    if move_number <= opening_moves {
        return GameStage::Early;
    }

    let queens = board.pieces(Piece::Queen).popcnt();
    let pieces = [Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen]
        .iter()
        .map(|p| board.pieces(*p).popcnt())
        .sum::<u32>();

    if non_pawn_material(board) <= ENDGAME_MATERIAL || (queens == 0 && pieces <= 6) {
        GameStage::Endgame
    } else {
        GameStage::Middle
    }
}

/// Centipawn loss of a move, both scores from the mover's side
pub fn centipawn_loss(before: Score, after: Score) -> i32 {
    let before = before.to_centipawns().clamp(-CP_CLAMP, CP_CLAMP);
    let after = after.to_centipawns().clamp(-CP_CLAMP, CP_CLAMP);
    (before - after).max(0)
}

/// Per-stage counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    pub total_moves: u32,
    pub inaccuracies: u32,
    pub mistakes: u32,
    pub blunders: u32,
    pub total_cp_loss: i64,
    pub avg_cp_loss: f64,
}

impl StageStats {
    fn record(&mut self, cp_loss: i32, classification: MoveClassification) {
        self.total_moves += 1;
        self.total_cp_loss += cp_loss as i64;
        match classification {
            MoveClassification::Inaccuracy => self.inaccuracies += 1,
            MoveClassification::Mistake => self.mistakes += 1,
            MoveClassification::Blunder => self.blunders += 1,
            MoveClassification::Good => {}
        }
    }

    fn finalize(&mut self) {
        self.avg_cp_loss = if self.total_moves > 0 {
            let avg = self.total_cp_loss as f64 / self.total_moves as f64;
            (avg * 10.0).round() / 10.0
        } else {
            0.0
        };
    }

    fn merge(&mut self, other: &StageStats) {
        self.total_moves += other.total_moves;
        self.inaccuracies += other.inaccuracies;
        self.mistakes += other.mistakes;
        self.blunders += other.blunders;
        self.total_cp_loss += other.total_cp_loss;
    }
}

/// Scoring of one move by the player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveAnalysis {
    pub ply: usize,
    pub move_number: u32,
    pub played: String,
    pub played_uci: String,
    /// Engine's choice in SAN, when it had one
    pub best_move: Option<String>,
    pub fen_before: String,
    /// Evaluation before the move, player's side, centipawns
    pub eval_before: i32,
    /// Evaluation after the move, player's side, centipawns
    pub eval_after: i32,
    pub cp_loss: i32,
    pub stage: GameStage,
    pub classification: MoveClassification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameAnalysis {
    pub url: String,
    pub end_time: i64,
    #[serde(with = "color_name")]
    pub color: Color,
    pub moves: Vec<MoveAnalysis>,
}

/// A flagged move together with the game it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MistakeExample {
    pub game_url: String,
    pub end_time: i64,
    #[serde(with = "color_name")]
    pub color: Color,
    #[serde(flatten)]
    pub details: MoveAnalysis,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleInfo {
    /// Games handed to the analyzer
    pub total_games: usize,
    /// Standard-rules games with a PGN in which the player took part
    pub eligible_games: usize,
    pub analyzed_games: usize,
    /// Games skipped because their PGN could not be replayed
    pub failed_games: usize,
    /// `analyzed_games / total_games * 100`
    pub sample_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MistakeAnalysis {
    pub early: StageStats,
    pub middle: StageStats,
    pub endgame: StageStats,
    pub sample_info: SampleInfo,
    pub thresholds: MistakeThresholds,
    pub worst_mistakes: Vec<MistakeExample>,
}

impl MistakeAnalysis {
    pub fn stage(&self, stage: GameStage) -> &StageStats {
        match stage {
            GameStage::Early => &self.early,
            GameStage::Middle => &self.middle,
            GameStage::Endgame => &self.endgame,
        }
    }

    fn stage_mut(&mut self, stage: GameStage) -> &mut StageStats {
        match stage {
            GameStage::Early => &mut self.early,
            GameStage::Middle => &mut self.middle,
            GameStage::Endgame => &mut self.endgame,
        }
    }

    /// All stages added together
    pub fn overall(&self) -> StageStats {
        let mut total = StageStats::default();
        for stage in GameStage::ALL {
            total.merge(self.stage(stage));
        }
        total.finalize();
        total
    }
}

/// Knobs for [`MistakeAnalyzer`]
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerSettings {
    pub thresholds: MistakeThresholds,
    /// Moves up to this full-move number count as early game
    pub opening_moves: u32,
    /// Analyse only the most recent N eligible games
    pub max_games: Option<usize>,
    /// How many flagged moves to keep in `worst_mistakes`
    pub worst_mistakes: usize,
    pub show_progress: bool,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            thresholds: MistakeThresholds::default(),
            opening_moves: 10,
            max_games: None,
            worst_mistakes: 10,
            show_progress: true,
        }
    }
}

pub struct MistakeAnalyzer<E: PositionEvaluator> {
    evaluator: E,
    settings: AnalyzerSettings,
}

impl<E: PositionEvaluator> MistakeAnalyzer<E> {
    pub fn new(evaluator: E, settings: AnalyzerSettings) -> Self {
        Self {
            evaluator,
            settings,
        }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub fn into_evaluator(self) -> E {
        self.evaluator
    }

    /// Analyse every eligible game of `username` and aggregate by stage.
    ///
    /// Games whose PGN cannot be replayed are skipped and counted in
    /// `failed_games`. Engine failures abort the whole analysis.
    pub fn aggregate_mistake_analysis(
        &mut self,
        games: &[GameRecord],
        username: &str,
    ) -> Result<MistakeAnalysis> {
        let mut eligible: Vec<&GameRecord> = games
            .iter()
            .filter(|game| {
                game.is_standard()
                    && !game.pgn.trim().is_empty()
                    && game.user_color(username).is_some()
            })
            .collect();
        let eligible_games = eligible.len();

        if let Some(max_games) = self.settings.max_games {
            eligible.sort_by_key(|game| Reverse(game.end_time));
            eligible.truncate(max_games);
        }
        eligible.sort_by_key(|game| game.end_time);

        let mut analysis = MistakeAnalysis {
            early: StageStats::default(),
            middle: StageStats::default(),
            endgame: StageStats::default(),
            sample_info: SampleInfo {
                total_games: games.len(),
                eligible_games,
                ..SampleInfo::default()
            },
            thresholds: self.settings.thresholds,
            worst_mistakes: Vec::new(),
        };
        let mut flagged: Vec<MistakeExample> = Vec::new();

        let pb = self.progress_bar(eligible.len());

        for game in eligible {
            match self.analyze_game(game, username) {
                Ok(game_analysis) => {
                    analysis.sample_info.analyzed_games += 1;
                    for mv in game_analysis.moves {
                        analysis.stage_mut(mv.stage).record(mv.cp_loss, mv.classification);
                        if mv.classification != MoveClassification::Good {
                            flagged.push(MistakeExample {
                                game_url: game_analysis.url.clone(),
                                end_time: game_analysis.end_time,
                                color: game_analysis.color,
                                details: mv,
                            });
                        }
                    }
                }
                Err(AnalysisError::InvalidGame(reason)) => {
                    tracing::warn!(url = %game.url, %reason, "skipping game");
                    analysis.sample_info.failed_games += 1;
                }
                Err(error) => {
                    pb.abandon();
                    return add_context!(Err(error), format!("Analysing {}", game.url));
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        for stage in GameStage::ALL {
            analysis.stage_mut(stage).finalize();
        }

        // Stable sort keeps chronological order among equal losses
        flagged.sort_by_key(|example| Reverse(example.details.cp_loss));
        flagged.truncate(self.settings.worst_mistakes);
        analysis.worst_mistakes = flagged;

        analysis.sample_info.sample_percentage = if games.is_empty() {
            0.0
        } else {
            analysis.sample_info.analyzed_games as f64 / games.len() as f64 * 100.0
        };

        Ok(analysis)
    }

    /// Score every move `username` made in one game
    pub fn analyze_game(&mut self, game: &GameRecord, username: &str) -> Result<GameAnalysis> {
        let color = game
            .user_color(username)
            .ok_or_else(|| crate::invalid_game!("{} did not play in {}", username, game.url))?;
        let parsed = pgn::parse_game(&game.pgn)?;

        self.evaluator.new_game()?;

        let mut moves = Vec::new();
        for ply in parsed.plies.iter().filter(|p| p.side == color) {
            moves.push(self.analyze_move(ply)?);
        }

        tracing::debug!(
            url = %game.url,
            result = parsed.header("Result").unwrap_or("*"),
            start = %parsed.starting_fen,
            moves = moves.len(),
            "game analysed"
        );
        Ok(GameAnalysis {
            url: game.url.clone(),
            end_time: game.end_time,
            color,
            moves,
        })
    }

    fn analyze_move(&mut self, ply: &PlyRecord) -> Result<MoveAnalysis> {
        let before = self.evaluate_board(&ply.board_before, &ply.fen_before)?;
        let after = self.evaluate_board(&ply.board_after, &ply.fen_after)?;

        let before_score = before.score;
        // `after` is from the opponent's side; Mate(0) has no sign to flip
        let after_score = if ply.board_after.status() == BoardStatus::Checkmate {
            Score::Centipawns(Score::MATE_VALUE)
        } else {
            after.score.flip()
        };

        let played_best = before.best_move.as_deref() == Some(ply.uci.as_str());
        let cp_loss = if played_best {
            0
        } else {
            centipawn_loss(before_score, after_score)
        };

        let best_move = before
            .best_move
            .as_deref()
            .and_then(|uci| pgn::move_from_uci(&ply.board_before, uci))
            .map(|m| pgn::san_for_move(&ply.board_before, m));

        Ok(MoveAnalysis {
            ply: ply.ply,
            move_number: ply.move_number,
            played: ply.san.clone(),
            played_uci: ply.uci.clone(),
            best_move,
            fen_before: ply.fen_before.clone(),
            eval_before: before_score.to_centipawns(),
            eval_after: after_score.to_centipawns(),
            cp_loss,
            stage: game_stage(&ply.board_before, ply.move_number, self.settings.opening_moves),
            classification: self.settings.thresholds.classify(cp_loss),
        })
    }

    /// Finished positions are scored without asking the engine
    fn evaluate_board(&mut self, board: &Board, fen: &str) -> Result<Evaluation> {
        match board.status() {
            BoardStatus::Checkmate => Ok(Evaluation {
                score: Score::Mate(0),
                best_move: None,
                depth: 0,
            }),
            BoardStatus::Stalemate => Ok(Evaluation {
                score: Score::Centipawns(0),
                best_move: None,
                depth: 0,
            }),
            BoardStatus::Ongoing => self.evaluator.evaluate(fen),
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.settings.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let template =
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} games ({eta})";
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

mod color_name {
    use chess::Color;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(color: &Color, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match color {
            Color::White => "white",
            Color::Black => "black",
        })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
        match String::deserialize(deserializer)?.as_str() {
            "white" => Ok(Color::White),
            "black" => Ok(Color::Black),
            other => Err(serde::de::Error::unknown_variant(other, &["white", "black"])),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::str::FromStr;

    /// Evaluator answering from a FEN table, 0 cp otherwise
    #[derive(Default)]
    struct TableEvaluator {
        scores: HashMap<String, Evaluation>,
        calls: usize,
        new_games: usize,
    }

    impl PositionEvaluator for TableEvaluator {
        fn evaluate(&mut self, fen: &str) -> Result<Evaluation> {
            self.calls += 1;
            Ok(self.scores.get(fen).cloned().unwrap_or(Evaluation {
                score: Score::Centipawns(0),
                best_move: None,
                depth: 12,
            }))
        }

        fn new_game(&mut self) -> Result<()> {
            self.new_games += 1;
            Ok(())
        }
    }

    struct BrokenEvaluator;

    impl PositionEvaluator for BrokenEvaluator {
        fn evaluate(&mut self, _fen: &str) -> Result<Evaluation> {
            Err(crate::engine_error!("Engine closed its output"))
        }
    }

    const SCHOLARS_MATE: &str = "1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7# 1-0";

    fn scholars_game(end_time: i64) -> GameRecord {
        let mut game = GameRecord {
            url: format!("https://www.chess.com/game/live/{}", end_time),
            pgn: SCHOLARS_MATE.to_string(),
            end_time,
            rules: Some("chess".to_string()),
            ..GameRecord::default()
        };
        game.white.username = "opponent".to_string();
        game.black.username = "Jay_FH".to_string();
        game
    }

    fn quiet_settings() -> AnalyzerSettings {
        AnalyzerSettings {
            show_progress: false,
            ..AnalyzerSettings::default()
        }
    }

    /// Position after 3...Nf6: White mates in one
    fn mate_threat_table() -> TableEvaluator {
        let parsed = pgn::parse_game(SCHOLARS_MATE).unwrap();
        let after_nf6 = parsed.plies[5].fen_after.clone();
        let before_nf6 = parsed.plies[5].fen_before.clone();

        let mut table = TableEvaluator::default();
        table.scores.insert(
            after_nf6,
            Evaluation {
                score: Score::Mate(1),
                best_move: Some("h5f7".to_string()),
                depth: 12,
            },
        );
        table.scores.insert(
            before_nf6,
            Evaluation {
                score: Score::Centipawns(-20),
                best_move: Some("g7g6".to_string()),
                depth: 12,
            },
        );
        table
    }

    #[test]
    fn test_classify_thresholds() {
        let thresholds = MistakeThresholds::default();
        assert_eq!(thresholds.classify(0), MoveClassification::Good);
        assert_eq!(thresholds.classify(49), MoveClassification::Good);
        assert_eq!(thresholds.classify(50), MoveClassification::Inaccuracy);
        assert_eq!(thresholds.classify(100), MoveClassification::Mistake);
        assert_eq!(thresholds.classify(299), MoveClassification::Mistake);
        assert_eq!(thresholds.classify(300), MoveClassification::Blunder);
        assert!(thresholds.validate().is_ok());

        let inverted = MistakeThresholds {
            inaccuracy: 100,
            mistake: 50,
            blunder: 300,
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_centipawn_loss() {
        assert_eq!(centipawn_loss(Score::Centipawns(50), Score::Centipawns(-100)), 150);
        // Improving never counts as negative loss
        assert_eq!(centipawn_loss(Score::Centipawns(-100), Score::Centipawns(50)), 0);
        // Both sides of the clamp: +1500 to +1100 is still "winning"
        assert_eq!(centipawn_loss(Score::Centipawns(1500), Score::Centipawns(1100)), 0);
        // Missing a forced mate but staying winning costs nothing extra
        assert_eq!(centipawn_loss(Score::Mate(3), Score::Centipawns(900)), 100);
        // Walking into a mate
        assert_eq!(centipawn_loss(Score::Centipawns(0), Score::Mate(-2)), 1000);
    }

    #[test]
    fn test_game_stage() {
        let start = Board::default();
        assert_eq!(game_stage(&start, 5, 10), GameStage::Early);
        assert_eq!(game_stage(&start, 11, 10), GameStage::Middle);

        // Rook + bishop each: 16 points of material
        let endgame = Board::from_str("4k3/pp3b1r/8/8/8/8/PP3B1R/4K3 w - - 0 40").unwrap();
        assert_eq!(non_pawn_material(&endgame), 16);
        assert_eq!(game_stage(&endgame, 40, 10), GameStage::Endgame);
        // Still early by move number
        assert_eq!(game_stage(&endgame, 8, 10), GameStage::Early);

        // Queens off, two rooks and a knight each: 26 material, endgame
        let rooks =
            Board::from_str("r3k2r/ppp2ppp/2n5/8/8/2N5/PPP2PPP/R3K2R w KQkq - 0 20").unwrap();
        assert_eq!(game_stage(&rooks, 20, 10), GameStage::Endgame);

        // Queens and minor pieces on board
        let middle = Board::from_str(
            "r1bq1rk1/ppp2ppp/2n2n2/3pp3/2B1P3/2NP1N2/PPP2PPP/R1BQ1RK1 w - - 0 9",
        )
        .unwrap();
        assert_eq!(game_stage(&middle, 12, 10), GameStage::Middle);
    }

    #[test]
    fn test_analyze_game_flags_blunder_into_mate() {
        let mut analyzer = MistakeAnalyzer::new(mate_threat_table(), quiet_settings());
        let analysis = analyzer.analyze_game(&scholars_game(1_767_300_000), "jay_fh").unwrap();

        assert_eq!(analysis.color, Color::Black);
        assert_eq!(analysis.moves.len(), 3);

        let nf6 = &analysis.moves[2];
        assert_eq!(nf6.played, "Nf6");
        assert_eq!(nf6.move_number, 3);
        assert_eq!(nf6.eval_before, -20);
        assert_eq!(nf6.eval_after, -9_990);
        assert_eq!(nf6.cp_loss, 980);
        assert_eq!(nf6.classification, MoveClassification::Blunder);
        assert_eq!(nf6.stage, GameStage::Early);
        assert_eq!(nf6.best_move.as_deref(), Some("g6"));

        assert!(analysis.moves[..2]
            .iter()
            .all(|m| m.classification == MoveClassification::Good));

        let evaluator = analyzer.into_evaluator();
        assert_eq!(evaluator.new_games, 1);
        // Three black moves, two positions each
        assert_eq!(evaluator.calls, 6);
    }

    #[test]
    fn test_playing_engine_move_costs_nothing() {
        let parsed = pgn::parse_game(SCHOLARS_MATE).unwrap();
        let mut table = TableEvaluator::default();
        // e5 is the engine's pick, but the shallow after-score looks worse
        table.scores.insert(
            parsed.plies[1].fen_before.clone(),
            Evaluation {
                score: Score::Centipawns(-30),
                best_move: Some("e7e5".to_string()),
                depth: 12,
            },
        );
        table.scores.insert(
            parsed.plies[1].fen_after.clone(),
            Evaluation {
                score: Score::Centipawns(80),
                best_move: None,
                depth: 12,
            },
        );

        let mut analyzer = MistakeAnalyzer::new(table, quiet_settings());
        let analysis = analyzer.analyze_game(&scholars_game(1), "jay_fh").unwrap();
        assert_eq!(analysis.moves[0].cp_loss, 0);
        assert_eq!(analysis.moves[0].best_move.as_deref(), Some("e5"));
    }

    #[test]
    fn test_mating_move_is_scored_without_engine() {
        let mut game = scholars_game(1);
        // Analyse from White's side this time
        game.white.username = "jay_fh".to_string();
        game.black.username = "opponent".to_string();

        let mut analyzer = MistakeAnalyzer::new(mate_threat_table(), quiet_settings());
        let analysis = analyzer.analyze_game(&game, "jay_fh").unwrap();

        let mate = analysis.moves.last().unwrap();
        assert_eq!(mate.played, "Qxf7#");
        assert_eq!(mate.cp_loss, 0);
        assert_eq!(mate.eval_after, Score::MATE_VALUE);
    }

    #[test]
    fn test_aggregate_mistake_analysis() {
        let mut broken = scholars_game(3);
        broken.pgn = "1. e4 e5 2. Ke3 *".to_string();

        let mut variant = scholars_game(4);
        variant.rules = Some("chess960".to_string());

        let mut stranger = scholars_game(5);
        stranger.black.username = "someone_else".to_string();

        let games = vec![scholars_game(1), scholars_game(2), broken, variant, stranger];

        let mut analyzer = MistakeAnalyzer::new(mate_threat_table(), quiet_settings());
        let analysis = analyzer.aggregate_mistake_analysis(&games, "jay_fh").unwrap();

        assert_eq!(analysis.sample_info.total_games, 5);
        assert_eq!(analysis.sample_info.eligible_games, 3);
        assert_eq!(analysis.sample_info.analyzed_games, 2);
        assert_eq!(analysis.sample_info.failed_games, 1);
        assert!((analysis.sample_info.sample_percentage - 40.0).abs() < 1e-9);

        assert_eq!(analysis.early.total_moves, 6);
        assert_eq!(analysis.early.blunders, 2);
        assert_eq!(analysis.early.total_cp_loss, 1960);
        assert!((analysis.early.avg_cp_loss - 326.7).abs() < 1e-9);
        assert_eq!(analysis.middle, StageStats::default());
        assert_eq!(analysis.endgame.total_moves, 0);

        assert_eq!(analysis.worst_mistakes.len(), 2);
        assert_eq!(analysis.worst_mistakes[0].end_time, 1);
        assert_eq!(analysis.worst_mistakes[0].details.played, "Nf6");

        let overall = analysis.overall();
        assert_eq!(overall.total_moves, 6);
        assert_eq!(overall.blunders, 2);
    }

    #[test]
    fn test_max_games_samples_most_recent() {
        let games = vec![scholars_game(10), scholars_game(30), scholars_game(20)];
        let settings = AnalyzerSettings {
            max_games: Some(2),
            worst_mistakes: 5,
            ..quiet_settings()
        };

        let mut analyzer = MistakeAnalyzer::new(mate_threat_table(), settings);
        let analysis = analyzer.aggregate_mistake_analysis(&games, "jay_fh").unwrap();

        assert_eq!(analysis.sample_info.eligible_games, 3);
        assert_eq!(analysis.sample_info.analyzed_games, 2);
        let times: Vec<i64> = analysis.worst_mistakes.iter().map(|m| m.end_time).collect();
        assert_eq!(times, vec![20, 30]);
    }

    #[test]
    fn test_engine_failure_aborts() {
        let mut analyzer = MistakeAnalyzer::new(BrokenEvaluator, quiet_settings());
        let result = analyzer.aggregate_mistake_analysis(&[scholars_game(1)], "jay_fh");

        match result {
            Err(AnalysisError::ChainedError { source, context }) => {
                assert!(context.contains("https://www.chess.com/game/live/1"));
                assert!(matches!(*source, AnalysisError::EngineError(_)));
            }
            other => panic!("Expected ChainedError, got {:?}", other),
        }
    }

    #[test]
    fn test_analysis_serializes_stage_keys() {
        let mut analyzer = MistakeAnalyzer::new(mate_threat_table(), quiet_settings());
        let analysis = analyzer
            .aggregate_mistake_analysis(&[scholars_game(1)], "jay_fh")
            .unwrap();
        let value = serde_json::to_value(&analysis).unwrap();

        for key in ["early", "middle", "endgame", "sample_info", "worst_mistakes"] {
            assert!(value.get(key).is_some(), "missing {}", key);
        }
        assert_eq!(value["early"]["blunders"], 1);
        assert_eq!(value["worst_mistakes"][0]["color"], "black");
        assert_eq!(value["worst_mistakes"][0]["classification"], "blunder");
        assert_eq!(value["worst_mistakes"][0]["stage"], "early");
        assert_eq!(value["worst_mistakes"][0]["played"], "Nf6");
    }
}
