//! The JSON report written at the end of a run, and its console summary.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::config::{format_utc_offset, AnalysisConfig, DATE_FORMAT};
use crate::errors::Result;
use crate::games::GameRecord;
use crate::mistakes::{GameStage, MistakeAnalysis};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub username: String,
    pub start_date: String,
    pub end_date: String,
    pub timezone: String,
    pub utc_offset: String,
    /// Local time the report was produced, RFC 3339
    pub analysis_date: String,
    pub total_games: usize,
    pub engine_depth: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub metadata: ReportMetadata,
    pub mistake_analysis: MistakeAnalysis,
    /// Every fetched game, as the archive returned it
    pub games: Vec<GameRecord>,
}

impl AnalysisReport {
    pub fn new(config: &AnalysisConfig, games: Vec<GameRecord>, analysis: MistakeAnalysis) -> Self {
        let metadata = ReportMetadata {
            username: config.username.clone(),
            start_date: config.range.start().format(DATE_FORMAT).to_string(),
            end_date: config.range.end().format(DATE_FORMAT).to_string(),
            timezone: config.timezone.clone(),
            utc_offset: format_utc_offset(&config.utc_offset),
            analysis_date: Local::now().to_rfc3339(),
            total_games: games.len(),
            engine_depth: config.engine.depth,
        };

        Self {
            metadata,
            mistake_analysis: analysis,
            games,
        }
    }

    /// Pretty-printed JSON, creating parent directories as needed
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        tracing::info!(path = %path.display(), games = self.games.len(), "report written");
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Per-stage table; stages without moves are left out
    pub fn display_summary(&self) {
        print!("{}", self.summary());
    }

    pub fn summary(&self) -> String {
        let analysis = &self.mistake_analysis;
        let mut out = String::new();

        for stage in GameStage::ALL {
            let stats = analysis.stage(stage);
            if stats.total_moves == 0 {
                continue;
            }
            out.push_str(&format!("\n   {}:\n", stage.as_str().to_uppercase()));
            out.push_str(&format!("     Moves analyzed: {}\n", stats.total_moves));
            out.push_str(&format!("     Inaccuracies: {}\n", stats.inaccuracies));
            out.push_str(&format!("     Mistakes: {}\n", stats.mistakes));
            out.push_str(&format!("     Blunders: {}\n", stats.blunders));
            out.push_str(&format!("     Avg CP Loss: {:.1}\n", stats.avg_cp_loss));
        }

        if let Some(worst) = analysis.worst_mistakes.first() {
            out.push_str(&format!(
                "\n   Worst move: {}{} {} ({:?}, -{} cp, best was {})\n     {}\n",
                worst.details.move_number,
                if worst.color == chess::Color::White { "." } else { "..." },
                worst.details.played,
                worst.details.classification,
                worst.details.cp_loss,
                worst.details.best_move.as_deref().unwrap_or("?"),
                worst.game_url
            ));
        }

        out
    }
}
