//! Fetch, analyse, summarise and save in one pass.

use std::path::PathBuf;

use crate::config::{AnalysisConfig, DATE_FORMAT};
use crate::engine::PositionEvaluator;
use crate::errors::{AnalysisError, Result};
use crate::games::{fetch_games, GameSource};
use crate::mistakes::MistakeAnalyzer;
use crate::report::AnalysisReport;

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub output_path: PathBuf,
    pub total_games: usize,
    pub analyzed_games: usize,
}

/// Run the whole analysis for `config`.
///
/// Months that fail to download are reported and skipped. When nothing at
/// all comes back the run fails with [`AnalysisError::NoGamesFound`] and no
/// file is written.
pub fn run<S, E>(config: &AnalysisConfig, source: &S, evaluator: E) -> Result<RunOutcome>
where
    S: GameSource + ?Sized,
    E: PositionEvaluator,
{
    config.validate()?;

    let start = config.range.start().format(DATE_FORMAT).to_string();
    let end = config.range.end().format(DATE_FORMAT).to_string();

    println!(
        "\n2. Fetching games for {} from {} to {}...",
        config.username, start, end
    );
    let fetched = fetch_games(source, &config.username, &config.range, &config.utc_offset);
    for month in &fetched.months {
        match &month.result {
            Ok(count) => println!("   ✓ {}: {} games", month.label(), count),
            Err(error) => println!("   ✗ {}: {}", month.label(), error),
        }
    }
    println!("\n   Total games fetched: {}", fetched.games.len());

    if fetched.games.is_empty() {
        return Err(AnalysisError::NoGamesFound {
            username: config.username.clone(),
            start,
            end,
        });
    }

    println!("\n3. Running Stockfish mistake analysis...");
    println!("   This may take a few minutes...");
    let mut analyzer = MistakeAnalyzer::new(evaluator, config.analyzer.clone());
    if let Some(max_games) = analyzer.settings().max_games {
        println!("   Sampling the {} most recent games", max_games);
    }
    let analysis = analyzer.aggregate_mistake_analysis(&fetched.games, &config.username)?;

    let sample = &analysis.sample_info;
    println!("   ✓ Analysis complete!");
    println!("   Games analyzed: {}", sample.analyzed_games);
    if sample.failed_games > 0 {
        println!("   Games skipped (unreadable PGN): {}", sample.failed_games);
    }
    println!("   Sample: {:.1}%", sample.sample_percentage);
    let analyzed_games = sample.analyzed_games;

    let report = AnalysisReport::new(config, fetched.games, analysis);

    println!("\n4. Analysis Summary:");
    report.display_summary();

    let output_path = config.output_path();
    println!("\n5. Saving results to file...");
    report.write_json(&output_path)?;
    println!("   ✓ Results saved to: {}", output_path.display());

    Ok(RunOutcome {
        output_path,
        total_games: report.metadata.total_games,
        analyzed_games,
    })
}
