use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::chess_com::ArchiveConfig;
use crate::engine::EngineConfig;
use crate::errors::Result;
use crate::mistakes::AnalyzerSettings;
use crate::{config_error, validation_error};

/// Date format accepted on the command line and written to the report
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Inclusive calendar date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(validation_error!(
                "date_range",
                format!("{} to {}", start, end),
                "start date on or before end date"
            ));
        }
        Ok(Self { start, end })
    }

    /// Parse two `YYYY-MM-DD` dates
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start = NaiveDate::parse_from_str(start.trim(), DATE_FORMAT)?;
        let end = NaiveDate::parse_from_str(end.trim(), DATE_FORMAT)?;
        Self::new(start, end)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Every (year, month) bucket touched by the range, in order
    pub fn months(&self) -> Vec<(i32, u32)> {
        let mut months = Vec::new();
        let (mut year, mut month) = (self.start.year(), self.start.month());
        let last = (self.end.year(), self.end.month());

        while (year, month) <= last {
            months.push((year, month));
            if month == 12 {
                year += 1;
                month = 1;
            } else {
                month += 1;
            }
        }

        months
    }

    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Whether a unix timestamp falls on a day inside the range, as seen
    /// from `offset`. The whole end day is included.
    pub fn contains_timestamp(&self, timestamp: i64, offset: &FixedOffset) -> bool {
        DateTime::from_timestamp(timestamp, 0)
            .map(|utc| self.contains_date(utc.with_timezone(offset).date_naive()))
            .unwrap_or(false)
    }
}

/// Parse a UTC offset such as `+07:00`, `-0530`, `+7`, `Z` or `UTC`
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset> {
    let trimmed = raw.trim();
    let invalid = || validation_error!("utc_offset", raw, "+HH:MM, -HHMM, Z or UTC");

    if ["z", "utc", "gmt"].iter().any(|z| trimmed.eq_ignore_ascii_case(z)) {
        return Ok(Utc.fix());
    }

    let (sign, rest) = match trimmed.chars().next() {
        Some('+') => (1, &trimmed[1..]),
        Some('-') => (-1, &trimmed[1..]),
        _ => return Err(invalid()),
    };

    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit() || c == ':') {
        return Err(invalid());
    }

    let (hours, minutes) = if let Some((h, m)) = rest.split_once(':') {
        (h, m)
    } else if rest.len() == 4 {
        rest.split_at(2)
    } else {
        (rest, "0")
    };

    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes >= 60 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Everything one analysis run needs
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub username: String,
    pub range: DateRange,
    /// Free-form label written into the report metadata
    pub timezone: String,
    /// Offset used to decide which day a game ended on
    pub utc_offset: FixedOffset,
    pub archive: ArchiveConfig,
    pub engine: EngineConfig,
    pub analyzer: AnalyzerSettings,
    /// Explicit output file; overrides `output_dir`
    pub output: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl AnalysisConfig {
    /// Config with default engine, archive and analyzer settings.
    /// Surrounding whitespace is stripped from `username`.
    pub fn new(username: impl Into<String>, range: DateRange) -> Self {
        let username: String = username.into();
        Self {
            username: username.trim().to_string(),
            range,
            timezone: "UTC".to_string(),
            utc_offset: Utc.fix(),
            archive: ArchiveConfig::default(),
            engine: EngineConfig::default(),
            analyzer: AnalyzerSettings::default(),
            output: None,
            output_dir: PathBuf::from("."),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            return Err(config_error!("username must not be empty"));
        }
        if self.username.contains('/') || self.username.contains(char::is_whitespace) {
            return Err(validation_error!(
                "username",
                self.username,
                "a chess.com username without spaces or slashes"
            ));
        }
        if self.engine.depth == 0 {
            return Err(validation_error!("depth", 0, "at least 1"));
        }
        if self.engine.stockfish_path.trim().is_empty() {
            return Err(config_error!("stockfish path must not be empty"));
        }
        if self.analyzer.max_games == Some(0) {
            return Err(validation_error!("max_games", 0, "at least 1 when set"));
        }
        self.analyzer.thresholds.validate()?;
        Ok(())
    }

    /// True when `timezone` names something other than UTC while the
    /// filtering offset is still zero
    pub fn timezone_label_ignored(&self) -> bool {
        let label_is_utc = ["utc", "gmt", "z", "etc/utc", "utc+0", "+00:00"]
            .iter()
            .any(|utc| self.timezone.trim().eq_ignore_ascii_case(utc));
        !label_is_utc && self.utc_offset.local_minus_utc() == 0
    }

    /// Where the report will be written
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => self.output_dir.join(default_file_name(&self.username, &self.range)),
        }
    }
}

/// `stockfish_analysis_<user>_<start>_to_<end>.json`
pub fn default_file_name(username: &str, range: &DateRange) -> String {
    format!(
        "stockfish_analysis_{}_{}_to_{}.json",
        username,
        range.start().format(DATE_FORMAT),
        range.end().format(DATE_FORMAT)
    )
}

/// Formats an offset as `+HH:MM`
pub fn format_utc_offset(offset: &FixedOffset) -> String {
    offset.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_range_rejects_inverted_dates() {
        assert!(DateRange::parse("2026-02-01", "2026-01-31").is_err());
        assert!(DateRange::parse("2026-01-31", "2026-01-31").is_ok());
        assert!(DateRange::parse("2026-13-01", "2026-12-31").is_err());
    }

    #[test]
    fn test_months_single_month() {
        let range = DateRange::parse("2026-01-01", "2026-01-31").unwrap();
        assert_eq!(range.months(), vec![(2026, 1)]);
    }

    #[test]
    fn test_months_cross_year_boundary() {
        let range = DateRange::parse("2025-11-15", "2026-02-03").unwrap();
        assert_eq!(
            range.months(),
            vec![(2025, 11), (2025, 12), (2026, 1), (2026, 2)]
        );
    }

    #[test]
    fn test_contains_timestamp_includes_whole_end_day() {
        let range = DateRange::parse("2026-01-01", "2026-01-31").unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();

        // 2026-01-31T23:30:00Z
        assert!(range.contains_timestamp(1_769_902_200, &utc));
        // 2026-02-01T00:00:00Z
        assert!(!range.contains_timestamp(1_769_904_000, &utc));
        // 2025-12-31T23:59:59Z
        assert!(!range.contains_timestamp(1_767_225_599, &utc));
        assert!(!range.contains_timestamp(0, &utc));
    }

    #[test]
    fn test_contains_timestamp_respects_offset() {
        let range = DateRange::parse("2026-02-01", "2026-02-28").unwrap();
        let bangkok = parse_utc_offset("+07:00").unwrap();
        let utc = parse_utc_offset("UTC").unwrap();

        // 2026-01-31T20:00:00Z is already February 1st in Bangkok
        let ts = 1_769_889_600;
        assert!(range.contains_timestamp(ts, &bangkok));
        assert!(!range.contains_timestamp(ts, &utc));
    }

    #[test]
    fn test_parse_utc_offset_forms() {
        assert_eq!(parse_utc_offset("+07:00").unwrap().local_minus_utc(), 7 * 3600);
        assert_eq!(parse_utc_offset("-0530").unwrap().local_minus_utc(), -(5 * 3600 + 1800));
        assert_eq!(parse_utc_offset("+7").unwrap().local_minus_utc(), 7 * 3600);
        assert_eq!(parse_utc_offset("Z").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("utc").unwrap().local_minus_utc(), 0);
        assert!(parse_utc_offset("Bangkok").is_err());
        assert!(parse_utc_offset("+25:00").is_err());
        assert!(parse_utc_offset("+07:75").is_err());
        assert!(parse_utc_offset("+").is_err());
    }

    #[test]
    fn test_output_path() {
        let range = DateRange::new(date("2026-01-01"), date("2026-01-31")).unwrap();
        let mut config = AnalysisConfig::new("jay_fh", range);
        config.output_dir = PathBuf::from("out");
        assert_eq!(
            config.output_path(),
            PathBuf::from("out/stockfish_analysis_jay_fh_2026-01-01_to_2026-01-31.json")
        );

        config.output = Some(PathBuf::from("custom.json"));
        assert_eq!(config.output_path(), PathBuf::from("custom.json"));
    }

    #[test]
    fn test_validate() {
        let range = DateRange::parse("2026-01-01", "2026-01-31").unwrap();
        let config = AnalysisConfig::new("jay_fh", range);
        assert!(config.validate().is_ok());

        let mut bad = config.clone();
        bad.username = "  ".to_string();
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.engine.depth = 0;
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.analyzer.max_games = Some(0);
        assert!(bad.validate().is_err());

        let mut bad = config.clone();
        bad.username = " jay_fh".to_string();
        assert!(bad.validate().is_err());

        let mut bad = config;
        bad.analyzer.thresholds.mistake = 10;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_new_trims_username() {
        let range = DateRange::parse("2026-01-01", "2026-01-31").unwrap();
        let config = AnalysisConfig::new("  jay_fh \n", range);
        assert_eq!(config.username, "jay_fh");
        assert!(config.validate().is_ok());
        assert!(config
            .output_path()
            .ends_with("stockfish_analysis_jay_fh_2026-01-01_to_2026-01-31.json"));
    }

    #[test]
    fn test_timezone_label_ignored() {
        let range = DateRange::parse("2026-01-01", "2026-01-31").unwrap();
        let mut config = AnalysisConfig::new("jay_fh", range);
        assert!(!config.timezone_label_ignored());

        config.timezone = "Bangkok".to_string();
        assert!(config.timezone_label_ignored());

        config.utc_offset = parse_utc_offset("+07:00").unwrap();
        assert!(!config.timezone_label_ignored());

        config.timezone = "GMT".to_string();
        config.utc_offset = parse_utc_offset("Z").unwrap();
        assert!(!config.timezone_label_ignored());
    }
}
