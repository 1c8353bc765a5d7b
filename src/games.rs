//! Archived game records and the month-by-month fetch loop.

use chess::Color;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::DateRange;
use crate::errors::Result;

/// One side of an archived game
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u32>,
    /// `win`, `checkmated`, `resigned`, `timeout`, `agreed`, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Accuracies {
    pub white: f64,
    pub black: f64,
}

/// A single game as returned by the monthly archive.
///
/// Fields the analysis does not read are kept in `extra` so the game list
/// written to the report carries everything the archive sent. Typed optional
/// fields are written only when present: an explicit `null` from the archive
/// comes back out as a missing key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub pgn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_control: Option<String>,
    /// Unix seconds; 0 when the archive omits it
    #[serde(default)]
    pub end_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eco: Option<String>,
    #[serde(default)]
    pub white: PlayerInfo,
    #[serde(default)]
    pub black: PlayerInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracies: Option<Accuracies>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GameRecord {
    /// Which colour `username` played, compared case-insensitively
    pub fn user_color(&self, username: &str) -> Option<Color> {
        if self.white.username.eq_ignore_ascii_case(username) {
            Some(Color::White)
        } else if self.black.username.eq_ignore_ascii_case(username) {
            Some(Color::Black)
        } else {
            None
        }
    }

    /// Standard chess; variants such as chess960 or bughouse are not
    pub fn is_standard(&self) -> bool {
        self.rules.as_deref().map_or(true, |rules| rules == "chess")
    }

    pub fn ended_at(&self, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
        DateTime::from_timestamp(self.end_time, 0).map(|utc| utc.with_timezone(offset))
    }
}

/// Body of `GET /pub/player/{user}/games/{YYYY}/{MM}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonthlyArchive {
    #[serde(default)]
    pub games: Vec<GameRecord>,
}

/// Anything that can hand out a player's games one month at a time
pub trait GameSource {
    fn games_for_month(&self, username: &str, year: i32, month: u32) -> Result<Vec<GameRecord>>;
}

impl<S: GameSource + ?Sized> GameSource for &S {
    fn games_for_month(&self, username: &str, year: i32, month: u32) -> Result<Vec<GameRecord>> {
        (**self).games_for_month(username, year, month)
    }
}

impl<S: GameSource + ?Sized> GameSource for Box<S> {
    fn games_for_month(&self, username: &str, year: i32, month: u32) -> Result<Vec<GameRecord>> {
        (**self).games_for_month(username, year, month)
    }
}

/// What happened to one month bucket
#[derive(Debug, Clone, PartialEq)]
pub struct MonthOutcome {
    pub year: i32,
    pub month: u32,
    /// Games kept after date filtering, or the error message
    pub result: std::result::Result<usize, String>,
}

impl MonthOutcome {
    pub fn label(&self) -> String {
        format!("{}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Games inside the range, oldest first
    pub games: Vec<GameRecord>,
    pub months: Vec<MonthOutcome>,
}

impl FetchReport {
    pub fn failed_months(&self) -> impl Iterator<Item = &MonthOutcome> {
        self.months.iter().filter(|m| m.result.is_err())
    }
}

/// Fetch every month touched by `range` and keep the games that ended
/// inside it. A month that fails to load is recorded and skipped.
pub fn fetch_games<S: GameSource + ?Sized>(
    source: &S,
    username: &str,
    range: &DateRange,
    offset: &FixedOffset,
) -> FetchReport {
    let mut report = FetchReport::default();

    for (year, month) in range.months() {
        let result = match source.games_for_month(username, year, month) {
            Ok(batch) => {
                let fetched = batch.len();
                let before = report.games.len();
                report.games.extend(
                    batch
                        .into_iter()
                        .filter(|game| range.contains_timestamp(game.end_time, offset)),
                );
                let kept = report.games.len() - before;
                tracing::debug!(year, month, fetched, kept, "fetched month");
                Ok(kept)
            }
            Err(error) => {
                tracing::warn!(year, month, error = %error, "failed to fetch month");
                Err(error.to_string())
            }
        };
        report.months.push(MonthOutcome { year, month, result });
    }

    report.games.sort_by_key(|game| game.end_time);
    report
}
