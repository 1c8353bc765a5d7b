//! Blocking client for the public chess.com game archive.
//!
//! `GET {base}/pub/player/{username}/games/{YYYY}/{MM}` returns every game the
//! player finished that month. Rate limiting (429) and server errors are
//! retried with backoff; anything else is reported to the caller.

use std::time::Duration;

use crate::errors::resilience::{retry_with_backoff, RetryConfig};
use crate::errors::{AnalysisError, Result};
use crate::games::{GameRecord, GameSource, MonthlyArchive};

pub const DEFAULT_API_BASE_URL: &str = "https://api.chess.com";

/// chess.com asks API consumers to identify themselves
pub const DEFAULT_USER_AGENT: &str = concat!(
    env!("CARGO_PKG_NAME"),
    "/",
    env!("CARGO_PKG_VERSION")
);

/// Longest error body kept in an [`AnalysisError::HttpStatus`]
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 30,
            retry: RetryConfig::default(),
        }
    }
}

pub struct ChessComClient {
    client: reqwest::blocking::Client,
    config: ArchiveConfig,
}

impl ChessComClient {
    pub fn new(config: ArchiveConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn month_url(&self, username: &str, year: i32, month: u32) -> String {
        format!(
            "{}/pub/player/{}/games/{}/{:02}",
            self.config.base_url.trim_end_matches('/'),
            username.to_lowercase(),
            year,
            month
        )
    }

    fn fetch_archive(&self, url: &str) -> Result<MonthlyArchive> {
        let response = self.client.get(url).send()?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        let body = response.text()?;
        serde_json::from_str(&body)
            .map_err(|e| AnalysisError::IoError(format!("Malformed archive from {}: {}", url, e)))
    }
}

impl GameSource for ChessComClient {
    fn games_for_month(&self, username: &str, year: i32, month: u32) -> Result<Vec<GameRecord>> {
        let url = self.month_url(username, year, month);
        tracing::debug!(%url, "requesting monthly archive");

        let archive = retry_with_backoff(&format!("GET {}", url), &self.config.retry, || {
            self.fetch_archive(&url)
        })?;
        Ok(archive.games)
    }
}
