//! Gamma Markets API client (market catalog)
//!
//! Discovery reads the events endpoint and drills into nested markets. Only
//! the fields the engine consumes are modelled; `outcomes` and
//! `clobTokenIds` arrive JSON-encoded inside strings and get parsed lazily.

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum GammaError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Deserialization failed: {0}")]
    DeserializeFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,
}

pub type Result<T> = std::result::Result<T, GammaError>;

/// Event from the catalog with its nested markets.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub markets: Vec<GammaMarket>,
}

/// Market within an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub condition_id: Option<String>,
    pub question: String,
    #[serde(default)]
    pub end_date: Option<String>,
    /// JSON-encoded array of outcome names, e.g. `"[\"Up\", \"Down\"]"`
    #[serde(default)]
    pub outcomes: Option<String>,
    /// JSON-encoded array of CLOB token ids
    #[serde(default)]
    pub clob_token_ids: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
}

impl GammaMarket {
    /// Decode the JSON-encoded outcome names.
    pub fn parse_outcomes(&self) -> Result<Vec<String>> {
        let raw = self
            .outcomes
            .as_deref()
            .ok_or_else(|| GammaError::DeserializeFailed("missing outcomes".to_string()))?;
        serde_json::from_str(raw).map_err(|e| GammaError::DeserializeFailed(e.to_string()))
    }

    /// Decode the JSON-encoded token ids.
    pub fn parse_token_ids(&self) -> Result<Vec<String>> {
        let raw = self
            .clob_token_ids
            .as_deref()
            .ok_or_else(|| GammaError::DeserializeFailed("missing clobTokenIds".to_string()))?;
        serde_json::from_str(raw).map_err(|e| GammaError::DeserializeFailed(e.to_string()))
    }
}

/// Gamma API client.
pub struct GammaClient {
    base_url: String,
    client: Client,
}

impl GammaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    /// Fetch active, unclosed events, optionally restricted to a series.
    pub async fn get_active_events(&self, series_id: Option<&str>) -> Result<Vec<GammaEvent>> {
        let mut all_events = Vec::new();
        let mut offset = 0;
        const LIMIT: usize = 100;

        loop {
            let events = self.get_events_page(series_id, LIMIT, offset).await?;
            let count = events.len();
            debug!("Fetched {} events (offset {})", count, offset);
            all_events.extend(events);

            if count < LIMIT {
                break;
            }
            offset += LIMIT;

            // Rate limit protection between pages
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        Ok(all_events)
    }

    async fn get_events_page(
        &self,
        series_id: Option<&str>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<GammaEvent>> {
        let url = format!("{}/events", self.base_url);

        let mut params = vec![
            ("active".to_string(), "true".to_string()),
            ("closed".to_string(), "false".to_string()),
            ("limit".to_string(), limit.to_string()),
            ("offset".to_string(), offset.to_string()),
        ];
        if let Some(series_id) = series_id {
            params.push(("series_id".to_string(), series_id.to_string()));
        }

        let response = self.client.get(&url).query(&params).send().await?;
        let status = response.status();

        if status == 429 {
            warn!("Gamma rate limit exceeded");
            return Err(GammaError::RateLimitExceeded);
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(GammaError::ApiError(format!(
                "Failed to fetch events ({}): {}",
                status, error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| GammaError::DeserializeFailed(e.to_string()))
    }
}
