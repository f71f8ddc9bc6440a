//! Market discovery
//!
//! Periodically pulls candidate markets from the catalog and filters down to
//! the BTC Up/Down family: a time-window question ("3:00PM-3:15PM") that
//! mentions bitcoin, with exactly an Up and a Down outcome. Survivors are
//! classified into the LIVE / PREMARKET regime by time-to-expiry.

use crate::domain::market::{PairMarket, Regime};
use crate::infrastructure::client::gamma::{GammaClient, GammaMarket};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use tracing::{debug, warn};

/// Question pattern for 15-minute window markets, e.g. "3:00PM-3:15PM".
const WINDOW_PATTERN: &str = r"\d{1,2}:\d{2}(AM|PM)-\d{1,2}:\d{2}(AM|PM)";

pub struct DiscoveryService {
    gamma: GammaClient,
    series_id: Option<String>,
    window_pattern: Regex,
    /// Markets expiring within this window are not worth admitting
    expiry_cutoff: Duration,
}

impl DiscoveryService {
    pub fn new(gamma: GammaClient, series_id: Option<String>, expiry_cutoff_secs: u64) -> Self {
        Self {
            gamma,
            series_id,
            window_pattern: Regex::new(WINDOW_PATTERN).expect("window pattern is valid"),
            expiry_cutoff: Duration::seconds(expiry_cutoff_secs as i64),
        }
    }

    /// Fetch the catalog and return every admissible Up/Down market.
    pub async fn discover(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<PairMarket>> {
        let events = self
            .gamma
            .get_active_events(self.series_id.as_deref())
            .await?;

        let mut markets = Vec::new();
        for event in events {
            for market in &event.markets {
                if let Some(pair) = self.classify(market, now) {
                    markets.push(pair);
                }
            }
        }

        debug!("Discovery produced {} candidate markets", markets.len());
        Ok(markets)
    }

    /// Validate and classify a single catalog market.
    pub fn classify(&self, market: &GammaMarket, now: DateTime<Utc>) -> Option<PairMarket> {
        if !self.is_updown_question(&market.question) {
            return None;
        }

        let condition_id = market.condition_id.as_deref()?;

        let outcomes = match market.parse_outcomes() {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!("Market {} has unparseable outcomes: {}", condition_id, e);
                return None;
            }
        };
        let token_ids = match market.parse_token_ids() {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Market {} has unparseable token ids: {}", condition_id, e);
                return None;
            }
        };

        let (up_idx, down_idx) = up_down_indices(&outcomes)?;
        if token_ids.len() != outcomes.len() {
            warn!(
                "Market {} token/outcome count mismatch ({} vs {})",
                condition_id,
                token_ids.len(),
                outcomes.len()
            );
            return None;
        }

        let end_date = market.end_date.as_deref()?;
        let end_time = match DateTime::parse_from_rfc3339(end_date) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                warn!("Market {} has unparseable endDate {}: {}", condition_id, end_date, e);
                return None;
            }
        };

        // Too close to settlement to be worth admitting
        if end_time.signed_duration_since(now) <= self.expiry_cutoff {
            return None;
        }

        let regime = Regime::classify(end_time, now)?;

        Some(PairMarket {
            id: condition_id.to_string(),
            question: market.question.clone(),
            up_token: token_ids[up_idx].clone(),
            down_token: token_ids[down_idx].clone(),
            end_time,
            regime,
        })
    }

    /// BTC Up/Down family: a clock window in the question plus a bitcoin
    /// reference, case-insensitive.
    pub fn is_updown_question(&self, question: &str) -> bool {
        if !self.window_pattern.is_match(question) {
            return false;
        }
        let lower = question.to_lowercase();
        lower.contains("bitcoin") || lower.contains("btc")
    }
}

/// Indices of the Up and Down outcomes; the market must carry exactly these
/// two, in either order.
fn up_down_indices(outcomes: &[String]) -> Option<(usize, usize)> {
    if outcomes.len() != 2 {
        return None;
    }
    let lower: Vec<String> = outcomes.iter().map(|o| o.to_lowercase()).collect();
    match (lower[0].as_str(), lower[1].as_str()) {
        ("up", "down") => Some((0, 1)),
        ("down", "up") => Some((1, 0)),
        _ => None,
    }
}
