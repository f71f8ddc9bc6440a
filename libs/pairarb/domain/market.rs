//! Market domain entities
//!
//! A pair market binds two complementary outcome tokens (Up and Down) whose
//! settlement payoffs sum to exactly one unit of collateral.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Time-to-expiry classification used to pick pricing parameters.
///
/// Markets enter tracking up to 30 minutes before expiry. `Premarket` covers
/// 15-30 minutes out, `Live` the final 15 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Live,
    Premarket,
}

impl Regime {
    /// Seconds-to-expiry boundary between the two regimes.
    pub const LIVE_HORIZON_SECS: i64 = 15 * 60;

    /// Outer admission boundary: markets further out are not tracked yet.
    pub const PREMARKET_HORIZON_SECS: i64 = 30 * 60;

    /// Classify a market by its remaining lifetime. Returns `None` when the
    /// market is already expired or still too far out to track.
    pub fn classify(end_time: DateTime<Utc>, now: DateTime<Utc>) -> Option<Regime> {
        let remaining = end_time.signed_duration_since(now).num_seconds();
        if remaining <= 0 {
            None
        } else if remaining <= Self::LIVE_HORIZON_SECS {
            Some(Regime::Live)
        } else if remaining <= Self::PREMARKET_HORIZON_SECS {
            Some(Regime::Premarket)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Live => "LIVE",
            Regime::Premarket => "PREMARKET",
        }
    }
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A binary Up/Down market admitted for tracking.
///
/// Immutable after admission except for `regime`, which flips
/// Premarket -> Live when the remaining lifetime crosses 15 minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairMarket {
    /// Condition id on the exchange
    pub id: String,
    /// Human-readable question, e.g. "Bitcoin Up or Down - 3:00PM-3:15PM ET"
    pub question: String,
    /// Token id of the Up outcome
    pub up_token: String,
    /// Token id of the Down outcome
    pub down_token: String,
    /// Settlement instant
    pub end_time: DateTime<Utc>,
    /// Current time-to-expiry classification
    pub regime: Regime,
}

impl PairMarket {
    /// Remaining lifetime at `now`. Negative once expired.
    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.end_time.signed_duration_since(now)
    }

    /// Terminal check: the exchange settles at expiry, nothing to trade after.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.time_to_expiry(now) <= Duration::zero()
    }

    /// Advance the regime if the market crossed into the live window.
    /// Returns true when a transition happened.
    pub fn refresh_regime(&mut self, now: DateTime<Utc>) -> bool {
        if self.regime == Regime::Premarket
            && self.time_to_expiry(now).num_seconds() <= Regime::LIVE_HORIZON_SECS
        {
            self.regime = Regime::Live;
            return true;
        }
        false
    }

    /// Both leg token ids, Up first.
    pub fn token_ids(&self) -> [&str; 2] {
        [&self.up_token, &self.down_token]
    }

    /// True when `token` is one of this market's legs.
    pub fn owns_token(&self, token: &str) -> bool {
        token == self.up_token || token == self.down_token
    }
}
