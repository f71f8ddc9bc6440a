//! Orderbook domain entities
//!
//! Compact orderbook keyed by integer micros for fast comparison:
//! - Sorted Vec levels, cache-friendly for the shallow books these markets have
//! - Asks ascending, bids descending, so best-of-side is O(1)
//! - A monotonic `last_updated` stamp backing the freshness contract

use serde::{Deserialize, Serialize};
use std::time::Instant;

// =============================================================================
// Price Level
// =============================================================================

/// Price level as delivered on the wire. Strings avoid float precision drift.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: String,
    pub size: String,
}

impl PriceLevel {
    pub fn price_f64(&self) -> f64 {
        self.price.parse().unwrap_or(0.0)
    }

    pub fn size_f64(&self) -> f64 {
        self.size.parse().unwrap_or(0.0)
    }
}

// =============================================================================
// Price Conversion
// =============================================================================

/// Convert a decimal string (e.g. "0.48") to integer micros (480000).
#[inline]
pub fn price_to_micros(price: &str) -> u64 {
    (price.parse::<f64>().unwrap_or(0.0) * 1_000_000.0).round() as u64
}

/// Convert integer micros back to f64.
#[inline]
pub fn micros_to_f64(micros: u64) -> f64 {
    micros as f64 / 1_000_000.0
}

// =============================================================================
// OrderbookSide
// =============================================================================

/// One side of the book as (price_micros, size_micros) pairs.
#[derive(Debug, Clone)]
pub struct OrderbookSide {
    levels: Vec<(u64, u64)>,
    /// True for bids (descending), false for asks (ascending)
    is_bid: bool,
}

impl OrderbookSide {
    pub fn new(is_bid: bool) -> Self {
        Self {
            levels: Vec::with_capacity(32),
            is_bid,
        }
    }

    /// Replace the entire side with snapshot data. Zero-size levels dropped.
    pub fn replace(&mut self, levels: &[PriceLevel]) {
        self.levels.clear();
        self.levels.reserve(levels.len());

        for level in levels {
            let price = price_to_micros(&level.price);
            let size = price_to_micros(&level.size);
            if size > 0 {
                self.levels.push((price, size));
            }
        }

        if self.is_bid {
            self.levels.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        } else {
            self.levels.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        }
    }

    /// Best level of the side: highest bid or lowest ask.
    #[inline]
    pub fn best(&self) -> Option<(u64, u64)> {
        self.levels.first().copied()
    }

    #[inline]
    pub fn levels(&self) -> &[(u64, u64)] {
        &self.levels
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Sum of sizes across all levels, in micros.
    pub fn total_liquidity(&self) -> u64 {
        self.levels.iter().map(|(_, s)| s).sum()
    }
}

// =============================================================================
// Orderbook
// =============================================================================

/// Complete orderbook for one outcome token.
///
/// Snapshots fully replace both sides. Incremental price_change events only
/// refresh `last_updated`; the stored levels always reflect the last full
/// snapshot. No sequence-number gap recovery is attempted.
#[derive(Debug, Clone)]
pub struct Orderbook {
    pub token_id: String,
    pub bids: OrderbookSide,
    pub asks: OrderbookSide,
    last_updated: Instant,
}

impl Orderbook {
    pub fn new(token_id: String) -> Self {
        Self {
            token_id,
            bids: OrderbookSide::new(true),
            asks: OrderbookSide::new(false),
            last_updated: Instant::now(),
        }
    }

    /// Apply a full snapshot, replacing both sides and refreshing the stamp.
    pub fn apply_snapshot(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.bids.replace(bids);
        self.asks.replace(asks);
        self.last_updated = Instant::now();
    }

    /// Refresh the update stamp without touching levels (price_change events).
    pub fn touch(&mut self) {
        self.last_updated = Instant::now();
    }

    /// Seconds since the last snapshot or touch.
    pub fn seconds_since_update(&self) -> f64 {
        self.last_updated.elapsed().as_secs_f64()
    }

    /// Best bid (highest buy price) as (price, size) in micros.
    #[inline]
    pub fn best_bid(&self) -> Option<(u64, u64)> {
        self.bids.best()
    }

    /// Best ask (lowest sell price) as (price, size) in micros.
    #[inline]
    pub fn best_ask(&self) -> Option<(u64, u64)> {
        self.asks.best()
    }

    /// Spread in micros. Positive whenever the book is not crossed.
    pub fn spread(&self) -> Option<i64> {
        match (self.best_bid(), self.best_ask()) {
            (Some((bid, _)), Some((ask, _))) => Some(ask as i64 - bid as i64),
            _ => None,
        }
    }

    /// One-line summary for logging.
    pub fn format_summary(&self) -> String {
        let bid_str = self
            .best_bid()
            .map(|(p, s)| format!("{:.3} ({:.1})", micros_to_f64(p), micros_to_f64(s)))
            .unwrap_or_else(|| "N/A".to_string());
        let ask_str = self
            .best_ask()
            .map(|(p, s)| format!("{:.3} ({:.1})", micros_to_f64(p), micros_to_f64(s)))
            .unwrap_or_else(|| "N/A".to_string());
        format!("Bid: {} | Ask: {}", bid_str, ask_str)
    }
}

// =============================================================================
// Tests
// =============================================================================
