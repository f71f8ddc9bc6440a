//! Live order-book cache
//!
//! Single writer (the market feed task), many readers (market sessions and
//! the executor). Reads answer from the last committed snapshot and go dark
//! once a book ages past the freshness horizon, so a dead feed degrades to
//! "no data" instead of stale quotes.

use crate::domain::orderbook::{micros_to_f64, Orderbook, PriceLevel};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::time::Duration;

/// Default freshness horizon: books older than this answer "no data".
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(5);

pub struct BookCache {
    books: DashMap<String, Orderbook>,
    subscribed: RwLock<HashSet<String>>,
    freshness: Duration,
}

impl BookCache {
    pub fn new(freshness: Duration) -> Self {
        Self {
            books: DashMap::new(),
            subscribed: RwLock::new(HashSet::new()),
            freshness,
        }
    }

    /// Register interest in a set of tokens. Idempotent; returns the number
    /// of tokens that were not already subscribed.
    pub fn subscribe(&self, token_ids: &[String]) -> usize {
        let mut subscribed = self.subscribed.write();
        token_ids
            .iter()
            .filter(|t| subscribed.insert((*t).clone()))
            .count()
    }

    /// All tokens registered so far (used for resubscription after reconnect).
    pub fn subscriptions(&self) -> Vec<String> {
        self.subscribed.read().iter().cloned().collect()
    }

    /// Replace the stored book for a token with a full snapshot.
    pub fn apply_snapshot(&self, token_id: &str, bids: &[PriceLevel], asks: &[PriceLevel]) {
        let mut entry = self
            .books
            .entry(token_id.to_string())
            .or_insert_with(|| Orderbook::new(token_id.to_string()));
        entry.apply_snapshot(bids, asks);
    }

    /// Refresh a book's freshness stamp without touching levels.
    pub fn touch(&self, token_id: &str) {
        if let Some(mut book) = self.books.get_mut(token_id) {
            book.touch();
        }
    }

    fn is_fresh(&self, book: &Orderbook) -> bool {
        book.seconds_since_update() <= self.freshness.as_secs_f64()
    }

    /// Best ask as (price, size), or `None` when absent, empty or stale.
    pub fn best_ask(&self, token_id: &str) -> Option<(f64, f64)> {
        let book = self.books.get(token_id)?;
        if !self.is_fresh(&book) {
            return None;
        }
        book.best_ask()
            .map(|(p, s)| (micros_to_f64(p), micros_to_f64(s)))
    }

    /// Best bid as (price, size), or `None` when absent, empty or stale.
    pub fn best_bid(&self, token_id: &str) -> Option<(f64, f64)> {
        let book = self.books.get(token_id)?;
        if !self.is_fresh(&book) {
            return None;
        }
        book.best_bid()
            .map(|(p, s)| (micros_to_f64(p), micros_to_f64(s)))
    }

    /// True iff both books exist and were updated within the horizon.
    pub fn is_fresh_pair(&self, token_a: &str, token_b: &str) -> bool {
        let fresh = |token: &str| {
            self.books
                .get(token)
                .map(|b| self.is_fresh(&b))
                .unwrap_or(false)
        };
        fresh(token_a) && fresh(token_b)
    }

    /// Age of the stored book in seconds, ignoring the freshness horizon.
    pub fn book_age_secs(&self, token_id: &str) -> Option<f64> {
        self.books.get(token_id).map(|b| b.seconds_since_update())
    }
}

impl Default for BookCache {
    fn default() -> Self {
        Self::new(DEFAULT_FRESHNESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: &str, size: &str) -> PriceLevel {
        PriceLevel {
            price: price.to_string(),
            size: size.to_string(),
        }
    }

    #[test]
    fn test_no_data_before_first_snapshot() {
        let cache = BookCache::default();
        cache.subscribe(&["tok".to_string()]);
        assert_eq!(cache.best_ask("tok"), None);
        assert_eq!(cache.best_bid("tok"), None);
        assert!(!cache.is_fresh_pair("tok", "other"));
    }

    #[test]
    fn test_snapshot_answers_best_of_book() {
        let cache = BookCache::default();
        cache.apply_snapshot(
            "tok",
            &[level("0.47", "100"), level("0.45", "50")],
            &[level("0.49", "10"), level("0.51", "20")],
        );
        assert_eq!(cache.best_ask("tok"), Some((0.49, 10.0)));
        assert_eq!(cache.best_bid("tok"), Some((0.47, 100.0)));
    }

    #[test]
    fn test_snapshot_fully_replaces_prior_state() {
        let cache = BookCache::default();
        cache.apply_snapshot("tok", &[level("0.47", "100")], &[level("0.49", "10")]);
        cache.apply_snapshot("tok", &[level("0.40", "5")], &[level("0.55", "7")]);
        assert_eq!(cache.best_ask("tok"), Some((0.55, 7.0)));
        assert_eq!(cache.best_bid("tok"), Some((0.40, 5.0)));
    }

    #[test]
    fn test_staleness_hides_data() {
        let cache = BookCache::new(Duration::from_millis(30));
        cache.apply_snapshot("tok", &[level("0.47", "100")], &[level("0.49", "10")]);
        assert!(cache.best_ask("tok").is_some());

        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(cache.best_ask("tok"), None);
        assert_eq!(cache.best_bid("tok"), None);
        assert!(!cache.is_fresh_pair("tok", "tok"));

        // A price_change touch revives the stored snapshot
        cache.touch("tok");
        assert_eq!(cache.best_ask("tok"), Some((0.49, 10.0)));
    }

    #[test]
    fn test_subscribe_idempotent() {
        let cache = BookCache::default();
        let tokens = vec!["a".to_string(), "b".to_string()];
        assert_eq!(cache.subscribe(&tokens), 2);
        assert_eq!(cache.subscribe(&tokens), 0);
        assert_eq!(cache.subscriptions().len(), 2);
    }

    #[test]
    fn test_fresh_pair_requires_both() {
        let cache = BookCache::default();
        cache.apply_snapshot("a", &[], &[level("0.49", "10")]);
        assert!(!cache.is_fresh_pair("a", "b"));
        cache.apply_snapshot("b", &[], &[level("0.50", "10")]);
        assert!(cache.is_fresh_pair("a", "b"));
    }
}
