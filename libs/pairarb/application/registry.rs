//! Market registry
//!
//! The set of markets the engine currently tracks plus the append-only
//! completed and blocked sets. The Supervisor is the only mutator of the
//! active map; sessions read their own slot. Entries never leave the
//! completed/blocked sets while the process lives, which keeps every
//! admission and trade-attempt check a plain membership test.

use crate::domain::market::PairMarket;
use dashmap::{DashMap, DashSet};
use tokio::task::JoinHandle;
use tracing::debug;

/// Handle to a tracked market and its spawned tasks.
pub struct ActiveMarket {
    pub market: PairMarket,
    /// Session + feed tasks; aborted on removal
    pub tasks: Vec<JoinHandle<()>>,
}

pub struct MarketRegistry {
    active: DashMap<String, ActiveMarket>,
    completed: DashSet<String>,
    blocked: DashSet<String>,
}

impl MarketRegistry {
    pub fn new() -> Self {
        Self {
            active: DashMap::new(),
            completed: DashSet::new(),
            blocked: DashSet::new(),
        }
    }

    /// A market is admissible when it is not already tracked and has never
    /// completed or blocked this engine cycle.
    pub fn can_admit(&self, market_id: &str) -> bool {
        !self.active.contains_key(market_id)
            && !self.completed.contains(market_id)
            && !self.blocked.contains(market_id)
    }

    pub fn insert_active(&self, market: PairMarket, tasks: Vec<JoinHandle<()>>) {
        debug!("Registry: tracking market {}", market.id);
        self.active
            .insert(market.id.clone(), ActiveMarket { market, tasks });
    }

    /// Remove a market and abort its tasks. Used by the expiry sweep.
    pub fn remove(&self, market_id: &str) -> Option<PairMarket> {
        self.active.remove(market_id).map(|(_, active)| {
            for task in &active.tasks {
                task.abort();
            }
            debug!("Registry: removed market {}", market_id);
            active.market
        })
    }

    /// Reap entries whose tasks have all finished. Returns removed ids.
    pub fn sweep_finished(&self) -> Vec<String> {
        let finished: Vec<String> = self
            .active
            .iter()
            .filter(|e| e.value().tasks.iter().all(|t| t.is_finished()))
            .map(|e| e.key().clone())
            .collect();
        for id in &finished {
            self.active.remove(id);
            debug!("Registry: reaped finished market {}", id);
        }
        finished
    }

    /// Mark a market completed (executor success). Append-only.
    pub fn mark_completed(&self, market_id: &str) {
        self.completed.insert(market_id.to_string());
    }

    /// Mark a market blocked. Append-only; permanent until restart.
    pub fn mark_blocked(&self, market_id: &str) {
        self.blocked.insert(market_id.to_string());
    }

    pub fn is_completed(&self, market_id: &str) -> bool {
        self.completed.contains(market_id)
    }

    pub fn is_blocked(&self, market_id: &str) -> bool {
        self.blocked.contains(market_id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.active.iter().map(|e| e.key().clone()).collect()
    }

    pub fn active_markets(&self) -> Vec<PairMarket> {
        self.active.iter().map(|e| e.value().market.clone()).collect()
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }
}

impl Default for MarketRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Regime;
    use chrono::{Duration, Utc};

    fn market(id: &str) -> PairMarket {
        PairMarket {
            id: id.to_string(),
            question: "Bitcoin Up or Down - 3:00PM-3:15PM ET".to_string(),
            up_token: format!("{}-up", id),
            down_token: format!("{}-down", id),
            end_time: Utc::now() + Duration::seconds(600),
            regime: Regime::Live,
        }
    }

    #[test]
    fn test_admission_gates() {
        let registry = MarketRegistry::new();
        assert!(registry.can_admit("m1"));

        registry.insert_active(market("m1"), vec![]);
        assert!(!registry.can_admit("m1"));

        registry.remove("m1");
        assert!(registry.can_admit("m1"));

        registry.mark_blocked("m1");
        assert!(!registry.can_admit("m1"));

        registry.mark_completed("m2");
        assert!(!registry.can_admit("m2"));
    }

    #[test]
    fn test_blocked_is_permanent() {
        let registry = MarketRegistry::new();
        registry.mark_blocked("m1");
        assert!(registry.is_blocked("m1"));
        // Removal of active state does not touch the blocked set
        registry.remove("m1");
        assert!(registry.is_blocked("m1"));
    }

    #[test]
    fn test_active_accessors() {
        let registry = MarketRegistry::new();
        registry.insert_active(market("m1"), vec![]);
        registry.insert_active(market("m2"), vec![]);
        assert_eq!(registry.active_count(), 2);
        let mut ids = registry.active_ids();
        ids.sort();
        assert_eq!(ids, vec!["m1", "m2"]);
    }
}
