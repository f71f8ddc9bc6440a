//! Arbitrage executor (taker fast path)
//!
//! When the two asks sum below one, buying both legs at market locks the
//! difference with no directional exposure. The executor's invariant is
//! strict equal exposure: every committed Up share is matched by a Down
//! share, and any partial success that breaks this triggers an immediate
//! reversal to zero or blocks the market.
//!
//! A single global trade lock keeps at most one executor trade in flight
//! engine-wide.

use crate::application::stats::EngineStats;
use crate::domain::market::PairMarket;
use crate::infrastructure::book_cache::BookCache;
use crate::infrastructure::config::{RecoveryTuning, ScanTuning};
use crate::infrastructure::gateway::{ExchangeGateway, GatewayError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Price used for "market" orders: a limit that crosses the whole book.
const CROSSING_BUY_PRICE: f64 = 0.99;

/// Price used for reversal sells: a limit at the floor that hits any bid.
const REVERSAL_SELL_PRICE: f64 = 0.01;

/// A crossing-arbitrage opportunity observed in the books.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub market: PairMarket,
    pub ask_up: f64,
    pub ask_down: f64,
    pub available_up: f64,
    pub available_down: f64,
    pub executable_shares: u64,
    pub edge: f64,
}

/// Terminal result of one executor attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TradeOutcome {
    /// Equal deltas on both legs; market is done for this cycle
    Completed { shares: u64, combined_cost: f64 },
    /// Positions unchanged; the opportunity may still be there next scan
    Retryable { reason: String },
    /// Irrecoverable imbalance; market needs operator action
    Blocked { reason: String },
}

pub struct ArbExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    books: Arc<BookCache>,
    scan: ScanTuning,
    recovery: RecoveryTuning,
    stats: Arc<EngineStats>,
    /// Global mutual exclusion: one trade in flight engine-wide
    trade_lock: Mutex<()>,
}

impl ArbExecutor {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        books: Arc<BookCache>,
        scan: ScanTuning,
        recovery: RecoveryTuning,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            gateway,
            books,
            scan,
            recovery,
            stats,
            trade_lock: Mutex::new(()),
        }
    }

    /// Check one market for a crossing arbitrage.
    pub async fn scan_market(
        &self,
        market: &PairMarket,
        now: DateTime<Utc>,
    ) -> Option<Opportunity> {
        if market.time_to_expiry(now).num_seconds() <= self.scan.expiry_cutoff_secs as i64 {
            return None;
        }

        let (ask_up, available_up) = self.best_ask(&market.up_token).await?;
        let (ask_down, available_down) = self.best_ask(&market.down_token).await?;

        let combined = ask_up + ask_down;
        if combined >= 1.0 - self.scan.min_edge {
            return None;
        }

        let executable_shares = available_up
            .min(available_down)
            .min(self.scan.max_shares as f64)
            .floor() as u64;
        if executable_shares == 0 {
            return None;
        }

        Some(Opportunity {
            market: market.clone(),
            ask_up,
            ask_down,
            available_up,
            available_down,
            executable_shares,
            edge: 1.0 - combined,
        })
    }

    /// Execute an opportunity under the equal-exposure protocol.
    pub async fn execute(&self, opp: &Opportunity) -> anyhow::Result<TradeOutcome> {
        let _guard = self.trade_lock.lock().await;
        let market = &opp.market;

        info!(
            "[{}] Executing arb: asks {:.3}+{:.3}={:.3}, edge {:.3}",
            market.id,
            opp.ask_up,
            opp.ask_down,
            opp.ask_up + opp.ask_down,
            opp.edge
        );

        // Starting positions; stale exposure from a previous process must be
        // cleared before we commit anything new
        let (up_0, down_0) = self.sample_pair(market).await?;
        if up_0 != down_0 {
            warn!(
                "[{}] Pre-existing imbalance {}/{}, attempting reversal",
                market.id, up_0, down_0
            );
            if !self.reverse_to_zero(market).await? {
                return Ok(TradeOutcome::Blocked {
                    reason: format!("pre-existing imbalance {}/{} not reversible", up_0, down_0),
                });
            }
        }
        let (up_0, down_0) = self.sample_pair(market).await?;

        // First leg: probe DOWN with a crossing buy
        let shares = opp.executable_shares.min(self.scan.min_shares);
        let down_order = match self
            .gateway
            .place_limit_buy(&market.down_token, CROSSING_BUY_PRICE, shares as f64)
            .await
        {
            Ok(id) => id,
            Err(GatewayError::Transient(msg)) | Err(GatewayError::Rejected(msg)) => {
                return Ok(TradeOutcome::Retryable {
                    reason: format!("down leg placement failed: {}", msg),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let f_down = self
            .read_fill(&down_order, &market.down_token, down_0)
            .await;
        let _ = self.gateway.cancel(&down_order).await;

        if f_down == 0 {
            return Ok(TradeOutcome::Retryable {
                reason: "down leg did not fill".to_string(),
            });
        }

        // Second leg: buy exactly the filled DOWN size of UP
        match self
            .gateway
            .place_limit_buy(&market.up_token, CROSSING_BUY_PRICE, f_down as f64)
            .await
        {
            Ok(up_order) => {
                let _ = self.gateway.cancel(&up_order).await;
            }
            Err(e) => warn!("[{}] Up leg placement failed: {}", market.id, e),
        }

        // Final sample decides the outcome
        let (up_1, down_1) = self.sample_pair(market).await?;
        let delta_up = up_1.saturating_sub(up_0);
        let delta_down = down_1.saturating_sub(down_0);

        if delta_up == delta_down && delta_up > 0 {
            let combined_cost = opp.ask_up + opp.ask_down;
            self.stats.incr_arbs_executed();
            self.stats
                .add_realized_pnl((1.0 - combined_cost) * delta_up as f64);
            info!(
                "[{}] Arb complete: {} pairs at {:.3}",
                market.id, delta_up, combined_cost
            );
            self.stats.emit(format!(
                "ARB {} {} pairs at {:.3}",
                market.id, delta_up, combined_cost
            ));
            return Ok(TradeOutcome::Completed {
                shares: delta_up,
                combined_cost,
            });
        }

        warn!(
            "[{}] Imbalanced after execution: deltas {}/{}, reversing",
            market.id, delta_up, delta_down
        );
        if self.reverse_to_zero(market).await? {
            Ok(TradeOutcome::Retryable {
                reason: format!("imbalance {}/{} reversed to zero", delta_up, delta_down),
            })
        } else {
            Ok(TradeOutcome::Blocked {
                reason: format!("imbalance {}/{} could not be reversed", delta_up, delta_down),
            })
        }
    }

    /// Close all position in both tokens via aggressive sells. Returns true
    /// when both legs read zero afterwards.
    async fn reverse_to_zero(&self, market: &PairMarket) -> anyhow::Result<bool> {
        // Just-bought tokens need a beat before they can be sold back
        sleep(self.recovery.settlement_delay()).await;

        for attempt in 1..=self.recovery.cutloss_attempts {
            let (up, down) = self.sample_pair(market).await?;
            if up == 0 && down == 0 {
                return Ok(true);
            }

            debug!(
                "[{}] Reversal attempt {}: positions {}/{}",
                market.id, attempt, up, down
            );

            for (token, pos) in [(&market.up_token, up), (&market.down_token, down)] {
                if pos == 0 {
                    continue;
                }
                match self
                    .gateway
                    .place_limit_sell(token, REVERSAL_SELL_PRICE, pos as f64)
                    .await
                {
                    Ok(_) | Err(GatewayError::PositionClosed(_)) => {}
                    Err(e) => warn!("[{}] Reversal sell failed: {}", market.id, e),
                }
            }

            sleep(self.recovery.cutloss_poll()).await;
        }

        let (up, down) = self.sample_pair(market).await?;
        Ok(up == 0 && down == 0)
    }

    async fn sample_pair(&self, market: &PairMarket) -> anyhow::Result<(u64, u64)> {
        let up = self.gateway.position(&market.up_token).await?;
        let down = self.gateway.position(&market.down_token).await?;
        Ok((up, down))
    }

    /// Filled size of an order: the exchange's matched field when available,
    /// the position delta otherwise.
    async fn read_fill(&self, order_id: &str, token: &str, pos_before: u64) -> u64 {
        if let Ok(Some(matched)) = self.gateway.order_fill(order_id).await {
            if matched > 0.0 {
                return matched.floor() as u64;
            }
        }
        match self.gateway.position(token).await {
            Ok(now) => now.saturating_sub(pos_before),
            Err(e) => {
                warn!("Fill read fallback failed for {}: {}", token, e);
                0
            }
        }
    }

    /// Best ask with size: cache preferred, REST fallback.
    async fn best_ask(&self, token: &str) -> Option<(f64, f64)> {
        if let Some(best) = self.books.best_ask(token) {
            return Some(best);
        }
        match self.gateway.fetch_book(token).await {
            Ok(top) => top.best_ask(),
            Err(e) => {
                debug!("REST book fallback failed for {}: {}", token, e);
                None
            }
        }
    }
}
