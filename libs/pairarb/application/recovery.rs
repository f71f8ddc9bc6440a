//! One-sided fill recovery
//!
//! A quote cycle that fills only one leg leaves directional exposure that
//! settles to zero or one, not to a locked pair. Recovery tries, in order:
//! complete the other leg aggressively while the unwind premium stays inside
//! the accepted bound, wait a bounded window for the other ask to improve,
//! then cut the filled leg loose. Whatever the path, the market is never
//! re-entered afterwards.

use super::session::{MarketSession, MarketStatus};
use crate::infrastructure::gateway::GatewayError;
use std::time::Instant;
use tokio::time::sleep;
use tracing::{info, warn};

/// Result of the aggressive-complete attempt.
enum CompleteOutcome {
    Completed,
    TimedOut,
}

impl MarketSession {
    /// Entry point: exactly one of the two legs holds shares.
    pub(crate) async fn recover_one_sided(&mut self, filled_is_up: bool) -> anyhow::Result<()> {
        let (filled_token, other_token) = if filled_is_up {
            (self.market.up_token.clone(), self.market.down_token.clone())
        } else {
            (self.market.down_token.clone(), self.market.up_token.clone())
        };
        let filled_shares = if filled_is_up {
            self.observed_up
        } else {
            self.observed_down
        };
        let entry_price = if filled_is_up {
            self.last_up_bid
        } else {
            self.last_down_bid
        };

        self.stats.incr_fills();
        info!(
            "[{}] One-sided fill: {} shares of {} at {:.3}",
            self.market.id,
            filled_shares,
            if filled_is_up { "Up" } else { "Down" },
            entry_price
        );
        self.stats.emit(format!(
            "ONE_SIDED {} {} shares {}",
            self.market.id,
            filled_shares,
            if filled_is_up { "Up" } else { "Down" }
        ));

        // Nothing else may rest while we work the imbalance
        self.cancel_market_orders().await?;
        self.clear_quote_state();

        // A fill larger than one order's worth means something upstream
        // duplicated orders; complete only one order's worth and let
        // cut-loss deal with the excess. Caps the worst-case unwind cost.
        let complete_size = filled_shares.min(self.quoting.shares_per_order);
        if complete_size < filled_shares {
            warn!(
                "[{}] Filled {} shares exceeds size_per_order {}, completing only {}",
                self.market.id, filled_shares, self.quoting.shares_per_order, complete_size
            );
        }

        let accept_ceiling = 1.0 + self.recovery.max_unwind_loss;
        let wait_deadline = Instant::now() + self.recovery.improve_wait();

        // Price-improvement loop; the first pass covers the cheap case
        loop {
            if let Some(ask) = self.side_ask(&other_token).await {
                let would_pay = entry_price + ask;
                if would_pay <= accept_ceiling {
                    match self
                        .aggressive_complete(&other_token, complete_size, ask, would_pay)
                        .await?
                    {
                        CompleteOutcome::Completed => return Ok(()),
                        CompleteOutcome::TimedOut => break,
                    }
                }
                info!(
                    "[{}] Completion too expensive (would pay {:.3}), waiting for improvement",
                    self.market.id, would_pay
                );
            }

            if Instant::now() >= wait_deadline {
                info!("[{}] No price improvement in time", self.market.id);
                break;
            }
            sleep(self.recovery.improve_poll()).await;
        }

        self.cut_loss(&filled_token, filled_shares).await
    }

    /// Cross the spread on the unfilled side for `size` shares, then poll
    /// positions until matched or the wait expires.
    async fn aggressive_complete(
        &mut self,
        other_token: &str,
        size: u64,
        ask: f64,
        would_pay: f64,
    ) -> anyhow::Result<CompleteOutcome> {
        self.status = MarketStatus::AggressiveComplete;
        let price = (ask + 0.01).min(0.99);

        info!(
            "[{}] Aggressive complete: BUY {} @ {:.3} (pair cost {:.3})",
            self.market.id, size, price, would_pay
        );

        let order_id = match self
            .gateway
            .place_limit_buy(other_token, price, size as f64)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                warn!("[{}] Aggressive complete placement failed: {}", self.market.id, e);
                return Ok(CompleteOutcome::TimedOut);
            }
        };

        let deadline = Instant::now() + self.recovery.complete_wait();
        loop {
            sleep(self.recovery.complete_poll()).await;

            match self.sample_positions().await {
                Ok(()) => {
                    let (pos_up, pos_down) = (self.observed_up, self.observed_down);
                    let matched =
                        pos_up > 0 && pos_down > 0 && pos_up.abs_diff(pos_down) <= 1;
                    if matched {
                        self.cancel_market_orders().await?;
                        let pairs = pos_up.min(pos_down);
                        let realized = (1.0 - would_pay) * pairs as f64;
                        self.stats.add_realized_pnl(realized);
                        self.stats.incr_completes();
                        info!(
                            "[{}] Recovery complete: {}/{} shares, realised {:.4}",
                            self.market.id, pos_up, pos_down, realized
                        );
                        self.stats.emit(format!(
                            "RECOVERED {} {} pairs, pnl {:.4}",
                            self.market.id, pairs, realized
                        ));
                        self.set_holding("one-sided recovery");
                        return Ok(CompleteOutcome::Completed);
                    }
                }
                Err(GatewayError::Transient(msg)) => {
                    warn!("[{}] Position poll failed: {}", self.market.id, msg);
                }
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                warn!("[{}] Aggressive complete timed out", self.market.id);
                let _ = self.gateway.cancel(&order_id).await;
                return Ok(CompleteOutcome::TimedOut);
            }
        }
    }

    /// Unwind the filled leg with bounded sell attempts. Whatever the
    /// outcome, this market is done for the cycle: a clean exit blocks it
    /// from re-entry, a residual blocks it with an operator notice.
    async fn cut_loss(&mut self, filled_token: &str, filled_shares: u64) -> anyhow::Result<()> {
        self.stats.incr_cut_losses();
        info!("[{}] Cut-loss: unwinding {}", self.market.id, filled_token);

        let _ = self.cancel_market_orders().await;
        // Give a just-bought token time to settle before selling it back
        sleep(self.recovery.settlement_delay()).await;

        let mut residual: u64 = filled_shares;

        for attempt in 1..=self.recovery.cutloss_attempts {
            residual = match self.gateway.position(filled_token).await {
                Ok(pos) => pos,
                Err(e) => {
                    warn!("[{}] Position sample failed in cut-loss: {}", self.market.id, e);
                    sleep(self.recovery.cutloss_poll()).await;
                    continue;
                }
            };

            if residual == 0 {
                break;
            }

            let price = match self.side_bid(filled_token).await {
                Some(bid) => (bid - 0.01).max(0.01),
                None => 0.01,
            };

            info!(
                "[{}] Cut-loss attempt {}: SELL {} @ {:.3}",
                self.market.id, attempt, residual, price
            );

            match self
                .gateway
                .place_limit_sell(filled_token, price, residual as f64)
                .await
            {
                Ok(_) => {}
                Err(GatewayError::PositionClosed(_)) => {
                    // Exchange already liquidated the position
                    residual = 0;
                    break;
                }
                Err(e) => {
                    warn!("[{}] Cut-loss sell failed: {}", self.market.id, e);
                }
            }

            // Watch for the sell to fill before retrying
            for _ in 0..2 {
                sleep(self.recovery.cutloss_poll()).await;
                if let Ok(pos) = self.gateway.position(filled_token).await {
                    residual = pos;
                    if residual == 0 {
                        break;
                    }
                }
            }
            if residual == 0 {
                break;
            }

            // Remove the resting sell before pricing the next attempt
            let _ = self.cancel_market_orders().await;
        }

        if residual == 0 {
            let estimated_loss = filled_shares as f64 * 0.03;
            self.stats.add_realized_pnl(-estimated_loss);
            info!(
                "[{}] Cut-loss complete, estimated loss {:.4}",
                self.market.id, estimated_loss
            );
            self.stats.emit(format!(
                "CUT_LOSS {} {} shares, est loss {:.4}",
                self.market.id, filled_shares, estimated_loss
            ));
            // The market saw exposure this cycle; it is never re-entered
            self.set_blocked("cut-loss complete", 0);
        } else {
            self.set_blocked("cut-loss could not unwind", residual);
        }
        Ok(())
    }
}
