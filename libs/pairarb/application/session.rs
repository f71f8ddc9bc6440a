//! Per-market state machine
//!
//! One session owns the full quote lifecycle for a single Up/Down market:
//! expiry handling, fill detection, requoting and the hand-off into
//! one-sided recovery. The cancel-before-place discipline is strict: no BUY
//! is submitted while a prior order could still be resting (cancel is issued
//! and verified absent first), and every error path that placed an order
//! attempts to cancel it.

use crate::application::pricing::{quote_pair, QuoteDecision, RegimeParams};
use crate::application::stats::EngineStats;
use crate::domain::market::PairMarket;
use crate::infrastructure::book_cache::BookCache;
use crate::infrastructure::config::{QuoteTuning, RecoveryTuning};
use crate::infrastructure::gateway::{ExchangeGateway, GatewayError, OpenOrderSummary};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Session status. `Holding` and `Blocked` are terminal: a holding market
/// waits for settlement, a blocked one is excluded from every trading path
/// until operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketStatus {
    Idle,
    Quoting,
    AggressiveComplete,
    Holding,
    Blocked,
}

impl MarketStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MarketStatus::Holding | MarketStatus::Blocked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Idle => "IDLE",
            MarketStatus::Quoting => "QUOTING",
            MarketStatus::AggressiveComplete => "AGGRESSIVE_COMPLETE",
            MarketStatus::Holding => "HOLDING",
            MarketStatus::Blocked => "BLOCKED",
        }
    }
}

pub struct MarketSession {
    pub(crate) market: PairMarket,
    pub(crate) status: MarketStatus,

    /// Prices of the most recent live quote pair; 0.0 when not quoting
    pub(crate) last_up_bid: f64,
    pub(crate) last_down_bid: f64,
    pub(crate) up_order_id: Option<String>,
    pub(crate) down_order_id: Option<String>,

    /// Last sampled positions; the gateway stays the source of truth
    pub(crate) observed_up: u64,
    pub(crate) observed_down: u64,

    pub(crate) entered_holding_at: Option<chrono::DateTime<Utc>>,

    pub(crate) gateway: Arc<dyn ExchangeGateway>,
    pub(crate) books: Arc<BookCache>,
    pub(crate) quoting: QuoteTuning,
    pub(crate) recovery: RecoveryTuning,
    pub(crate) stats: Arc<EngineStats>,
}

impl MarketSession {
    pub fn new(
        market: PairMarket,
        gateway: Arc<dyn ExchangeGateway>,
        books: Arc<BookCache>,
        quoting: QuoteTuning,
        recovery: RecoveryTuning,
        stats: Arc<EngineStats>,
    ) -> Self {
        books.subscribe(&[market.up_token.clone(), market.down_token.clone()]);
        Self {
            market,
            status: MarketStatus::Idle,
            last_up_bid: 0.0,
            last_down_bid: 0.0,
            up_order_id: None,
            down_order_id: None,
            observed_up: 0,
            observed_down: 0,
            entered_holding_at: None,
            gateway,
            books,
            quoting,
            recovery,
            stats,
        }
    }

    pub fn status(&self) -> MarketStatus {
        self.status
    }

    pub fn market(&self) -> &PairMarket {
        &self.market
    }

    pub fn positions(&self) -> (u64, u64) {
        (self.observed_up, self.observed_down)
    }

    /// When the session secured its position, if it has.
    pub fn entered_holding_at(&self) -> Option<chrono::DateTime<Utc>> {
        self.entered_holding_at
    }

    /// Drive the session until it reaches a terminal state or shutdown.
    /// Returns the final status so the caller can update the registry.
    pub async fn run(mut self, shutdown: Arc<AtomicBool>) -> MarketStatus {
        let interval = self.quoting.requote_interval();

        while shutdown.load(Ordering::Acquire) && !self.status.is_terminal() {
            if let Err(e) = self.tick().await {
                warn!("[{}] Tick failed: {}", self.market.id, e);
            }
            sleep(interval).await;
        }

        // Shutdown drain: pull any resting quotes before exiting
        if !self.status.is_terminal() && self.quotes_outstanding() {
            info!("[{}] Shutdown: cancelling resting quotes", self.market.id);
            let _ = self.cancel_market_orders().await;
        }

        info!(
            "[{}] Session finished in {}",
            self.market.id,
            self.status.as_str()
        );
        self.status
    }

    /// One driver cycle: (a) expiry check, (b) position sample,
    /// (c) status-dependent action.
    pub async fn tick(&mut self) -> anyhow::Result<()> {
        if self.status.is_terminal() {
            return Ok(());
        }

        let now = Utc::now();
        if self.market.refresh_regime(now) {
            info!("[{}] Regime -> LIVE", self.market.id);
        }

        let remaining = self.market.time_to_expiry(now).num_seconds();

        // Final settlement sweep: secure or abandon, never requote
        if remaining <= self.quoting.settle_window_secs as i64 {
            return self.settle_at_expiry().await;
        }

        // Close to expiry: stop quoting but keep watching positions
        if remaining <= self.quoting.quote_stop_secs as i64
            && self.status == MarketStatus::Quoting
        {
            info!(
                "[{}] {}s to expiry, withdrawing quotes",
                self.market.id, remaining
            );
            self.cancel_market_orders().await?;
            self.clear_quote_state();
            self.status = MarketStatus::Idle;
        }

        // Position sample strictly precedes any quoting decision
        match self.sample_positions().await {
            Ok(()) => {}
            Err(GatewayError::Transient(msg)) => {
                debug!("[{}] Position sample deferred: {}", self.market.id, msg);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let size = self.quoting.shares_per_order;
        let (pos_up, pos_down) = (self.observed_up, self.observed_down);

        if pos_up >= size && pos_down >= size {
            return self.lock_in_pair().await;
        }
        if pos_up > 0 && pos_down == 0 {
            return self.recover_one_sided(true).await;
        }
        if pos_down > 0 && pos_up == 0 {
            return self.recover_one_sided(false).await;
        }
        if pos_up > 0 && pos_down > 0 {
            // Partial fills on both legs: stop here and hold what we have
            info!(
                "[{}] Partial pair {}/{} shares, holding",
                self.market.id, pos_up, pos_down
            );
            self.cancel_market_orders().await?;
            self.set_holding("partial pair");
            return Ok(());
        }

        // Quote evaluation only ever runs flat
        if remaining > self.quoting.quote_stop_secs as i64 {
            self.evaluate_quotes().await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expiry handling
    // ------------------------------------------------------------------

    /// Inside the final window: cancel everything, then settle on what the
    /// positions say. Never places a new BUY.
    async fn settle_at_expiry(&mut self) -> anyhow::Result<()> {
        info!("[{}] Entering settlement window", self.market.id);
        let _ = self.cancel_market_orders().await;
        self.clear_quote_state();

        if let Err(e) = self.sample_positions().await {
            warn!(
                "[{}] Position sample failed at settlement, using last observed: {}",
                self.market.id, e
            );
        }
        let (pos_up, pos_down) = (self.observed_up, self.observed_down);

        if pos_up > 0 && pos_down > 0 {
            info!(
                "[{}] Settling with paired position {}/{}",
                self.market.id, pos_up, pos_down
            );
            self.set_holding("expiry sweep");
        } else if pos_up == 0 && pos_down == 0 {
            self.set_blocked("market lost: expired flat", 0);
        } else {
            // Stranded singleton: best-effort close, then stand down
            let (token, pos) = if pos_up > 0 {
                (self.market.up_token.clone(), pos_up)
            } else {
                (self.market.down_token.clone(), pos_down)
            };
            let price = match self.side_bid(&token).await {
                Some(bid) => (bid - 0.01).max(0.01),
                None => 0.01,
            };
            match self.gateway.place_limit_sell(&token, price, pos as f64).await {
                Ok(_) | Err(GatewayError::PositionClosed(_)) => {}
                Err(e) => warn!("[{}] Expiry close failed: {}", self.market.id, e),
            }
            self.set_blocked("stranded singleton at expiry", pos);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Fill handling
    // ------------------------------------------------------------------

    /// Both legs filled to size: lock in the pair and hold to settlement.
    async fn lock_in_pair(&mut self) -> anyhow::Result<()> {
        let pairs = self.observed_up.min(self.observed_down);

        self.cancel_market_orders().await?;
        self.stats.incr_fills();

        if self.last_up_bid > 0.0 && self.last_down_bid > 0.0 {
            let locked = (1.0 - self.last_up_bid - self.last_down_bid) * pairs as f64;
            self.stats.add_realized_pnl(locked);
            self.stats.incr_completes();
            info!(
                "[{}] Pair complete: {} shares locked at {:.3}+{:.3}, profit {:.4}",
                self.market.id, pairs, self.last_up_bid, self.last_down_bid, locked
            );
            self.stats.emit(format!(
                "FILL {} {} pairs, locked profit {:.4}",
                self.market.id, pairs, locked
            ));
        }

        self.set_holding("pair complete");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Quoting
    // ------------------------------------------------------------------

    /// Query the books, price a pair and reconcile resting quotes.
    async fn evaluate_quotes(&mut self) -> anyhow::Result<()> {
        if !matches!(self.status, MarketStatus::Idle | MarketStatus::Quoting) {
            return Ok(());
        }

        let ask_up = self.books.best_ask(&self.market.up_token);
        let ask_down = self.books.best_ask(&self.market.down_token);

        let (ask_up, ask_down) = match (ask_up, ask_down) {
            (Some((up, _)), Some((down, _))) => (up, down),
            _ => {
                // Missing or stale book: never refresh quotes off bad data,
                // but existing quotes may still be reasonable
                debug!("[{}] Book unavailable, holding pat", self.market.id);
                return Ok(());
            }
        };

        let params = RegimeParams::for_regime(self.market.regime);
        let decision = quote_pair(
            ask_up,
            ask_down,
            &params,
            self.quoting.volatility_threshold,
        );

        match decision {
            QuoteDecision::Skip => {
                debug!(
                    "[{}] Volatility skip (asks {:.2}/{:.2})",
                    self.market.id, ask_up, ask_down
                );
                self.withdraw_if_quoting().await
            }
            QuoteDecision::NoEdge => {
                debug!(
                    "[{}] No edge (asks {:.2}/{:.2})",
                    self.market.id, ask_up, ask_down
                );
                self.withdraw_if_quoting().await
            }
            QuoteDecision::Pair { bid_up, bid_down } => {
                if self.status == MarketStatus::Quoting
                    && (bid_up - self.last_up_bid).abs() < self.quoting.requote_tolerance
                    && (bid_down - self.last_down_bid).abs() < self.quoting.requote_tolerance
                {
                    // Quotes are still where we want them
                    return Ok(());
                }
                self.place_quote_pair(bid_up, bid_down).await
            }
        }
    }

    async fn withdraw_if_quoting(&mut self) -> anyhow::Result<()> {
        if self.status == MarketStatus::Quoting {
            self.cancel_market_orders().await?;
            self.clear_quote_state();
            self.status = MarketStatus::Idle;
        }
        Ok(())
    }

    /// Cancel-verify-place: the only path that submits quote BUYs.
    async fn place_quote_pair(&mut self, bid_up: f64, bid_down: f64) -> anyhow::Result<()> {
        self.cancel_market_orders().await?;

        if !self.verify_orders_cancelled().await {
            warn!(
                "[{}] Prior orders still resting, deferring requote",
                self.market.id
            );
            return Ok(());
        }
        self.clear_quote_state();

        let size = self.quoting.shares_per_order as f64;
        let (up_result, down_result) = tokio::join!(
            self.gateway
                .place_limit_buy(&self.market.up_token, bid_up, size),
            self.gateway
                .place_limit_buy(&self.market.down_token, bid_down, size),
        );

        match (up_result, down_result) {
            (Ok(up_id), Ok(down_id)) => {
                self.up_order_id = Some(up_id);
                self.down_order_id = Some(down_id);
                self.last_up_bid = bid_up;
                self.last_down_bid = bid_down;
                self.status = MarketStatus::Quoting;
                self.stats.incr_quotes_placed();
                info!(
                    "[{}] Quoting {:.3}/{:.3} x {}",
                    self.market.id, bid_up, bid_down, self.quoting.shares_per_order
                );
                self.stats.emit(format!(
                    "QUOTE {} {:.3}/{:.3}",
                    self.market.id, bid_up, bid_down
                ));

                // Stale orders from earlier attempts would breach the
                // two-order bound; flush everything and retry next tick
                if let Ok(open) = self.open_orders_for_market().await {
                    if open.len() > 2 {
                        warn!(
                            "[{}] {} open orders after requote, flushing",
                            self.market.id,
                            open.len()
                        );
                        let _ = self.cancel_market_orders().await;
                        self.clear_quote_state();
                        self.status = MarketStatus::Idle;
                    }
                }
                Ok(())
            }
            (up_result, down_result) => {
                // One leg may have landed; pull everything and retry next tick
                if let Err(e) = &up_result {
                    warn!("[{}] Up quote failed: {}", self.market.id, e);
                }
                if let Err(e) = &down_result {
                    warn!("[{}] Down quote failed: {}", self.market.id, e);
                }
                let _ = self.cancel_market_orders().await;
                self.clear_quote_state();
                self.status = MarketStatus::Idle;
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    pub(crate) async fn sample_positions(&mut self) -> Result<(), GatewayError> {
        self.observed_up = self.gateway.position(&self.market.up_token).await?;
        self.observed_down = self.gateway.position(&self.market.down_token).await?;
        Ok(())
    }

    pub(crate) async fn cancel_market_orders(&self) -> anyhow::Result<()> {
        self.gateway
            .cancel_token_orders(&[
                self.market.up_token.clone(),
                self.market.down_token.clone(),
            ])
            .await?;
        Ok(())
    }

    /// Poll until the exchange reports no resting orders for this market.
    pub(crate) async fn verify_orders_cancelled(&self) -> bool {
        for _ in 0..10 {
            match self.open_orders_for_market().await {
                Ok(open) if open.is_empty() => return true,
                Ok(_) => {}
                Err(e) => {
                    debug!("[{}] Open-order check failed: {}", self.market.id, e);
                }
            }
            sleep(Duration::from_millis(50)).await;
        }
        false
    }

    pub(crate) async fn open_orders_for_market(
        &self,
    ) -> Result<Vec<OpenOrderSummary>, GatewayError> {
        let orders = self.gateway.list_open_orders().await?;
        Ok(orders
            .into_iter()
            .filter(|o| self.market.owns_token(&o.token_id))
            .collect())
    }

    /// Best ask for a token: cache preferred, REST fallback.
    pub(crate) async fn side_ask(&self, token: &str) -> Option<f64> {
        if let Some((price, _)) = self.books.best_ask(token) {
            return Some(price);
        }
        match self.gateway.fetch_book(token).await {
            Ok(top) => top.best_ask().map(|(p, _)| p),
            Err(e) => {
                debug!("[{}] REST book fallback failed: {}", self.market.id, e);
                None
            }
        }
    }

    /// Best bid for a token: cache preferred, REST fallback.
    pub(crate) async fn side_bid(&self, token: &str) -> Option<f64> {
        if let Some((price, _)) = self.books.best_bid(token) {
            return Some(price);
        }
        match self.gateway.fetch_book(token).await {
            Ok(top) => top.best_bid().map(|(p, _)| p),
            Err(e) => {
                debug!("[{}] REST book fallback failed: {}", self.market.id, e);
                None
            }
        }
    }

    pub(crate) fn quotes_outstanding(&self) -> bool {
        self.up_order_id.is_some() || self.down_order_id.is_some()
    }

    pub(crate) fn clear_quote_state(&mut self) {
        self.up_order_id = None;
        self.down_order_id = None;
    }

    pub(crate) fn set_holding(&mut self, reason: &str) {
        self.status = MarketStatus::Holding;
        self.entered_holding_at = Some(Utc::now());
        self.clear_quote_state();
        info!("[{}] -> HOLDING ({})", self.market.id, reason);
        self.stats
            .emit(format!("HOLDING {} ({})", self.market.id, reason));
    }

    pub(crate) fn set_blocked(&mut self, reason: &str, imbalance: u64) {
        self.status = MarketStatus::Blocked;
        self.clear_quote_state();
        self.stats.incr_blocked();
        // Operator notice: this market needs manual attention on the exchange
        error!(
            "[{}] BLOCKED ({}) question=\"{}\" residual_imbalance={}",
            self.market.id, reason, self.market.question, imbalance
        );
        self.stats.emit(format!(
            "BLOCKED {} ({}) residual={}",
            self.market.id, reason, imbalance
        ));
    }
}
