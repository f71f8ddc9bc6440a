//! Shared test fixtures: a scriptable simulated exchange gateway.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use pairarb::domain::market::{PairMarket, Regime};
use pairarb::domain::orderbook::PriceLevel;
use pairarb::infrastructure::client::Side;
use pairarb::infrastructure::gateway::{
    BookTop, ExchangeGateway, GatewayError, GatewayResult, OpenOrderSummary,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// How the simulated exchange treats a BUY on a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuyRule {
    /// Fill the whole order immediately
    Fill,
    /// Fill only this many shares, the rest evaporates
    Partial(u64),
    /// Rest on the book, never fill
    Rest,
    /// Exchange rejects the placement
    Reject,
}

/// How the simulated exchange treats a SELL on a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellRule {
    /// Fill against the position immediately
    Fill,
    /// Rest forever (an unsellable token)
    Ignore,
}

#[derive(Debug, Clone)]
struct SimOrder {
    id: String,
    token: String,
    side: Side,
    price: f64,
    size: u64,
    matched: u64,
    open: bool,
}

#[derive(Default)]
struct SimState {
    orders: Vec<SimOrder>,
    positions: HashMap<String, u64>,
    books: HashMap<String, BookTop>,
    buy_rules: HashMap<String, BuyRule>,
    sell_rules: HashMap<String, SellRule>,
    max_open: usize,
    buys_placed: u64,
    sells_placed: u64,
}

impl SimState {
    fn open_count(&self) -> usize {
        self.orders.iter().filter(|o| o.open).count()
    }

    fn note_open_high_water(&mut self) {
        let open = self.open_count();
        if open > self.max_open {
            self.max_open = open;
        }
    }
}

/// Scriptable in-memory exchange.
pub struct SimGateway {
    state: Mutex<SimState>,
    next_id: AtomicU64,
}

impl SimGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn set_buy_rule(&self, token: &str, rule: BuyRule) {
        self.state.lock().buy_rules.insert(token.to_string(), rule);
    }

    pub fn set_sell_rule(&self, token: &str, rule: SellRule) {
        self.state.lock().sell_rules.insert(token.to_string(), rule);
    }

    pub fn set_rest_book(&self, token: &str, book: BookTop) {
        self.state.lock().books.insert(token.to_string(), book);
    }

    pub fn set_position(&self, token: &str, shares: u64) {
        self.state.lock().positions.insert(token.to_string(), shares);
    }

    pub fn position_of(&self, token: &str) -> u64 {
        *self.state.lock().positions.get(token).unwrap_or(&0)
    }

    pub fn open_order_count(&self) -> usize {
        self.state.lock().open_count()
    }

    /// Highest number of orders ever resting at once.
    pub fn max_open_orders(&self) -> usize {
        self.state.lock().max_open
    }

    pub fn buys_placed(&self) -> u64 {
        self.state.lock().buys_placed
    }

    pub fn sells_placed(&self) -> u64 {
        self.state.lock().sells_placed
    }

    fn fresh_id(&self) -> String {
        format!("sim-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SimGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeGateway for SimGateway {
    async fn place_limit_buy(
        &self,
        token_id: &str,
        price: f64,
        size: f64,
    ) -> GatewayResult<String> {
        let mut state = self.state.lock();
        let rule = state
            .buy_rules
            .get(token_id)
            .copied()
            .unwrap_or(BuyRule::Rest);

        if rule == BuyRule::Reject {
            return Err(GatewayError::Rejected("simulated rejection".to_string()));
        }

        let id = self.fresh_id();
        let shares = size.round() as u64;
        let (matched, open) = match rule {
            BuyRule::Fill => (shares, false),
            BuyRule::Partial(n) => (n.min(shares), false),
            BuyRule::Rest => (0, true),
            BuyRule::Reject => unreachable!(),
        };

        if matched > 0 {
            *state.positions.entry(token_id.to_string()).or_insert(0) += matched;
        }

        state.orders.push(SimOrder {
            id: id.clone(),
            token: token_id.to_string(),
            side: Side::Buy,
            price,
            size: shares,
            matched,
            open,
        });
        state.buys_placed += 1;
        state.note_open_high_water();

        Ok(id)
    }

    async fn place_limit_sell(
        &self,
        token_id: &str,
        price: f64,
        size: f64,
    ) -> GatewayResult<String> {
        let mut state = self.state.lock();
        let rule = state
            .sell_rules
            .get(token_id)
            .copied()
            .unwrap_or(SellRule::Fill);

        let held = *state.positions.get(token_id).unwrap_or(&0);
        if held == 0 {
            return Err(GatewayError::PositionClosed(
                "not enough balance".to_string(),
            ));
        }

        let id = self.fresh_id();
        let shares = size.round() as u64;
        let (matched, open) = match rule {
            SellRule::Fill => {
                let sold = held.min(shares);
                state
                    .positions
                    .insert(token_id.to_string(), held - sold);
                (sold, false)
            }
            SellRule::Ignore => (0, true),
        };

        state.orders.push(SimOrder {
            id: id.clone(),
            token: token_id.to_string(),
            side: Side::Sell,
            price,
            size: shares,
            matched,
            open,
        });
        state.sells_placed += 1;
        state.note_open_high_water();

        Ok(id)
    }

    async fn cancel(&self, order_id: &str) -> GatewayResult<()> {
        let mut state = self.state.lock();
        for order in state.orders.iter_mut() {
            if order.id == order_id {
                order.open = false;
            }
        }
        Ok(())
    }

    async fn cancel_all(&self) -> GatewayResult<()> {
        let mut state = self.state.lock();
        for order in state.orders.iter_mut() {
            order.open = false;
        }
        Ok(())
    }

    async fn cancel_token_orders(&self, token_ids: &[String]) -> GatewayResult<()> {
        let mut state = self.state.lock();
        for order in state.orders.iter_mut() {
            if token_ids.contains(&order.token) {
                order.open = false;
            }
        }
        Ok(())
    }

    async fn list_open_orders(&self) -> GatewayResult<Vec<OpenOrderSummary>> {
        let state = self.state.lock();
        Ok(state
            .orders
            .iter()
            .filter(|o| o.open)
            .map(|o| OpenOrderSummary {
                order_id: o.id.clone(),
                token_id: o.token.clone(),
                side: o.side,
                price: o.price,
                size: o.size as f64,
                size_matched: o.matched as f64,
            })
            .collect())
    }

    async fn position(&self, token_id: &str) -> GatewayResult<u64> {
        Ok(*self.state.lock().positions.get(token_id).unwrap_or(&0))
    }

    async fn collateral_balance(&self) -> GatewayResult<f64> {
        Ok(1_000.0)
    }

    async fn fetch_book(&self, token_id: &str) -> GatewayResult<BookTop> {
        Ok(self
            .state
            .lock()
            .books
            .get(token_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn order_fill(&self, order_id: &str) -> GatewayResult<Option<f64>> {
        let state = self.state.lock();
        Ok(state
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .map(|o| o.matched as f64))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub const UP: &str = "tok-up";
pub const DOWN: &str = "tok-down";

/// A live Up/Down market expiring `secs` from now.
pub fn test_market(secs: i64) -> PairMarket {
    let now = Utc::now();
    let end_time = now + ChronoDuration::seconds(secs);
    PairMarket {
        id: "cond-test".to_string(),
        question: "Bitcoin Up or Down - 3:00PM-3:15PM ET".to_string(),
        up_token: UP.to_string(),
        down_token: DOWN.to_string(),
        end_time,
        regime: Regime::classify(end_time, now).unwrap_or(Regime::Live),
    }
}

/// Build wire-format levels from (price, size) string pairs.
pub fn levels(pairs: &[(&str, &str)]) -> Vec<PriceLevel> {
    pairs
        .iter()
        .map(|(price, size)| PriceLevel {
            price: price.to_string(),
            size: size.to_string(),
        })
        .collect()
}
