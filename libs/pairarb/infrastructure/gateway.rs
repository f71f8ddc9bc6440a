//! Exchange gateway
//!
//! The transactional surface between the engine and the exchange. Everything
//! order- or balance-shaped goes through the `ExchangeGateway` trait so the
//! engine can run against the live CLOB or a simulated exchange in tests.
//!
//! Contract notes:
//! - Cancelling an unknown order is success, not failure.
//! - A sell rejected because the position is already gone reports
//!   `PositionClosed`; callers treat it as reconciled.
//! - Transient I/O failures are typed and reported, never retried here.

use super::client::{
    AssetType, ClobAuth, OrderBuilder, OrderType, RestClient, RestError, Side,
};
use super::client::constants::{DECIMAL_MULTIPLIER, POLYGON_CHAIN_ID};
use super::config::EngineConfig;
use async_trait::async_trait;
use ethers::types::Address;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Timeouts, rate limits, 5xx, undecodable payloads. Skip this tick,
    /// retry next.
    #[error("transient exchange error: {0}")]
    Transient(String),

    /// The exchange refused the operation outright.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// Sell refused because the position no longer exists on the exchange.
    #[error("position already closed: {0}")]
    PositionClosed(String),

    #[error("authentication failure: {0}")]
    Auth(String),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

impl From<RestError> for GatewayError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::RequestFailed(e) => GatewayError::Transient(e.to_string()),
            // Fluid payload shapes are a transient condition: the next
            // response usually parses.
            RestError::DeserializeFailed(msg) => GatewayError::Transient(msg),
            RestError::ApiError(msg) => GatewayError::Rejected(msg),
            RestError::AuthFailed(e) => GatewayError::Auth(e.to_string()),
            RestError::OrderBuildFailed(e) => GatewayError::Rejected(e.to_string()),
        }
    }
}

/// Open order as the engine sees it.
#[derive(Debug, Clone)]
pub struct OpenOrderSummary {
    pub order_id: String,
    pub token_id: String,
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub size_matched: f64,
}

/// Top-of-book snapshot from the REST fallback path.
#[derive(Debug, Clone, Default)]
pub struct BookTop {
    /// (price, size), descending by price
    pub bids: Vec<(f64, f64)>,
    /// (price, size), ascending by price
    pub asks: Vec<(f64, f64)>,
}

impl BookTop {
    pub fn best_bid(&self) -> Option<(f64, f64)> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<(f64, f64)> {
        self.asks.first().copied()
    }
}

/// Snap a decimal price onto the exchange tick grid and clamp into the
/// tradeable [0.01, 0.99] band.
pub fn snap_to_tick(price: f64, tick: f64) -> f64 {
    let snapped = (price / tick).round() * tick;
    // Round away float residue from the division
    let snapped = (snapped * 1000.0).round() / 1000.0;
    snapped.clamp(0.01, 0.99)
}

/// The transactional surface the engine core depends on.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Place a good-till-cancelled limit BUY. Returns the order id.
    async fn place_limit_buy(&self, token_id: &str, price: f64, size: f64)
        -> GatewayResult<String>;

    /// Place a good-till-cancelled limit SELL. Returns the order id.
    async fn place_limit_sell(
        &self,
        token_id: &str,
        price: f64,
        size: f64,
    ) -> GatewayResult<String>;

    /// Best-effort cancel; success does not guarantee instantaneous removal.
    async fn cancel(&self, order_id: &str) -> GatewayResult<()>;

    /// Cancel every open order belonging to this account. Callers that need
    /// certainty poll `list_open_orders` until empty.
    async fn cancel_all(&self) -> GatewayResult<()>;

    /// Cancel all orders resting on the given tokens.
    async fn cancel_token_orders(&self, token_ids: &[String]) -> GatewayResult<()>;

    async fn list_open_orders(&self) -> GatewayResult<Vec<OpenOrderSummary>>;

    /// Whole shares of a conditional token held at the exchange.
    async fn position(&self, token_id: &str) -> GatewayResult<u64>;

    /// Collateral balance in units (6-decimal raw converted).
    async fn collateral_balance(&self) -> GatewayResult<f64>;

    /// REST book snapshot, for paths that cannot rely on the cache.
    async fn fetch_book(&self, token_id: &str) -> GatewayResult<BookTop>;

    /// Matched size of an order, if the exchange still knows it.
    async fn order_fill(&self, order_id: &str) -> GatewayResult<Option<f64>>;
}

// =============================================================================
// Live implementation
// =============================================================================

/// Gateway backed by the live CLOB.
pub struct LiveGateway {
    rest: RestClient,
    auth: ClobAuth,
    builder: OrderBuilder,
    signature_type: u8,
    tick: f64,
}

impl LiveGateway {
    /// Connect: build the signer, derive API credentials, verify reachability.
    pub async fn connect(config: &EngineConfig) -> anyhow::Result<Self> {
        let mut auth = ClobAuth::new(&config.private_key, POLYGON_CHAIN_ID)?;
        let signer_addr = auth.address();

        let maker_addr = match &config.proxy_wallet {
            Some(addr) => addr
                .parse::<Address>()
                .map_err(|_| anyhow::anyhow!("Invalid proxy wallet address: {}", addr))?,
            None => signer_addr,
        };

        let rest = RestClient::new(&config.clob_url);

        info!("Deriving API credentials from private key...");
        let creds = rest.get_or_create_api_creds(&auth).await?;
        auth.set_api_key(creds);
        info!("API credentials obtained");

        if let Err(e) = rest.health_check().await {
            warn!("CLOB connectivity check failed: {}", e);
        }

        let builder = OrderBuilder::new(
            signer_addr,
            maker_addr,
            POLYGON_CHAIN_ID,
            config.signature_type,
            false,
        );

        debug!(
            "LiveGateway ready: signer={:?}, maker={:?}, signature_type={}",
            signer_addr, maker_addr, config.signature_type
        );

        Ok(Self {
            rest,
            auth,
            builder,
            signature_type: config.signature_type,
            tick: 0.01,
        })
    }

    async fn place(
        &self,
        token_id: &str,
        price: f64,
        size: f64,
        side: Side,
    ) -> GatewayResult<String> {
        let price = snap_to_tick(price, self.tick);
        let response = self
            .rest
            .place_signed_order(
                &self.auth,
                &self.builder,
                token_id,
                price,
                size,
                side,
                OrderType::GTC,
            )
            .await?;

        if !response.success {
            let msg = response
                .error_msg
                .unwrap_or_else(|| "placement reported failure".to_string());
            if side == Side::Sell && msg.to_lowercase().contains("not enough balance") {
                return Err(GatewayError::PositionClosed(msg));
            }
            return Err(GatewayError::Rejected(msg));
        }

        response
            .order_id
            .ok_or_else(|| GatewayError::Rejected("placement succeeded without order id".into()))
    }
}

#[async_trait]
impl ExchangeGateway for LiveGateway {
    async fn place_limit_buy(
        &self,
        token_id: &str,
        price: f64,
        size: f64,
    ) -> GatewayResult<String> {
        self.place(token_id, price, size, Side::Buy).await
    }

    async fn place_limit_sell(
        &self,
        token_id: &str,
        price: f64,
        size: f64,
    ) -> GatewayResult<String> {
        self.place(token_id, price, size, Side::Sell).await
    }

    async fn cancel(&self, order_id: &str) -> GatewayResult<()> {
        match self.rest.cancel_order(&self.auth, order_id).await {
            Ok(_) => Ok(()),
            // Cancelling an order the exchange no longer knows is success
            Err(RestError::ApiError(msg)) => {
                debug!("Cancel of {} reported: {}", order_id, msg);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel_all(&self) -> GatewayResult<()> {
        match self.rest.cancel_all_orders(&self.auth).await {
            Ok(_) => Ok(()),
            // Cancel-all on an empty book is a no-op
            Err(RestError::ApiError(msg)) => {
                debug!("cancel_all reported: {}", msg);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cancel_token_orders(&self, token_ids: &[String]) -> GatewayResult<()> {
        for token_id in token_ids {
            match self
                .rest
                .cancel_market_orders(&self.auth, None, Some(token_id))
                .await
            {
                Ok(_) => {}
                Err(RestError::ApiError(msg)) => {
                    debug!("cancel_token_orders({}) reported: {}", token_id, msg);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn list_open_orders(&self) -> GatewayResult<Vec<OpenOrderSummary>> {
        let orders = self.rest.get_all_orders(&self.auth, None).await?;
        Ok(orders
            .into_iter()
            .map(|o| OpenOrderSummary {
                size_matched: o.size_matched_f64(),
                price: o.price_f64(),
                size: o.original_size_f64(),
                order_id: o.id,
                token_id: o.asset_id,
                side: o.side,
            })
            .collect())
    }

    async fn position(&self, token_id: &str) -> GatewayResult<u64> {
        let balance = self
            .rest
            .get_balance_allowance(
                &self.auth,
                AssetType::Conditional,
                Some(token_id),
                self.signature_type,
            )
            .await?;
        // Raw integer with 6 decimals; floor to whole shares
        Ok(balance.raw_balance() / DECIMAL_MULTIPLIER)
    }

    async fn collateral_balance(&self) -> GatewayResult<f64> {
        let balance = self
            .rest
            .get_balance_allowance(&self.auth, AssetType::Collateral, None, self.signature_type)
            .await?;
        Ok(balance.raw_balance() as f64 / DECIMAL_MULTIPLIER as f64)
    }

    async fn fetch_book(&self, token_id: &str) -> GatewayResult<BookTop> {
        let book = self.rest.get_book(token_id).await?;

        let mut bids: Vec<(f64, f64)> = book
            .bids
            .iter()
            .map(|l| (l.price_f64(), l.size_f64()))
            .filter(|(_, s)| *s > 0.0)
            .collect();
        let mut asks: Vec<(f64, f64)> = book
            .asks
            .iter()
            .map(|l| (l.price_f64(), l.size_f64()))
            .filter(|(_, s)| *s > 0.0)
            .collect();

        bids.sort_unstable_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        asks.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(BookTop { bids, asks })
    }

    async fn order_fill(&self, order_id: &str) -> GatewayResult<Option<f64>> {
        match self.rest.get_order(&self.auth, order_id).await {
            Ok(order) => Ok(Some(order.size_matched_f64())),
            Err(RestError::ApiError(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
