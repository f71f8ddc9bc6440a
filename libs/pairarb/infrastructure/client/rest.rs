//! REST client for the Polymarket CLOB
//!
//! Thin typed wrapper over the HTTP surface the engine consumes: book and
//! price queries, signed order placement, cancellation, open-order listing
//! and balance queries. Transient I/O failures are converted to `RestError`
//! and reported to the caller; nothing here retries.

use super::auth::{AuthError, ClobAuth};
use super::order_builder::{build_order_payload, OrderBuilder, OrderBuilderError};
use super::types::*;
use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const START_CURSOR: &str = "MA==";
const END_CURSOR: &str = "LTE=";

#[derive(Error, Debug)]
pub enum RestError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Authentication failed: {0}")]
    AuthFailed(#[from] AuthError),

    #[error("Order build failed: {0}")]
    OrderBuildFailed(#[from] OrderBuilderError),

    #[error("Deserialization failed: {0}")]
    DeserializeFailed(String),
}

pub type Result<T> = std::result::Result<T, RestError>;

// ============================================================================
// HTTP helpers
// ============================================================================

async fn extract_api_error(response: reqwest::Response, context: &str) -> RestError {
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    RestError::ApiError(format!("{}: {}", context, error_text))
}

async fn require_success(
    response: reqwest::Response,
    context: &str,
) -> Result<reqwest::Response> {
    if !response.status().is_success() {
        return Err(extract_api_error(response, context).await);
    }
    Ok(response)
}

fn with_headers(req: RequestBuilder, headers: HashMap<String, String>) -> RequestBuilder {
    headers.into_iter().fold(req, |r, (k, v)| r.header(k, v))
}

async fn parse_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    response
        .json()
        .await
        .map_err(|e| RestError::DeserializeFailed(e.to_string()))
}

fn build_http_client() -> Client {
    use reqwest::header;

    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_static("rs_clob_client"),
    );
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
    headers.insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );

    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(15))
        .build()
        .expect("Failed to build HTTP client")
}

// ============================================================================
// RestClient
// ============================================================================

pub struct RestClient {
    base_url: String,
    client: Client,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: build_http_client(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Lightweight connectivity probe.
    pub async fn health_check(&self) -> Result<()> {
        let url = format!("{}/time", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;
        debug!("CLOB health check: {}", response.status());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Public market data
    // ------------------------------------------------------------------

    /// Orderbook snapshot for a token.
    pub async fn get_book(&self, token_id: &str) -> Result<BookResponse> {
        let url = format!("{}/book?token_id={}", self.base_url, token_id);
        let response = self.client.get(&url).send().await?;
        let response = require_success(response, "Failed to fetch orderbook").await?;
        parse_json(response).await
    }

    /// Single executable price for a token/side.
    pub async fn get_price(&self, token_id: &str, side: Side) -> Result<f64> {
        let side_str = match side {
            Side::Buy => "buy",
            Side::Sell => "sell",
        };
        let url = format!(
            "{}/price?token_id={}&side={}",
            self.base_url, token_id, side_str
        );
        let response = self.client.get(&url).send().await?;
        let response = require_success(response, "Failed to fetch price").await?;
        let price: PriceResponse = parse_json(response).await?;
        price
            .price
            .parse()
            .map_err(|e| RestError::DeserializeFailed(format!("Bad price string: {}", e)))
    }

    // ------------------------------------------------------------------
    // API key management
    // ------------------------------------------------------------------

    /// Create new API key credentials (L1-authenticated).
    pub async fn create_api_key(&self, auth: &ClobAuth) -> Result<ApiCredentials> {
        let url = format!("{}/auth/api-key", self.base_url);
        let headers = auth.l1_headers(ClobAuth::current_timestamp(), 0).await?;
        let response = with_headers(self.client.post(&url), headers).send().await?;
        let response = require_success(response, "Failed to create API key").await?;
        parse_json(response).await
    }

    /// Derive API key deterministically from the private key.
    pub async fn derive_api_key(&self, auth: &ClobAuth) -> Result<ApiCredentials> {
        let url = format!("{}/auth/derive-api-key", self.base_url);
        let headers = auth.l1_headers(ClobAuth::current_timestamp(), 0).await?;
        let response = with_headers(self.client.get(&url), headers).send().await?;
        let response = require_success(response, "Failed to derive API key").await?;
        parse_json(response).await
    }

    /// Derive if possible, create otherwise.
    pub async fn get_or_create_api_creds(&self, auth: &ClobAuth) -> Result<ApiCredentials> {
        match self.derive_api_key(auth).await {
            Ok(creds) => Ok(creds),
            Err(_) => self.create_api_key(auth).await,
        }
    }

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Sign and submit a limit order.
    pub async fn place_signed_order(
        &self,
        auth: &ClobAuth,
        builder: &OrderBuilder,
        token_id: &str,
        price: f64,
        size: f64,
        side: Side,
        order_type: OrderType,
    ) -> Result<OrderPlacementResponse> {
        let api_key = auth
            .api_key()
            .ok_or_else(|| RestError::ApiError("API key not set".to_string()))?
            .key
            .clone();

        let signed = builder.build_signed_order(auth, token_id, price, size, side, 0, None)?;
        let payload = build_order_payload(&signed, &api_key, order_type);
        let body = serde_json::to_string(&payload)
            .map_err(|e| RestError::ApiError(format!("Failed to serialize order: {}", e)))?;

        let timestamp = ClobAuth::current_timestamp();
        let headers = auth.l2_headers(timestamp, "POST", "/order", &body)?;

        debug!(
            token_id,
            price, size, "Submitting {:?} {:?} order", side, order_type
        );

        let url = format!("{}/order", self.base_url);
        let response = with_headers(self.client.post(&url), headers)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(extract_api_error(response, "Failed to place order").await);
        }
        parse_json(response).await
    }

    /// Cancel a single order by ID.
    pub async fn cancel_order(&self, auth: &ClobAuth, order_id: &str) -> Result<CancelResponse> {
        let url = format!("{}/order", self.base_url);
        let body_json = serde_json::json!({ "orderID": order_id });
        let body = serde_json::to_string(&body_json)
            .map_err(|e| RestError::ApiError(e.to_string()))?;

        let timestamp = ClobAuth::current_timestamp();
        let headers = auth.l2_headers(timestamp, "DELETE", "/order", &body)?;
        let response = with_headers(self.client.delete(&url), headers)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(extract_api_error(response, "Failed to cancel order").await);
        }
        parse_json(response).await
    }

    /// Cancel every open order owned by this account.
    pub async fn cancel_all_orders(&self, auth: &ClobAuth) -> Result<CancelResponse> {
        let url = format!("{}/cancel-all", self.base_url);
        let timestamp = ClobAuth::current_timestamp();
        let headers = auth.l2_headers(timestamp, "DELETE", "/cancel-all", "")?;
        let response = with_headers(self.client.delete(&url), headers).send().await?;

        if !response.status().is_success() {
            return Err(extract_api_error(response, "Failed to cancel all orders").await);
        }
        parse_json(response).await
    }

    /// Cancel all orders resting on a market or single asset.
    pub async fn cancel_market_orders(
        &self,
        auth: &ClobAuth,
        market: Option<&str>,
        asset_id: Option<&str>,
    ) -> Result<CancelResponse> {
        let url = format!("{}/cancel-market-orders", self.base_url);
        let body_json = serde_json::json!({
            "market": market.unwrap_or(""),
            "asset_id": asset_id.unwrap_or(""),
        });
        let body = serde_json::to_string(&body_json)
            .map_err(|e| RestError::ApiError(e.to_string()))?;

        let timestamp = ClobAuth::current_timestamp();
        let headers = auth.l2_headers(timestamp, "DELETE", "/cancel-market-orders", &body)?;
        let response = with_headers(self.client.delete(&url), headers)
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(extract_api_error(response, "Failed to cancel market orders").await);
        }
        parse_json(response).await
    }

    /// Fetch open orders, one page.
    pub async fn get_orders_page(
        &self,
        auth: &ClobAuth,
        asset_id: Option<&str>,
        next_cursor: Option<&str>,
    ) -> Result<PaginatedResponse<OpenOrder>> {
        let mut query_parts = Vec::new();
        if let Some(asset_id) = asset_id {
            query_parts.push(format!("asset_id={}", asset_id));
        }
        query_parts.push(format!(
            "next_cursor={}",
            next_cursor.unwrap_or(START_CURSOR)
        ));

        let url = format!("{}/data/orders?{}", self.base_url, query_parts.join("&"));
        let timestamp = ClobAuth::current_timestamp();
        let headers = auth.l2_headers(timestamp, "GET", "/data/orders", "")?;
        let response = with_headers(self.client.get(&url), headers).send().await?;

        if !response.status().is_success() {
            return Err(extract_api_error(response, "Failed to fetch orders").await);
        }
        parse_json(response).await
    }

    /// Fetch all open orders with auto-pagination.
    pub async fn get_all_orders(
        &self,
        auth: &ClobAuth,
        asset_id: Option<&str>,
    ) -> Result<Vec<OpenOrder>> {
        let mut all_orders = Vec::new();
        let mut cursor = Some(START_CURSOR.to_string());

        while let Some(ref cur) = cursor {
            let page = self.get_orders_page(auth, asset_id, Some(cur)).await?;
            all_orders.extend(page.data);

            if page.next_cursor == END_CURSOR || page.next_cursor.is_empty() {
                cursor = None;
            } else {
                cursor = Some(page.next_cursor);
            }
        }

        Ok(all_orders)
    }

    /// Fetch a single order by ID.
    pub async fn get_order(&self, auth: &ClobAuth, order_id: &str) -> Result<OpenOrder> {
        let path = format!("/data/order/{}", order_id);
        let url = format!("{}{}", self.base_url, path);
        let timestamp = ClobAuth::current_timestamp();
        let headers = auth.l2_headers(timestamp, "GET", &path, "")?;
        let response = with_headers(self.client.get(&url), headers).send().await?;

        if !response.status().is_success() {
            return Err(extract_api_error(response, "Failed to fetch order").await);
        }
        parse_json(response).await
    }

    // ------------------------------------------------------------------
    // Balances
    // ------------------------------------------------------------------

    /// Balance/allowance query, raw smallest-unit values.
    pub async fn get_balance_allowance(
        &self,
        auth: &ClobAuth,
        asset_type: AssetType,
        token_id: Option<&str>,
        signature_type: u8,
    ) -> Result<BalanceAllowance> {
        let mut query_parts = vec![format!("asset_type={}", asset_type.as_str())];
        if let Some(token_id) = token_id {
            query_parts.push(format!("token_id={}", token_id));
        }
        query_parts.push(format!("signature_type={}", signature_type));

        let url = format!(
            "{}/balance-allowance?{}",
            self.base_url,
            query_parts.join("&")
        );
        let timestamp = ClobAuth::current_timestamp();
        let headers = auth.l2_headers(timestamp, "GET", "/balance-allowance", "")?;
        let response = with_headers(self.client.get(&url), headers).send().await?;

        if !response.status().is_success() {
            return Err(extract_api_error(response, "Failed to fetch balance/allowance").await);
        }
        parse_json(response).await
    }
}
