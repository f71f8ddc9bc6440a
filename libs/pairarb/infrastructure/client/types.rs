//! Request/response schemas at the CLOB API boundary
//!
//! Exchange payloads have fluid shapes; everything the engine consumes is
//! pinned down here and deserialisation failures surface as typed errors.

use crate::domain::orderbook::PriceLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Order side
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

/// Order time-in-force
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Good Till Cancel
    GTC,
    /// Fill Or Kill
    FOK,
    /// Fill And Kill (partial fill allowed, rest cancelled)
    FAK,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::GTC => "GTC",
            OrderType::FOK => "FOK",
            OrderType::FAK => "FAK",
        }
    }
}

/// Derived API credentials (L2 auth)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCredentials {
    #[serde(alias = "apiKey")]
    pub key: String,
    pub secret: String,
    pub passphrase: String,
}

/// Orderbook response from `/book?token_id=...`
#[derive(Debug, Clone, Deserialize)]
pub struct BookResponse {
    #[serde(default)]
    pub market: Option<String>,
    #[serde(default)]
    pub asset_id: Option<String>,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Single executable price from `/price?token_id=...&side=...`
#[derive(Debug, Clone, Deserialize)]
pub struct PriceResponse {
    pub price: String,
}

/// Order placement response from the CLOB API
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPlacementResponse {
    /// Order ID if placement was accepted
    #[serde(rename = "orderID", default)]
    pub order_id: Option<String>,

    pub success: bool,

    #[serde(rename = "errorMsg", default)]
    pub error_msg: Option<String>,

    /// "matched", "live", "delayed", "unmatched"
    #[serde(default)]
    pub status: Option<String>,

    /// Size immediately matched on placement, when reported
    #[serde(rename = "makingAmount", default)]
    pub making_amount: Option<String>,

    #[serde(rename = "takingAmount", default)]
    pub taking_amount: Option<String>,
}

/// Response from order cancellation endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelResponse {
    #[serde(default)]
    pub canceled: Vec<String>,
    #[serde(default)]
    pub not_canceled: HashMap<String, String>,
}

/// Open order from `/data/orders`
#[derive(Debug, Clone, Deserialize)]
pub struct OpenOrder {
    pub id: String,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub market: Option<String>,

    pub asset_id: String,

    pub side: Side,

    /// Original size, decimal string
    pub original_size: String,

    /// Size matched so far, decimal string
    #[serde(default)]
    pub size_matched: Option<String>,

    pub price: String,
}

impl OpenOrder {
    pub fn price_f64(&self) -> f64 {
        self.price.parse().unwrap_or(0.0)
    }

    pub fn original_size_f64(&self) -> f64 {
        self.original_size.parse().unwrap_or(0.0)
    }

    pub fn size_matched_f64(&self) -> f64 {
        self.size_matched
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0)
    }
}

/// Cursor-paginated list from the data endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub next_cursor: String,
    #[serde(default)]
    pub count: Option<u64>,
}

/// Asset class selector for balance queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetType {
    Collateral,
    Conditional,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Collateral => "COLLATERAL",
            AssetType::Conditional => "CONDITIONAL",
        }
    }
}

/// Balance/allowance response, values in smallest units (6 decimals)
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceAllowance {
    pub balance: String,
    #[serde(default)]
    pub allowance: Option<String>,
}

impl BalanceAllowance {
    /// Raw smallest-unit balance as integer; unparseable payloads read as 0.
    pub fn raw_balance(&self) -> u64 {
        self.balance.parse::<f64>().unwrap_or(0.0).max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_response_parses_minimal() {
        let json = r#"{"success": true, "orderID": "0xabc", "status": "live"}"#;
        let resp: OrderPlacementResponse = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        assert_eq!(resp.order_id.as_deref(), Some("0xabc"));
    }

    #[test]
    fn test_placement_response_error_shape() {
        let json = r#"{"success": false, "errorMsg": "not enough balance/allowance"}"#;
        let resp: OrderPlacementResponse = serde_json::from_str(json).unwrap();
        assert!(!resp.success);
        assert!(resp.error_msg.unwrap().contains("balance"));
    }

    #[test]
    fn test_open_order_size_matched() {
        let json = r#"{
            "id": "0x1",
            "asset_id": "tok",
            "side": "BUY",
            "original_size": "5",
            "size_matched": "3.0",
            "price": "0.48"
        }"#;
        let order: OpenOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.size_matched_f64(), 3.0);
        assert_eq!(order.original_size_f64(), 5.0);
        assert_eq!(order.price_f64(), 0.48);
    }

    #[test]
    fn test_balance_raw() {
        let b = BalanceAllowance {
            balance: "12500000".to_string(),
            allowance: None,
        };
        assert_eq!(b.raw_balance(), 12_500_000);
    }
}
