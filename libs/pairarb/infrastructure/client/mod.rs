//! Exchange client stack
//!
//! REST (CLOB + market catalog), WebSocket market feed, authentication and
//! EIP-712 order signing.

pub mod auth;
pub mod constants;
pub mod gamma;
pub mod market_ws;
pub mod order_builder;
pub mod rest;
pub mod types;

pub use auth::{AuthError, ClobAuth};
pub use constants::{
    POLYGON_CHAIN_ID, SIGNATURE_TYPE_EOA, SIGNATURE_TYPE_POLY_GNOSIS_SAFE,
    SIGNATURE_TYPE_POLY_PROXY,
};
pub use gamma::{GammaClient, GammaError, GammaEvent, GammaMarket};
pub use market_ws::{run_market_feed, MARKET_WS_URL};
pub use order_builder::{OrderBuilder, OrderBuilderError, SignedOrder};
pub use rest::{RestClient, RestError};
pub use types::{
    ApiCredentials, AssetType, BalanceAllowance, BookResponse, CancelResponse, OpenOrder,
    OrderPlacementResponse, OrderType, PaginatedResponse, Side,
};
