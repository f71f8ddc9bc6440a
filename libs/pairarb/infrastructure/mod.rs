//! Infrastructure Layer
//!
//! Implementations of external interfaces: exchange clients, the live book
//! cache, configuration, logging and flat-file persistence. Depends on the
//! domain layer, never on the application layer.

pub mod book_cache;
pub mod client;
pub mod config;
pub mod gateway;
pub mod logging;
pub mod persistence;
pub mod shutdown;

pub use book_cache::{BookCache, DEFAULT_FRESHNESS};
pub use client::{
    ApiCredentials, ClobAuth, GammaClient, GammaEvent, GammaMarket, OpenOrder, OrderBuilder,
    OrderType, RestClient, RestError, Side, MARKET_WS_URL,
};
pub use config::{ConfigError, EngineConfig, QuoteTuning, RecoveryTuning, ScanTuning};
pub use gateway::{
    snap_to_tick, BookTop, ExchangeGateway, GatewayError, GatewayResult, LiveGateway,
    OpenOrderSummary,
};
pub use logging::{init_tracing, init_tracing_with_level};
pub use persistence::{
    DataRecorder, DisappearReason, ObservationRecord, ScanStats, TradeRecord,
};
pub use shutdown::ShutdownManager;
