//! Pair-Arbitrage Engine for Binary Prediction Markets
//!
//! Automated market making and crossing-arbitrage on Polymarket 15-minute
//! Up/Down markets. Two complementary outcome tokens pay exactly one unit at
//! settlement; whenever both legs can be acquired for a combined cost below
//! one, holding equal share counts to expiry locks in the difference.

// Core layers (Clean Architecture)
pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export commonly used items from the domain layer
pub use domain::market::{PairMarket, Regime};
pub use domain::orderbook::{Orderbook, OrderbookSide, PriceLevel};

// Re-export commonly used items from infrastructure
pub use infrastructure::book_cache::BookCache;
pub use infrastructure::config::EngineConfig;
pub use infrastructure::gateway::{
    BookTop, ExchangeGateway, GatewayError, GatewayResult, LiveGateway, OpenOrderSummary,
};
pub use infrastructure::logging::{init_tracing, init_tracing_with_level};
pub use infrastructure::shutdown::ShutdownManager;

// Re-export from the application layer
pub use application::executor::ArbExecutor;
pub use application::pricing::{quote_pair, QuoteDecision, RegimeParams};
pub use application::registry::MarketRegistry;
pub use application::session::{MarketSession, MarketStatus};
pub use application::stats::EngineStats;
pub use application::supervisor::{EngineMode, Supervisor};
