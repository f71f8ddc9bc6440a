//! Application Layer
//!
//! The trading engine proper: pricing, discovery, the per-market state
//! machine with one-sided recovery, the equal-exposure executor and the
//! supervisor that drives them. Depends on domain and infrastructure.

pub mod dashboard;
pub mod discovery;
pub mod executor;
pub mod pricing;
pub mod recovery;
pub mod registry;
pub mod session;
pub mod stats;
pub mod supervisor;

pub use discovery::DiscoveryService;
pub use executor::{ArbExecutor, Opportunity, TradeOutcome};
pub use pricing::{quote_pair, QuoteDecision, RegimeParams};
pub use registry::MarketRegistry;
pub use session::{MarketSession, MarketStatus};
pub use stats::{EngineStats, StatsSnapshot};
pub use supervisor::{EngineMode, Supervisor};
