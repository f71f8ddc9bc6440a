//! Engine bootstrap shared by the binaries
//!
//! Loads configuration, wires the live gateway, cache, discovery, registry
//! and stats together, and hands control to the Supervisor.

use pairarb::application::discovery::DiscoveryService;
use pairarb::application::registry::MarketRegistry;
use pairarb::application::stats::EngineStats;
use pairarb::application::supervisor::{EngineMode, Supervisor};
use pairarb::infrastructure::book_cache::BookCache;
use pairarb::infrastructure::client::gamma::GammaClient;
use pairarb::infrastructure::config::EngineConfig;
use pairarb::infrastructure::gateway::{ExchangeGateway, LiveGateway};
use pairarb::infrastructure::logging::init_tracing_with_level;
use pairarb::infrastructure::persistence::DataRecorder;
use pairarb::infrastructure::shutdown::ShutdownManager;
use std::sync::Arc;
use tracing::{info, warn};

/// Load config, connect to the exchange and run the engine in `mode` until
/// shutdown.
pub async fn run_engine(mode: EngineMode) -> anyhow::Result<()> {
    let mut config = EngineConfig::from_env()?;
    if let Ok(path) = std::env::var("ENGINE_CONFIG") {
        config = config.overlay_yaml(&path)?;
    }

    init_tracing_with_level(&config.log_level);
    info!(
        "Starting pairarb in {} mode",
        match mode {
            EngineMode::MarketMaker => "market-maker",
            EngineMode::ArbTaker => "arb-taker",
        }
    );
    config.log_summary();

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.spawn_signal_handler();

    let gateway: Arc<dyn ExchangeGateway> = Arc::new(LiveGateway::connect(&config).await?);
    let books = Arc::new(BookCache::default());
    let discovery = DiscoveryService::new(
        GammaClient::new(&config.gamma_url),
        config.series_id.clone(),
        config.scan.expiry_cutoff_secs,
    );
    let registry = Arc::new(MarketRegistry::new());
    let stats = Arc::new(EngineStats::new());

    let recorder = match DataRecorder::new(&config.data_dir) {
        Ok(recorder) => Some(recorder),
        Err(e) => {
            warn!("Data recorder unavailable ({}), records disabled", e);
            None
        }
    };

    let supervisor = Supervisor::new(
        config, gateway, books, discovery, registry, stats, recorder, shutdown,
    );
    supervisor.run(mode).await
}
