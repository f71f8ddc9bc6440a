//! Supervisor
//!
//! Owns the main loop for whichever operating mode the binary selected:
//! discovery and admission, per-market session tasks (maker mode) or the
//! scan/execute cycle (taker mode), expiry sweeps, stats and graceful
//! shutdown. The two modes are mutually exclusive; the executor's global
//! trade lock stays in place regardless.

use crate::application::dashboard;
use crate::application::discovery::DiscoveryService;
use crate::application::executor::{ArbExecutor, Opportunity, TradeOutcome};
use crate::application::registry::MarketRegistry;
use crate::application::session::{MarketSession, MarketStatus};
use crate::application::stats::EngineStats;
use crate::domain::market::PairMarket;
use crate::infrastructure::book_cache::BookCache;
use crate::infrastructure::client::market_ws::run_market_feed;
use crate::infrastructure::config::EngineConfig;
use crate::infrastructure::gateway::ExchangeGateway;
use crate::infrastructure::persistence::{
    DataRecorder, DisappearReason, ObservationRecord, ScanStats, TradeRecord,
};
use crate::infrastructure::shutdown::ShutdownManager;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Operating mode, chosen at startup. Maker quotes passively; taker crosses
/// the book when a true arbitrage appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    MarketMaker,
    ArbTaker,
}

pub struct Supervisor {
    config: EngineConfig,
    gateway: Arc<dyn ExchangeGateway>,
    books: Arc<BookCache>,
    discovery: DiscoveryService,
    registry: Arc<MarketRegistry>,
    stats: Arc<EngineStats>,
    recorder: Option<DataRecorder>,
    shutdown: Arc<ShutdownManager>,
}

impl Supervisor {
    pub fn new(
        config: EngineConfig,
        gateway: Arc<dyn ExchangeGateway>,
        books: Arc<BookCache>,
        discovery: DiscoveryService,
        registry: Arc<MarketRegistry>,
        stats: Arc<EngineStats>,
        recorder: Option<DataRecorder>,
        shutdown: Arc<ShutdownManager>,
    ) -> Self {
        Self {
            config,
            gateway,
            books,
            discovery,
            registry,
            stats,
            recorder,
            shutdown,
        }
    }

    /// Run until shutdown.
    pub async fn run(&self, mode: EngineMode) -> anyhow::Result<()> {
        self.stats.set_status(match mode {
            EngineMode::MarketMaker => "market_maker",
            EngineMode::ArbTaker => "arb_taker",
        });

        if self.config.dashboard_port != 0 {
            let stats = Arc::clone(&self.stats);
            let port = self.config.dashboard_port;
            tokio::spawn(async move {
                if let Err(e) = dashboard::serve(stats, port).await {
                    warn!("Dashboard server exited: {}", e);
                }
            });
        }

        match mode {
            EngineMode::MarketMaker => self.run_market_maker().await,
            EngineMode::ArbTaker => self.run_arb_taker().await,
        }
    }

    // ------------------------------------------------------------------
    // Maker mode
    // ------------------------------------------------------------------

    async fn run_market_maker(&self) -> anyhow::Result<()> {
        info!("Starting market-maker loop");
        let rediscovery = Duration::from_secs(self.config.rediscovery_secs);

        while self.shutdown.is_running() {
            match self.discovery.discover(Utc::now()).await {
                Ok(markets) => {
                    for market in markets {
                        if self.registry.can_admit(&market.id) {
                            self.admit_maker_market(market);
                        }
                    }
                }
                Err(e) => warn!("Discovery failed: {}", e),
            }

            self.sweep_expired();
            self.registry.sweep_finished();
            self.stats.set_markets_tracked(self.registry.active_count());

            self.shutdown.interruptible_sleep(rediscovery).await;
        }

        self.drain_sessions().await;
        info!("Market-maker loop ended");
        Ok(())
    }

    fn admit_maker_market(&self, market: PairMarket) {
        info!(
            "Admitting market {} ({}) [{}], expires {}",
            market.id,
            market.question,
            market.regime,
            market.end_time.format("%H:%M:%S UTC")
        );
        self.stats
            .emit(format!("ADMIT {} {}", market.id, market.question));

        let flag = self.shutdown.flag();
        let feed_handle = tokio::spawn(run_owned_feed(
            self.config.ws_url.clone(),
            vec![market.up_token.clone(), market.down_token.clone()],
            Arc::clone(&self.books),
            Arc::clone(&flag),
        ));

        let session = MarketSession::new(
            market.clone(),
            Arc::clone(&self.gateway),
            Arc::clone(&self.books),
            self.config.quoting.clone(),
            self.config.recovery.clone(),
            Arc::clone(&self.stats),
        );

        let registry = Arc::clone(&self.registry);
        let market_id = market.id.clone();
        let session_handle = tokio::spawn(async move {
            let final_status = session.run(flag).await;
            match final_status {
                MarketStatus::Blocked => registry.mark_blocked(&market_id),
                // Holding (or any clean exit with prior exposure) never
                // re-enters this cycle
                MarketStatus::Holding => registry.mark_completed(&market_id),
                _ => {}
            }
        });

        self.registry
            .insert_active(market, vec![session_handle, feed_handle]);
    }

    /// Shutdown drain: sessions cancel their own quotes; give them a bounded
    /// window, then sweep whatever the exchange still shows.
    async fn drain_sessions(&self) {
        info!("Draining {} session(s)", self.registry.active_count());
        let deadline = Instant::now() + Duration::from_secs(35);

        while self.registry.active_count() > 0 && Instant::now() < deadline {
            self.registry.sweep_finished();
            tokio::time::sleep(Duration::from_millis(250)).await;
        }

        if let Err(e) = self.gateway.cancel_all().await {
            warn!("Final cancel_all failed: {}", e);
        }
    }

    // ------------------------------------------------------------------
    // Taker mode
    // ------------------------------------------------------------------

    async fn run_arb_taker(&self) -> anyhow::Result<()> {
        info!("Starting arbitrage-taker loop");

        let executor = ArbExecutor::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.books),
            self.config.scan.clone(),
            self.config.recovery.clone(),
            Arc::clone(&self.stats),
        );

        let rediscovery = Duration::from_secs(self.config.rediscovery_secs);
        let mut last_discovery: Option<Instant> = None;
        // Arbs currently open in the books, for disappearance accounting
        let mut active_arbs: HashMap<String, Opportunity> = HashMap::new();

        while self.shutdown.is_running() {
            let scan_started = Instant::now();

            if last_discovery.map_or(true, |t| t.elapsed() >= rediscovery) {
                last_discovery = Some(Instant::now());
                match self.discovery.discover(Utc::now()).await {
                    Ok(markets) => {
                        for market in markets {
                            if self.registry.can_admit(&market.id) {
                                self.admit_taker_market(market);
                            }
                        }
                    }
                    Err(e) => warn!("Discovery failed: {}", e),
                }
                self.sweep_expired();
                self.registry.sweep_finished();
                self.stats.set_markets_tracked(self.registry.active_count());
            }

            let now = Utc::now();
            for market in self.registry.active_markets() {
                if self.registry.is_blocked(&market.id) || self.registry.is_completed(&market.id)
                {
                    continue;
                }

                match executor.scan_market(&market, now).await {
                    Some(opp) => {
                        if !active_arbs.contains_key(&market.id) {
                            self.stats.incr_arbs_found();
                            info!(
                                "[{}] Arb window open: {:.3}+{:.3} (edge {:.3}, {} shares)",
                                market.id,
                                opp.ask_up,
                                opp.ask_down,
                                opp.edge,
                                opp.executable_shares
                            );
                        }
                        active_arbs.insert(market.id.clone(), opp.clone());

                        match executor.execute(&opp).await {
                            Ok(TradeOutcome::Completed {
                                shares,
                                combined_cost,
                            }) => {
                                self.registry.mark_completed(&market.id);
                                self.record_trade(&opp, shares, combined_cost);
                            }
                            Ok(TradeOutcome::Retryable { reason }) => {
                                info!("[{}] Trade retryable: {}", market.id, reason);
                            }
                            Ok(TradeOutcome::Blocked { reason }) => {
                                error!(
                                    "[{}] BLOCKED ({}) question=\"{}\"",
                                    market.id, reason, market.question
                                );
                                self.stats.incr_blocked();
                                self.registry.mark_blocked(&market.id);
                            }
                            Err(e) => warn!("[{}] Execution error: {}", market.id, e),
                        }
                    }
                    None => {
                        if let Some(gone) = active_arbs.remove(&market.id) {
                            let reason = self.disappearance_reason(&gone, now).await;
                            self.record_observation(&gone, reason);
                        }
                    }
                }
            }

            self.stats.incr_scans();
            self.write_scan_stats(scan_started);

            self.shutdown
                .interruptible_sleep(self.config.scan.scan_interval())
                .await;
        }

        // Whatever is still open at shutdown goes down as still-active
        for (_, opp) in active_arbs {
            self.record_observation(&opp, DisappearReason::StillActive);
        }

        if let Err(e) = self.gateway.cancel_all().await {
            warn!("Final cancel_all failed: {}", e);
        }
        info!("Arbitrage-taker loop ended");
        Ok(())
    }

    fn admit_taker_market(&self, market: PairMarket) {
        info!("Tracking market {} ({})", market.id, market.question);
        self.books
            .subscribe(&[market.up_token.clone(), market.down_token.clone()]);

        let feed_handle = tokio::spawn(run_owned_feed(
            self.config.ws_url.clone(),
            vec![market.up_token.clone(), market.down_token.clone()],
            Arc::clone(&self.books),
            self.shutdown.flag(),
        ));

        self.registry.insert_active(market, vec![feed_handle]);
    }

    /// Why a previously open arb is no longer actionable.
    async fn disappearance_reason(
        &self,
        gone: &Opportunity,
        now: chrono::DateTime<Utc>,
    ) -> DisappearReason {
        if gone.market.time_to_expiry(now).num_seconds()
            <= self.config.scan.expiry_cutoff_secs as i64
        {
            return DisappearReason::ExpiryCutoff;
        }

        let asks = (
            self.books.best_ask(&gone.market.up_token),
            self.books.best_ask(&gone.market.down_token),
        );
        match asks {
            (Some((up, up_size)), Some((down, down_size))) => {
                if up + down >= 1.0 - self.config.scan.min_edge {
                    DisappearReason::PriceMoved
                } else if up_size.min(down_size) < 1.0 {
                    DisappearReason::LiquidityExhausted
                } else {
                    DisappearReason::PriceMoved
                }
            }
            _ => DisappearReason::LiquidityExhausted,
        }
    }

    // ------------------------------------------------------------------
    // Shared
    // ------------------------------------------------------------------

    fn sweep_expired(&self) {
        let now = Utc::now();
        for market in self.registry.active_markets() {
            if market.is_expired(now) {
                info!("Market {} expired, removing", market.id);
                self.registry.remove(&market.id);
            }
        }
    }

    fn record_trade(&self, opp: &Opportunity, shares: u64, combined_cost: f64) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        let record = TradeRecord {
            timestamp: Utc::now().to_rfc3339(),
            market_id: opp.market.id.clone(),
            question: opp.market.question.clone(),
            shares,
            up_price: opp.ask_up,
            down_price: opp.ask_down,
            combined_cost,
            expected_profit: (1.0 - combined_cost) * shares as f64,
        };
        if let Err(e) = recorder.append_trade(&record) {
            warn!("Failed to record trade: {}", e);
        }
    }

    fn record_observation(&self, opp: &Opportunity, reason: DisappearReason) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        let record = ObservationRecord {
            timestamp: Utc::now().to_rfc3339(),
            market_id: opp.market.id.clone(),
            question: opp.market.question.clone(),
            ask_up: opp.ask_up,
            ask_down: opp.ask_down,
            combined: opp.ask_up + opp.ask_down,
            edge: opp.edge,
            executable_shares: opp.executable_shares,
            reason,
        };
        if let Err(e) = recorder.record_observation(&record) {
            warn!("Failed to record observation: {}", e);
        }
    }

    fn write_scan_stats(&self, scan_started: Instant) {
        let Some(recorder) = &self.recorder else {
            return;
        };
        let snap = self.stats.snapshot();
        let stats = ScanStats {
            timestamp: Utc::now().to_rfc3339(),
            scan_count: snap.scan_count,
            markets_tracked: snap.markets_tracked,
            arbs_found: snap.arbs_found,
            last_scan_ms: scan_started.elapsed().as_millis() as u64,
        };
        if let Err(e) = recorder.write_scan_stats(&stats) {
            warn!("Failed to write scan stats: {}", e);
        }
    }
}

/// Feed wrapper taking owned arguments, suitable for `tokio::spawn`.
async fn run_owned_feed(
    url: String,
    tokens: Vec<String>,
    books: Arc<BookCache>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
) {
    run_market_feed(&url, tokens, books, shutdown).await;
}
