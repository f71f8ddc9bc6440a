//! Engine statistics
//!
//! Cheap shared counters the trading paths bump and the dashboard reads.
//! Event lines fan out over a broadcast channel; slow or absent dashboard
//! subscribers never block the engine.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::broadcast;

use parking_lot::RwLock;

const PNL_SCALE: f64 = 1_000_000.0;

pub struct EngineStats {
    started_at: Instant,
    status: RwLock<String>,

    scan_count: AtomicU64,
    markets_tracked: AtomicUsize,
    quotes_placed: AtomicU64,
    fills_detected: AtomicU64,
    completes: AtomicU64,
    cut_losses: AtomicU64,
    arbs_found: AtomicU64,
    arbs_executed: AtomicU64,
    blocked_markets: AtomicU64,
    /// Realised P&L in collateral micros, signed
    realized_pnl_micros: AtomicI64,

    events: broadcast::Sender<String>,
}

/// Point-in-time view for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub status: String,
    pub runtime_secs: u64,
    pub scan_count: u64,
    pub markets_tracked: usize,
    pub quotes_placed: u64,
    pub fills_detected: u64,
    pub completes: u64,
    pub cut_losses: u64,
    pub arbs_found: u64,
    pub arbs_executed: u64,
    pub blocked_markets: u64,
    pub realized_pnl: f64,
}

impl EngineStats {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            started_at: Instant::now(),
            status: RwLock::new("starting".to_string()),
            scan_count: AtomicU64::new(0),
            markets_tracked: AtomicUsize::new(0),
            quotes_placed: AtomicU64::new(0),
            fills_detected: AtomicU64::new(0),
            completes: AtomicU64::new(0),
            cut_losses: AtomicU64::new(0),
            arbs_found: AtomicU64::new(0),
            arbs_executed: AtomicU64::new(0),
            blocked_markets: AtomicU64::new(0),
            realized_pnl_micros: AtomicI64::new(0),
            events,
        }
    }

    pub fn set_status(&self, status: impl Into<String>) {
        *self.status.write() = status.into();
    }

    pub fn incr_scans(&self) {
        self.scan_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_markets_tracked(&self, count: usize) {
        self.markets_tracked.store(count, Ordering::Relaxed);
    }

    pub fn incr_quotes_placed(&self) {
        self.quotes_placed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_fills(&self) {
        self.fills_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_completes(&self) {
        self.completes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_cut_losses(&self) {
        self.cut_losses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_arbs_found(&self) {
        self.arbs_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_arbs_executed(&self) {
        self.arbs_executed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_blocked(&self) {
        self.blocked_markets.fetch_add(1, Ordering::Relaxed);
    }

    /// Record realised P&L (may be negative).
    pub fn add_realized_pnl(&self, pnl: f64) {
        self.realized_pnl_micros
            .fetch_add((pnl * PNL_SCALE) as i64, Ordering::Relaxed);
    }

    pub fn realized_pnl(&self) -> f64 {
        self.realized_pnl_micros.load(Ordering::Relaxed) as f64 / PNL_SCALE
    }

    /// Publish an event line to dashboard subscribers.
    pub fn emit(&self, line: impl Into<String>) {
        // No receivers is fine; the engine never depends on observers
        let _ = self.events.send(line.into());
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<String> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            status: self.status.read().clone(),
            runtime_secs: self.started_at.elapsed().as_secs(),
            scan_count: self.scan_count.load(Ordering::Relaxed),
            markets_tracked: self.markets_tracked.load(Ordering::Relaxed),
            quotes_placed: self.quotes_placed.load(Ordering::Relaxed),
            fills_detected: self.fills_detected.load(Ordering::Relaxed),
            completes: self.completes.load(Ordering::Relaxed),
            cut_losses: self.cut_losses.load(Ordering::Relaxed),
            arbs_found: self.arbs_found.load(Ordering::Relaxed),
            arbs_executed: self.arbs_executed.load(Ordering::Relaxed),
            blocked_markets: self.blocked_markets.load(Ordering::Relaxed),
            realized_pnl: self.realized_pnl(),
        }
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}
