//! Flat-file trade records under `data/`
//!
//! Three artifacts:
//! - `observations.csv`: append-only log of every arbitrage window seen,
//!   ordered fields ending with the disappearance reason
//! - `executed_trades.json`: array of completed executor trades, rewritten
//!   atomically (temp file + rename)
//! - `scan_stats.json`: overwritten each scan cycle

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RecorderError>;

/// Why an observed arbitrage window stopped being actionable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisappearReason {
    PriceMoved,
    LiquidityExhausted,
    ExpiryCutoff,
    StillActive,
}

impl DisappearReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisappearReason::PriceMoved => "price_moved",
            DisappearReason::LiquidityExhausted => "liquidity_exhausted",
            DisappearReason::ExpiryCutoff => "expiry_cutoff",
            DisappearReason::StillActive => "still_active",
        }
    }
}

/// One arbitrage window observation. Field order is the CSV column order;
/// the reason stays last.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub timestamp: String,
    pub market_id: String,
    pub question: String,
    pub ask_up: f64,
    pub ask_down: f64,
    pub combined: f64,
    pub edge: f64,
    pub executable_shares: u64,
    pub reason: DisappearReason,
}

/// A completed executor trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub timestamp: String,
    pub market_id: String,
    pub question: String,
    pub shares: u64,
    pub up_price: f64,
    pub down_price: f64,
    pub combined_cost: f64,
    pub expected_profit: f64,
}

/// Per-cycle scanner counters, overwritten in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanStats {
    pub timestamp: String,
    pub scan_count: u64,
    pub markets_tracked: usize,
    pub arbs_found: u64,
    pub last_scan_ms: u64,
}

/// Recorder rooted at the data directory.
pub struct DataRecorder {
    dir: PathBuf,
}

impl DataRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Append one observation row; the header is written on first use.
    pub fn record_observation(&self, record: &ObservationRecord) -> Result<()> {
        let path = self.path("observations.csv");
        let write_header = !path.exists();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(write_header)
            .from_writer(file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }

    /// Append a trade to the JSON array, rewriting the file atomically.
    pub fn append_trade(&self, record: &TradeRecord) -> Result<()> {
        let path = self.path("executed_trades.json");
        let mut trades: Vec<TradeRecord> = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!("executed_trades.json unreadable ({}), starting fresh", e);
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        trades.push(record.clone());
        self.write_json_atomic(&path, &trades)
    }

    /// Overwrite the per-cycle scan stats.
    pub fn write_scan_stats(&self, stats: &ScanStats) -> Result<()> {
        self.write_json_atomic(&self.path("scan_stats.json"), stats)
    }

    /// Load recorded trades (empty when none recorded yet).
    pub fn load_trades(&self) -> Result<Vec<TradeRecord>> {
        let path = self.path("executed_trades.json");
        match fs::read_to_string(&path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(_) => Ok(Vec::new()),
        }
    }

    fn write_json_atomic<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(value)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(reason: DisappearReason) -> ObservationRecord {
        ObservationRecord {
            timestamp: "2026-08-01T15:00:00Z".to_string(),
            market_id: "cond-1".to_string(),
            question: "Bitcoin Up or Down - 3:00PM-3:15PM ET".to_string(),
            ask_up: 0.48,
            ask_down: 0.49,
            combined: 0.97,
            edge: 0.03,
            executable_shares: 25,
            reason,
        }
    }

    #[test]
    fn test_csv_appends_with_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DataRecorder::new(dir.path()).unwrap();

        recorder
            .record_observation(&observation(DisappearReason::StillActive))
            .unwrap();
        recorder
            .record_observation(&observation(DisappearReason::PriceMoved))
            .unwrap();

        let content = fs::read_to_string(dir.path().join("observations.csv")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3); // header + 2 rows
        assert!(lines[0].starts_with("timestamp,"));
        assert!(lines[0].ends_with(",reason"));
        assert!(lines[1].ends_with("still_active"));
        assert!(lines[2].ends_with("price_moved"));
    }

    #[test]
    fn test_trade_array_grows_and_survives_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DataRecorder::new(dir.path()).unwrap();

        let trade = TradeRecord {
            timestamp: "2026-08-01T15:01:00Z".to_string(),
            market_id: "cond-1".to_string(),
            question: "Bitcoin Up or Down - 3:00PM-3:15PM ET".to_string(),
            shares: 5,
            up_price: 0.48,
            down_price: 0.49,
            combined_cost: 0.97,
            expected_profit: 0.15,
        };

        recorder.append_trade(&trade).unwrap();
        recorder.append_trade(&trade).unwrap();

        let trades = recorder.load_trades().unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].shares, 5);

        // No temp file left behind
        assert!(!dir.path().join("executed_trades.json.tmp").exists());
    }

    #[test]
    fn test_scan_stats_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = DataRecorder::new(dir.path()).unwrap();

        recorder
            .write_scan_stats(&ScanStats {
                scan_count: 1,
                ..Default::default()
            })
            .unwrap();
        recorder
            .write_scan_stats(&ScanStats {
                scan_count: 2,
                ..Default::default()
            })
            .unwrap();

        let content = fs::read_to_string(dir.path().join("scan_stats.json")).unwrap();
        let stats: ScanStats = serde_json::from_str(&content).unwrap();
        assert_eq!(stats.scan_count, 2);
    }
}
