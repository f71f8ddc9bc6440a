//! Engine configuration
//!
//! Env-first: secrets and tunables come from the environment (a `.env` file
//! is honoured), with an optional YAML overlay for the non-secret tuning
//! knobs. Everything is validated at load; a bad knob fails startup rather
//! than a live trade.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable not set: {0}")]
    EnvVarMissing(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

const DEFAULT_CLOB_URL: &str = "https://clob.polymarket.com";
const DEFAULT_GAMMA_URL: &str = "https://gamma-api.polymarket.com";

// ============================================================================
// Tuning blocks
// ============================================================================

/// Executor scan tuning.
///
/// Two operating points have seen production use; the aggressive tuple is
/// the default and `conservative()` trades fill rate for fewer false
/// positives near expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTuning {
    /// Minimum crossing edge (1 - combined ask) to act on
    pub min_edge: f64,
    /// Skip markets expiring within this many seconds
    pub expiry_cutoff_secs: u64,
    /// Scan cadence in milliseconds
    pub scan_interval_ms: u64,
    /// Hard cap on shares per executor trade
    pub max_shares: u64,
    /// Probe size of the first (DOWN) leg
    pub min_shares: u64,
}

impl Default for ScanTuning {
    fn default() -> Self {
        Self {
            min_edge: 0.005,
            expiry_cutoff_secs: 60,
            scan_interval_ms: 100,
            max_shares: 100,
            min_shares: 5,
        }
    }
}

impl ScanTuning {
    /// Conservative preset: wider edge, earlier cutoff, slower cadence.
    pub fn conservative() -> Self {
        Self {
            min_edge: 0.02,
            expiry_cutoff_secs: 120,
            scan_interval_ms: 300,
            ..Self::default()
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }
}

/// Market-maker quoting tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteTuning {
    /// Shares per quote leg
    pub shares_per_order: u64,
    /// Tick cadence in milliseconds
    pub requote_interval_ms: u64,
    /// Skip pricing entirely when either ask reaches this level
    pub volatility_threshold: f64,
    /// Leave existing quotes alone when the new pair moves less than this
    pub requote_tolerance: f64,
    /// Stop placing new quotes inside this window before expiry (seconds)
    pub quote_stop_secs: u64,
    /// Final settlement sweep window before expiry (seconds)
    pub settle_window_secs: u64,
}

impl Default for QuoteTuning {
    fn default() -> Self {
        Self {
            shares_per_order: 5,
            requote_interval_ms: 2000,
            volatility_threshold: 0.80,
            requote_tolerance: 0.005,
            quote_stop_secs: 300,
            settle_window_secs: 60,
        }
    }
}

impl QuoteTuning {
    pub fn requote_interval(&self) -> Duration {
        Duration::from_millis(self.requote_interval_ms)
    }
}

/// One-sided-fill recovery tuning. All waits are bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryTuning {
    /// Accepted unwind premium: complete while filled + ask <= 1 + this
    pub max_unwind_loss: f64,
    /// Aggressive-complete fill wait (seconds) and poll cadence (ms)
    pub complete_wait_secs: u64,
    pub complete_poll_ms: u64,
    /// Price-improvement wait (seconds) and poll cadence (ms)
    pub improve_wait_secs: u64,
    pub improve_poll_ms: u64,
    /// Cut-loss sell attempts and per-attempt poll cadence (ms)
    pub cutloss_attempts: u32,
    pub cutloss_poll_ms: u64,
    /// Delay before selling a just-bought token (ms)
    pub settlement_delay_ms: u64,
}

impl Default for RecoveryTuning {
    fn default() -> Self {
        Self {
            max_unwind_loss: 0.02,
            complete_wait_secs: 30,
            complete_poll_ms: 1000,
            improve_wait_secs: 30,
            improve_poll_ms: 2000,
            cutloss_attempts: 3,
            cutloss_poll_ms: 2000,
            settlement_delay_ms: 1500,
        }
    }
}

impl RecoveryTuning {
    pub fn complete_wait(&self) -> Duration {
        Duration::from_secs(self.complete_wait_secs)
    }
    pub fn complete_poll(&self) -> Duration {
        Duration::from_millis(self.complete_poll_ms)
    }
    pub fn improve_wait(&self) -> Duration {
        Duration::from_secs(self.improve_wait_secs)
    }
    pub fn improve_poll(&self) -> Duration {
        Duration::from_millis(self.improve_poll_ms)
    }
    pub fn cutloss_poll(&self) -> Duration {
        Duration::from_millis(self.cutloss_poll_ms)
    }
    pub fn settlement_delay(&self) -> Duration {
        Duration::from_millis(self.settlement_delay_ms)
    }
}

/// YAML overlay: only tuning knobs, never secrets.
#[derive(Debug, Clone, Default, Deserialize)]
struct TuningFile {
    #[serde(default)]
    scan: Option<ScanTuning>,
    #[serde(default)]
    quoting: Option<QuoteTuning>,
    #[serde(default)]
    recovery: Option<RecoveryTuning>,
}

// ============================================================================
// EngineConfig
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// EOA signer key (required, env only)
    pub private_key: String,
    /// Funder proxy-wallet address, when trading through a proxy
    pub proxy_wallet: Option<String>,
    /// 0 = EOA, 1 = proxy, 2 = safe
    pub signature_type: u8,
    pub log_level: String,
    /// Dashboard HTTP port
    pub dashboard_port: u16,

    pub clob_url: String,
    pub gamma_url: String,
    pub ws_url: String,
    /// Restrict discovery to one catalog series, when set
    pub series_id: Option<String>,

    pub scan: ScanTuning,
    pub quoting: QuoteTuning,
    pub recovery: RecoveryTuning,

    /// Root for CSV/JSON trade records
    pub data_dir: PathBuf,
    /// Rediscovery cadence in multi-market mode (seconds)
    pub rediscovery_secs: u64,
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
        Err(_) => Ok(default),
    }
}

impl EngineConfig {
    /// Load from the environment (honouring `.env`).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let private_key = std::env::var("POLYMARKET_PRIVATE_KEY")
            .map_err(|_| ConfigError::EnvVarMissing("POLYMARKET_PRIVATE_KEY".to_string()))?;

        let mut scan = ScanTuning::default();
        scan.min_edge = env_parse("MIN_EDGE", scan.min_edge)?;
        scan.expiry_cutoff_secs = env_parse("EXPIRY_CUTOFF_SECONDS", scan.expiry_cutoff_secs)?;
        scan.scan_interval_ms = env_parse("SCAN_INTERVAL_MS", scan.scan_interval_ms)?;

        let mut quoting = QuoteTuning::default();
        quoting.shares_per_order = env_parse("SHARES_PER_ORDER", quoting.shares_per_order)?;
        quoting.requote_interval_ms =
            env_parse("REQUOTE_INTERVAL_MS", quoting.requote_interval_ms)?;
        quoting.volatility_threshold =
            env_parse("VOLATILITY_THRESHOLD", quoting.volatility_threshold)?;

        let config = Self {
            private_key,
            proxy_wallet: std::env::var("POLYMARKET_PROXY_WALLET").ok(),
            signature_type: env_parse("POLYMARKET_SIGNATURE_TYPE", 0u8)?,
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            dashboard_port: env_parse("PORT", 8080u16)?,
            clob_url: std::env::var("CLOB_URL").unwrap_or_else(|_| DEFAULT_CLOB_URL.to_string()),
            gamma_url: std::env::var("GAMMA_URL")
                .unwrap_or_else(|_| DEFAULT_GAMMA_URL.to_string()),
            ws_url: std::env::var("WS_URL")
                .unwrap_or_else(|_| super::client::MARKET_WS_URL.to_string()),
            series_id: std::env::var("GAMMA_SERIES_ID").ok(),
            scan,
            quoting,
            recovery: RecoveryTuning::default(),
            data_dir: PathBuf::from(
                std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
            ),
            rediscovery_secs: env_parse("REDISCOVERY_SECONDS", 15u64)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply a YAML tuning overlay on top of the env-derived config.
    pub fn overlay_yaml(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let overlay: TuningFile = serde_yaml::from_str(&content)?;

        if let Some(scan) = overlay.scan {
            self.scan = scan;
        }
        if let Some(quoting) = overlay.quoting {
            self.quoting = quoting;
        }
        if let Some(recovery) = overlay.recovery {
            self.recovery = recovery;
        }

        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        let check_unit = |name: &str, value: f64| {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue(
                    name.to_string(),
                    value.to_string(),
                ));
            }
            Ok(())
        };

        check_unit("MIN_EDGE", self.scan.min_edge)?;
        check_unit("VOLATILITY_THRESHOLD", self.quoting.volatility_threshold)?;
        check_unit("max_unwind_loss", self.recovery.max_unwind_loss)?;

        if self.signature_type > 2 {
            return Err(ConfigError::InvalidValue(
                "POLYMARKET_SIGNATURE_TYPE".to_string(),
                self.signature_type.to_string(),
            ));
        }
        if self.quoting.shares_per_order == 0 {
            return Err(ConfigError::InvalidValue(
                "SHARES_PER_ORDER".to_string(),
                "0".to_string(),
            ));
        }
        if self.quoting.requote_interval_ms == 0 || self.scan.scan_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "interval".to_string(),
                "0".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue(
                "LOG_LEVEL".to_string(),
                self.log_level.clone(),
            ));
        }

        Ok(())
    }

    /// Log a redacted summary at startup.
    pub fn log_summary(&self) {
        info!("Configuration loaded:");
        info!("  CLOB: {}", self.clob_url);
        info!("  Gamma: {}", self.gamma_url);
        info!(
            "  Signature type: {} (proxy: {})",
            self.signature_type,
            self.proxy_wallet.is_some()
        );
        info!(
            "  Scan: min_edge={} cutoff={}s interval={}ms",
            self.scan.min_edge, self.scan.expiry_cutoff_secs, self.scan.scan_interval_ms
        );
        info!(
            "  Quoting: {} shares, requote {}ms, vol threshold {}",
            self.quoting.shares_per_order,
            self.quoting.requote_interval_ms,
            self.quoting.volatility_threshold
        );
        info!("  Data dir: {}", self.data_dir.display());
    }

    /// Config for tests: simulated keys, millisecond-scale waits.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            private_key: "0x0000000000000000000000000000000000000000000000000000000000000001"
                .to_string(),
            proxy_wallet: None,
            signature_type: 0,
            log_level: "debug".to_string(),
            dashboard_port: 0,
            clob_url: DEFAULT_CLOB_URL.to_string(),
            gamma_url: DEFAULT_GAMMA_URL.to_string(),
            ws_url: super::client::MARKET_WS_URL.to_string(),
            series_id: None,
            scan: ScanTuning::default(),
            quoting: QuoteTuning {
                requote_interval_ms: 10,
                ..QuoteTuning::default()
            },
            recovery: RecoveryTuning {
                complete_wait_secs: 1,
                complete_poll_ms: 5,
                improve_wait_secs: 1,
                improve_poll_ms: 5,
                cutloss_attempts: 3,
                cutloss_poll_ms: 5,
                settlement_delay_ms: 1,
                max_unwind_loss: 0.02,
            },
            data_dir: PathBuf::from("data"),
            rediscovery_secs: 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tuples() {
        let scan = ScanTuning::default();
        assert_eq!(scan.min_edge, 0.005);
        assert_eq!(scan.expiry_cutoff_secs, 60);
        assert_eq!(scan.scan_interval_ms, 100);

        let conservative = ScanTuning::conservative();
        assert_eq!(conservative.min_edge, 0.02);
        assert_eq!(conservative.expiry_cutoff_secs, 120);
        assert_eq!(conservative.scan_interval_ms, 300);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = EngineConfig::for_tests();
        config.scan.min_edge = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::for_tests();
        config.signature_type = 7;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::for_tests();
        config.quoting.shares_per_order = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_overlay() {
        let config = EngineConfig::for_tests();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tuning.yaml");
        std::fs::write(
            &path,
            "scan:\n  min_edge: 0.02\n  expiry_cutoff_secs: 120\n  scan_interval_ms: 300\n  max_shares: 50\n  min_shares: 5\n",
        )
        .unwrap();

        let config = config.overlay_yaml(&path).unwrap();
        assert_eq!(config.scan.min_edge, 0.02);
        assert_eq!(config.scan.max_shares, 50);
        // Untouched blocks keep defaults
        assert_eq!(config.quoting.volatility_threshold, 0.80);
    }
}
