//! Arbitrage-taker entry point
//!
//! Scans tracked Up/Down markets for crossing arbitrage (ask sum below one)
//! and takes both legs under the equal-exposure protocol.

use pairarb::application::supervisor::EngineMode;
use pairarb_bot::bin_common::run_engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    run_engine(EngineMode::ArbTaker).await
}
