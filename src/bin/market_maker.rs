//! Market-maker entry point
//!
//! Quotes bid pairs on discovered Up/Down markets and holds completed pairs
//! to settlement.

use pairarb::application::supervisor::EngineMode;
use pairarb_bot::bin_common::run_engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    run_engine(EngineMode::MarketMaker).await
}
