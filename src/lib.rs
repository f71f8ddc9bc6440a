//! Pair-arbitrage bot - main library
//!
//! Thin presentation layer over the `pairarb` engine: shared startup wiring
//! for the two binaries (`market_maker` and `arb_taker`).

// Re-export the engine for convenience
pub use pairarb;

// Binary common utilities
pub mod bin_common {
    //! Shared startup wiring for the binaries.

    pub mod runner;

    pub use runner::run_engine;
}
