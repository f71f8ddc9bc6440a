//! Domain Layer
//!
//! Pure business entities with no I/O: markets, regimes and orderbooks.

pub mod market;
pub mod orderbook;

pub use market::{PairMarket, Regime};
pub use orderbook::{micros_to_f64, price_to_micros, Orderbook, OrderbookSide, PriceLevel};
