//! Quote pricing
//!
//! Pure function from the two best asks to a proposed bid pair. The bids are
//! placed so that, if both legs fill, the combined cost lands at the regime's
//! target; holding the pair to settlement then pays the difference to one.

use crate::domain::market::Regime;

/// Fixed half-spread proxy: the usable mid is estimated at 98% of the ask.
const MID_PROXY: f64 = 0.98;

/// Exchange price floor.
const PRICE_FLOOR: f64 = 0.01;

/// Numerical safety margin on the combined-cost rejection check.
const COMBINED_SLACK: f64 = 0.01;

/// Per-regime pricing parameters. These are the only knobs that differ
/// between the live and premarket windows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegimeParams {
    /// Combined cost the bid pair aims for
    pub target_combined: f64,
    /// Minimum discount below the mids worth quoting for
    pub min_edge: f64,
}

impl RegimeParams {
    pub fn for_regime(regime: Regime) -> Self {
        match regime {
            Regime::Live => Self {
                target_combined: 0.97,
                min_edge: 0.02,
            },
            Regime::Premarket => Self {
                target_combined: 0.98,
                min_edge: 0.015,
            },
        }
    }
}

/// Outcome of a pricing pass.
///
/// `Skip` (volatility filter) and `NoEdge` are treated identically by
/// consumers at decision time but logged differently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuoteDecision {
    Pair { bid_up: f64, bid_down: f64 },
    NoEdge,
    Skip,
}

impl QuoteDecision {
    pub fn is_pair(&self) -> bool {
        matches!(self, QuoteDecision::Pair { .. })
    }
}

/// Propose a bid pair for the given best asks.
///
/// Mid for each side is estimated as ask x 0.98. The discount needed to pull
/// the combined mid down to the target is split across the legs in
/// proportion to their weight, flooring at the exchange minimum. Pairs whose
/// combined bid still exceeds target + 0.01 are rejected outright.
pub fn quote_pair(
    ask_up: f64,
    ask_down: f64,
    params: &RegimeParams,
    volatility_threshold: f64,
) -> QuoteDecision {
    // One side trading rich means the market has mostly made up its mind;
    // quoting into that is directional risk, not arbitrage.
    if ask_up >= volatility_threshold || ask_down >= volatility_threshold {
        return QuoteDecision::Skip;
    }

    let mid_up = ask_up * MID_PROXY;
    let mid_down = ask_down * MID_PROXY;
    let combined_mid = mid_up + mid_down;

    if combined_mid <= 0.0 {
        return QuoteDecision::NoEdge;
    }

    let discount_needed = combined_mid - params.target_combined;
    if discount_needed < params.min_edge {
        return QuoteDecision::NoEdge;
    }

    let weight_up = mid_up / combined_mid;
    let weight_down = mid_down / combined_mid;

    let bid_up = (mid_up - discount_needed * weight_up).max(PRICE_FLOOR);
    let bid_down = (mid_down - discount_needed * weight_down).max(PRICE_FLOOR);

    if bid_up + bid_down > params.target_combined + COMBINED_SLACK {
        return QuoteDecision::NoEdge;
    }

    QuoteDecision::Pair { bid_up, bid_down }
}
