//! Polymarket CTF Exchange constants
//!
//! Contract addresses and EIP-712 domain constants for Polygon Mainnet.

use ethers::types::Address;

// ============================================================================
// Network
// ============================================================================

/// Chain ID for Polygon Mainnet
pub const POLYGON_CHAIN_ID: u64 = 137;

// ============================================================================
// Contract Addresses (Polygon Mainnet)
// ============================================================================

/// CTF Exchange contract address (regular markets)
pub const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";

/// CTF Exchange contract address (neg_risk markets)
pub const NEG_RISK_CTF_EXCHANGE: &str = "0xC5d563A36AE78145C45a50134d48A1215220f80a";

/// Zero address (public orders)
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

// ============================================================================
// EIP-712 Domain
// ============================================================================

pub const EIP712_DOMAIN_NAME: &str = "Polymarket CTF Exchange";
pub const EIP712_DOMAIN_VERSION: &str = "1";

// ============================================================================
// Signature Types
// ============================================================================

/// EOA signature type (direct wallet signing)
pub const SIGNATURE_TYPE_EOA: u8 = 0;

/// POLY_PROXY signature type (proxy wallet)
pub const SIGNATURE_TYPE_POLY_PROXY: u8 = 1;

/// POLY_GNOSIS_SAFE signature type
pub const SIGNATURE_TYPE_POLY_GNOSIS_SAFE: u8 = 2;

// ============================================================================
// Order Side Encoding
// ============================================================================

pub const SIDE_BUY: u8 = 0;
pub const SIDE_SELL: u8 = 1;

// ============================================================================
// Token Decimals
// ============================================================================

/// Collateral (USDC) and conditional tokens carry 6 decimal places
pub const TOKEN_DECIMALS: u32 = 6;

/// Multiplier for converting to smallest units (10^6)
pub const DECIMAL_MULTIPLIER: u64 = 1_000_000;

// ============================================================================
// Helpers
// ============================================================================

pub fn exchange_address() -> Address {
    CTF_EXCHANGE.parse().expect("Invalid exchange address constant")
}

pub fn neg_risk_exchange_address() -> Address {
    NEG_RISK_CTF_EXCHANGE
        .parse()
        .expect("Invalid neg_risk exchange address constant")
}

pub fn get_exchange_address(neg_risk: bool) -> Address {
    if neg_risk {
        neg_risk_exchange_address()
    } else {
        exchange_address()
    }
}

pub fn zero_address() -> Address {
    ZERO_ADDRESS.parse().expect("Invalid zero address constant")
}
