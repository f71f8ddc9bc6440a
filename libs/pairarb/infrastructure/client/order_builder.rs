//! EIP-712 order construction for the CTF Exchange
//!
//! Builds and signs the on-chain Order struct the CLOB expects. The encoding
//! must match the Solidity struct field-for-field; the signature covers
//! keccak256("\x19\x01" || domainSeparator || structHash).

use super::auth::ClobAuth;
use super::constants::*;
use super::types::{OrderType, Side};
use ethers::types::{Address, H256, U256};
use ethers::utils::{keccak256, to_checksum};
use rand::Rng;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrderBuilderError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid token ID: {0}")]
    InvalidTokenId(String),

    #[error("Failed to sign order: {0}")]
    SigningError(String),
}

pub type Result<T> = std::result::Result<T, OrderBuilderError>;

// ============================================================================
// Order struct
// ============================================================================

/// CTF Exchange Order matching the on-chain EIP-712 struct.
///
/// Field order and types must match the Solidity declaration exactly.
#[derive(Debug, Clone)]
pub struct Order {
    pub salt: U256,
    /// Funder address (proxy wallet for proxy/safe signature types)
    pub maker: Address,
    /// Signing wallet address
    pub signer: Address,
    /// Taker address (zero for public orders)
    pub taker: Address,
    /// ERC1155 conditional token ID
    pub token_id: U256,
    pub maker_amount: U256,
    pub taker_amount: U256,
    /// Expiration timestamp (0 = no expiration)
    pub expiration: U256,
    pub nonce: U256,
    pub fee_rate_bps: U256,
    /// 0 = BUY, 1 = SELL
    pub side: u8,
    /// 0 = EOA, 1 = POLY_PROXY, 2 = POLY_GNOSIS_SAFE
    pub signature_type: u8,
}

/// Signed order ready for API submission
#[derive(Debug, Clone)]
pub struct SignedOrder {
    pub order: Order,
    pub signature: String,
}

impl SignedOrder {
    /// Serialise for the API. Field formats follow the official clients:
    /// salt is a JSON number, amounts and ids are strings, side is
    /// "BUY"/"SELL", and insertion order must be preserved.
    pub fn to_api_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();

        let salt_number = serde_json::Number::from_string_unchecked(self.order.salt.to_string());
        map.insert("salt".to_string(), serde_json::Value::Number(salt_number));
        map.insert(
            "maker".to_string(),
            serde_json::Value::String(to_checksum(&self.order.maker, None)),
        );
        map.insert(
            "signer".to_string(),
            serde_json::Value::String(to_checksum(&self.order.signer, None)),
        );
        map.insert(
            "taker".to_string(),
            serde_json::Value::String(to_checksum(&self.order.taker, None)),
        );
        map.insert(
            "tokenId".to_string(),
            serde_json::Value::String(self.order.token_id.to_string()),
        );
        map.insert(
            "makerAmount".to_string(),
            serde_json::Value::String(self.order.maker_amount.to_string()),
        );
        map.insert(
            "takerAmount".to_string(),
            serde_json::Value::String(self.order.taker_amount.to_string()),
        );
        map.insert(
            "expiration".to_string(),
            serde_json::Value::String(self.order.expiration.to_string()),
        );
        map.insert(
            "nonce".to_string(),
            serde_json::Value::String(self.order.nonce.to_string()),
        );
        map.insert(
            "feeRateBps".to_string(),
            serde_json::Value::String(self.order.fee_rate_bps.to_string()),
        );
        map.insert(
            "side".to_string(),
            serde_json::Value::String(
                if self.order.side == SIDE_BUY { "BUY" } else { "SELL" }.to_string(),
            ),
        );
        map.insert(
            "signatureType".to_string(),
            serde_json::Value::Number(self.order.signature_type.into()),
        );
        map.insert(
            "signature".to_string(),
            serde_json::Value::String(self.signature.clone()),
        );

        serde_json::Value::Object(map)
    }
}

/// Wrap a signed order into the `/order` request body.
pub fn build_order_payload(
    signed: &SignedOrder,
    api_key: &str,
    order_type: OrderType,
) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    map.insert("order".to_string(), signed.to_api_json());
    map.insert(
        "owner".to_string(),
        serde_json::Value::String(api_key.to_string()),
    );
    map.insert(
        "orderType".to_string(),
        serde_json::Value::String(order_type.as_str().to_string()),
    );
    serde_json::Value::Object(map)
}

// ============================================================================
// ABI encoding helpers
// ============================================================================

fn encode_uint256(value: U256) -> [u8; 32] {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    buf
}

fn encode_address(addr: Address) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[12..].copy_from_slice(addr.as_bytes());
    buf
}

fn encode_uint8(value: u8) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf[31] = value;
    buf
}

// ============================================================================
// EIP-712 hashing
// ============================================================================

/// domainSeparator = keccak256(typeHash || nameHash || versionHash || chainId || exchange)
pub fn compute_domain_separator(chain_id: u64, neg_risk: bool) -> [u8; 32] {
    let type_hash = keccak256(
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    );
    let name_hash = keccak256(EIP712_DOMAIN_NAME.as_bytes());
    let version_hash = keccak256(EIP712_DOMAIN_VERSION.as_bytes());

    let mut encoded = Vec::new();
    encoded.extend_from_slice(&type_hash);
    encoded.extend_from_slice(&name_hash);
    encoded.extend_from_slice(&version_hash);
    encoded.extend_from_slice(&encode_uint256(U256::from(chain_id)));
    encoded.extend_from_slice(&encode_address(get_exchange_address(neg_risk)));

    keccak256(&encoded)
}

fn compute_struct_hash(order: &Order) -> [u8; 32] {
    let type_hash = keccak256(
        b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)",
    );

    let mut encoded = Vec::new();
    encoded.extend_from_slice(&type_hash);
    encoded.extend_from_slice(&encode_uint256(order.salt));
    encoded.extend_from_slice(&encode_address(order.maker));
    encoded.extend_from_slice(&encode_address(order.signer));
    encoded.extend_from_slice(&encode_address(order.taker));
    encoded.extend_from_slice(&encode_uint256(order.token_id));
    encoded.extend_from_slice(&encode_uint256(order.maker_amount));
    encoded.extend_from_slice(&encode_uint256(order.taker_amount));
    encoded.extend_from_slice(&encode_uint256(order.expiration));
    encoded.extend_from_slice(&encode_uint256(order.nonce));
    encoded.extend_from_slice(&encode_uint256(order.fee_rate_bps));
    encoded.extend_from_slice(&encode_uint8(order.side));
    encoded.extend_from_slice(&encode_uint8(order.signature_type));

    keccak256(&encoded)
}

/// Full message hash: keccak256("\x19\x01" || domainSeparator || structHash)
pub fn compute_eip712_hash(order: &Order, chain_id: u64, neg_risk: bool) -> [u8; 32] {
    let domain_separator = compute_domain_separator(chain_id, neg_risk);
    let struct_hash = compute_struct_hash(order);

    let mut message = Vec::with_capacity(66);
    message.extend_from_slice(b"\x19\x01");
    message.extend_from_slice(&domain_separator);
    message.extend_from_slice(&struct_hash);

    keccak256(&message)
}

// ============================================================================
// OrderBuilder
// ============================================================================

/// Builder for signed orders.
pub struct OrderBuilder {
    signer: Address,
    maker: Address,
    chain_id: u64,
    signature_type: u8,
    neg_risk: bool,
}

impl OrderBuilder {
    /// Create a builder for the given signer/maker pair.
    ///
    /// For EOA signing `signer == maker`; for proxy and safe wallets the
    /// maker is the funder address holding collateral.
    pub fn new(
        signer: Address,
        maker: Address,
        chain_id: u64,
        signature_type: u8,
        neg_risk: bool,
    ) -> Self {
        Self {
            signer,
            maker,
            chain_id,
            signature_type,
            neg_risk,
        }
    }

    /// Build and sign a limit order.
    pub fn build_signed_order(
        &self,
        auth: &ClobAuth,
        token_id: &str,
        price: f64,
        size: f64,
        side: Side,
        nonce: u64,
        fee_rate_bps: Option<u64>,
    ) -> Result<SignedOrder> {
        if price <= 0.0 || price >= 1.0 {
            return Err(OrderBuilderError::InvalidPrice(format!(
                "Price must be between 0 and 1 (exclusive), got: {}",
                price
            )));
        }
        if size <= 0.0 {
            return Err(OrderBuilderError::InvalidSize(format!(
                "Size must be positive, got: {}",
                size
            )));
        }

        let token_id_u256 = U256::from_dec_str(token_id).map_err(|e| {
            OrderBuilderError::InvalidTokenId(format!("Failed to parse token ID: {}", e))
        })?;

        let (maker_amount, taker_amount) = self.calculate_amounts(price, size, side);

        let order = Order {
            salt: generate_salt(),
            maker: self.maker,
            signer: self.signer,
            taker: zero_address(),
            token_id: token_id_u256,
            maker_amount,
            taker_amount,
            expiration: U256::zero(),
            nonce: U256::from(nonce),
            fee_rate_bps: U256::from(fee_rate_bps.unwrap_or(0)),
            side: match side {
                Side::Buy => SIDE_BUY,
                Side::Sell => SIDE_SELL,
            },
            signature_type: self.signature_type,
        };

        let message_hash = compute_eip712_hash(&order, self.chain_id, self.neg_risk);
        let signature = auth
            .sign_hash_hex(H256::from(message_hash))
            .map_err(|e| OrderBuilderError::SigningError(e.to_string()))?;

        Ok(SignedOrder { order, signature })
    }

    /// Amounts in smallest units (6 decimals).
    ///
    /// BUY:  makerAmount = price * size (collateral spent), takerAmount = size
    /// SELL: makerAmount = size (tokens sold), takerAmount = price * size
    fn calculate_amounts(&self, price: f64, size: f64, side: Side) -> (U256, U256) {
        let size_scaled = (size * DECIMAL_MULTIPLIER as f64).round() as u128;
        let collateral = (price * size * DECIMAL_MULTIPLIER as f64).round() as u128;

        match side {
            Side::Buy => (U256::from(collateral), U256::from(size_scaled)),
            Side::Sell => (U256::from(size_scaled), U256::from(collateral)),
        }
    }
}

/// Random salt in the format the official clients use:
/// round(unix_seconds * random()), a small-ish integer.
fn generate_salt() -> U256 {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs_f64();

    let random: f64 = rand::thread_rng().gen();
    U256::from((now * random).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eoa_builder(addr: Address) -> OrderBuilder {
        OrderBuilder::new(addr, addr, POLYGON_CHAIN_ID, SIGNATURE_TYPE_EOA, false)
    }

    #[test]
    fn test_amount_calculation_buy() {
        let builder = eoa_builder(Address::zero());
        let (maker_amount, taker_amount) = builder.calculate_amounts(0.5, 100.0, Side::Buy);
        assert_eq!(maker_amount, U256::from(50_000_000u64));
        assert_eq!(taker_amount, U256::from(100_000_000u64));
    }

    #[test]
    fn test_amount_calculation_sell() {
        let builder = eoa_builder(Address::zero());
        let (maker_amount, taker_amount) = builder.calculate_amounts(0.5, 100.0, Side::Sell);
        assert_eq!(maker_amount, U256::from(100_000_000u64));
        assert_eq!(taker_amount, U256::from(50_000_000u64));
    }

    #[test]
    fn test_salt_uniqueness() {
        assert_ne!(generate_salt(), generate_salt());
    }

    #[test]
    fn test_domain_separator_known_values() {
        // Known-answer vectors from the official Python client
        let expected_regular =
            hex::decode("1a573e3617c78403b5b4b892827992f027b03d4eaf570048b8ee8cdd84d151be")
                .unwrap();
        let expected_neg_risk =
            hex::decode("82cb6aa85babb812f4b521a12b10f0cbc68d2b44be7bc02c047004f544adb49f")
                .unwrap();

        assert_eq!(
            compute_domain_separator(POLYGON_CHAIN_ID, false).to_vec(),
            expected_regular
        );
        assert_eq!(
            compute_domain_separator(POLYGON_CHAIN_ID, true).to_vec(),
            expected_neg_risk
        );
    }

    #[test]
    fn test_eip712_hash_known_value() {
        // Known-answer vector from the official Python client
        let maker: Address = "0x497284Cd581433f3C8224F07556a8d903113E0D3".parse().unwrap();

        let order = Order {
            salt: U256::from(12345u64),
            maker,
            signer: maker,
            taker: zero_address(),
            token_id: U256::from_dec_str(
                "87681536460342357667165150330318852851476971055929009934844581402585803923513",
            )
            .unwrap(),
            maker_amount: U256::from(16400000u64),
            taker_amount: U256::from(40000000u64),
            expiration: U256::zero(),
            nonce: U256::zero(),
            fee_rate_bps: U256::zero(),
            side: SIDE_BUY,
            signature_type: SIGNATURE_TYPE_EOA,
        };

        let expected =
            hex::decode("36ea8c22435f8c4a2804e77be5074f23f98101af0a339564693cd0b186ebda46")
                .unwrap();
        assert_eq!(
            compute_eip712_hash(&order, POLYGON_CHAIN_ID, false).to_vec(),
            expected
        );
    }

    #[test]
    fn test_signature_matches_python_client() {
        // Private key that derives to 0x497284Cd581433f3C8224F07556a8d903113E0D3
        let private_key = "0x257091039adf0d3df1f3171508f7db838782ee9b4f6ad61054be773e7541d90a";
        let auth = ClobAuth::new(private_key, POLYGON_CHAIN_ID).unwrap();
        let maker = auth.address();

        let order = Order {
            salt: U256::from(12345u64),
            maker,
            signer: maker,
            taker: zero_address(),
            token_id: U256::from_dec_str(
                "87681536460342357667165150330318852851476971055929009934844581402585803923513",
            )
            .unwrap(),
            maker_amount: U256::from(16400000u64),
            taker_amount: U256::from(40000000u64),
            expiration: U256::zero(),
            nonce: U256::zero(),
            fee_rate_bps: U256::zero(),
            side: SIDE_BUY,
            signature_type: SIGNATURE_TYPE_EOA,
        };

        let hash = compute_eip712_hash(&order, POLYGON_CHAIN_ID, false);
        let signature = auth.sign_hash_hex(H256::from(hash)).unwrap();

        let expected_sig = "0x069db5e77ee9b663b7c2d9bb388b156b314d42d39d3f968edcba9ebbd662b8856a116138dc95883183889d48d615b1f4ead5a35d18b439ab0a2b45b794744d151b";
        assert_eq!(signature.to_lowercase(), expected_sig.to_lowercase());
    }

    #[test]
    fn test_api_json_field_order_and_types() {
        let maker = Address::zero();
        let signed = SignedOrder {
            order: Order {
                salt: U256::from(7u64),
                maker,
                signer: maker,
                taker: zero_address(),
                token_id: U256::from(1u64),
                maker_amount: U256::from(2400000u64),
                taker_amount: U256::from(5000000u64),
                expiration: U256::zero(),
                nonce: U256::zero(),
                fee_rate_bps: U256::zero(),
                side: SIDE_BUY,
                signature_type: SIGNATURE_TYPE_EOA,
            },
            signature: "0xsig".to_string(),
        };

        let json = signed.to_api_json();
        assert!(json["salt"].is_number());
        assert_eq!(json["side"], "BUY");
        assert_eq!(json["makerAmount"], "2400000");
        assert_eq!(json["signatureType"], 0);

        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys.first().map(|s| s.as_str()), Some("salt"));
        assert_eq!(keys.last().map(|s| s.as_str()), Some("signature"));
    }
}
