//! CLOB authentication
//!
//! Two credential levels:
//! - L1: EIP-712 signatures from the EOA signer (API-key derivation, order signing)
//! - L2: HMAC-SHA256 over timestamp+method+path+body with the derived API secret

use super::types::ApiCredentials;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use ethers::prelude::*;
use ethers::types::{Signature, H256};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Failed to sign message: {0}")]
    SigningError(String),

    #[error("Invalid private key")]
    InvalidPrivateKey,

    #[error("HMAC error: {0}")]
    HmacError(String),

    #[error("API credentials not set")]
    CredentialsMissing,
}

pub type Result<T> = std::result::Result<T, AuthError>;

/// Signing-wallet auth manager for the CLOB API.
pub struct ClobAuth {
    wallet: LocalWallet,
    wallet_address: Address,
    chain_id: u64,
    api_key: Option<ApiCredentials>,
}

impl ClobAuth {
    /// Create from a hex private key (with or without 0x prefix).
    pub fn new(private_key: &str, chain_id: u64) -> Result<Self> {
        let key = private_key.trim_start_matches("0x");

        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|_| AuthError::InvalidPrivateKey)?
            .with_chain_id(chain_id);

        let wallet_address = wallet.address();

        Ok(Self {
            wallet,
            wallet_address,
            chain_id,
            api_key: None,
        })
    }

    /// Signer address
    pub fn address(&self) -> Address {
        self.wallet_address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Store derived API credentials for subsequent L2 requests.
    pub fn set_api_key(&mut self, credentials: ApiCredentials) {
        self.api_key = Some(credentials);
    }

    pub fn api_key(&self) -> Option<&ApiCredentials> {
        self.api_key.as_ref()
    }

    /// Generate the L1 attestation signature used for API-key derivation.
    pub async fn sign_l1_message(&self, timestamp: u64, nonce: u64) -> Result<String> {
        let message = format!(
            "This message attests that I control the given wallet\nAddress: {:?}\nTimestamp: {}\nNonce: {}",
            self.wallet_address, timestamp, nonce
        );

        let signature = self
            .wallet
            .sign_message(message.as_bytes())
            .await
            .map_err(|e| AuthError::SigningError(e.to_string()))?;

        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }

    /// Generate the L2 HMAC signature for an API request.
    ///
    /// 1. Base64-decode the API secret (URL-safe alphabet)
    /// 2. message = timestamp + method + path + body
    /// 3. HMAC-SHA256, then URL-safe base64 encode
    pub fn sign_l2_request(
        &self,
        timestamp: u64,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<String> {
        let api_key = self.api_key.as_ref().ok_or(AuthError::CredentialsMissing)?;

        let secret_bytes = URL_SAFE
            .decode(&api_key.secret)
            .map_err(|e| AuthError::HmacError(format!("Failed to decode secret: {}", e)))?;

        let message = format!("{}{}{}{}", timestamp, method, path, body);

        let mut mac = HmacSha256::new_from_slice(&secret_bytes)
            .map_err(|e| AuthError::HmacError(e.to_string()))?;
        mac.update(message.as_bytes());

        Ok(URL_SAFE.encode(mac.finalize().into_bytes()))
    }

    /// Build L1 authentication headers (API-key derivation endpoints).
    pub async fn l1_headers(&self, timestamp: u64, nonce: u64) -> Result<HashMap<String, String>> {
        let signature = self.sign_l1_message(timestamp, nonce).await?;

        let mut headers = HashMap::new();
        headers.insert(
            "POLY_ADDRESS".to_string(),
            ethers::utils::to_checksum(&self.wallet_address, None),
        );
        headers.insert("POLY_SIGNATURE".to_string(), signature);
        headers.insert("POLY_TIMESTAMP".to_string(), timestamp.to_string());
        headers.insert("POLY_NONCE".to_string(), nonce.to_string());

        Ok(headers)
    }

    /// Build L2 authentication headers for trading/data requests.
    pub fn l2_headers(
        &self,
        timestamp: u64,
        method: &str,
        path: &str,
        body: &str,
    ) -> Result<HashMap<String, String>> {
        let api_key = self.api_key.as_ref().ok_or(AuthError::CredentialsMissing)?;
        let signature = self.sign_l2_request(timestamp, method, path, body)?;

        let mut headers = HashMap::new();
        headers.insert(
            "POLY_ADDRESS".to_string(),
            ethers::utils::to_checksum(&self.wallet_address, None),
        );
        headers.insert("POLY_SIGNATURE".to_string(), signature);
        headers.insert("POLY_TIMESTAMP".to_string(), timestamp.to_string());
        headers.insert("POLY_API_KEY".to_string(), api_key.key.clone());
        headers.insert("POLY_PASSPHRASE".to_string(), api_key.passphrase.clone());

        Ok(headers)
    }

    /// Current Unix timestamp in seconds.
    pub fn current_timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_secs()
    }

    /// Sign a raw 32-byte hash (EIP-712 order signing, no prefix).
    pub fn sign_hash(&self, hash: H256) -> Result<Signature> {
        self.wallet
            .sign_hash(hash)
            .map_err(|e| AuthError::SigningError(e.to_string()))
    }

    /// Sign a raw hash, hex-encoded with 0x prefix.
    pub fn sign_hash_hex(&self, hash: H256) -> Result<String> {
        let signature = self.sign_hash(hash)?;
        Ok(format!("0x{}", hex::encode(signature.to_vec())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0x1234567890123456789012345678901234567890123456789012345678901234";

    #[test]
    fn test_auth_creation() {
        assert!(ClobAuth::new(TEST_KEY, 137).is_ok());
    }

    #[test]
    fn test_invalid_private_key() {
        assert!(ClobAuth::new("invalid", 137).is_err());
    }

    #[tokio::test]
    async fn test_l1_signature() {
        let auth = ClobAuth::new(TEST_KEY, 137).unwrap();
        let signature = auth.sign_l1_message(1234567890, 0).await;
        assert!(signature.unwrap().starts_with("0x"));
    }

    #[test]
    fn test_l2_signature_requires_credentials() {
        let auth = ClobAuth::new(TEST_KEY, 137).unwrap();
        assert!(auth.sign_l2_request(1234567890, "GET", "/markets", "").is_err());
    }

    #[test]
    fn test_l2_signature() {
        let mut auth = ClobAuth::new(TEST_KEY, 137).unwrap();
        // "dGVzdF9zZWNyZXRfMTIzNDU2" is base64 for "test_secret_123456"
        auth.set_api_key(ApiCredentials {
            key: "test_key".to_string(),
            secret: "dGVzdF9zZWNyZXRfMTIzNDU2".to_string(),
            passphrase: "test_pass".to_string(),
        });

        assert!(auth.sign_l2_request(1234567890, "GET", "/markets", "").is_ok());
    }
}
