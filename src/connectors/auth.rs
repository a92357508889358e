//! RSA-PSS request signing for the Kalshi WebSocket handshake.
//!
//! Kalshi authenticates the upgrade request with three headers: the API key
//! id, a base64 RSA-PSS (SHA-256) signature over
//! `<timestamp-ms> + "GET" + <upgrade-path>`, and the timestamp itself.
//! A fresh timestamp is generated for every dial attempt so retries never
//! reuse a stale signature.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::BlindedSigningKey;
use rsa::sha2::Sha256;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use std::path::Path;
use thiserror::Error;

/// Upgrade path covered by the handshake signature.
pub const KALSHI_WS_PATH: &str = "/trade-api/ws/v2";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("failed to read private key file: {0}")]
    KeyFile(#[from] std::io::Error),

    #[error("failed to parse private key: {0}")]
    KeyParse(String),
}

/// Authentication headers for one WebSocket upgrade request.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    /// KALSHI-ACCESS-KEY value.
    pub key_id: String,
    /// KALSHI-ACCESS-SIGNATURE value (base64).
    pub signature: String,
    /// KALSHI-ACCESS-TIMESTAMP value (ms since epoch).
    pub timestamp: String,
}

/// Signs Kalshi handshake requests with a private key loaded at startup.
pub struct KalshiSigner {
    key_id: String,
    signing_key: BlindedSigningKey<Sha256>,
}

impl std::fmt::Debug for KalshiSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KalshiSigner")
            .field("key_id", &self.key_id)
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}

impl KalshiSigner {
    /// Loads a PEM-encoded RSA private key from disk. PKCS#8 is tried
    /// first, PKCS#1 as a fallback.
    pub fn from_pem_file(key_id: &str, path: impl AsRef<Path>) -> Result<Self, AuthError> {
        let pem = std::fs::read_to_string(path)?;
        Self::from_pem(key_id, &pem)
    }

    /// Builds a signer from PEM text.
    pub fn from_pem(key_id: &str, pem: &str) -> Result<Self, AuthError> {
        let private_key = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| AuthError::KeyParse(e.to_string()))?;

        Ok(Self {
            key_id: key_id.to_string(),
            signing_key: BlindedSigningKey::<Sha256>::new(private_key),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Signs the upgrade request with the current wall-clock timestamp.
    pub fn ws_handshake_headers(&self) -> SignedHeaders {
        self.sign_with_timestamp(Utc::now().timestamp_millis())
    }

    /// Signs the upgrade request with an explicit timestamp.
    pub fn sign_with_timestamp(&self, timestamp_ms: i64) -> SignedHeaders {
        let message = signing_message(timestamp_ms);
        let signature = self
            .signing_key
            .sign_with_rng(&mut rand::thread_rng(), message.as_bytes());

        SignedHeaders {
            key_id: self.key_id.clone(),
            signature: BASE64.encode(signature.to_bytes()),
            timestamp: timestamp_ms.to_string(),
        }
    }
}

fn signing_message(timestamp_ms: i64) -> String {
    format!("{timestamp_ms}GET{KALSHI_WS_PATH}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signer() -> KalshiSigner {
        // 1024 bits keeps key generation fast; PSS with SHA-256 needs at
        // least 66 bytes of modulus.
        let key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        KalshiSigner {
            key_id: "test-key-id".to_string(),
            signing_key: BlindedSigningKey::<Sha256>::new(key),
        }
    }

    #[test]
    fn test_signing_message_format() {
        assert_eq!(
            signing_message(1706817600000),
            "1706817600000GET/trade-api/ws/v2"
        );
    }

    #[test]
    fn test_sign_produces_decodable_signature() {
        let signer = test_signer();
        let headers = signer.sign_with_timestamp(1706817600000);

        assert_eq!(headers.key_id, "test-key-id");
        assert_eq!(headers.timestamp, "1706817600000");
        assert!(!BASE64.decode(&headers.signature).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_pem_is_rejected() {
        let result = KalshiSigner::from_pem("key", "not a pem at all");
        assert!(matches!(result, Err(AuthError::KeyParse(_))));
    }

    #[test]
    fn test_missing_key_file_is_io_error() {
        let result = KalshiSigner::from_pem_file("key", "/definitely/not/here.pem");
        assert!(matches!(result, Err(AuthError::KeyFile(_))));
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let signer = test_signer();
        let debug_output = format!("{:?}", signer);
        assert!(debug_output.contains("test-key-id"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
