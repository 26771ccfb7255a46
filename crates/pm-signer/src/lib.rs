//! C1 Auth Signer: deterministic Ed25519 signing of outbound requests.
//!
//! Grounded on `examples/original_source/basic.py`, which signs
//! `f"{ts}{method}{path}"` with an `Ed25519PrivateKey` built from the first
//! 32 bytes of the base64-decoded secret. The teacher's own signer
//! (`hip3-executor::signer::KeyManager`) uses `alloy`'s secp256k1 scheme for
//! EIP-712 payloads, which does not apply to this exchange's auth scheme;
//! the key-loading shape (load once at startup, fail fast on bad input) is
//! kept, the cryptography is swapped for `ed25519-dalek`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use ed25519_dalek::{Signature, Signer, SigningKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignerError {
    #[error("secret key is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("decoded secret must be at least 32 bytes, got {0}")]
    SecretTooShort(usize),
}

pub type Result<T> = std::result::Result<T, SignerError>;

/// The three headers every authenticated request (REST or WS upgrade) must
/// carry.
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub access_key: String,
    pub timestamp_ms: i64,
    pub signature_b64: String,
}

/// Holds the loaded signing key and the access-key id sent alongside it.
/// Construction is fallible (bad secret); signing after that is infallible.
pub struct AuthSigner {
    access_key: String,
    signing_key: SigningKey,
}

impl AuthSigner {
    pub fn new(access_key: impl Into<String>, secret_b64: &str) -> Result<Self> {
        let decoded = STANDARD.decode(secret_b64.trim())?;
        if decoded.len() < 32 {
            return Err(SignerError::SecretTooShort(decoded.len()));
        }
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&decoded[..32]);
        let signing_key = SigningKey::from_bytes(&scalar);
        Ok(Self {
            access_key: access_key.into(),
            signing_key,
        })
    }

    /// Signs `method` + `path` (no scheme/host/query string) at the current
    /// millisecond timestamp and returns the header triple.
    pub fn sign_now(&self, method: &str, path: &str) -> SignedHeaders {
        let ts = Utc::now().timestamp_millis();
        self.sign_at(method, path, ts)
    }

    pub fn sign_at(&self, method: &str, path: &str, timestamp_ms: i64) -> SignedHeaders {
        let message = Self::canonical_message(timestamp_ms, method, path);
        let sig: Signature = self.signing_key.sign(message.as_bytes());
        SignedHeaders {
            access_key: self.access_key.clone(),
            timestamp_ms,
            signature_b64: STANDARD.encode(sig.to_bytes()),
        }
    }

    /// `timestamp_ms‖METHOD_UPPER‖path`, exactly per spec.md §4.1 — decimal
    /// timestamp, no separators, method upper-cased, path only (no query).
    pub fn canonical_message(timestamp_ms: i64, method: &str, path: &str) -> String {
        format!("{timestamp_ms}{}{path}", method.to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_secret() -> String {
        // 32 zero bytes, base64-encoded — deterministic for tests.
        STANDARD.encode([0u8; 32])
    }

    #[test]
    fn rejects_short_secret() {
        let short = STANDARD.encode([0u8; 16]);
        let err = AuthSigner::new("key", &short).unwrap_err();
        assert!(matches!(err, SignerError::SecretTooShort(16)));
    }

    #[test]
    fn rejects_invalid_base64() {
        let err = AuthSigner::new("key", "not-base64-!!!").unwrap_err();
        assert!(matches!(err, SignerError::InvalidBase64(_)));
    }

    #[test]
    fn canonical_message_has_no_separators() {
        let msg = AuthSigner::canonical_message(1_700_000_000_000, "get", "/v1/markets");
        assert_eq!(msg, "1700000000000GET/v1/markets");
    }

    #[test]
    fn signing_is_deterministic_for_same_inputs() {
        let signer = AuthSigner::new("key-1", &test_secret()).unwrap();
        let a = signer.sign_at("GET", "/v1/markets", 123);
        let b = signer.sign_at("GET", "/v1/markets", 123);
        assert_eq!(a.signature_b64, b.signature_b64);
        assert_eq!(a.access_key, "key-1");
        assert_eq!(a.timestamp_ms, 123);
    }

    #[test]
    fn signing_differs_across_timestamps() {
        let signer = AuthSigner::new("key-1", &test_secret()).unwrap();
        let a = signer.sign_at("GET", "/v1/markets", 1);
        let b = signer.sign_at("GET", "/v1/markets", 2);
        assert_ne!(a.signature_b64, b.signature_b64);
    }

    #[test]
    fn round_trip_is_byte_identical_for_same_tuple() {
        // spec.md §8: "encoding the canonical signed message and
        // re-encoding yields a byte-identical string for the same tuple"
        let m1 = AuthSigner::canonical_message(42, "POST", "/v1/orders");
        let m2 = AuthSigner::canonical_message(42, "post", "/v1/orders");
        assert_eq!(m1, m2);
    }
}
