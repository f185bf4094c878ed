//! RSA-PSS authentication for the Kalshi API.
//!
//! Signature format: `RSA-PSS(SHA256, timestamp + method + path)` → base64,
//! MGF1(SHA256), salt length = digest length.
//! The `path` must NOT include query parameters.

use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue};
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::{BlindedSigningKey, Signature};
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use sha2::Sha256;

use common::Error;

pub const HEADER_KEY: &str = "KALSHI-ACCESS-KEY";
pub const HEADER_TIMESTAMP: &str = "KALSHI-ACCESS-TIMESTAMP";
pub const HEADER_SIGNATURE: &str = "KALSHI-ACCESS-SIGNATURE";

/// Holds the key id and the parsed RSA private key.
#[derive(Clone)]
pub struct KalshiAuth {
    key_id: String,
    signing_key: BlindedSigningKey<Sha256>,
}

impl std::fmt::Debug for KalshiAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KalshiAuth")
            .field("key_id", &"<redacted>")
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

/// Timestamp and signature for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub timestamp_ms: String,
    pub signature: String,
}

/// The string Kalshi expects to be signed.
pub fn canonical_message(timestamp_ms: &str, method: &str, path: &str) -> String {
    let path_clean = path.split('?').next().unwrap_or(path);
    format!("{}{}{}", timestamp_ms, method.to_uppercase(), path_clean)
}

impl KalshiAuth {
    /// Create from a key id and PEM-encoded private key string.
    ///
    /// The PEM string may contain literal `\n` (two chars) instead of real
    /// newlines; both forms are accepted.
    pub fn new(key_id: &str, pem_string: &str) -> Result<Self, Error> {
        let pem = pem_string.replace("\\n", "\n");
        let pem = pem.trim();

        let private_key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| Error::Auth(format!("Failed to parse RSA private key: {e}")))?;

        Ok(Self {
            key_id: key_id.trim().to_string(),
            signing_key: BlindedSigningKey::<Sha256>::new(private_key),
        })
    }

    /// Sign a request with a freshly generated millisecond timestamp.
    pub fn sign_request(&self, method: &str, path: &str) -> SignedRequest {
        let timestamp_ms = chrono::Utc::now().timestamp_millis().to_string();
        self.sign_at(timestamp_ms, method, path)
    }

    fn sign_at(&self, timestamp_ms: String, method: &str, path: &str) -> SignedRequest {
        let message = canonical_message(&timestamp_ms, method, path);
        let mut rng = rand::thread_rng();
        let signature: Signature = self.signing_key.sign_with_rng(&mut rng, message.as_bytes());

        SignedRequest {
            timestamp_ms,
            signature: base64::engine::general_purpose::STANDARD.encode(signature.to_bytes()),
        }
    }

    /// Build the authenticated header set. Every call signs anew, so a
    /// retried request never reuses an earlier timestamp.
    pub fn headers(&self, method: &str, path: &str) -> Result<HeaderMap, Error> {
        let signed = self.sign_request(method, path);

        let mut headers = HeaderMap::new();
        headers.insert(HEADER_KEY, header_value(&self.key_id, "key id")?);
        headers.insert(HEADER_TIMESTAMP, header_value(&signed.timestamp_ms, "timestamp")?);
        headers.insert(HEADER_SIGNATURE, header_value(&signed.signature, "signature")?);
        Ok(headers)
    }
}

fn header_value(raw: &str, what: &str) -> Result<HeaderValue, Error> {
    HeaderValue::from_str(raw).map_err(|_| Error::Auth(format!("{what} is not a valid header value")))
}
