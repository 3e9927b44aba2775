use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::warn;
use zeroize::Zeroizing;

use crate::codec;
use crate::error::{TokenError, TokenResult};

type HmacSha256 = Hmac<Sha256>;

/// How a [`Signer`] protects the tokens it signs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerMode {
    /// HMAC-SHA-256 keyed by the configured secret.
    Keyed,
    /// Unkeyed SHA-256 checksum. Sufficient for offline/demo operation,
    /// explicitly not a security guarantee.
    Degraded,
}

/// Computes and verifies message-authentication codes over encoded
/// token segments. Verification is constant-time in both modes.
#[derive(Clone)]
pub struct Signer {
    secret: Zeroizing<Vec<u8>>,
    mode: SignerMode,
}

impl Signer {
    pub fn keyed(secret: &[u8]) -> Self {
        Self {
            secret: Zeroizing::new(secret.to_vec()),
            mode: SignerMode::Keyed,
        }
    }

    pub fn degraded() -> Self {
        warn!("no signing secret configured; falling back to unkeyed checksum signatures");
        Self {
            secret: Zeroizing::new(Vec::new()),
            mode: SignerMode::Degraded,
        }
    }

    /// Picks the mode from an optional secret: a missing or blank secret
    /// selects the degraded checksum mode.
    pub fn from_secret(secret: Option<&str>) -> Self {
        match secret.map(str::trim) {
            Some(value) if !value.is_empty() => Self::keyed(value.as_bytes()),
            _ => Self::degraded(),
        }
    }

    pub fn mode(&self) -> SignerMode {
        self.mode
    }

    pub fn is_degraded(&self) -> bool {
        self.mode == SignerMode::Degraded
    }

    /// Returns the URL-safe encoded digest of `message`.
    pub fn sign(&self, message: &str) -> TokenResult<String> {
        Ok(codec::encode_bytes(&self.digest(message)?))
    }

    /// Recomputes the digest and compares it to `signature` without
    /// early exit on the first differing byte.
    pub fn verify(&self, message: &str, signature: &str) -> bool {
        let provided = match codec::decode_bytes(signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        match self.mode {
            SignerMode::Keyed => {
                // Mac::verify_slice compares in constant time.
                match <HmacSha256 as Mac>::new_from_slice(&self.secret) {
                    Ok(mut mac) => {
                        mac.update(message.as_bytes());
                        mac.verify_slice(&provided).is_ok()
                    }
                    Err(_) => false,
                }
            }
            SignerMode::Degraded => match self.digest(message) {
                Ok(expected) => ct_eq(&expected, &provided),
                Err(_) => false,
            },
        }
    }

    fn digest(&self, message: &str) -> TokenResult<Vec<u8>> {
        match self.mode {
            SignerMode::Keyed => {
                let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
                    .map_err(|_| TokenError::InvalidKey)?;
                mac.update(message.as_bytes());
                Ok(mac.finalize().into_bytes().to_vec())
            }
            SignerMode::Degraded => {
                let mut hasher = Sha256::new();
                hasher.update(b"portal-degraded:");
                hasher.update(message.as_bytes());
                Ok(hasher.finalize().to_vec())
            }
        }
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("mode", &self.mode)
            .field("secret", &"***redacted***")
            .finish()
    }
}

fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
