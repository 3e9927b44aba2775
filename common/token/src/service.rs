use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::claims::{Claims, Identity, RefreshClaims};
use crate::codec;
use crate::error::{TokenError, TokenResult};
use crate::signer::Signer;

/// Fixed `iss` claim stamped on every issued token.
pub const ISSUER: &str = "ops-portal";
/// Fixed `aud` claim stamped on every issued token.
pub const AUDIENCE: &str = "ops-portal-client";
/// Access tokens live for 24 hours.
pub const ACCESS_TTL_SECONDS: i64 = 86_400;
/// Refresh tokens live for 7 days.
pub const REFRESH_TTL_SECONDS: i64 = 604_800;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

impl Header {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

/// Issuance parameters for a [`TokenService`].
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: ISSUER.to_string(),
            audience: AUDIENCE.to_string(),
            access_ttl_seconds: ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: REFRESH_TTL_SECONDS,
        }
    }
}

/// An atomically-issued access/refresh pair. `expires_at` duplicates the
/// access token's absolute expiry so callers can check liveness without
/// re-parsing the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    /// True when the pair was signed by a degraded (unkeyed) signer.
    pub degraded: bool,
}

/// Issues and verifies compact signed tokens
/// (`base64url(header).base64url(payload).base64url(signature)`).
#[derive(Debug, Clone)]
pub struct TokenService {
    config: TokenConfig,
    signer: Signer,
}

impl TokenService {
    pub fn new(config: TokenConfig, signer: Signer) -> Self {
        Self { config, signer }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    pub fn is_degraded(&self) -> bool {
        self.signer.is_degraded()
    }

    /// Stamps bookkeeping claims and issues a single signed token.
    pub fn issue(&self, identity: &Identity, ttl_seconds: i64) -> TokenResult<String> {
        self.issue_at(identity, ttl_seconds, Utc::now().timestamp())
    }

    pub fn issue_at(
        &self,
        identity: &Identity,
        ttl_seconds: i64,
        now_unix_seconds: i64,
    ) -> TokenResult<String> {
        let claims = self.stamp(identity, ttl_seconds, now_unix_seconds);
        self.seal(&claims)
    }

    /// Issues an access token carrying full claims and a refresh token
    /// carrying only subject and email.
    pub fn issue_pair(&self, identity: &Identity) -> TokenResult<TokenPair> {
        self.issue_pair_at(identity, Utc::now().timestamp())
    }

    pub fn issue_pair_at(&self, identity: &Identity, now_unix_seconds: i64) -> TokenResult<TokenPair> {
        let access_claims = self.stamp(identity, self.config.access_ttl_seconds, now_unix_seconds);
        let expires_at = access_claims.expires_at;
        let access_token = self.seal(&access_claims)?;

        let refresh_claims = RefreshClaims {
            subject_id: identity.subject_id.clone(),
            email: identity.email.clone(),
            issued_at: now_unix_seconds,
            expires_at: now_unix_seconds + self.config.refresh_ttl_seconds,
            issuer: self.config.issuer.clone(),
            audience: self.config.audience.clone(),
            jti: Uuid::new_v4().to_string(),
        };
        let refresh_token = self.seal(&refresh_claims)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_at,
            degraded: self.signer.is_degraded(),
        })
    }

    /// Verifies an access token against the current clock. All failures
    /// collapse to `None` with the cause logged; this never panics or
    /// errors outward.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        match self.verify_at(token, Utc::now().timestamp()) {
            Ok(claims) => Some(claims),
            Err(err) => {
                debug!(error = %err, "access token rejected");
                None
            }
        }
    }

    /// Explicit-clock access verification, reporting the rejection cause.
    pub fn verify_at(&self, token: &str, now_unix_seconds: i64) -> TokenResult<Claims> {
        let value = self.open(token)?;
        let claims = Claims::try_from(value)?;
        self.check_registered(&claims.issuer, &claims.audience)?;
        if claims.expires_at <= now_unix_seconds {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    /// Verifies a refresh token; only subject and email gate acceptance.
    pub fn verify_refresh(&self, token: &str) -> Option<RefreshClaims> {
        match self.verify_refresh_at(token, Utc::now().timestamp()) {
            Ok(claims) => Some(claims),
            Err(err) => {
                debug!(error = %err, "refresh token rejected");
                None
            }
        }
    }

    pub fn verify_refresh_at(
        &self,
        token: &str,
        now_unix_seconds: i64,
    ) -> TokenResult<RefreshClaims> {
        let value = self.open(token)?;
        let claims = RefreshClaims::try_from(value)?;
        self.check_registered(&claims.issuer, &claims.audience)?;
        if claims.expires_at <= now_unix_seconds {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn stamp(&self, identity: &Identity, ttl_seconds: i64, now_unix_seconds: i64) -> Claims {
        Claims {
            subject_id: identity.subject_id.clone(),
            email: identity.email.clone(),
            role: identity.role,
            display_name: identity.display_name.clone(),
            organization_id: identity.organization_id.clone(),
            organization_name: identity.organization_name.clone(),
            issued_at: now_unix_seconds,
            expires_at: now_unix_seconds + ttl_seconds,
            issuer: self.config.issuer.clone(),
            audience: self.config.audience.clone(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    fn seal<T: Serialize>(&self, payload: &T) -> TokenResult<String> {
        let header_json = serde_json::to_string(&Header::hs256())
            .map_err(|err| TokenError::InvalidJson(err.to_string()))?;
        let payload_json =
            serde_json::to_string(payload).map_err(|err| TokenError::InvalidJson(err.to_string()))?;
        let signing_input = format!("{}.{}", codec::encode(&header_json), codec::encode(&payload_json));
        let signature = self.signer.sign(&signing_input)?;
        Ok(format!("{signing_input}.{signature}"))
    }

    /// Structural and signature checks shared by both verify paths.
    /// Returns the decoded payload JSON.
    fn open(&self, token: &str) -> TokenResult<serde_json::Value> {
        let (header_b64, payload_b64, signature_b64) = split_segments(token)?;

        let signing_input = format!("{header_b64}.{payload_b64}");
        if !self.signer.verify(&signing_input, signature_b64) {
            return Err(TokenError::SignatureMismatch);
        }

        let header: Header = serde_json::from_str(&codec::decode(header_b64)?)
            .map_err(|err| TokenError::InvalidJson(err.to_string()))?;
        if header.alg != "HS256" {
            return Err(TokenError::UnsupportedAlgorithm(header.alg));
        }

        serde_json::from_str(&codec::decode(payload_b64)?)
            .map_err(|err| TokenError::InvalidJson(err.to_string()))
    }

    fn check_registered(&self, issuer: &str, audience: &str) -> TokenResult<()> {
        if issuer != self.config.issuer {
            return Err(TokenError::InvalidIssuer(self.config.issuer.clone()));
        }
        if audience != self.config.audience {
            return Err(TokenError::InvalidAudience(self.config.audience.clone()));
        }
        Ok(())
    }
}

/// Splits a compact token into exactly three non-empty segments.
fn split_segments(token: &str) -> TokenResult<(&str, &str, &str)> {
    let segments: Vec<&str> = token.split('.').collect();
    match segments.as_slice() {
        [header, payload, signature]
            if !header.is_empty() && !payload.is_empty() && !signature.is_empty() =>
        {
            Ok((header, payload, signature))
        }
        _ => Err(TokenError::TokenFormat),
    }
}
