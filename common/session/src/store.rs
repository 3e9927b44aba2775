use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use portal_token::TokenPair;

pub const ACCESS_TOKEN_KEY: &str = "access-token";
pub const REFRESH_TOKEN_KEY: &str = "refresh-token";
pub const EXPIRES_AT_KEY: &str = "expires-at";

/// Owner of the persisted session. The store never validates signatures;
/// that is the token service's job, invoked by the gateway before a
/// loaded session is trusted.
pub trait SessionStore: Send + Sync {
    /// Persists the whole pair in one atomic write; readers never observe
    /// a half-written session.
    fn save(&self, pair: &TokenPair);

    /// Returns the stored pair, or `None` if any of the three values is
    /// absent.
    fn load(&self) -> Option<TokenPair>;

    fn clear(&self);

    /// Compares the stored expiry marker to the current time. Missing or
    /// unparsable data counts as expired.
    fn is_expired(&self) -> bool;
}

/// Thread-safe in-memory session store keyed like the client-local
/// storage it models.
#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn save(&self, pair: &TokenPair) {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        guard.insert(ACCESS_TOKEN_KEY.to_string(), pair.access_token.clone());
        guard.insert(REFRESH_TOKEN_KEY.to_string(), pair.refresh_token.clone());
        guard.insert(EXPIRES_AT_KEY.to_string(), pair.expires_at.to_string());
    }

    fn load(&self) -> Option<TokenPair> {
        let guard = self.inner.read().expect("rwlock poisoned");
        let access_token = guard.get(ACCESS_TOKEN_KEY)?.clone();
        let refresh_token = guard.get(REFRESH_TOKEN_KEY)?.clone();
        let expires_at = guard.get(EXPIRES_AT_KEY)?.parse().ok()?;
        Some(TokenPair {
            access_token,
            refresh_token,
            expires_at,
            // Degradation is a property of issuance; a reloaded pair is
            // re-verified by the gateway before it is trusted.
            degraded: false,
        })
    }

    fn clear(&self) {
        let mut guard = self.inner.write().expect("rwlock poisoned");
        guard.remove(ACCESS_TOKEN_KEY);
        guard.remove(REFRESH_TOKEN_KEY);
        guard.remove(EXPIRES_AT_KEY);
    }

    fn is_expired(&self) -> bool {
        match self.load() {
            Some(pair) => pair.expires_at <= Utc::now().timestamp(),
            None => true,
        }
    }
}
