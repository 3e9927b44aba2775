use std::env;
use std::sync::Arc;
use std::time::Duration;

use portal_token::{Signer, TokenConfig, TokenService, ACCESS_TTL_SECONDS, REFRESH_TTL_SECONDS};

use crate::client::AuthenticatedClient;
use crate::error::{AuthError, AuthResult};
use crate::gateway::AuthGateway;
use crate::guard::RouteGuard;
use crate::identity::HttpIdentityAuthority;
use crate::store::InMemorySessionStore;

pub const ENV_AUTHORITY_URL: &str = "PORTAL_AUTHORITY_URL";
pub const ENV_TOKEN_SECRET: &str = "PORTAL_TOKEN_SECRET";
pub const ENV_ACCESS_TTL: &str = "PORTAL_ACCESS_TTL_SECONDS";
pub const ENV_REFRESH_TTL: &str = "PORTAL_REFRESH_TTL_SECONDS";
pub const ENV_RESOLVE_TIMEOUT: &str = "PORTAL_RESOLVE_TIMEOUT_SECONDS";

#[derive(Debug, Clone)]
pub struct PortalAuthConfig {
    pub authority_url: String,
    /// Missing secret selects the degraded signer; see `Signer`.
    pub token_secret: Option<String>,
    pub access_ttl_seconds: i64,
    pub refresh_ttl_seconds: i64,
    pub resolve_timeout: Duration,
}

impl PortalAuthConfig {
    pub fn new(authority_url: impl Into<String>) -> Self {
        Self {
            authority_url: authority_url.into(),
            token_secret: None,
            access_ttl_seconds: ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: REFRESH_TTL_SECONDS,
            resolve_timeout: crate::guard::RESOLVE_TIMEOUT,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.token_secret = Some(secret.into());
        self
    }

    /// Assembles the full subsystem from this config: gateway, route
    /// guard and authenticated client sharing one in-memory session
    /// store.
    pub fn build(&self) -> PortalAuth {
        let signer = Signer::from_secret(self.token_secret.as_deref());
        let tokens = TokenService::new(
            TokenConfig {
                access_ttl_seconds: self.access_ttl_seconds,
                refresh_ttl_seconds: self.refresh_ttl_seconds,
                ..TokenConfig::default()
            },
            signer,
        );
        let gateway = Arc::new(AuthGateway::new(
            Arc::new(HttpIdentityAuthority::new(&self.authority_url)),
            tokens,
            Arc::new(InMemorySessionStore::new()),
        ));
        PortalAuth {
            guard: RouteGuard::with_timeout(gateway.clone(), self.resolve_timeout),
            client: AuthenticatedClient::new(gateway.clone()),
            gateway,
        }
    }
}

/// The assembled subsystem handles.
#[derive(Clone)]
pub struct PortalAuth {
    pub gateway: Arc<AuthGateway>,
    pub guard: RouteGuard,
    pub client: AuthenticatedClient,
}

/// Loads configuration from the environment. Only the authority URL is
/// required; everything else has defaults.
pub fn load_portal_config() -> AuthResult<PortalAuthConfig> {
    let authority_url = env::var(ENV_AUTHORITY_URL)
        .ok()
        .and_then(|value| normalize_optional(&value))
        .ok_or_else(|| AuthError::Config(format!("{ENV_AUTHORITY_URL} is not set")))?;

    let token_secret = env::var(ENV_TOKEN_SECRET)
        .ok()
        .and_then(|value| normalize_optional(&value));

    let access_ttl_seconds = seconds_from_env(ENV_ACCESS_TTL)?.unwrap_or(ACCESS_TTL_SECONDS);
    let refresh_ttl_seconds = seconds_from_env(ENV_REFRESH_TTL)?.unwrap_or(REFRESH_TTL_SECONDS);
    let resolve_timeout = seconds_from_env(ENV_RESOLVE_TIMEOUT)?
        .map(|value| Duration::from_secs(value as u64))
        .unwrap_or(crate::guard::RESOLVE_TIMEOUT);

    Ok(PortalAuthConfig {
        authority_url,
        token_secret,
        access_ttl_seconds,
        refresh_ttl_seconds,
        resolve_timeout,
    })
}

fn seconds_from_env(key: &str) -> AuthResult<Option<i64>> {
    match env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let seconds: i64 = trimmed
                .parse()
                .map_err(|_| AuthError::Config(format!("{key} must be a number of seconds")))?;
            if seconds <= 0 {
                return Err(AuthError::Config(format!("{key} must be positive")));
            }
            Ok(Some(seconds))
        }
        Err(_) => Ok(None),
    }
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
