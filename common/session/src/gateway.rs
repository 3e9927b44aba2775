use std::sync::Arc;

use chrono::Utc;
use portal_token::{Claims, Identity, Role, TokenError, TokenPair, TokenService};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{AuthError, AuthResult};
use crate::identity::IdentityAuthority;
use crate::store::SessionStore;

/// Outcome of a successful sign-in or refresh.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub identity: Identity,
    pub pair: TokenPair,
}

/// Orchestrates the session lifecycle against the external identity
/// authority. The authority's own session stays alive alongside the
/// local token pair; the local pair is only a fast-path cache.
pub struct AuthGateway {
    authority: Arc<dyn IdentityAuthority>,
    tokens: TokenService,
    store: Arc<dyn SessionStore>,
    refresh_lock: Mutex<()>,
}

impl AuthGateway {
    pub fn new(
        authority: Arc<dyn IdentityAuthority>,
        tokens: TokenService,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            authority,
            tokens,
            store,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Validates credentials with the authority, reconciles the profile
    /// (and organization) into claims, and persists a freshly issued
    /// pair as the terminal step. Nothing is persisted on any failure,
    /// and a session already opened at the authority is torn down.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        requested_role: Option<Role>,
    ) -> AuthResult<SignedIn> {
        let external = self.authority.validate_credentials(email, password).await?;

        match self
            .establish(&external.subject_id, email, requested_role)
            .await
        {
            Ok(signed) => Ok(signed),
            Err(err) => {
                self.teardown_external().await;
                Err(err)
            }
        }
    }

    /// Everything after the credential check. Any failure here leaves a
    /// session open at the authority, so the caller tears it down.
    async fn establish(
        &self,
        subject_id: &str,
        email: &str,
        requested_role: Option<Role>,
    ) -> AuthResult<SignedIn> {
        let identity = self.resolve_identity(subject_id, email).await?;

        if let Some(requested) = requested_role {
            if requested != identity.role {
                return Err(AuthError::RoleMismatch {
                    requested,
                    actual: identity.role,
                });
            }
        }

        let pair = self.tokens.issue_pair(&identity)?;
        self.store.save(&pair);
        Ok(SignedIn { identity, pair })
    }

    /// Re-fetches the profile for the refresh token's subject and
    /// supersedes the stored pair wholesale. Concurrent callers share one
    /// in-flight refresh: whoever waited out another caller's refresh
    /// adopts the fresh session instead of refreshing again. Any failure
    /// clears the session before it is surfaced.
    pub async fn refresh(&self) -> AuthResult<SignedIn> {
        let before = self.store.load().map(|pair| pair.access_token);
        let _guard = self.refresh_lock.lock().await;

        if let Some(pair) = self.store.load() {
            if before.as_deref() != Some(pair.access_token.as_str()) {
                if let Some(claims) = self.tokens.verify(&pair.access_token) {
                    debug!("adopting session refreshed by a concurrent caller");
                    return Ok(SignedIn {
                        identity: claims.identity(),
                        pair,
                    });
                }
            }
        }

        match self.refresh_locked().await {
            Ok(signed) => Ok(signed),
            Err(err) => {
                self.store.clear();
                Err(err)
            }
        }
    }

    async fn refresh_locked(&self) -> AuthResult<SignedIn> {
        let pair = self.store.load().ok_or(AuthError::NoSession)?;
        let refresh = self
            .tokens
            .verify_refresh(&pair.refresh_token)
            .ok_or_else(|| {
                AuthError::RefreshFailed("stored refresh token failed verification".to_string())
            })?;

        let identity = self
            .resolve_identity(&refresh.subject_id, &refresh.email)
            .await
            .map_err(|err| AuthError::RefreshFailed(err.to_string()))?;

        let pair = self.tokens.issue_pair(&identity)?;
        self.store.save(&pair);
        Ok(SignedIn { identity, pair })
    }

    /// Clears the local session unconditionally, then notifies the
    /// authority best-effort. Local sign-out always succeeds.
    pub async fn sign_out(&self) {
        self.store.clear();
        if let Err(err) = self.authority.invalidate_session().await {
            warn!(error = %err, "external sign-out notification failed; local session already cleared");
        }
    }

    /// Loads and verifies the stored access token. An expired token
    /// yields `None` but leaves the session in place for `refresh` to
    /// rescue; any other verification failure clears the session
    /// (self-healing against corrupted state).
    pub fn current_user(&self) -> Option<Claims> {
        let pair = self.store.load()?;
        match self
            .tokens
            .verify_at(&pair.access_token, Utc::now().timestamp())
        {
            Ok(claims) => Some(claims),
            Err(TokenError::Expired) => None,
            Err(err) => {
                debug!(error = %err, "stored access token rejected; clearing session");
                self.store.clear();
                None
            }
        }
    }

    pub fn clear_session(&self) {
        self.store.clear();
    }

    async fn resolve_identity(&self, subject_id: &str, email: &str) -> AuthResult<Identity> {
        let profile = self.authority.lookup_profile(subject_id).await?;

        let organization_name = match &profile.organization_id {
            Some(organization_id) => Some(
                self.authority
                    .lookup_organization(organization_id)
                    .await?
                    .display_name,
            ),
            None => None,
        };

        Ok(Identity {
            subject_id: subject_id.to_string(),
            email: email.to_string(),
            role: profile.role,
            display_name: profile.display_name,
            organization_id: profile.organization_id,
            organization_name,
        })
    }

    async fn teardown_external(&self) {
        if let Err(err) = self.authority.invalidate_session().await {
            warn!(error = %err, "failed to tear down external session after rejected sign-in");
        }
    }
}
