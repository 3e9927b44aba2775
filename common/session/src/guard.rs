use std::sync::Arc;
use std::time::Duration;

use portal_token::{Claims, Role};
use tracing::{debug, warn};

use crate::gateway::AuthGateway;

/// Sign-in entry point; redirects carry the originally requested
/// destination so sign-in can return the user there.
pub const SIGN_IN_ROUTE: &str = "/sign-in";

/// How long authentication resolution may run before the guard reports
/// a stall and exposes the manual escape hatches.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal guard states. `Resolving` is implicit in the pending
/// `evaluate` future; once it completes (or times out) one of these is
/// reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Valid claims, role on the allow-list: protected content renders.
    Allowed(Claims),
    /// Valid claims, role not allowed: redirect to that role's own
    /// default destination, never to the forbidden route.
    Denied { redirect: String },
    /// No valid claims: redirect to sign-in with the destination carried.
    Unauthenticated { redirect: String },
    /// Resolution exceeded the timeout. [`RouteGuard::recover`] starts a
    /// fresh attempt; [`RouteGuard::reset`] clears the session outright.
    Stalled,
}

/// Reconciles authentication state with per-route role allow-lists.
#[derive(Clone)]
pub struct RouteGuard {
    gateway: Arc<AuthGateway>,
    resolve_timeout: Duration,
}

impl RouteGuard {
    pub fn new(gateway: Arc<AuthGateway>) -> Self {
        Self {
            gateway,
            resolve_timeout: RESOLVE_TIMEOUT,
        }
    }

    pub fn with_timeout(gateway: Arc<AuthGateway>, resolve_timeout: Duration) -> Self {
        Self {
            gateway,
            resolve_timeout,
        }
    }

    /// Resolves the current auth state, bounded by the configured
    /// timeout, and decides the outcome for a route. An empty allow-list
    /// admits any authenticated role.
    pub async fn evaluate(&self, destination: &str, allowed: &[Role]) -> GuardOutcome {
        match tokio::time::timeout(self.resolve_timeout, self.resolve()).await {
            Ok(claims) => decide(destination, allowed, claims),
            Err(_) => {
                warn!(destination, "authentication resolution stalled");
                GuardOutcome::Stalled
            }
        }
    }

    /// Manual recovery action after a stall: starts a new resolution
    /// attempt (the stalled one is not cancelled, merely abandoned).
    pub async fn recover(&self, destination: &str, allowed: &[Role]) -> GuardOutcome {
        debug!(destination, "manual recovery requested");
        self.evaluate(destination, allowed).await
    }

    /// Manual escape hatch after a stall: clears the session so the next
    /// evaluation resolves to `Unauthenticated` immediately.
    pub fn reset(&self) {
        debug!("manual session reset requested");
        self.gateway.clear_session();
    }

    async fn resolve(&self) -> Option<Claims> {
        if let Some(claims) = self.gateway.current_user() {
            return Some(claims);
        }
        if self.gateway.store().load().is_none() {
            return None;
        }
        // A session exists but its access token no longer verifies; one
        // refresh against the authority before failing closed.
        match self.gateway.refresh().await {
            Ok(_) => self.gateway.current_user(),
            Err(err) => {
                debug!(error = %err, "refresh during route resolution failed");
                None
            }
        }
    }
}

fn decide(destination: &str, allowed: &[Role], claims: Option<Claims>) -> GuardOutcome {
    match claims {
        None => GuardOutcome::Unauthenticated {
            redirect: format!(
                "{SIGN_IN_ROUTE}?return_to={}",
                urlencoding::encode(destination)
            ),
        },
        Some(claims) if allowed.is_empty() || allowed.contains(&claims.role) => {
            GuardOutcome::Allowed(claims)
        }
        Some(claims) => GuardOutcome::Denied {
            redirect: claims.role.default_route().to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthResult;
    use crate::identity::{ExternalSession, IdentityAuthority, Organization, Profile};
    use crate::store::{InMemorySessionStore, SessionStore};
    use async_trait::async_trait;
    use chrono::Utc;
    use portal_token::{Identity, Signer, TokenConfig, TokenService, ACCESS_TTL_SECONDS};

    struct StubAuthority {
        role: Role,
        hang: bool,
    }

    #[async_trait]
    impl IdentityAuthority for StubAuthority {
        async fn validate_credentials(
            &self,
            _email: &str,
            _password: &str,
        ) -> AuthResult<ExternalSession> {
            Ok(ExternalSession {
                subject_id: "user-1".to_string(),
                session_token: "ext".to_string(),
            })
        }

        async fn lookup_profile(&self, _subject_id: &str) -> AuthResult<Profile> {
            if self.hang {
                // Simulates an authority round trip that never returns.
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(Profile {
                role: self.role,
                display_name: "Alice".to_string(),
                organization_id: None,
            })
        }

        async fn lookup_organization(&self, _id: &str) -> AuthResult<Organization> {
            Ok(Organization {
                display_name: "Acme".to_string(),
            })
        }

        async fn invalidate_session(&self) -> AuthResult<()> {
            Ok(())
        }
    }

    fn guard_with(role: Role, hang: bool) -> (RouteGuard, Arc<AuthGateway>, InMemorySessionStore) {
        let store = InMemorySessionStore::new();
        let tokens = TokenService::new(TokenConfig::default(), Signer::keyed(b"test-secret"));
        let gateway = Arc::new(AuthGateway::new(
            Arc::new(StubAuthority { role, hang }),
            tokens,
            Arc::new(store.clone()),
        ));
        (
            RouteGuard::with_timeout(gateway.clone(), Duration::from_millis(100)),
            gateway,
            store,
        )
    }

    fn seed(gateway: &AuthGateway, store: &InMemorySessionStore, role: Role, issued_at: i64) {
        let pair = gateway
            .tokens()
            .issue_pair_at(
                &Identity {
                    subject_id: "user-1".to_string(),
                    email: "alice@example.com".to_string(),
                    role,
                    display_name: "Alice".to_string(),
                    organization_id: None,
                    organization_name: None,
                },
                issued_at,
            )
            .expect("pair");
        store.save(&pair);
    }

    #[tokio::test]
    async fn allowed_role_renders_children() {
        let (guard, gateway, store) = guard_with(Role::Administrator, false);
        seed(&gateway, &store, Role::Administrator, Utc::now().timestamp());

        let outcome = guard.evaluate("/admin/clients", &[Role::Administrator]).await;
        assert!(matches!(outcome, GuardOutcome::Allowed(claims) if claims.role == Role::Administrator));
    }

    #[tokio::test]
    async fn member_on_admin_route_is_sent_to_the_member_default() {
        let (guard, gateway, store) = guard_with(Role::Member, false);
        seed(&gateway, &store, Role::Member, Utc::now().timestamp());

        let outcome = guard.evaluate("/admin/clients", &[Role::Administrator]).await;
        assert_eq!(
            outcome,
            GuardOutcome::Denied {
                redirect: "/member".to_string()
            }
        );
    }

    #[tokio::test]
    async fn empty_allow_list_admits_any_authenticated_role() {
        let (guard, gateway, store) = guard_with(Role::Member, false);
        seed(&gateway, &store, Role::Member, Utc::now().timestamp());

        let outcome = guard.evaluate("/messages", &[]).await;
        assert!(matches!(outcome, GuardOutcome::Allowed(_)));
    }

    #[tokio::test]
    async fn unauthenticated_redirect_carries_the_destination() {
        let (guard, _gateway, _store) = guard_with(Role::Member, false);

        let outcome = guard.evaluate("/admin/clients?page=2", &[Role::Administrator]).await;
        assert_eq!(
            outcome,
            GuardOutcome::Unauthenticated {
                redirect: "/sign-in?return_to=%2Fadmin%2Fclients%3Fpage%3D2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn expired_access_token_is_refreshed_during_resolution() {
        let (guard, gateway, store) = guard_with(Role::Member, false);
        seed(
            &gateway,
            &store,
            Role::Member,
            Utc::now().timestamp() - 2 * ACCESS_TTL_SECONDS,
        );

        let outcome = guard.evaluate("/member", &[Role::Member]).await;
        assert!(matches!(outcome, GuardOutcome::Allowed(_)));
        assert!(!store.is_expired());
    }

    #[tokio::test]
    async fn hung_resolution_reports_a_stall_and_reset_clears() {
        let (guard, gateway, store) = guard_with(Role::Member, true);
        seed(
            &gateway,
            &store,
            Role::Member,
            Utc::now().timestamp() - 2 * ACCESS_TTL_SECONDS,
        );

        let outcome = guard.evaluate("/member", &[Role::Member]).await;
        assert_eq!(outcome, GuardOutcome::Stalled);

        guard.reset();
        assert!(store.load().is_none());
        let outcome = guard.evaluate("/member", &[Role::Member]).await;
        assert!(matches!(outcome, GuardOutcome::Unauthenticated { .. }));
    }
}
