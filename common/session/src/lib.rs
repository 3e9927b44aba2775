pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod identity;
pub mod store;

pub use client::AuthenticatedClient;
pub use config::{load_portal_config, PortalAuth, PortalAuthConfig};
pub use error::{AuthError, AuthResult};
pub use gateway::{AuthGateway, SignedIn};
pub use guard::{GuardOutcome, RouteGuard, RESOLVE_TIMEOUT, SIGN_IN_ROUTE};
pub use identity::{
    ExternalSession, HttpIdentityAuthority, IdentityAuthority, Organization, Profile,
};
pub use store::{
    InMemorySessionStore, SessionStore, ACCESS_TOKEN_KEY, EXPIRES_AT_KEY, REFRESH_TOKEN_KEY,
};
