use portal_token::{Role, TokenError};
use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    CredentialRejected(String),
    #[error("this account is registered as '{actual}', not '{requested}'")]
    RoleMismatch { requested: Role, actual: Role },
    #[error("session refresh failed: {0}")]
    RefreshFailed(String),
    #[error("no active session")]
    NoSession,
    #[error("network failure calling the identity authority: {0}")]
    Network(String),
    #[error("identity authority returned HTTP {0}")]
    Authority(u16),
    #[error("malformed identity authority response: {0}")]
    AuthorityDecode(String),
    #[error("session cleared; sign-in required")]
    SignInRequired,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Token(#[from] TokenError),
}
