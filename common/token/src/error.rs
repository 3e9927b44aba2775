use thiserror::Error;

pub type TokenResult<T> = Result<T, TokenError>;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("malformed token segment: {0}")]
    Decode(String),
    #[error("token is not three dot-separated segments")]
    TokenFormat,
    #[error("unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("token expired")]
    Expired,
    #[error("missing required claim '{0}'")]
    MissingClaim(&'static str),
    #[error("invalid claim '{0}' with value '{1}'")]
    InvalidClaim(&'static str, String),
    #[error("malformed claim payload: {0}")]
    InvalidJson(String),
    #[error("invalid signing key")]
    InvalidKey,
    #[error("token issuer does not match '{0}'")]
    InvalidIssuer(String),
    #[error("token audience does not match '{0}'")]
    InvalidAudience(String),
}
