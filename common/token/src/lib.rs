pub mod claims;
pub mod codec;
pub mod error;
pub mod service;
pub mod signer;

pub use claims::{Claims, Identity, RefreshClaims, Role};
pub use error::{TokenError, TokenResult};
pub use service::{
    TokenConfig, TokenPair, TokenService, ACCESS_TTL_SECONDS, AUDIENCE, ISSUER,
    REFRESH_TTL_SECONDS,
};
pub use signer::{Signer, SignerMode};
