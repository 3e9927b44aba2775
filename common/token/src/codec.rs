use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{TokenError, TokenResult};

/// Encodes UTF-8 text into the URL- and header-safe token alphabet,
/// padding stripped.
pub fn encode(input: &str) -> String {
    encode_bytes(input.as_bytes())
}

pub fn encode_bytes(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Inverse of [`encode`]. Rejects non-alphabet characters, impossible
/// lengths, and non-UTF-8 payloads.
pub fn decode(segment: &str) -> TokenResult<String> {
    let bytes = decode_bytes(segment)?;
    String::from_utf8(bytes).map_err(|err| TokenError::Decode(err.to_string()))
}

pub fn decode_bytes(segment: &str) -> TokenResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|err| TokenError::Decode(err.to_string()))
}
