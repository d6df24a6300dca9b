//! Access token expiry decoding
//!
//! The tutor API issues JWT access tokens. When a token response carries no
//! `expires_in`, the `exp` claim is the only expiry information available. The
//! signature is not verified; the claim is a scheduling hint, and the server
//! stays the authority through its 401 responses.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Extract the `exp` claim of a JWT as unix milliseconds.
///
/// Returns `None` for opaque tokens, malformed payloads, or a missing claim.
pub fn expiry_millis(token: &str) -> Option<u64> {
    let mut segments = token.split('.');
    let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);
    if segments.next().is_some() {
        return None;
    }

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?;
    let seconds = exp.as_u64().or_else(|| exp.as_f64().map(|f| f as u64))?;
    seconds.checked_mul(1000)
}
