//! Bearer token inspection.
//!
//! Tokens are JWTs; only the `exp` claim of the payload is read. Signatures
//! are never verified client-side.

use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Access tokens expiring within this many seconds are refreshed ahead of time
pub const REFRESH_BUFFER_SECS: i64 = 5 * 60;

/// Expiry encoded in the token's `exp` claim, if it can be read
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut parts = token.split('.');
    let _header = parts.next()?;
    let payload = parts.next()?;
    let _signature = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE.decode(payload))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;
    let exp = claims.get("exp")?.as_i64()?;
    Utc.timestamp_opt(exp, 0).single()
}

/// True when the token is readable and outlives `now` by at least the refresh buffer
pub fn is_token_fresh(token: &str, now: DateTime<Utc>) -> bool {
    token_expiry(token).is_some_and(|exp| exp > now + Duration::seconds(REFRESH_BUFFER_SECS))
}

/// True only when the token is known to have expired.
///
/// Opaque tokens whose expiry cannot be read are not considered expired.
pub fn is_token_expired(token: &str, now: DateTime<Utc>) -> bool {
    token_expiry(token).is_some_and(|exp| exp <= now)
}

/// Build an unsigned token with the given expiry (for tests and local demos)
pub fn unsigned_token(subject: &str, exp: DateTime<Utc>) -> String {
    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = engine.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = engine.encode(
        serde_json::json!({ "sub": subject, "exp": exp.timestamp() }).to_string(),
    );
    format!("{}.{}.", header, payload)
}
