// Redirect bootstrap token codec.
//
// Format: `nonce.payload.signature`, all three segments base64url without
// padding. The payload is JSON `{u, w, e}` (user id, workspace slug, epoch
// millis expiry); the signature is HMAC-SHA256 over `nonce.payload`.
// Tokens are single-use by convention only — expiry is the sole replay
// defense beyond the 30 minute window.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

pub const REDIRECT_TOKEN_TTL_MINUTES: i64 = 30;

const NONCE_BYTES: usize = 10;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
}

/// The claims carried by a verified redirect token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectClaims {
    pub user_id: Uuid,
    pub workspace_slug: String,
}

#[derive(Serialize, Deserialize)]
struct TokenPayload {
    u: Uuid,
    w: String,
    #[serde(default)]
    e: Option<i64>,
}

/// Issue a signed redirect token for `user_id` into `workspace_slug`.
pub fn issue(user_id: Uuid, workspace_slug: &str, secret: &str) -> String {
    issue_at(user_id, workspace_slug, secret, Utc::now().timestamp_millis())
}

fn issue_at(user_id: Uuid, workspace_slug: &str, secret: &str, issued_at_ms: i64) -> String {
    let mut nonce = [0u8; NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut nonce);
    let nonce = URL_SAFE_NO_PAD.encode(nonce);

    let payload = TokenPayload {
        u: user_id,
        w: workspace_slug.to_owned(),
        e: Some(issued_at_ms + Duration::minutes(REDIRECT_TOKEN_TTL_MINUTES).num_milliseconds()),
    };
    let encoded_payload = URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&payload).expect("token payload serialization is infallible"));

    let signature = sign(&nonce, &encoded_payload, secret);

    format!("{nonce}.{encoded_payload}.{signature}")
}

/// Verify a redirect token and return its claims.
pub fn verify(token: &str, secret: &str) -> Result<RedirectClaims, TokenError> {
    verify_at(token, secret, Utc::now().timestamp_millis())
}

fn verify_at(token: &str, secret: &str, now_ms: i64) -> Result<RedirectClaims, TokenError> {
    let mut segments = token.split('.');
    let (Some(nonce), Some(encoded_payload), Some(signature), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        return Err(TokenError::Malformed);
    };
    if nonce.is_empty() || encoded_payload.is_empty() || signature.is_empty() {
        return Err(TokenError::Malformed);
    }

    let signature_bytes =
        URL_SAFE_NO_PAD.decode(signature).map_err(|_| TokenError::InvalidSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(nonce.as_bytes());
    mac.update(b".");
    mac.update(encoded_payload.as_bytes());
    mac.verify_slice(&signature_bytes).map_err(|_| TokenError::InvalidSignature)?;

    let payload_bytes =
        URL_SAFE_NO_PAD.decode(encoded_payload).map_err(|_| TokenError::Malformed)?;
    let payload: TokenPayload =
        serde_json::from_slice(&payload_bytes).map_err(|_| TokenError::Malformed)?;

    // A payload without an expiry fails closed, never "not expired".
    let expires_at_ms = payload.e.ok_or(TokenError::Malformed)?;
    if expires_at_ms < now_ms {
        return Err(TokenError::Expired);
    }

    Ok(RedirectClaims { user_id: payload.u, workspace_slug: payload.w })
}

fn sign(nonce: &str, encoded_payload: &str, secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(nonce.as_bytes());
    mac.update(b".");
    mac.update(encoded_payload.as_bytes());
    URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
}
