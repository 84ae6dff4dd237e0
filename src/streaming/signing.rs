//! Signed URL authorization.
//!
//! A signed URL carries `sig` and `expires` query parameters where
//! `sig = hex(HMAC-SHA256(secret, "{resource_id}:{expires}"))`. Validation is
//! a pure function of the request, the clock and the process-wide secret.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};

type HmacSha256 = Hmac<Sha256>;

/// Signature query parameters of a request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignatureParams {
    pub sig: Option<String>,
    pub expires: Option<String>,
}

/// Verifies time-boxed URL signatures.
#[derive(Clone)]
pub struct SignedUrlValidator {
    secret: Vec<u8>,
    enforce: bool,
}

impl std::fmt::Debug for SignedUrlValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedUrlValidator")
            .field("enforce", &self.enforce)
            .finish_non_exhaustive()
    }
}

impl SignedUrlValidator {
    /// Create a validator. With `enforce == false` every request is accepted,
    /// which is only meant for local development.
    pub fn new(secret: impl Into<Vec<u8>>, enforce: bool) -> Self {
        Self {
            secret: secret.into(),
            enforce,
        }
    }

    pub fn is_enforced(&self) -> bool {
        self.enforce
    }

    /// Validate against the current wall clock.
    pub fn validate_now(&self, resource_id: &str, params: &SignatureParams) -> bool {
        self.validate(resource_id, params, unix_now())
    }

    /// Validate a request at unix time `now`. Never fails loudly: any missing,
    /// expired or mismatched signature yields `false`.
    pub fn validate(&self, resource_id: &str, params: &SignatureParams, now: i64) -> bool {
        if !self.enforce {
            return true;
        }

        let (Some(sig), Some(expires)) = (params.sig.as_deref(), params.expires.as_deref())
        else {
            return false;
        };

        // The MAC covers `expires` exactly as sent; the parsed value is only
        // used for the expiry check.
        let Ok(expires_at) = expires.trim().parse::<i64>() else {
            return false;
        };
        if now > expires_at {
            return false;
        }

        // Only canonical lowercase hex is accepted, so every altered character
        // changes the decoded bytes.
        if !sig.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
            return false;
        }
        let Ok(provided) = hex::decode(sig) else {
            return false;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(&self.secret) else {
            return false;
        };
        mac.update(signing_message(resource_id, expires).as_bytes());

        // Constant-time comparison.
        mac.verify_slice(&provided).is_ok()
    }
}

fn signing_message(resource_id: &str, expires: impl std::fmt::Display) -> String {
    format!("{}:{}", resource_id, expires)
}

/// Compute the hex signature for `resource_id` valid until `expires_at`.
pub fn sign(secret: &[u8], resource_id: &str, expires_at: i64) -> String {
    HmacSha256::new_from_slice(secret)
        .map(|mut mac| {
            mac.update(signing_message(resource_id, expires_at).as_bytes());
            hex::encode(mac.finalize().into_bytes())
        })
        .unwrap_or_default()
}

/// Query string (`?sig=..&expires=..`) for a signed URL.
pub fn signed_query(secret: &[u8], resource_id: &str, expires_at: i64) -> String {
    format!(
        "?sig={}&expires={}",
        sign(secret, resource_id, expires_at),
        expires_at
    )
}

/// Generate a random signing secret
pub fn generate_secret() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
