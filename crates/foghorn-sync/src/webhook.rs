//! Inbound webhook request verification.
//!
//! Providers sign each delivery with HMAC-SHA256 over
//! `"{timestamp}.{raw_body}"`, base64-encoded and prefixed with a version
//! tag (`"v1,<base64>"`). Verification runs in strict order and
//! short-circuits: secret present, headers present, timestamp inside the
//! replay window, then a constant-time signature comparison.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use thiserror::Error;

type HmacSha256 = Hmac<sha2::Sha256>;

/// Replay window: requests older (or newer) than this many seconds are
/// rejected even with a valid signature.
pub const REPLAY_WINDOW_SECS: i64 = 300;

const SIGNATURE_VERSION: &str = "v1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    #[error("Webhook not configured")]
    NotConfigured,
    #[error("Missing signature header")]
    MissingSignature,
    #[error("Missing timestamp header")]
    MissingTimestamp,
    #[error("Invalid timestamp")]
    InvalidTimestamp,
    #[error("Timestamp outside of tolerance")]
    StaleTimestamp,
    #[error("Invalid signature format")]
    MalformedSignature,
    #[error("Invalid signature")]
    SignatureMismatch,
}

/// Computes the signature header value for a payload. Used by outbound
/// test tooling and by tests; the inverse of [`verify_signature`].
pub fn compute_signature(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    format!("{SIGNATURE_VERSION},{}", STANDARD.encode(digest))
}

/// Verifies a signed webhook request. `signature` and `timestamp` are the
/// raw header values; absence is an error. The comparison is constant-time
/// via [`Mac::verify_slice`].
pub fn verify_signature(
    secret: Option<&str>,
    signature: Option<&str>,
    timestamp: Option<&str>,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<(), WebhookError> {
    let secret = match secret {
        Some(s) if !s.trim().is_empty() => s,
        _ => return Err(WebhookError::NotConfigured),
    };
    let signature = signature.ok_or(WebhookError::MissingSignature)?;
    let timestamp = timestamp.ok_or(WebhookError::MissingTimestamp)?;

    let timestamp: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| WebhookError::InvalidTimestamp)?;
    if (now.timestamp() - timestamp).abs() > REPLAY_WINDOW_SECS {
        return Err(WebhookError::StaleTimestamp);
    }

    let encoded = signature
        .strip_prefix(SIGNATURE_VERSION)
        .and_then(|rest| rest.strip_prefix(','))
        .ok_or(WebhookError::MalformedSignature)?;
    let provided = STANDARD
        .decode(encoded)
        .map_err(|_| WebhookError::MalformedSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts any key length");
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| WebhookError::SignatureMismatch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "whsec_test";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn verify_at(age_secs: i64, body: &[u8]) -> Result<(), WebhookError> {
        let ts = now().timestamp() - age_secs;
        let sig = compute_signature(SECRET, ts, body);
        verify_signature(
            Some(SECRET),
            Some(&sig),
            Some(&ts.to_string()),
            body,
            now(),
        )
    }

    #[test]
    fn accepts_valid_signature() {
        assert_eq!(verify_at(0, b"{\"type\":\"broadcast.sent\"}"), Ok(()));
    }

    #[test]
    fn replay_window_boundary() {
        assert_eq!(verify_at(299, b"{}"), Ok(()));
        assert_eq!(verify_at(300, b"{}"), Ok(()));
        assert_eq!(verify_at(301, b"{}"), Err(WebhookError::StaleTimestamp));
        // Future-dated timestamps are bounded too.
        assert_eq!(verify_at(-301, b"{}"), Err(WebhookError::StaleTimestamp));
    }

    #[test]
    fn any_flipped_body_byte_fails_verification() {
        let body = b"{\"type\":\"broadcast.sent\",\"data\":{\"id\":42}}".to_vec();
        let ts = now().timestamp();
        let sig = compute_signature(SECRET, ts, &body);
        for i in 0..body.len() {
            let mut tampered = body.clone();
            tampered[i] ^= 0x01;
            assert_eq!(
                verify_signature(
                    Some(SECRET),
                    Some(&sig),
                    Some(&ts.to_string()),
                    &tampered,
                    now(),
                ),
                Err(WebhookError::SignatureMismatch),
                "byte {i} flip must break the signature"
            );
        }
    }

    #[test]
    fn unknown_version_tag_is_rejected() {
        let ts = now().timestamp();
        let sig = compute_signature(SECRET, ts, b"{}").replace("v1,", "v2,");
        assert_eq!(
            verify_signature(Some(SECRET), Some(&sig), Some(&ts.to_string()), b"{}", now()),
            Err(WebhookError::MalformedSignature)
        );
    }

    #[test]
    fn missing_pieces_short_circuit_in_order() {
        assert_eq!(
            verify_signature(None, Some("v1,x"), Some("1"), b"{}", now()),
            Err(WebhookError::NotConfigured)
        );
        assert_eq!(
            verify_signature(Some(SECRET), None, Some("1"), b"{}", now()),
            Err(WebhookError::MissingSignature)
        );
        assert_eq!(
            verify_signature(Some(SECRET), Some("v1,x"), None, b"{}", now()),
            Err(WebhookError::MissingTimestamp)
        );
        assert_eq!(
            verify_signature(Some(SECRET), Some("v1,x"), Some("abc"), b"{}", now()),
            Err(WebhookError::InvalidTimestamp)
        );
    }

    #[test]
    fn wrong_secret_fails() {
        let ts = now().timestamp();
        let sig = compute_signature("other_secret", ts, b"{}");
        assert_eq!(
            verify_signature(Some(SECRET), Some(&sig), Some(&ts.to_string()), b"{}", now()),
            Err(WebhookError::SignatureMismatch)
        );
    }
}
