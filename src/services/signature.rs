//! Webhook signature verification.
//!
//! Inbound processor webhooks are verified against a shared secret before
//! any field of the payload is trusted. A failed verification is a hard
//! rejection (`InvalidSignature`), never a retry signal.
//!
//! # Formats
//!
//! - Card intents: `X-Intent-Signature: t=<unix seconds>,v1=<hex>` where the
//!   MAC covers `"<t>.<raw body>"`; timestamps older than the tolerance are
//!   rejected to stop replays of captured requests.
//! - Hosted orders: `X-Webhook-Signature: sha256=<hex>` where the MAC covers
//!   the raw body.
//!
//! All comparisons are constant time (`Mac::verify_slice`).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a timestamped signature.
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

fn mac(secret: &str) -> HmacSha256 {
    // HMAC accepts keys of any length
    HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid")
}

/// Compute the hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign(secret: &str, payload: &[u8]) -> String {
    let mut mac = mac(secret);
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn verify_hex(secret: &str, payload: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = mac(secret);
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Verify a `sha256=<hex>` body signature.
pub fn verify_body_signature(
    secret: &str,
    body: &[u8],
    header: Option<&str>,
) -> Result<(), AppError> {
    let signature = header
        .and_then(|h| h.strip_prefix("sha256="))
        .ok_or(AppError::InvalidSignature)?;

    if verify_hex(secret, body, signature) {
        Ok(())
    } else {
        Err(AppError::InvalidSignature)
    }
}

/// Verify a `t=<ts>,v1=<hex>` timestamped signature.
///
/// Any of several `v1` entries may match (the processor sends more than one
/// while a secret is being rotated).
pub fn verify_timestamped_signature(
    secret: &str,
    body: &[u8],
    header: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let header = header.ok_or(AppError::InvalidSignature)?;

    let mut timestamp: Option<i64> = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(AppError::InvalidSignature)?;
    if (now.timestamp() - timestamp).abs() > TIMESTAMP_TOLERANCE_SECS {
        tracing::warn!(timestamp, "Webhook signature timestamp outside tolerance");
        return Err(AppError::InvalidSignature);
    }

    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(body);

    if signatures
        .iter()
        .any(|signature| verify_hex(secret, &signed, signature))
    {
        Ok(())
    } else {
        Err(AppError::InvalidSignature)
    }
}

/// Compare a presented shared secret with the configured one in constant time.
///
/// Each value keys an HMAC over the same message, so the comparison
/// runs over fixed-length tags. An empty configured secret never matches.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    let mut expected_mac = mac(expected);
    expected_mac.update(b"shared-secret");
    let expected_tag = expected_mac.finalize().into_bytes();

    let mut provided_mac = mac(provided);
    provided_mac.update(b"shared-secret");
    provided_mac.verify_slice(&expected_tag).is_ok()
}

/// Build a `t=<ts>,v1=<hex>` header value. Used by tests and local tooling.
pub fn timestamped_header(secret: &str, body: &[u8], timestamp: i64) -> String {
    let mut signed = format!("{timestamp}.").into_bytes();
    signed.extend_from_slice(body);
    format!("t={timestamp},v1={}", sign(secret, &signed))
}
