//! Webhook signature verification.
//!
//! Providers sign each delivery with a header of the form
//! `t=<unix-seconds>,v1=<hex hmac-sha256>`, where the MAC covers
//! `"{t}.{raw body}"`. Verification is constant-time on the MAC and
//! rejects stale timestamps to bound replay windows. A request that
//! fails here must leave no trace in the ledger.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::types::Timestamp;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("malformed signature header")]
    MalformedHeader,

    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    #[error("signature mismatch")]
    Mismatch,
}

/// Parsed `t=...,v1=...` header.
#[derive(Debug)]
struct SignatureHeader {
    timestamp: i64,
    mac: Vec<u8>,
}

fn parse_header(header: &str) -> Result<SignatureHeader, SignatureError> {
    let mut timestamp = None;
    let mut mac = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::MalformedHeader)?);
            }
            Some(("v1", value)) => {
                mac = Some(hex::decode(value).map_err(|_| SignatureError::MalformedHeader)?);
            }
            // Unknown schemes (v0, ...) are ignored for forward compat.
            Some(_) => {}
            None => return Err(SignatureError::MalformedHeader),
        }
    }

    match (timestamp, mac) {
        (Some(timestamp), Some(mac)) => Ok(SignatureHeader { timestamp, mac }),
        _ => Err(SignatureError::MalformedHeader),
    }
}

/// Verify a webhook delivery.
///
/// `tolerance_secs` bounds how far the signed timestamp may drift from
/// `now` in either direction.
pub fn verify(
    secret: &str,
    header: &str,
    payload: &[u8],
    now: Timestamp,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    let parsed = parse_header(header)?;

    if (now.timestamp() - parsed.timestamp).abs() > tolerance_secs {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::MalformedHeader)?;
    mac.update(parsed.timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);

    mac.verify_slice(&parsed.mac)
        .map_err(|_| SignatureError::Mismatch)
}

/// Produce a valid header for a payload. Test helper for exercising
/// the webhook endpoint end to end.
pub fn sign(secret: &str, payload: &[u8], at: Timestamp) -> String {
    let timestamp = at.timestamp();
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("hmac accepts any key length"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
