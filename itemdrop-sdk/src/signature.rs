//! EventSub message signatures.
//!
//! Twitch signs every webhook delivery with the secret supplied when the
//! subscription was created. The header carries
//!
//! ```text
//! Twitch-Eventsub-Message-Signature: sha256={hex_signature}
//! ```
//!
//! where the signature is `HMAC-SHA256("{message_id}{timestamp}{raw_body}", secret)`.

/// Header carrying the unique delivery id.
pub const MESSAGE_ID_HEADER: &str = "Twitch-Eventsub-Message-Id";

/// Header carrying the RFC 3339 delivery timestamp.
pub const MESSAGE_TIMESTAMP_HEADER: &str = "Twitch-Eventsub-Message-Timestamp";

/// Header carrying the `sha256=` prefixed signature.
pub const MESSAGE_SIGNATURE_HEADER: &str = "Twitch-Eventsub-Message-Signature";

/// Header carrying the message type (notification, verification, revocation).
pub const MESSAGE_TYPE_HEADER: &str = "Twitch-Eventsub-Message-Type";

/// Header name for admin API authentication (plaintext secret).
pub const ADMIN_AUTH_HEADER: &str = "Itemdrop-Admin-Authorization";

/// Deliveries older than this (in seconds) are rejected as replays.
pub const MAX_MESSAGE_AGE: i64 = 10 * 60;

const SIGNATURE_PREFIX: &str = "sha256=";

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid signature header format")]
    InvalidFormat,
    #[error("invalid hex encoding")]
    InvalidHex,
    #[error("invalid message timestamp")]
    InvalidTimestamp,
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("message expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

fn hmac_key(secret: &[u8]) -> ring::hmac::Key {
    ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret)
}

fn signed_payload(message_id: &str, timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(message_id.len() + timestamp.len() + body.len());
    data.extend_from_slice(message_id.as_bytes());
    data.extend_from_slice(timestamp.as_bytes());
    data.extend_from_slice(body);
    data
}

/// Compute the full `sha256=...` header value for a delivery.
pub fn sign_message(message_id: &str, timestamp: &str, body: &[u8], secret: &[u8]) -> String {
    let tag = ring::hmac::sign(
        &hmac_key(secret),
        &signed_payload(message_id, timestamp, body),
    );
    format!("{SIGNATURE_PREFIX}{}", hex::encode(tag.as_ref()))
}

/// Parse a `sha256={hex}` header value into the raw signature bytes.
pub fn parse_signature_header(value: &str) -> Result<Vec<u8>, SignatureError> {
    let encoded = value
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(SignatureError::InvalidFormat)?;
    hex::decode(encoded).map_err(|_| SignatureError::InvalidHex)
}

/// Verify a delivery's HMAC and freshness.
///
/// The comparison is constant-time (done by `ring`).
pub fn verify_message(
    message_id: &str,
    timestamp: &str,
    body: &[u8],
    signature_header: &str,
    secret: &[u8],
) -> Result<(), SignatureError> {
    let signature = parse_signature_header(signature_header)?;
    ring::hmac::verify(
        &hmac_key(secret),
        &signed_payload(message_id, timestamp, body),
        &signature,
    )?;
    check_timestamp(timestamp, time::OffsetDateTime::now_utc())
}

/// Check that an RFC 3339 delivery timestamp is within [`MAX_MESSAGE_AGE`] of `now`.
pub fn check_timestamp(timestamp: &str, now: time::OffsetDateTime) -> Result<(), SignatureError> {
    let sent = time::OffsetDateTime::parse(timestamp, &time::format_description::well_known::Rfc3339)
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    if (now - sent).whole_seconds() > MAX_MESSAGE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}
