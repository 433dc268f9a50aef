//! Slack request signing (`v0` scheme).
//!
//! The platform signs every webhook with `v0=hex(HMAC-SHA256(secret, "v0:{ts}:{body}"))`.
//! The body must be the exact bytes received; re-serialising a parsed form would change the
//! digest.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use time::OffsetDateTime;

use crate::command::InboundCommand;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_VERSION: &str = "v0";

/// Timestamp headers in lookup order; the generic name is accepted as an alias.
pub const TIMESTAMP_HEADERS: [&str; 2] = ["X-Slack-Request-Timestamp", "X-Request-Timestamp"];
/// Signature headers in lookup order; the generic name is accepted as an alias.
pub const SIGNATURE_HEADERS: [&str; 2] = ["X-Slack-Signature", "X-Request-Signature"];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("request timestamp header missing")]
    MissingTimestamp,
    #[error("request signature header missing")]
    MissingSignature,
    #[error("request signature mismatch")]
    Mismatch,
    #[error("request timestamp is not a unix timestamp")]
    InvalidTimestamp,
    #[error("request timestamp outside replay window (age {age_secs}s)")]
    Stale { age_secs: u64 },
}

impl SignatureError {
    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            SignatureError::MissingTimestamp => "missing_timestamp",
            SignatureError::MissingSignature => "missing_signature",
            SignatureError::Mismatch => "mismatch",
            SignatureError::InvalidTimestamp => "invalid_timestamp",
            SignatureError::Stale { .. } => "stale",
        }
    }
}

/// Computes the `v0=<hex>` signature the platform would send for `body`.
///
/// ```
/// let sig = mantis_core::compute_signature("secret", "1700000000", b"text=12477");
/// assert!(sig.starts_with("v0="));
/// assert_eq!(sig.len(), 3 + 64);
/// ```
pub fn compute_signature(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC-SHA256 accepts keys of any length");
    mac.update(SIGNATURE_VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    format!("{SIGNATURE_VERSION}={}", hex::encode(mac.finalize().into_bytes()))
}

/// Single deterministic comparison of `signature` against the expected digest.
///
/// Empty headers never verify.
///
/// ```
/// assert!(!mantis_core::verify("secret", "1", "v0=deadbeef", b"{}"));
/// ```
pub fn verify(secret: &str, timestamp: &str, signature: &str, body: &[u8]) -> bool {
    if timestamp.is_empty() || signature.is_empty() {
        return false;
    }
    let expected = compute_signature(secret, timestamp, body);
    expected.as_bytes().ct_eq(signature.as_bytes()).into()
}

/// Verifies inbound requests against the shared signing secret.
///
/// Freshness checking is off unless a maximum age is configured.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    max_age: Option<Duration>,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &"<redacted>")
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            max_age: None,
        }
    }

    /// Enables the replay window: timestamps further than `max_age` from now are rejected.
    pub fn with_max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Checks a parsed command using the headers and raw body captured with it.
    pub fn verify_command(&self, command: &InboundCommand) -> Result<(), SignatureError> {
        self.verify_at(
            command.timestamp(),
            command.signature(),
            command.raw_body(),
            OffsetDateTime::now_utc(),
        )
    }

    pub fn verify_at(
        &self,
        timestamp: &str,
        signature: &str,
        body: &[u8],
        now: OffsetDateTime,
    ) -> Result<(), SignatureError> {
        if timestamp.is_empty() {
            return Err(SignatureError::MissingTimestamp);
        }
        if signature.is_empty() {
            return Err(SignatureError::MissingSignature);
        }
        if let Some(max_age) = self.max_age {
            let sent: i64 = timestamp
                .trim()
                .parse()
                .map_err(|_| SignatureError::InvalidTimestamp)?;
            let age_secs = now.unix_timestamp().abs_diff(sent);
            if age_secs > max_age.as_secs() {
                return Err(SignatureError::Stale { age_secs });
            }
        }
        if verify(&self.secret, timestamp, signature, body) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }
}

pub(crate) fn header_value<'a>(headers: &'a http::HeaderMap, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
    })
}
