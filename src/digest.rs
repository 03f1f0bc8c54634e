//! SHA-256 digest helpers.
//!
//! Registry content is addressed by `sha256:<hex>` digests. The artifact
//! digest is always computed from the raw on-disk manifest bytes, never from
//! a re-serialized structure; [`canonical_digest`] exists only to give config
//! documents a stable identity for duplicate detection.

use crate::error::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Prefix carried by every digest value in image and layer JSON.
const DIGEST_PREFIX: &str = "sha256";

/// Digest an exact byte sequence as `sha256:<hex>`.
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{DIGEST_PREFIX}:{:x}", hasher.finalize())
}

/// Digest the canonical serialization of a JSON document.
///
/// `serde_json` keeps object keys sorted, so two documents that differ only
/// in key order produce the same digest. Good enough for uniqueness checks;
/// not a registry-verifiable digest.
///
/// # Errors
///
/// Returns [`crate::error::GateError::Canonical`] if serialization fails.
pub fn canonical_digest(document: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(document)?;
    Ok(digest_bytes(&bytes))
}
