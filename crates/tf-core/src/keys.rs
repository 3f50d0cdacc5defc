//! Deterministic surrogate keys.
//!
//! Keys are the first 64 bits of a SHA-256 digest, read big-endian, so the
//! same input yields the same key on every run and in every implementation
//! that hashes the same UTF-8 text.

use sha2::{Digest, Sha256};

/// Namespace for geo identities (postal code)
pub const GEO_NAMESPACE: &str = "GEO";

/// Namespace for taxpayer identities (NRIC)
pub const TAXPAYER_NAMESPACE: &str = "NRIC";

/// Stable numeric identifier for `value` within `namespace`.
///
/// Empty or whitespace-only input has no identity and returns `None`.
pub fn stable_id(value: &str, namespace: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some(digest_u64(&format!("{namespace}:{value}")))
}

/// Return identity from the taxpayer identity and assessment period.
///
/// Both parts are required; a missing part yields no key. The digest input
/// is `"<nric>:<year>"` with no namespace prefix, so return keys stay equal
/// to those already stored by earlier loads of the same warehouse.
pub fn return_key(nric: &str, assessment_year: Option<i64>) -> Option<u64> {
    let nric = nric.trim();
    let year = assessment_year?;
    if nric.is_empty() {
        return None;
    }
    Some(digest_u64(&format!("{nric}:{year}")))
}

fn digest_u64(text: &str) -> u64 {
    let digest = Sha256::digest(text.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

#[cfg(test)]
#[path = "keys_test.rs"]
mod tests;
