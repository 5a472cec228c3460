//! Entry key generation.

use sha2::{Digest, Sha256};

/// Compute the storage key for a cached response.
///
/// The URL must already be canonical (fragment removed, host lowercased);
/// two requests that differ only in fragment share one entry.
pub fn compute_entry_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"GET\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
