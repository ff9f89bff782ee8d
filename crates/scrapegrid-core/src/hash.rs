//! Target fingerprinting.

use sha2::{Digest, Sha256};

use crate::types::{Labels, TargetHash};

/// Fingerprint a target from its discovered labels and final URL.
///
/// Labels are hashed in key order with separators that cannot appear in a
/// label name, so `{a="b;c"}` and `{a="b", c=""}` never collide.
pub fn target_hash(discovered_labels: &Labels, url: &str) -> TargetHash {
    let mut hasher = Sha256::new();
    for (k, v) in discovered_labels {
        hasher.update(k.as_bytes());
        hasher.update([0xff]);
        hasher.update(v.as_bytes());
        hasher.update([0xfe]);
    }
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(buf)
}

/// Lowercase hex SHA-256 of raw bytes (config hashes).
pub fn content_hash(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}
