//! Composite configuration fingerprinting.
//!
//! Each document's raw bytes are hashed individually; the per-document
//! digests, concatenated in sorted document-name order, are hashed again to
//! produce the composite. The short form `configs@<12-hex>` is what telemetry
//! records, so twelve hex characters must identify a configuration set
//! unambiguously within a deployment.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Hex-encoded SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Fold per-document digests into the composite `configs@<12-hex>` form.
///
/// `document_hashes` maps document name to its full hex digest. A `BTreeMap`
/// keeps iteration order sorted by name, which is what makes the composite
/// stable regardless of load order.
pub fn fingerprint_documents(document_hashes: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (name, digest) in document_hashes {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(digest.as_bytes());
        hasher.update([0u8]);
    }
    let composite = hex::encode(hasher.finalize());
    format!("configs@{}", &composite[..12])
}
