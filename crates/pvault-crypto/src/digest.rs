//! BLAKE3 content digests for plaintext integrity and content addressing
//!
//! The digest doubles as the end-to-end integrity check (computed before
//! encryption, re-verified after decryption) and as the content-address key
//! for stored blobs. Digests are not secrets; `verify` is a plain equality
//! check.

/// A BLAKE3 digest (32 bytes), displayed as 64 hex chars
pub type Digest = blake3::Hash;

/// Digest a byte slice. A zero-length input yields the well-defined
/// empty-input digest, never an error.
pub fn digest_bytes(data: &[u8]) -> Digest {
    blake3::hash(data)
}

/// Check bytes against an expected digest.
pub fn verify(data: &[u8], expected: &Digest) -> bool {
    digest_bytes(data) == *expected
}

/// Format a digest as lowercase hex (64 chars)
pub fn digest_to_hex(digest: &Digest) -> String {
    digest.to_hex().to_string()
}

/// Parse a 64-char hex string into a digest
pub fn digest_from_hex(hex: &str) -> anyhow::Result<Digest> {
    blake3::Hash::from_hex(hex).map_err(|e| anyhow::anyhow!("invalid BLAKE3 hex '{}': {}", hex, e))
}
