//! pvault-crypto: client-side encryption primitives for PinVault
//!
//! Pipeline: plaintext → BLAKE3 digest → seal (XChaCha20-Poly1305) → upload
//!
//! Key hierarchy:
//! ```text
//! Login secret / backup password
//!   └── Wrapping Key (256-bit, Argon2 with per-wrap random salt)
//!         └── Vault Key (256-bit random, account-wide)
//!               └── File envelopes: XChaCha20-Poly1305, random 192-bit nonce
//! ```
//!
//! The vault key is never persisted in plaintext; at rest it exists only
//! inside a `WrappedKey`. Envelopes are self-describing (algorithm id +
//! nonce) so data sealed under the legacy AES-256-GCM scheme stays readable.

pub mod digest;
pub mod envelope;
pub mod kdf;
pub mod keys;

pub use digest::{digest_bytes, digest_from_hex, digest_to_hex, verify, Digest};
pub use envelope::{open, seal, seal_with, EncryptedEnvelope, EnvelopeAlgorithm};
pub use kdf::{derive_wrapping_key, KdfAlgorithm, KdfParams, WrappingKey};
pub use keys::{unwrap_vault_key, wrap_vault_key, VaultKey, WrappedKey};

/// Size of a symmetric key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const XNONCE_SIZE: usize = 24;

/// Size of an AES-256-GCM nonce (96-bit, legacy envelopes)
pub const GCM_NONCE_SIZE: usize = 12;

/// Size of an AEAD authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of a KDF salt
pub const SALT_SIZE: usize = 16;
