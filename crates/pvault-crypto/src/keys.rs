//! Vault key generation and password wrapping
//!
//! Wrapped key format (JSON):
//! ```text
//! { version, kdf: { algorithm, mem_cost_kib, time_cost, parallelism },
//!   salt: b64, nonce: b64, ciphertext: b64 }
//! ```
//!
//! The KDF parameters and salt travel with the wrapped key so a backup
//! made under old cost settings stays restorable after the defaults move.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use pvault_core::{VaultError, VaultResult};

use crate::kdf::{derive_wrapping_key, KdfParams, WrappingKey};
use crate::{KEY_SIZE, SALT_SIZE, TAG_SIZE, XNONCE_SIZE};

const WRAPPED_KEY_VERSION: u32 = 1;

/// The account-wide 256-bit file encryption key. Zeroized on drop.
///
/// Exists in plaintext only in memory for the session; at rest it is always
/// inside a `WrappedKey`.
#[derive(Clone)]
pub struct VaultKey {
    bytes: [u8; KEY_SIZE],
}

impl VaultKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Generate a fresh random vault key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }
}

impl Drop for VaultKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl PartialEq for VaultKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A vault key encrypted under a password-derived wrapping key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrappedKey {
    pub version: u32,
    pub kdf: KdfParams,
    /// KDF salt (base64), fresh per wrap, not secret
    pub salt: String,
    /// AEAD nonce (base64)
    pub nonce: String,
    /// Encrypted vault key + tag (base64)
    pub ciphertext: String,
}

impl WrappedKey {
    /// Serialize to JSON bytes (the at-rest / export form).
    pub fn to_bytes(&self) -> VaultResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| VaultError::Metadata(format!("wrapped key serialization: {e}")))
    }

    /// Deserialize from JSON bytes. Unparseable input is an envelope
    /// problem, not a wrong password.
    pub fn from_bytes(data: &[u8]) -> VaultResult<Self> {
        serde_json::from_slice(data)
            .map_err(|e| VaultError::UnsupportedKeyEnvelope(format!("parse: {e}")))
    }
}

/// Wrap the vault key under a secret: derive a wrapping key with a fresh
/// random salt, then seal the key bytes with XChaCha20-Poly1305 (the same
/// AEAD the file cipher uses).
pub fn wrap_vault_key(
    key: &VaultKey,
    secret: &SecretString,
    params: &KdfParams,
) -> VaultResult<WrappedKey> {
    let mut salt = [0u8; SALT_SIZE];
    rand::thread_rng().fill_bytes(&mut salt);

    let wrapping = derive_wrapping_key(secret, &salt, params)?;

    let cipher = XChaCha20Poly1305::new(wrapping.as_bytes().into());
    let mut nonce_bytes = [0u8; XNONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, key.as_bytes().as_ref())
        .map_err(|e| VaultError::Other(anyhow::anyhow!("key wrapping failed: {e}")))?;

    Ok(WrappedKey {
        version: WRAPPED_KEY_VERSION,
        kdf: params.clone(),
        salt: b64_encode(&salt),
        nonce: b64_encode(&nonce_bytes),
        ciphertext: b64_encode(&ciphertext),
    })
}

/// Unwrap a vault key. Fails closed: a wrong secret yields `WrongSecret`,
/// a malformed or unknown-version envelope yields `UnsupportedKeyEnvelope`
/// (the distinction is internal; `user_message()` collapses both).
pub fn unwrap_vault_key(wrapped: &WrappedKey, secret: &SecretString) -> VaultResult<VaultKey> {
    if wrapped.version != WRAPPED_KEY_VERSION {
        return Err(VaultError::UnsupportedKeyEnvelope(format!(
            "unknown version {}",
            wrapped.version
        )));
    }

    let salt_bytes = b64_decode(&wrapped.salt)?;
    let salt: [u8; SALT_SIZE] = salt_bytes
        .as_slice()
        .try_into()
        .map_err(|_| VaultError::UnsupportedKeyEnvelope("bad salt length".into()))?;
    let nonce_bytes = b64_decode(&wrapped.nonce)?;
    if nonce_bytes.len() != XNONCE_SIZE {
        return Err(VaultError::UnsupportedKeyEnvelope("bad nonce length".into()));
    }
    let ciphertext = b64_decode(&wrapped.ciphertext)?;
    if ciphertext.len() != KEY_SIZE + TAG_SIZE {
        return Err(VaultError::UnsupportedKeyEnvelope(
            "bad ciphertext length".into(),
        ));
    }

    let wrapping = derive_wrapping_key(secret, &salt, &wrapped.kdf)?;
    unwrap_with(&wrapping, &nonce_bytes, &ciphertext)
}

fn unwrap_with(
    wrapping: &WrappingKey,
    nonce_bytes: &[u8],
    ciphertext: &[u8],
) -> VaultResult<VaultKey> {
    let cipher = XChaCha20Poly1305::new(wrapping.as_bytes().into());
    let nonce = XNonce::from_slice(nonce_bytes);

    // AEAD failure here means the derived key is wrong, i.e. wrong secret
    // (length and structure were validated above).
    let mut plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| VaultError::WrongSecret)?;

    if plaintext.len() != KEY_SIZE {
        plaintext.zeroize();
        return Err(VaultError::UnsupportedKeyEnvelope(
            "unwrapped key has wrong size".into(),
        ));
    }

    let mut key_bytes = [0u8; KEY_SIZE];
    key_bytes.copy_from_slice(&plaintext);
    plaintext.zeroize();

    Ok(VaultKey::from_bytes(key_bytes))
}

fn b64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

fn b64_decode(s: &str) -> VaultResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD
        .decode(s)
        .map_err(|e| VaultError::UnsupportedKeyEnvelope(format!("base64: {e}")))
}
