//! Self-describing encrypted file envelopes
//!
//! Envelope format (JSON):
//! ```text
//! { version, algorithm, nonce: b64, ciphertext: b64 }
//! ```
//!
//! `seal` always uses the current algorithm (XChaCha20-Poly1305) and
//! generates the nonce internally; callers cannot supply one, which rules
//! out nonce reuse under a shared key by construction. `open` dispatches on
//! the stored algorithm id, so envelopes sealed under the legacy
//! AES-256-GCM scheme stay readable after the default moved on.

use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use pvault_core::{VaultError, VaultResult};

use crate::keys::VaultKey;
use crate::{GCM_NONCE_SIZE, XNONCE_SIZE};

const ENVELOPE_VERSION: u32 = 1;

/// AEAD scheme an envelope was sealed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvelopeAlgorithm {
    /// Current scheme: 192-bit nonce, no counter management needed
    #[serde(rename = "xchacha20-poly1305")]
    XChaCha20Poly1305,
    /// Legacy scheme, open-only in practice
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
}

impl EnvelopeAlgorithm {
    fn nonce_size(self) -> usize {
        match self {
            Self::XChaCha20Poly1305 => XNONCE_SIZE,
            Self::Aes256Gcm => GCM_NONCE_SIZE,
        }
    }
}

/// An encrypted file payload, opaque without the vault key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    pub version: u32,
    pub algorithm: EnvelopeAlgorithm,
    /// AEAD nonce (base64)
    pub nonce: String,
    /// Ciphertext + tag (base64)
    pub ciphertext: String,
}

impl EncryptedEnvelope {
    /// Serialize to JSON bytes (the stored blob form).
    pub fn to_bytes(&self) -> VaultResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| VaultError::Other(anyhow::anyhow!("envelope serialization: {e}")))
    }

    /// Deserialize from JSON bytes. A blob that does not parse as an
    /// envelope cannot be decrypted, so this fails closed the same way a
    /// tag mismatch does.
    pub fn from_bytes(data: &[u8]) -> VaultResult<Self> {
        serde_json::from_slice(data).map_err(|_| VaultError::DecryptionFailed)
    }
}

/// Seal plaintext under the vault key with the current algorithm.
pub fn seal(plaintext: &[u8], key: &VaultKey) -> VaultResult<EncryptedEnvelope> {
    seal_with(plaintext, key, EnvelopeAlgorithm::XChaCha20Poly1305)
}

/// Seal under an explicit algorithm. Exists for migration tooling and for
/// exercising the legacy open path; regular callers use `seal`.
pub fn seal_with(
    plaintext: &[u8],
    key: &VaultKey,
    algorithm: EnvelopeAlgorithm,
) -> VaultResult<EncryptedEnvelope> {
    let mut nonce_bytes = vec![0u8; algorithm.nonce_size()];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);

    let ciphertext = match algorithm {
        EnvelopeAlgorithm::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
            cipher
                .encrypt(XNonce::from_slice(&nonce_bytes), plaintext)
                .map_err(|e| VaultError::Other(anyhow::anyhow!("seal failed: {e}")))?
        }
        EnvelopeAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new(key.as_bytes().into());
            cipher
                .encrypt(aes_gcm::Nonce::from_slice(&nonce_bytes), plaintext)
                .map_err(|e| VaultError::Other(anyhow::anyhow!("seal failed: {e}")))?
        }
    };

    Ok(EncryptedEnvelope {
        version: ENVELOPE_VERSION,
        algorithm,
        nonce: b64_encode(&nonce_bytes),
        ciphertext: b64_encode(&ciphertext),
    })
}

/// Open an envelope with the vault key.
///
/// Fails closed: tag mismatch, wrong key, malformed fields, and unknown
/// versions all return `DecryptionFailed`, never partial plaintext.
pub fn open(envelope: &EncryptedEnvelope, key: &VaultKey) -> VaultResult<Vec<u8>> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(VaultError::DecryptionFailed);
    }

    let nonce_bytes = b64_decode(&envelope.nonce)?;
    if nonce_bytes.len() != envelope.algorithm.nonce_size() {
        return Err(VaultError::DecryptionFailed);
    }
    let ciphertext = b64_decode(&envelope.ciphertext)?;

    match envelope.algorithm {
        EnvelopeAlgorithm::XChaCha20Poly1305 => {
            let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
            cipher
                .decrypt(XNonce::from_slice(&nonce_bytes), ciphertext.as_ref())
                .map_err(|_| VaultError::DecryptionFailed)
        }
        EnvelopeAlgorithm::Aes256Gcm => {
            let cipher = Aes256Gcm::new(key.as_bytes().into());
            cipher
                .decrypt(
                    aes_gcm::Nonce::from_slice(&nonce_bytes),
                    ciphertext.as_ref(),
                )
                .map_err(|_| VaultError::DecryptionFailed)
        }
    }
}

fn b64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

fn b64_decode(s: &str) -> VaultResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.decode(s).map_err(|_| VaultError::DecryptionFailed)
}
