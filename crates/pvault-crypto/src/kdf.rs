//! Key derivation: Argon2 login secret / backup password → wrapping key
//!
//! The wrapping key is never stored and never encrypts file content; its
//! only job is to protect the vault key inside a `WrappedKey`. It is
//! distinct from the vault key on purpose: the secret that unlocks the
//! vault and the key that encrypts files must not be the same value.

use argon2::{Algorithm, Argon2, Params, Version};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use pvault_core::{VaultError, VaultResult};

use crate::{KEY_SIZE, SALT_SIZE};

/// A 256-bit key derived from a login secret or backup password.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct WrappingKey {
    bytes: [u8; KEY_SIZE],
}

impl WrappingKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for WrappingKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for WrappingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappingKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Argon2 variant selector. Argon2id is the default; the others exist
/// because the cost/variant choice is surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KdfAlgorithm {
    Argon2id,
    Argon2i,
    Argon2d,
}

impl KdfAlgorithm {
    fn to_argon2(self) -> Algorithm {
        match self {
            Self::Argon2id => Algorithm::Argon2id,
            Self::Argon2i => Algorithm::Argon2i,
            Self::Argon2d => Algorithm::Argon2d,
        }
    }
}

impl std::str::FromStr for KdfAlgorithm {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "argon2id" => Ok(Self::Argon2id),
            "argon2i" => Ok(Self::Argon2i),
            "argon2d" => Ok(Self::Argon2d),
            other => Err(VaultError::Config(format!(
                "unknown KDF algorithm '{other}' (expected argon2id, argon2i, or argon2d)"
            ))),
        }
    }
}

/// Tunable KDF parameters, stored verbatim inside every `WrappedKey` so an
/// old backup stays unwrappable after the defaults change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    pub algorithm: KdfAlgorithm,
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    pub mem_cost_kib: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            algorithm: KdfAlgorithm::Argon2id,
            mem_cost_kib: 65536,
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Derive a 256-bit wrapping key from a secret and salt.
///
/// The salt must be freshly random per wrap operation and is stored
/// alongside the wrapped key (it does not need to be secret).
pub fn derive_wrapping_key(
    secret: &SecretString,
    salt: &[u8; SALT_SIZE],
    params: &KdfParams,
) -> VaultResult<WrappingKey> {
    let argon2_params = Params::new(
        params.mem_cost_kib,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| VaultError::Config(format!("invalid Argon2 params: {e}")))?;

    let argon2 = Argon2::new(params.algorithm.to_argon2(), Version::V0x13, argon2_params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(secret.expose_secret().as_bytes(), salt, &mut key)
        .map_err(|e| VaultError::Config(format!("Argon2 KDF failed: {e}")))?;

    Ok(WrappingKey::from_bytes(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    // Fast params for testing
    fn test_params() -> KdfParams {
        KdfParams {
            algorithm: KdfAlgorithm::Argon2id,
            mem_cost_kib: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn kdf_is_deterministic() {
        let secret = SecretString::from("test-secret-123");
        let salt = [1u8; SALT_SIZE];
        let params = test_params();

        let k1 = derive_wrapping_key(&secret, &salt, &params).unwrap();
        let k2 = derive_wrapping_key(&secret, &salt, &params).unwrap();

        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_secrets_different_keys() {
        let salt = [1u8; SALT_SIZE];
        let params = test_params();

        let k1 = derive_wrapping_key(&SecretString::from("secret-a"), &salt, &params).unwrap();
        let k2 = derive_wrapping_key(&SecretString::from("secret-b"), &salt, &params).unwrap();

        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_salts_different_keys() {
        let secret = SecretString::from("same-secret");
        let params = test_params();

        let k1 = derive_wrapping_key(&secret, &[1u8; SALT_SIZE], &params).unwrap();
        let k2 = derive_wrapping_key(&secret, &[2u8; SALT_SIZE], &params).unwrap();

        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn different_variants_different_keys() {
        let secret = SecretString::from("same-secret");
        let salt = [3u8; SALT_SIZE];
        let mut params_i = test_params();
        params_i.algorithm = KdfAlgorithm::Argon2i;

        let k1 = derive_wrapping_key(&secret, &salt, &test_params()).unwrap();
        let k2 = derive_wrapping_key(&secret, &salt, &params_i).unwrap();

        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn algorithm_parses_from_config_strings() {
        assert_eq!(
            KdfAlgorithm::from_str("argon2id").unwrap(),
            KdfAlgorithm::Argon2id
        );
        assert_eq!(
            KdfAlgorithm::from_str("argon2i").unwrap(),
            KdfAlgorithm::Argon2i
        );
        assert!(KdfAlgorithm::from_str("scrypt").is_err());
    }

    #[test]
    fn debug_redacts_key_bytes() {
        let key = WrappingKey::from_bytes([7u8; KEY_SIZE]);
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains('7'));
    }
}
