use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{VaultError, VaultResult};

/// Top-level vault configuration (loaded from pinvault.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PvaultConfig {
    pub vault: VaultConfig,
    pub storage: StorageConfig,
    pub share: ShareConfig,
}

impl PvaultConfig {
    pub fn from_toml_str(s: &str) -> VaultResult<Self> {
        toml::from_str(s).map_err(|e| VaultError::Config(format!("parsing config: {e}")))
    }

    pub fn load(path: &Path) -> VaultResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

/// Key derivation and cipher configuration.
///
/// The KDF cost knobs are user-facing: the UI exposes them as a
/// security/performance trade-off, so they are plain config values here
/// rather than hardcoded constants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// KDF variant: "argon2id" (default), "argon2i", or "argon2d"
    pub kdf_algorithm: String,
    /// Argon2 memory cost in KiB (default: 65536 = 64 MiB)
    pub kdf_mem_cost_kib: u32,
    /// Argon2 time cost / iterations (default: 3)
    pub kdf_time_cost: u32,
    /// Argon2 parallelism (default: 4)
    pub kdf_parallelism: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            kdf_algorithm: "argon2id".into(),
            kdf_mem_cost_kib: 65536,
            kdf_time_cost: 3,
            kdf_parallelism: 4,
        }
    }
}

/// Content-store (S3-compatible) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// S3-compatible endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket name
    pub bucket: String,
    /// Key prefix for all vault objects
    pub prefix: String,
    /// Enforce HTTPS (error on HTTP endpoints)
    pub enforce_tls: bool,
    /// Pin blobs right after storing them (advisory availability hint)
    pub pin_on_store: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "pinvault".into(),
            prefix: "vault".into(),
            enforce_tls: false,
            pin_on_store: true,
        }
    }
}

/// Share-grant configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareConfig {
    /// Digits in generated one-time codes (default: 6)
    pub otp_digits: u32,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self { otp_digits: 6 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml_str = r#"
[vault]
kdf_algorithm = "argon2i"
kdf_mem_cost_kib = 131072
kdf_time_cost = 4
kdf_parallelism = 8

[storage]
endpoint = "https://s3.example.com:8333"
region = "us-west-2"
bucket = "my-vault"
prefix = "tenant-a"
enforce_tls = true
pin_on_store = false

[share]
otp_digits = 8
"#;
        let config: PvaultConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.vault.kdf_algorithm, "argon2i");
        assert_eq!(config.vault.kdf_mem_cost_kib, 131072);
        assert_eq!(config.vault.kdf_time_cost, 4);
        assert_eq!(config.storage.endpoint, "https://s3.example.com:8333");
        assert!(config.storage.enforce_tls);
        assert!(!config.storage.pin_on_store);
        assert_eq!(config.storage.bucket, "my-vault");
        assert_eq!(config.share.otp_digits, 8);
    }

    #[test]
    fn parse_defaults() {
        let config: PvaultConfig = toml::from_str("").unwrap();

        assert_eq!(config.vault.kdf_algorithm, "argon2id");
        assert_eq!(config.vault.kdf_mem_cost_kib, 65536);
        assert_eq!(config.storage.endpoint, "http://localhost:8333");
        assert_eq!(config.storage.bucket, "pinvault");
        assert!(!config.storage.enforce_tls);
        assert!(config.storage.pin_on_store);
        assert_eq!(config.share.otp_digits, 6);
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
[storage]
endpoint = "http://192.168.1.100:8333"
"#;
        let config: PvaultConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.storage.endpoint, "http://192.168.1.100:8333");
        // Defaults
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.vault.kdf_time_cost, 3);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pinvault.toml");
        std::fs::write(&path, "[share]\notp_digits = 4\n").unwrap();

        let config = PvaultConfig::load(&path).unwrap();
        assert_eq!(config.share.otp_digits, 4);

        let missing = PvaultConfig::load(&dir.path().join("nope.toml"));
        assert!(matches!(missing.unwrap_err(), VaultError::Io(_)));

        std::fs::write(&path, "share = {{{").unwrap();
        assert!(matches!(
            PvaultConfig::load(&path).unwrap_err(),
            VaultError::Config(_)
        ));
    }

    #[test]
    fn serialize_roundtrip() {
        let config = PvaultConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: PvaultConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.vault.kdf_algorithm, parsed.vault.kdf_algorithm);
        assert_eq!(config.storage.endpoint, parsed.storage.endpoint);
        assert_eq!(config.share.otp_digits, parsed.share.otp_digits);
    }
}
