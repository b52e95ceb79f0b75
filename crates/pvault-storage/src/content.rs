//! OpenDAL-backed content-addressed blob store
//!
//! Layout under the configured prefix:
//! ```text
//! <prefix>/blobs/<blake3-hex>   sealed envelope bytes
//! <prefix>/pins/<blake3-hex>    advisory pin marker (empty object)
//! ```

use opendal::Operator;
use serde::{Deserialize, Serialize};

use pvault_core::config::StorageConfig;
use pvault_core::{VaultError, VaultResult};
use pvault_crypto::{digest_bytes, digest_to_hex};

/// Address of a stored blob: the BLAKE3 digest of its bytes, hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build an OpenDAL Operator for an S3-compatible endpoint.
///
/// Path-style addressing (the opendal default) is what SeaweedFS and MinIO
/// expect. If `enforce_tls` is set and the endpoint is plaintext HTTP this
/// returns an error; otherwise a warning is logged.
pub fn build_operator(
    cfg: &StorageConfig,
    access_key_id: &str,
    secret_access_key: &str,
) -> VaultResult<Operator> {
    if cfg.endpoint.starts_with("http://") {
        if cfg.enforce_tls {
            return Err(VaultError::Config(format!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                cfg.endpoint
            )));
        }
        tracing::warn!(
            endpoint = %cfg.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }

    let builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket)
        .access_key_id(access_key_id)
        .secret_access_key(secret_access_key);

    let op = Operator::new(builder)
        .map_err(|e| VaultError::Storage(format!("creating S3 operator: {e}")))?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

/// In-memory operator for tests.
pub fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator construction cannot fail")
        .finish()
}

/// Content-addressed blob store over an OpenDAL operator.
#[derive(Debug, Clone)]
pub struct ContentStore {
    op: Operator,
    prefix: String,
}

impl ContentStore {
    pub fn new(op: Operator, prefix: impl Into<String>) -> Self {
        Self {
            op,
            prefix: prefix.into(),
        }
    }

    /// Memory-backed store for tests.
    pub fn memory() -> Self {
        Self::new(memory_operator(), "vault")
    }

    fn blob_key(&self, addr: &ContentAddress) -> String {
        format!("{}/blobs/{}", self.prefix, addr.as_str())
    }

    fn pin_key(&self, addr: &ContentAddress) -> String {
        format!("{}/pins/{}", self.prefix, addr.as_str())
    }

    /// Store bytes under their content address. Identical bytes map to the
    /// same address; the write is skipped when the blob already exists.
    pub async fn put(&self, bytes: &[u8]) -> VaultResult<ContentAddress> {
        let addr = ContentAddress::new(digest_to_hex(&digest_bytes(bytes)));
        let key = self.blob_key(&addr);

        let exists = self
            .op
            .exists(&key)
            .await
            .map_err(|e| VaultError::Storage(format!("checking blob {key}: {e}")))?;
        if exists {
            tracing::debug!(address = %addr, "blob already present, skipping write");
            return Ok(addr);
        }

        self.op
            .write(&key, bytes.to_vec())
            .await
            .map_err(|e| VaultError::Storage(format!("writing blob {key}: {e}")))?;

        tracing::debug!(address = %addr, size = bytes.len(), "blob stored");
        Ok(addr)
    }

    /// Fetch a blob by address. A missing blob is `NotFound`, distinct from
    /// every decryption-level failure.
    pub async fn get(&self, addr: &ContentAddress) -> VaultResult<Vec<u8>> {
        let key = self.blob_key(addr);
        match self.op.read(&key).await {
            Ok(buf) => Ok(buf.to_vec()),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => {
                Err(VaultError::NotFound(format!("blob {addr}")))
            }
            Err(e) => Err(VaultError::Storage(format!("reading blob {key}: {e}"))),
        }
    }

    pub async fn contains(&self, addr: &ContentAddress) -> VaultResult<bool> {
        self.op
            .exists(&self.blob_key(addr))
            .await
            .map_err(|e| VaultError::Storage(format!("checking blob {addr}: {e}")))
    }

    /// Advisory availability hint. Callers treat failures as non-fatal.
    pub async fn pin(&self, addr: &ContentAddress) -> VaultResult<()> {
        self.op
            .write(&self.pin_key(addr), Vec::<u8>::new())
            .await
            .map(|_| ())
            .map_err(|e| VaultError::Storage(format!("pinning {addr}: {e}")))
    }

    /// Advisory: drop the availability hint. Missing markers are fine.
    pub async fn unpin(&self, addr: &ContentAddress) -> VaultResult<()> {
        self.op
            .delete(&self.pin_key(addr))
            .await
            .map_err(|e| VaultError::Storage(format!("unpinning {addr}: {e}")))
    }

    pub async fn is_pinned(&self, addr: &ContentAddress) -> VaultResult<bool> {
        self.op
            .exists(&self.pin_key(addr))
            .await
            .map_err(|e| VaultError::Storage(format!("checking pin {addr}: {e}")))
    }
}
