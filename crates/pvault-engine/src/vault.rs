//! The vault facade: the surface collaborators (UI, RPC) call into
//!
//! Wires the key store, pipeline, and grant manager together. Everything
//! here returns a typed `VaultError`; nothing panics across this boundary.
//! The login secret is opaque to the vault: whether it came from a
//! password or a wallet signature is the identity layer's business.

use std::str::FromStr;
use std::sync::Arc;

use secrecy::SecretString;

use pvault_core::config::PvaultConfig;
use pvault_core::{
    AccessKind, FileRecord, GrantPolicy, ShareGrant, VaultResult,
};
use pvault_crypto::{
    unwrap_vault_key, wrap_vault_key, KdfAlgorithm, KdfParams, VaultKey, WrappedKey,
};
use pvault_storage::{ContentStore, MetadataStore};

use crate::grants::{GrantCredentials, IssuedGrant, ShareGrantManager};
use crate::keystore::VaultKeyStore;
use crate::pipeline::VaultPipeline;

pub struct Vault<M: MetadataStore> {
    keystore: Arc<VaultKeyStore>,
    pipeline: VaultPipeline<M>,
    grants: ShareGrantManager<M>,
    meta: Arc<M>,
    kdf: KdfParams,
}

impl<M: MetadataStore> Vault<M> {
    pub fn new(config: &PvaultConfig, content: ContentStore, meta: Arc<M>) -> VaultResult<Self> {
        let kdf = KdfParams {
            algorithm: KdfAlgorithm::from_str(&config.vault.kdf_algorithm)?,
            mem_cost_kib: config.vault.kdf_mem_cost_kib,
            time_cost: config.vault.kdf_time_cost,
            parallelism: config.vault.kdf_parallelism,
        };

        let keystore = Arc::new(VaultKeyStore::new());
        let pipeline = VaultPipeline::new(
            Arc::clone(&keystore),
            content,
            Arc::clone(&meta),
            config.storage.pin_on_store,
        );
        let grants = ShareGrantManager::new(Arc::clone(&meta), config.share.otp_digits);

        Ok(Self {
            keystore,
            pipeline,
            grants,
            meta,
            kdf,
        })
    }

    // -- session / key management -----------------------------------------

    /// First-use setup: generate a vault key, wrap it under the login
    /// secret, and activate it. The returned `WrappedKey` is the only
    /// at-rest form of the key; persist it with the account.
    pub async fn initialize(&self, login_secret: &SecretString) -> VaultResult<WrappedKey> {
        let key = VaultKey::generate();
        let wrapped = wrap_vault_key(&key, login_secret, &self.kdf)?;
        self.keystore.activate(key).await;
        Ok(wrapped)
    }

    /// Unlock the session from a stored wrapped key.
    pub async fn unlock(
        &self,
        wrapped: &WrappedKey,
        login_secret: &SecretString,
    ) -> VaultResult<()> {
        let key = unwrap_vault_key(wrapped, login_secret)?;
        self.keystore.activate(key).await;
        Ok(())
    }

    /// End the session; key material is zeroized.
    pub async fn lock(&self) {
        self.keystore.lock().await;
    }

    pub async fn is_locked(&self) -> bool {
        self.keystore.is_locked().await
    }

    /// Export the active key wrapped under a backup password.
    pub async fn backup_key(&self, password: &SecretString) -> VaultResult<WrappedKey> {
        let key = self.keystore.current().await?;
        wrap_vault_key(&key, password, &self.kdf)
    }

    /// Restore from a backup: unwrap with the backup password and activate.
    pub async fn restore_key(
        &self,
        wrapped: &WrappedKey,
        password: &SecretString,
    ) -> VaultResult<()> {
        self.unlock(wrapped, password).await
    }

    /// Rotate the vault key, re-encrypting the owner's stored files under
    /// the replacement. Returns how many records were re-encrypted.
    pub async fn rotate_key(&self, owner_id: &str) -> VaultResult<usize> {
        self.pipeline.rotate_key(owner_id).await
    }

    // -- files -------------------------------------------------------------

    pub async fn store(
        &self,
        owner_id: &str,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> VaultResult<FileRecord> {
        self.pipeline.store(owner_id, name, mime_type, bytes).await
    }

    pub async fn retrieve(&self, file_id: &str) -> VaultResult<Vec<u8>> {
        let record = self.meta.get_file(file_id).await?;
        self.pipeline.retrieve(&record).await
    }

    pub async fn delete(&self, file_id: &str) -> VaultResult<FileRecord> {
        let record = self.meta.get_file(file_id).await?;
        self.pipeline.delete(&record).await
    }

    pub async fn list_files(&self, owner_id: &str) -> VaultResult<Vec<FileRecord>> {
        self.meta.list_files(owner_id).await
    }

    /// Reclaim uploads abandoned mid-pipeline (crash or cancelled caller).
    pub async fn sweep_abandoned(&self, owner_id: &str) -> VaultResult<usize> {
        self.pipeline.sweep_abandoned(owner_id).await
    }

    // -- share grants ------------------------------------------------------

    pub async fn issue_grant(&self, file_id: &str, policy: GrantPolicy) -> VaultResult<IssuedGrant> {
        let record = self.meta.get_file(file_id).await?;
        self.grants.issue(&record, policy).await
    }

    pub async fn validate_grant(
        &self,
        token: &str,
        creds: &GrantCredentials,
        kind: AccessKind,
    ) -> VaultResult<ShareGrant> {
        self.grants.validate(token, creds, kind).await
    }

    pub async fn revoke_grant(&self, grant_id: &str) -> VaultResult<()> {
        self.grants.revoke(grant_id).await
    }

    pub async fn revoke_grants_for_file(&self, file_id: &str) -> VaultResult<usize> {
        self.grants.revoke_all_for_file(file_id).await
    }

    pub async fn record_access(&self, grant_id: &str, kind: AccessKind) -> VaultResult<ShareGrant> {
        self.grants.record_access(grant_id, kind).await
    }

    /// Advisory expiry sweep; lazy validation stays authoritative.
    pub async fn sweep_expired_grants(&self) -> VaultResult<usize> {
        self.grants.sweep_expired().await
    }
}
