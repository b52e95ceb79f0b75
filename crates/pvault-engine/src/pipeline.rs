//! Store/retrieve/delete pipeline and key rotation
//!
//! Store path: digest → seal → put → persist. The record passes through
//! `pending → encrypting → stored`; a failure at any step rolls the
//! placeholder back, so no partially stored record is ever observable as
//! `stored`. Records left in a transient state by a crash are abandoned
//! uploads and reclaimed by `sweep_abandoned`.
//!
//! Retrieve re-verifies the plaintext digest after decryption: a digest
//! mismatch is reported as `IntegrityViolation` even though the AEAD tag
//! checked out, which catches key-confusion and storage-level corruption
//! the cipher alone would not.

use std::sync::Arc;

use tracing::{debug, info, warn};

use pvault_core::{FileRecord, FileStatus, VaultError, VaultResult};
use pvault_crypto::{digest_bytes, digest_from_hex, digest_to_hex, envelope, EncryptedEnvelope};
use pvault_storage::{ContentAddress, ContentStore, MetadataStore};

use crate::keystore::VaultKeyStore;

pub struct VaultPipeline<M: MetadataStore> {
    keystore: Arc<VaultKeyStore>,
    content: ContentStore,
    meta: Arc<M>,
    pin_on_store: bool,
}

impl<M: MetadataStore> VaultPipeline<M> {
    pub fn new(
        keystore: Arc<VaultKeyStore>,
        content: ContentStore,
        meta: Arc<M>,
        pin_on_store: bool,
    ) -> Self {
        Self {
            keystore,
            content,
            meta,
            pin_on_store,
        }
    }

    /// Encrypt and store one file, returning the persisted record.
    pub async fn store(
        &self,
        owner_id: &str,
        name: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> VaultResult<FileRecord> {
        let mut record = FileRecord::new_pending(owner_id, name, mime_type, bytes.len() as u64);
        self.meta.insert_file(record.clone()).await?;

        match self.store_inner(&mut record, bytes).await {
            Ok(()) => {
                info!(
                    file_id = %record.id,
                    owner = %record.owner_id,
                    size = record.size_bytes,
                    "file stored"
                );
                Ok(record)
            }
            Err(e) => {
                // Roll the placeholder back; a failed rollback only means
                // the record lingers as an abandoned upload for the sweep.
                if let Err(cleanup) = self.meta.delete_file(&record.id).await {
                    warn!(file_id = %record.id, error = %cleanup, "rollback of placeholder record failed");
                }
                Err(e)
            }
        }
    }

    async fn store_inner(&self, record: &mut FileRecord, bytes: &[u8]) -> VaultResult<()> {
        record.plaintext_digest = digest_to_hex(&digest_bytes(bytes));
        record.status = FileStatus::Encrypting;
        record.touch();
        self.meta.update_file(record).await?;

        // Hold the session key for the whole seal→put→persist span so a
        // rotation cannot slip in between sealing and recording.
        let key = self.keystore.session().await?;
        let sealed = envelope::seal(bytes, &key)?.to_bytes()?;
        let address = self.content.put(&sealed).await?;

        if self.pin_on_store {
            if let Err(e) = self.content.pin(&address).await {
                warn!(address = %address, error = %e, "advisory pin failed");
            }
        }

        record.storage_address = Some(address.to_string());
        record.status = FileStatus::Stored;
        record.touch();
        self.meta.update_file(record).await?;
        Ok(())
    }

    /// Fetch, decrypt, and integrity-check a stored file.
    pub async fn retrieve(&self, record: &FileRecord) -> VaultResult<Vec<u8>> {
        if record.status != FileStatus::Stored {
            return Err(VaultError::NotFound(format!(
                "file record {} is not stored",
                record.id
            )));
        }
        let address = record
            .storage_address
            .as_deref()
            .ok_or_else(|| VaultError::Metadata(format!("record {} has no address", record.id)))?;

        // Hold the session key across fetch and open so a rotation cannot
        // retire the key out from under an in-flight retrieve.
        let key = self.keystore.session().await?;
        let blob = self.content.get(&ContentAddress::new(address)).await?;
        let sealed = EncryptedEnvelope::from_bytes(&blob)?;
        let plaintext = envelope::open(&sealed, &key)?;
        drop(key);

        let expected = digest_from_hex(&record.plaintext_digest)
            .map_err(|e| VaultError::Metadata(format!("record {}: {e}", record.id)))?;
        if !pvault_crypto::verify(&plaintext, &expected) {
            return Err(VaultError::IntegrityViolation);
        }

        debug!(file_id = %record.id, size = plaintext.len(), "file retrieved");
        Ok(plaintext)
    }

    /// Mark a record deleted and drop its pin. Metadata deletion is the
    /// source of truth; the storage-side unpin is advisory and a failure
    /// there must not resurrect the file.
    pub async fn delete(&self, record: &FileRecord) -> VaultResult<FileRecord> {
        let mut record = record.clone();
        record.status = FileStatus::Deleted;
        record.touch();
        self.meta.update_file(&record).await?;

        if let Some(address) = record.storage_address.as_deref() {
            if let Err(e) = self.content.unpin(&ContentAddress::new(address)).await {
                warn!(file_id = %record.id, error = %e, "advisory unpin failed");
            }
        }

        info!(file_id = %record.id, "file deleted");
        Ok(record)
    }

    /// Rotate the vault key, re-encrypting every stored record of `owner_id`
    /// under the replacement key.
    ///
    /// Two phases under the rotation's exclusive guard: first every record
    /// is re-sealed and its new blob written, then the records are updated
    /// and the rotation commits. A failure in either phase aborts with the
    /// old key still current and every record still pointing at a blob that
    /// key can open.
    pub async fn rotate_key(&self, owner_id: &str) -> VaultResult<usize> {
        let rotation = self.keystore.begin_rotation().await?;

        let records = self.meta.list_files(owner_id).await?;
        let mut reencrypted: Vec<(FileRecord, ContentAddress, ContentAddress)> = Vec::new();

        for record in records {
            if record.status != FileStatus::Stored {
                continue;
            }
            let address = record.storage_address.as_deref().ok_or_else(|| {
                VaultError::Metadata(format!("record {} has no address", record.id))
            })?;
            let old_address = ContentAddress::new(address);

            let blob = self.content.get(&old_address).await?;
            let sealed = EncryptedEnvelope::from_bytes(&blob)?;
            let plaintext = envelope::open(&sealed, rotation.retiring_key())?;

            let expected = digest_from_hex(&record.plaintext_digest)
                .map_err(|e| VaultError::Metadata(format!("record {}: {e}", record.id)))?;
            if !pvault_crypto::verify(&plaintext, &expected) {
                return Err(VaultError::IntegrityViolation);
            }

            let resealed = envelope::seal(&plaintext, rotation.replacement_key())?.to_bytes()?;
            let new_address = self.content.put(&resealed).await?;
            if self.pin_on_store {
                if let Err(e) = self.content.pin(&new_address).await {
                    warn!(address = %new_address, error = %e, "advisory pin failed");
                }
            }

            reencrypted.push((record, old_address, new_address));
        }

        let count = reencrypted.len();
        for (mut record, old_address, new_address) in reencrypted {
            record.storage_address = Some(new_address.to_string());
            record.touch();
            self.meta.update_file(&record).await?;

            if let Err(e) = self.content.unpin(&old_address).await {
                warn!(address = %old_address, error = %e, "advisory unpin of retired blob failed");
            }
        }

        rotation.commit();
        info!(owner = %owner_id, records = count, "vault key rotated");
        Ok(count)
    }

    /// Delete records stuck in `pending`/`encrypting`: uploads abandoned
    /// by a crash or a cancelled caller. Returns how many were reclaimed.
    pub async fn sweep_abandoned(&self, owner_id: &str) -> VaultResult<usize> {
        let mut swept = 0;
        for record in self.meta.list_files(owner_id).await? {
            if matches!(record.status, FileStatus::Pending | FileStatus::Encrypting) {
                self.meta.delete_file(&record.id).await?;
                debug!(file_id = %record.id, status = ?record.status, "abandoned upload reclaimed");
                swept += 1;
            }
        }
        Ok(swept)
    }
}
