//! End-to-end tests for the store/retrieve pipeline: round-trips, failure
//! isolation (wrong key vs corrupted blob vs corrupted digest), deletion,
//! key rotation, and backup/restore.

use std::sync::Arc;

use secrecy::SecretString;

use pvault_core::config::PvaultConfig;
use pvault_core::{FileStatus, VaultError};
use pvault_crypto::{unwrap_vault_key, EncryptedEnvelope};
use pvault_engine::Vault;
use pvault_storage::{memory_operator, ContentStore, MemoryMetadataStore, MetadataStore};

fn test_config() -> PvaultConfig {
    let mut config = PvaultConfig::default();
    // Fast KDF params for testing
    config.vault.kdf_mem_cost_kib = 1024;
    config.vault.kdf_time_cost = 1;
    config.vault.kdf_parallelism = 1;
    config
}

struct Harness {
    vault: Vault<MemoryMetadataStore>,
    meta: Arc<MemoryMetadataStore>,
    op: opendal::Operator,
}

fn harness() -> Harness {
    let op = memory_operator();
    let content = ContentStore::new(op.clone(), "vault");
    let meta = Arc::new(MemoryMetadataStore::new());
    let vault = Vault::new(&test_config(), content, Arc::clone(&meta)).unwrap();
    Harness { vault, meta, op }
}

async fn unlocked() -> Harness {
    let h = harness();
    h.vault
        .initialize(&SecretString::from("login-secret"))
        .await
        .unwrap();
    h
}

#[tokio::test]
async fn store_retrieve_roundtrip() {
    let h = unlocked().await;

    // Read the payload off disk the way a caller would
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    std::fs::write(&path, b"the quick brown fox jumps over the lazy dog").unwrap();
    let bytes = std::fs::read(&path).unwrap();

    let record = h
        .vault
        .store("owner-1", "notes.txt", "text/plain", &bytes)
        .await
        .unwrap();

    assert_eq!(record.status, FileStatus::Stored);
    assert_eq!(record.size_bytes, bytes.len() as u64);
    assert_eq!(record.plaintext_digest.len(), 64);
    assert!(record.storage_address.is_some());

    let retrieved = h.vault.retrieve(&record.id).await.unwrap();
    assert_eq!(retrieved, bytes);
}

#[tokio::test]
async fn empty_file_roundtrip() {
    let h = unlocked().await;

    let record = h
        .vault
        .store("owner-1", "empty.bin", "application/octet-stream", b"")
        .await
        .unwrap();
    assert_eq!(h.vault.retrieve(&record.id).await.unwrap(), b"");
}

#[tokio::test]
async fn locked_vault_refuses_to_store_or_retrieve() {
    let h = harness();

    let err = h
        .vault
        .store("owner-1", "a.txt", "text/plain", b"data")
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::Locked));

    // The failed store must not leave a placeholder behind
    assert!(h.vault.list_files("owner-1").await.unwrap().is_empty());
}

#[tokio::test]
async fn lock_ends_the_session() {
    let h = unlocked().await;
    let record = h
        .vault
        .store("owner-1", "a.txt", "text/plain", b"data")
        .await
        .unwrap();

    h.vault.lock().await;
    assert!(h.vault.is_locked().await);
    assert!(matches!(
        h.vault.retrieve(&record.id).await.unwrap_err(),
        VaultError::Locked
    ));
}

#[tokio::test]
async fn tampered_blob_fails_closed() {
    let h = unlocked().await;
    let record = h
        .vault
        .store("owner-1", "a.txt", "text/plain", b"sensitive content")
        .await
        .unwrap();

    // Corrupt the stored envelope behind the store's back
    let key = format!("vault/blobs/{}", record.storage_address.as_deref().unwrap());
    let mut blob = h.op.read(&key).await.unwrap().to_vec();
    let mid = blob.len() / 2;
    blob[mid] ^= 0xFF;
    h.op.write(&key, blob).await.unwrap();

    let err = h.vault.retrieve(&record.id).await.unwrap_err();
    assert!(matches!(err, VaultError::DecryptionFailed));
}

#[tokio::test]
async fn corrupted_digest_is_an_integrity_violation() {
    let h = unlocked().await;
    let record = h
        .vault
        .store("owner-1", "a.txt", "text/plain", b"payload")
        .await
        .unwrap();

    // Decryption will succeed, but the recorded digest no longer matches
    let mut corrupted = record.clone();
    let flipped = if corrupted.plaintext_digest.starts_with('0') { "1" } else { "0" };
    corrupted.plaintext_digest.replace_range(0..1, flipped);
    h.meta.update_file(&corrupted).await.unwrap();

    let err = h.vault.retrieve(&record.id).await.unwrap_err();
    assert!(matches!(err, VaultError::IntegrityViolation));
}

#[tokio::test]
async fn missing_blob_is_not_found() {
    let h = unlocked().await;
    let record = h
        .vault
        .store("owner-1", "a.txt", "text/plain", b"payload")
        .await
        .unwrap();

    let key = format!("vault/blobs/{}", record.storage_address.as_deref().unwrap());
    h.op.delete(&key).await.unwrap();

    let err = h.vault.retrieve(&record.id).await.unwrap_err();
    assert!(matches!(err, VaultError::NotFound(_)));
}

#[tokio::test]
async fn deleted_file_is_gone_for_callers() {
    let h = unlocked().await;
    let record = h
        .vault
        .store("owner-1", "a.txt", "text/plain", b"payload")
        .await
        .unwrap();

    let deleted = h.vault.delete(&record.id).await.unwrap();
    assert_eq!(deleted.status, FileStatus::Deleted);

    assert!(matches!(
        h.vault.retrieve(&record.id).await.unwrap_err(),
        VaultError::NotFound(_)
    ));
}

#[tokio::test]
async fn same_plaintext_gets_distinct_envelopes() {
    let h = unlocked().await;

    // Same plaintext sealed twice gets fresh nonces, so the two records
    // point at different blobs; each remains independently retrievable.
    let r1 = h
        .vault
        .store("owner-1", "a.txt", "text/plain", b"same bytes")
        .await
        .unwrap();
    let r2 = h
        .vault
        .store("owner-1", "b.txt", "text/plain", b"same bytes")
        .await
        .unwrap();

    assert_eq!(r1.plaintext_digest, r2.plaintext_digest);
    assert_ne!(r1.storage_address, r2.storage_address);
    assert_eq!(h.vault.retrieve(&r1.id).await.unwrap(), b"same bytes");
    assert_eq!(h.vault.retrieve(&r2.id).await.unwrap(), b"same bytes");
}

#[tokio::test]
async fn rotation_reencrypts_and_old_envelopes_die() {
    let h = unlocked().await;
    let original = b"0123456789"; // 10 bytes, per the canonical scenario
    let record = h
        .vault
        .store("owner-1", "report.pdf", "application/pdf", original)
        .await
        .unwrap();

    // Keep the pre-rotation envelope around
    let old_key_path = format!("vault/blobs/{}", record.storage_address.as_deref().unwrap());
    let old_blob = h.op.read(&old_key_path).await.unwrap().to_vec();

    let rotated = h.vault.rotate_key("owner-1").await.unwrap();
    assert_eq!(rotated, 1);

    // The stale envelope no longer opens under the post-rotation key
    let backup = h
        .vault
        .backup_key(&SecretString::from("backup-pw"))
        .await
        .unwrap();
    let new_key = unwrap_vault_key(&backup, &SecretString::from("backup-pw")).unwrap();
    let old_envelope = EncryptedEnvelope::from_bytes(&old_blob).unwrap();
    assert!(matches!(
        pvault_crypto::open(&old_envelope, &new_key).unwrap_err(),
        VaultError::DecryptionFailed
    ));

    // The pipeline's record was re-encrypted: address moved, content and
    // digest are intact
    let updated = h.meta.get_file(&record.id).await.unwrap();
    assert_ne!(updated.storage_address, record.storage_address);
    assert_eq!(updated.plaintext_digest, record.plaintext_digest);
    assert_eq!(h.vault.retrieve(&record.id).await.unwrap(), original);
}

#[tokio::test]
async fn rotation_skips_deleted_records() {
    let h = unlocked().await;
    let keep = h
        .vault
        .store("owner-1", "keep.txt", "text/plain", b"keep me")
        .await
        .unwrap();
    let discard = h
        .vault
        .store("owner-1", "drop.txt", "text/plain", b"drop me")
        .await
        .unwrap();
    h.vault.delete(&discard.id).await.unwrap();

    assert_eq!(h.vault.rotate_key("owner-1").await.unwrap(), 1);
    assert_eq!(h.vault.retrieve(&keep.id).await.unwrap(), b"keep me");
}

#[tokio::test]
async fn rotation_on_locked_vault_fails() {
    let h = harness();
    assert!(matches!(
        h.vault.rotate_key("owner-1").await.unwrap_err(),
        VaultError::Locked
    ));
}

#[tokio::test]
async fn backup_and_restore_across_sessions() {
    let h = unlocked().await;
    let record = h
        .vault
        .store("owner-1", "a.txt", "text/plain", b"survives relock")
        .await
        .unwrap();

    let backup = h
        .vault
        .backup_key(&SecretString::from("backup-pw"))
        .await
        .unwrap();

    h.vault.lock().await;

    // Wrong backup password fails closed and leaves the vault locked
    let err = h
        .vault
        .restore_key(&backup, &SecretString::from("wrong-pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::WrongSecret));
    assert!(h.vault.is_locked().await);

    h.vault
        .restore_key(&backup, &SecretString::from("backup-pw"))
        .await
        .unwrap();
    assert_eq!(h.vault.retrieve(&record.id).await.unwrap(), b"survives relock");
}

#[tokio::test]
async fn unlock_with_wrong_login_secret_fails() {
    let h = harness();
    let wrapped = h
        .vault
        .initialize(&SecretString::from("right-secret"))
        .await
        .unwrap();
    h.vault.lock().await;

    let err = h
        .vault
        .unlock(&wrapped, &SecretString::from("wrong-secret"))
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::WrongSecret));
}

#[tokio::test]
async fn sweep_reclaims_abandoned_uploads() {
    let h = unlocked().await;
    let stored = h
        .vault
        .store("owner-1", "done.txt", "text/plain", b"finished")
        .await
        .unwrap();

    // Simulate an upload that died mid-pipeline
    let mut abandoned =
        pvault_core::FileRecord::new_pending("owner-1", "half.txt", "text/plain", 100);
    abandoned.status = FileStatus::Encrypting;
    h.meta.insert_file(abandoned.clone()).await.unwrap();

    assert_eq!(h.vault.sweep_abandoned("owner-1").await.unwrap(), 1);
    assert!(matches!(
        h.meta.get_file(&abandoned.id).await.unwrap_err(),
        VaultError::NotFound(_)
    ));
    // The completed record is untouched
    assert_eq!(h.vault.retrieve(&stored.id).await.unwrap(), b"finished");
}
