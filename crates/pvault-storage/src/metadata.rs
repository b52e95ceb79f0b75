//! Metadata-store port: CRUD over file records and share grants
//!
//! The trait is the seam between the vault core and whatever record store
//! backs it. Two methods are more than CRUD: `consume_access` and
//! `record_download` must apply their status/limit checks and the counter
//! increment atomically, because two concurrent validations racing at
//! `access_count == max_accesses - 1` must produce exactly one success.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use pvault_core::{
    AccessEvent, AccessKind, FileRecord, GrantStatus, ShareGrant, VaultError, VaultResult,
};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    // -- file records ------------------------------------------------------

    async fn insert_file(&self, record: FileRecord) -> VaultResult<()>;
    async fn update_file(&self, record: &FileRecord) -> VaultResult<()>;
    async fn get_file(&self, id: &str) -> VaultResult<FileRecord>;
    async fn list_files(&self, owner_id: &str) -> VaultResult<Vec<FileRecord>>;
    async fn delete_file(&self, id: &str) -> VaultResult<()>;

    // -- share grants ------------------------------------------------------

    async fn insert_grant(&self, grant: ShareGrant) -> VaultResult<()>;
    async fn update_grant(&self, grant: &ShareGrant) -> VaultResult<()>;
    async fn get_grant(&self, id: &str) -> VaultResult<ShareGrant>;
    async fn get_grant_by_token(&self, token: &str) -> VaultResult<ShareGrant>;
    async fn list_grants_for_file(&self, file_id: &str) -> VaultResult<Vec<ShareGrant>>;
    async fn list_grants(&self) -> VaultResult<Vec<ShareGrant>>;

    /// Atomically re-check the grant (active, unexpired as of `now_ms`,
    /// under its access limit) and increment `access_count`
    /// (+`download_count` for downloads). The atomicity requirement is what
    /// makes the exhaustion race resolve to exactly one winner.
    ///
    /// A grant found past its expiry is lazily flipped to `Expired` and
    /// `Err(Expired)` is returned.
    async fn consume_access(
        &self,
        grant_id: &str,
        kind: AccessKind,
        now_ms: u64,
    ) -> VaultResult<ShareGrant>;

    /// Atomically bump `download_count` on an active grant (the
    /// preview→download upgrade path; `access_count` was already consumed
    /// at validation). Non-active grants never increment counters.
    async fn record_download(&self, grant_id: &str, now_ms: u64) -> VaultResult<ShareGrant>;

    // -- access analytics --------------------------------------------------

    async fn append_access_event(&self, event: AccessEvent) -> VaultResult<()>;
    async fn access_events_for_grant(&self, grant_id: &str) -> VaultResult<Vec<AccessEvent>>;
}

#[derive(Debug, Default)]
struct Inner {
    files: HashMap<String, FileRecord>,
    grants: HashMap<String, ShareGrant>,
    /// token → grant id
    token_index: HashMap<String, String>,
    events: Vec<AccessEvent>,
}

/// In-memory metadata store. One mutex over all tables gives the
/// conditional-increment primitives their atomicity.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: Mutex<Inner>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared expiry/limit check used by both increment primitives.
fn check_consumable(grant: &mut ShareGrant, now_ms: u64) -> VaultResult<()> {
    match grant.status {
        GrantStatus::Revoked => return Err(VaultError::Revoked),
        GrantStatus::Expired => return Err(VaultError::Expired),
        GrantStatus::Active => {}
    }
    if grant.is_past_expiry(now_ms) {
        grant.status = GrantStatus::Expired;
        return Err(VaultError::Expired);
    }
    Ok(())
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn insert_file(&self, record: FileRecord) -> VaultResult<()> {
        let mut inner = self.lock();
        if inner.files.contains_key(&record.id) {
            return Err(VaultError::Metadata(format!(
                "file record {} already exists",
                record.id
            )));
        }
        inner.files.insert(record.id.clone(), record);
        Ok(())
    }

    async fn update_file(&self, record: &FileRecord) -> VaultResult<()> {
        let mut inner = self.lock();
        if !inner.files.contains_key(&record.id) {
            return Err(VaultError::NotFound(format!("file record {}", record.id)));
        }
        inner.files.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn get_file(&self, id: &str) -> VaultResult<FileRecord> {
        self.lock()
            .files
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("file record {id}")))
    }

    async fn list_files(&self, owner_id: &str) -> VaultResult<Vec<FileRecord>> {
        let mut files: Vec<FileRecord> = self
            .lock()
            .files
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        files.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(files)
    }

    async fn delete_file(&self, id: &str) -> VaultResult<()> {
        self.lock()
            .files
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| VaultError::NotFound(format!("file record {id}")))
    }

    async fn insert_grant(&self, grant: ShareGrant) -> VaultResult<()> {
        let mut inner = self.lock();
        if inner.grants.contains_key(&grant.id) {
            return Err(VaultError::Metadata(format!(
                "share grant {} already exists",
                grant.id
            )));
        }
        inner.token_index.insert(grant.token.clone(), grant.id.clone());
        inner.grants.insert(grant.id.clone(), grant);
        Ok(())
    }

    async fn update_grant(&self, grant: &ShareGrant) -> VaultResult<()> {
        let mut inner = self.lock();
        if !inner.grants.contains_key(&grant.id) {
            return Err(VaultError::NotFound(format!("share grant {}", grant.id)));
        }
        inner.grants.insert(grant.id.clone(), grant.clone());
        Ok(())
    }

    async fn get_grant(&self, id: &str) -> VaultResult<ShareGrant> {
        self.lock()
            .grants
            .get(id)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(format!("share grant {id}")))
    }

    async fn get_grant_by_token(&self, token: &str) -> VaultResult<ShareGrant> {
        let inner = self.lock();
        inner
            .token_index
            .get(token)
            .and_then(|id| inner.grants.get(id))
            .cloned()
            .ok_or_else(|| VaultError::NotFound("share token".into()))
    }

    async fn list_grants_for_file(&self, file_id: &str) -> VaultResult<Vec<ShareGrant>> {
        let mut grants: Vec<ShareGrant> = self
            .lock()
            .grants
            .values()
            .filter(|g| g.file_id == file_id)
            .cloned()
            .collect();
        grants.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(grants)
    }

    async fn list_grants(&self) -> VaultResult<Vec<ShareGrant>> {
        Ok(self.lock().grants.values().cloned().collect())
    }

    async fn consume_access(
        &self,
        grant_id: &str,
        kind: AccessKind,
        now_ms: u64,
    ) -> VaultResult<ShareGrant> {
        let mut inner = self.lock();
        let grant = inner
            .grants
            .get_mut(grant_id)
            .ok_or_else(|| VaultError::NotFound(format!("share grant {grant_id}")))?;

        check_consumable(grant, now_ms)?;
        if grant.is_exhausted() {
            return Err(VaultError::Exhausted);
        }

        grant.access_count += 1;
        if kind == AccessKind::Download {
            grant.download_count += 1;
        }
        Ok(grant.clone())
    }

    async fn record_download(&self, grant_id: &str, now_ms: u64) -> VaultResult<ShareGrant> {
        let mut inner = self.lock();
        let grant = inner
            .grants
            .get_mut(grant_id)
            .ok_or_else(|| VaultError::NotFound(format!("share grant {grant_id}")))?;

        check_consumable(grant, now_ms)?;

        grant.download_count += 1;
        Ok(grant.clone())
    }

    async fn append_access_event(&self, event: AccessEvent) -> VaultResult<()> {
        self.lock().events.push(event);
        Ok(())
    }

    async fn access_events_for_grant(&self, grant_id: &str) -> VaultResult<Vec<AccessEvent>> {
        Ok(self
            .lock()
            .events
            .iter()
            .filter(|e| e.grant_id == grant_id)
            .cloned()
            .collect())
    }
}
