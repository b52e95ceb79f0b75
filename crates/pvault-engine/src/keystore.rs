//! Session key store: the single slot holding the active vault key
//!
//! Pipeline operations take a read guard (`session()`) for their whole
//! span; rotation takes the write guard through `begin_rotation()`. That
//! makes "rotation never interleaves with an in-flight seal/open" a lock
//! property instead of a convention. The old key stays current until
//! `KeyRotation::commit()`; dropping the rotation without committing
//! aborts it.

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use pvault_core::{VaultError, VaultResult};
use pvault_crypto::VaultKey;

/// Holds at most one active vault key for the session.
#[derive(Debug, Default)]
pub struct VaultKeyStore {
    slot: RwLock<Option<VaultKey>>,
}

/// Read guard over the active key, held for the span of a seal/open.
pub struct SessionKey<'a> {
    guard: RwLockReadGuard<'a, VaultKey>,
}

impl std::ops::Deref for SessionKey<'_> {
    type Target = VaultKey;

    fn deref(&self) -> &VaultKey {
        &self.guard
    }
}

/// An in-progress key rotation. Holds the store's write guard, so no new
/// sessions start and no other rotation can begin until this one commits
/// or drops (= aborts, old key stays current).
pub struct KeyRotation<'a> {
    guard: RwLockWriteGuard<'a, Option<VaultKey>>,
    retiring: VaultKey,
    replacement: VaultKey,
}

impl KeyRotation<'_> {
    /// The key being replaced; still decrypts everything stored so far.
    pub fn retiring_key(&self) -> &VaultKey {
        &self.retiring
    }

    /// The freshly generated key; not current until `commit`.
    pub fn replacement_key(&self) -> &VaultKey {
        &self.replacement
    }

    /// Atomically swap the replacement in. Call only after every dependent
    /// record has been re-encrypted.
    pub fn commit(mut self) {
        *self.guard = Some(self.replacement.clone());
        tracing::info!("vault key rotation committed");
    }
}

impl VaultKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a key as the session's active key (unlock/restore).
    pub async fn activate(&self, key: VaultKey) {
        let mut slot = self.slot.write().await;
        *slot = Some(key);
    }

    /// Clone of the active key, for short synchronous uses.
    pub async fn current(&self) -> VaultResult<VaultKey> {
        self.slot.read().await.clone().ok_or(VaultError::Locked)
    }

    /// Read-guarded access for the span of a pipeline operation.
    pub async fn session(&self) -> VaultResult<SessionKey<'_>> {
        let guard = self.slot.read().await;
        match RwLockReadGuard::try_map(guard, |slot| slot.as_ref()) {
            Ok(guard) => Ok(SessionKey { guard }),
            Err(_) => Err(VaultError::Locked),
        }
    }

    pub async fn is_locked(&self) -> bool {
        self.slot.read().await.is_none()
    }

    /// Drop the active key; its bytes are zeroized on drop.
    pub async fn lock(&self) {
        let mut slot = self.slot.write().await;
        *slot = None;
    }

    /// Start a rotation: generates the replacement key and takes exclusive
    /// access until commit or abort.
    pub async fn begin_rotation(&self) -> VaultResult<KeyRotation<'_>> {
        let guard = self.slot.write().await;
        let retiring = guard.clone().ok_or(VaultError::Locked)?;
        Ok(KeyRotation {
            guard,
            retiring,
            replacement: VaultKey::generate(),
        })
    }
}
