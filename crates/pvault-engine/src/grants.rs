//! Share grants: issue, validate, revoke, and access tracking
//!
//! A grant is a random bearer token bound to one file record, optionally
//! fenced by a password, a one-time code, an expiry, and an access limit.
//! Grants are fully independent of the vault key: revoking every grant for
//! a file changes nothing about its encryption.
//!
//! Validation order matters: expiry is checked before the password and OTP
//! so an expired link never leaks whether a presented password was correct.

use std::sync::Arc;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::{Rng, RngCore};
use tracing::{debug, info};

use pvault_core::types::unix_now_ms;
use pvault_core::{
    AccessEvent, AccessKind, FileRecord, FileStatus, GrantPolicy, GrantStatus, OtpChallenge,
    ShareGrant, VaultError, VaultResult,
};
use pvault_storage::MetadataStore;

/// 256 bits of token entropy: unguessable over any realistic grant lifetime.
const TOKEN_BYTES: usize = 32;

/// Credentials presented with a validation attempt.
#[derive(Debug, Clone, Default)]
pub struct GrantCredentials {
    pub password: Option<String>,
    pub otp_code: Option<String>,
}

/// Result of issuing a grant. `otp_code` is returned exactly once, for
/// external delivery; only its salted hash is stored.
#[derive(Debug, Clone)]
pub struct IssuedGrant {
    pub grant: ShareGrant,
    pub otp_code: Option<String>,
}

pub struct ShareGrantManager<M: MetadataStore> {
    meta: Arc<M>,
    otp_digits: u32,
}

impl<M: MetadataStore> ShareGrantManager<M> {
    pub fn new(meta: Arc<M>, otp_digits: u32) -> Self {
        Self { meta, otp_digits }
    }

    /// Issue a grant against a stored file.
    pub async fn issue(&self, record: &FileRecord, policy: GrantPolicy) -> VaultResult<IssuedGrant> {
        if record.status != FileStatus::Stored {
            return Err(VaultError::NotFound(format!(
                "file record {} is not stored",
                record.id
            )));
        }

        let mut token_bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut token_bytes);
        let token = URL_SAFE_NO_PAD.encode(token_bytes);

        let password_hash = match policy.password.as_deref() {
            Some(password) => Some(hash_secret(password)?),
            None => None,
        };

        let (otp, otp_code) = match policy.otp {
            Some(method) => {
                let code = self.generate_otp_code();
                let challenge = OtpChallenge {
                    method,
                    code_hash: hash_secret(&code)?,
                };
                (Some(challenge), Some(code))
            }
            None => (None, None),
        };

        let grant = ShareGrant {
            id: uuid::Uuid::new_v4().to_string(),
            file_id: record.id.clone(),
            token,
            password_hash,
            otp,
            expires_at: policy.expires_at,
            max_accesses: policy.max_accesses,
            access_count: 0,
            download_count: 0,
            allow_preview: policy.allow_preview,
            track_access: policy.track_access,
            status: GrantStatus::Active,
            created_at: unix_now_ms(),
        };

        self.meta.insert_grant(grant.clone()).await?;
        info!(grant_id = %grant.id, file_id = %grant.file_id, "share grant issued");
        Ok(IssuedGrant { grant, otp_code })
    }

    /// Validate a token and consume one access. Short-circuits on the first
    /// failing check, in this order: lookup, revoked, expired, exhausted,
    /// password, OTP, preview permission.
    pub async fn validate(
        &self,
        token: &str,
        creds: &GrantCredentials,
        kind: AccessKind,
    ) -> VaultResult<ShareGrant> {
        let now = unix_now_ms();
        let grant = self.meta.get_grant_by_token(token).await?;

        match grant.status {
            GrantStatus::Revoked => return Err(VaultError::Revoked),
            GrantStatus::Expired => return Err(VaultError::Expired),
            GrantStatus::Active => {}
        }
        if grant.is_past_expiry(now) {
            // Lazy transition; the sweep is only an optimization over this.
            let mut expired = grant.clone();
            expired.status = GrantStatus::Expired;
            self.meta.update_grant(&expired).await?;
            return Err(VaultError::Expired);
        }
        if grant.is_exhausted() {
            return Err(VaultError::Exhausted);
        }

        if let Some(stored_hash) = grant.password_hash.as_deref() {
            let presented = creds.password.as_deref().ok_or(VaultError::BadCredentials)?;
            verify_secret(presented, stored_hash)?;
        }
        if let Some(otp) = &grant.otp {
            let presented = creds.otp_code.as_deref().ok_or(VaultError::BadCredentials)?;
            verify_secret(presented, &otp.code_hash)?;
        }

        if kind == AccessKind::Preview && !grant.allow_preview {
            return Err(VaultError::PreviewDenied);
        }

        // The atomic re-check-and-increment resolves concurrent validations
        // racing on the last remaining access.
        let grant = self.meta.consume_access(&grant.id, kind, now).await?;

        if grant.track_access {
            self.meta
                .append_access_event(AccessEvent {
                    grant_id: grant.id.clone(),
                    file_id: grant.file_id.clone(),
                    kind,
                    at: now,
                })
                .await?;
        }

        debug!(grant_id = %grant.id, kind = ?kind, count = grant.access_count, "grant access");
        Ok(grant)
    }

    /// Revoke a grant. Idempotent: revoking an already-revoked or
    /// already-expired grant is a no-op success, so bulk revokes never fail
    /// on mixed statuses.
    pub async fn revoke(&self, grant_id: &str) -> VaultResult<()> {
        let grant = self.meta.get_grant(grant_id).await?;
        if grant.status != GrantStatus::Active {
            return Ok(());
        }

        let mut revoked = grant;
        revoked.status = GrantStatus::Revoked;
        self.meta.update_grant(&revoked).await?;
        info!(grant_id = %grant_id, "share grant revoked");
        Ok(())
    }

    /// Revoke every grant of a file. Returns how many flipped to revoked.
    pub async fn revoke_all_for_file(&self, file_id: &str) -> VaultResult<usize> {
        let mut revoked = 0;
        for grant in self.meta.list_grants_for_file(file_id).await? {
            if grant.status == GrantStatus::Active {
                self.revoke(&grant.id).await?;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    /// Record a use of an already-validated grant: the preview→download
    /// upgrade bumps `download_count`; both kinds append an analytics event
    /// when the grant tracks access. Refuses on non-active grants, keeping
    /// counters monotone and frozen after revoke/expiry.
    pub async fn record_access(&self, grant_id: &str, kind: AccessKind) -> VaultResult<ShareGrant> {
        let now = unix_now_ms();
        let grant = match kind {
            AccessKind::Download => self.meta.record_download(grant_id, now).await?,
            AccessKind::Preview => {
                let grant = self.meta.get_grant(grant_id).await?;
                match grant.status {
                    GrantStatus::Revoked => return Err(VaultError::Revoked),
                    GrantStatus::Expired => return Err(VaultError::Expired),
                    GrantStatus::Active if grant.is_past_expiry(now) => {
                        return Err(VaultError::Expired)
                    }
                    GrantStatus::Active => grant,
                }
            }
        };

        if grant.track_access {
            self.meta
                .append_access_event(AccessEvent {
                    grant_id: grant.id.clone(),
                    file_id: grant.file_id.clone(),
                    kind,
                    at: now,
                })
                .await?;
        }
        Ok(grant)
    }

    /// Advisory sweep flipping past-expiry actives to `Expired`. Lazy
    /// validation stays authoritative; skipping this sweep loses nothing.
    pub async fn sweep_expired(&self) -> VaultResult<usize> {
        let now = unix_now_ms();
        let mut swept = 0;
        for grant in self.meta.list_grants().await? {
            if grant.status == GrantStatus::Active && grant.is_past_expiry(now) {
                let mut expired = grant;
                expired.status = GrantStatus::Expired;
                self.meta.update_grant(&expired).await?;
                swept += 1;
            }
        }
        if swept > 0 {
            debug!(count = swept, "expired grants swept");
        }
        Ok(swept)
    }

    fn generate_otp_code(&self) -> String {
        let digits = self.otp_digits.clamp(4, 10);
        let max = 10u64.pow(digits);
        let code = rand::thread_rng().gen_range(0..max);
        format!("{code:0width$}", width = digits as usize)
    }
}

/// Salted Argon2 hash, PHC string form.
fn hash_secret(secret: &str) -> VaultResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| VaultError::Other(anyhow::anyhow!("password hashing failed: {e}")))
}

/// Verify a presented secret against a stored PHC hash. A mismatch is a
/// credential failure; an unparseable stored hash is a metadata problem.
fn verify_secret(presented: &str, stored: &str) -> VaultResult<()> {
    let parsed = PasswordHash::new(stored)
        .map_err(|e| VaultError::Metadata(format!("stored credential hash: {e}")))?;
    Argon2::default()
        .verify_password(presented.as_bytes(), &parsed)
        .map_err(|_| VaultError::BadCredentials)
}
