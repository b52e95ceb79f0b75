use serde::{Deserialize, Serialize};

/// Current time as Unix epoch milliseconds.
pub fn unix_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Lifecycle state of a vault file.
///
/// `Pending` and `Encrypting` are transient pipeline states; a record found
/// in either of them after the fact is an abandoned upload and eligible for
/// cleanup. Only `Stored` records are retrievable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Encrypting,
    Stored,
    Deleted,
}

/// Metadata record for one encrypted file.
///
/// `plaintext_digest` is computed before encryption and re-verified after
/// decryption; it is the end-to-end integrity contract, independent of
/// whatever the cipher or the storage layer guarantee.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// BLAKE3 digest of the plaintext, hex.
    pub plaintext_digest: String,
    /// Content address of the sealed envelope; `None` until stored.
    pub storage_address: Option<String>,
    pub status: FileStatus,
    pub created_at: u64,
    pub updated_at: u64,
}

impl FileRecord {
    /// Fresh placeholder record at the start of the store pipeline.
    pub fn new_pending(owner_id: &str, name: &str, mime_type: &str, size_bytes: u64) -> Self {
        let now = unix_now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            size_bytes,
            plaintext_digest: String::new(),
            storage_address: None,
            status: FileStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = unix_now_ms();
    }
}

/// Lifecycle state of a share grant.
///
/// `Expired` is assigned lazily at validation time (or by the advisory
/// sweep); `Revoked` only via explicit owner action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrantStatus {
    Active,
    Expired,
    Revoked,
}

/// Delivery channel for a share-grant one-time code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpMethod {
    Email,
    Sms,
}

/// One-time-code requirement attached to a grant.
///
/// Only the salted hash of the code is kept; the plaintext code is handed
/// back exactly once at issue time for external delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpChallenge {
    pub method: OtpMethod,
    pub code_hash: String,
}

/// How a share-grant access is being used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessKind {
    Preview,
    Download,
}

/// A revocable, policy-bounded access token for one file.
///
/// Grants never store or need the vault key: revoking every grant for a
/// file does not affect the file's encryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareGrant {
    pub id: String,
    pub file_id: String,
    pub token: String,
    /// Salted Argon2 hash (PHC string) of the access password, if required.
    pub password_hash: Option<String>,
    pub otp: Option<OtpChallenge>,
    /// Unix epoch milliseconds; `None` = never expires.
    pub expires_at: Option<u64>,
    pub max_accesses: Option<u32>,
    pub access_count: u32,
    pub download_count: u32,
    pub allow_preview: bool,
    pub track_access: bool,
    pub status: GrantStatus,
    pub created_at: u64,
}

impl ShareGrant {
    /// Whether `expires_at` has passed as of `now_ms`.
    pub fn is_past_expiry(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }

    /// Whether `max_accesses` has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.max_accesses
            .is_some_and(|max| self.access_count >= max)
    }
}

/// Issue-time policy for a share grant.
#[derive(Debug, Clone, Default)]
pub struct GrantPolicy {
    /// Require this password on every validation (stored salted-hashed).
    pub password: Option<String>,
    /// Require a separately delivered one-time code.
    pub otp: Option<OtpMethod>,
    /// Unix epoch milliseconds after which the grant is expired.
    pub expires_at: Option<u64>,
    /// Maximum number of successful validations.
    pub max_accesses: Option<u32>,
    /// Allow preview accesses (in addition to downloads).
    pub allow_preview: bool,
    /// Append an access event per use for analytics.
    pub track_access: bool,
}

impl GrantPolicy {
    /// Open policy: no password, no OTP, no expiry, unlimited accesses.
    pub fn open() -> Self {
        Self {
            allow_preview: true,
            track_access: true,
            ..Self::default()
        }
    }
}

/// One recorded use of a share grant (kept only when the grant's
/// `track_access` is set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEvent {
    pub grant_id: String,
    pub file_id: String,
    pub kind: AccessKind,
    pub at: u64,
}
