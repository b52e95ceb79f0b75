use thiserror::Error;

pub type VaultResult<T> = Result<T, VaultError>;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault is locked: no active key")]
    Locked,

    #[error("key unwrap failed: wrong secret")]
    WrongSecret,

    #[error("unsupported or malformed key envelope: {0}")]
    UnsupportedKeyEnvelope(String),

    #[error("decryption failed: wrong key or corrupted envelope")]
    DecryptionFailed,

    #[error("integrity violation: plaintext digest mismatch")]
    IntegrityViolation,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("share grant expired")]
    Expired,

    #[error("share grant revoked")]
    Revoked,

    #[error("share grant access limit reached")]
    Exhausted,

    #[error("bad credentials")]
    BadCredentials,

    #[error("preview is disabled for this share grant")]
    PreviewDenied,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("metadata error: {0}")]
    Metadata(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VaultError {
    /// Whether this error stems from a failed secret check.
    ///
    /// All of these must render identically to end users: revealing which
    /// check failed would give a brute-forcing caller an oracle.
    pub fn is_credential_failure(&self) -> bool {
        matches!(
            self,
            Self::WrongSecret
                | Self::UnsupportedKeyEnvelope(_)
                | Self::DecryptionFailed
                | Self::BadCredentials
        )
    }

    /// User-facing message. Credential failures collapse into one generic
    /// string; `IntegrityViolation` is always surfaced distinctly because it
    /// indicates corruption or tampering, not user error.
    pub fn user_message(&self) -> String {
        if self.is_credential_failure() {
            return "invalid credentials or corrupted data".to_string();
        }
        match self {
            Self::IntegrityViolation => {
                "file integrity check failed: the content does not match its recorded digest"
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}
