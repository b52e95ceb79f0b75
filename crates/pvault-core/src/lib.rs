pub mod config;
pub mod error;
pub mod types;

pub use error::{VaultError, VaultResult};
pub use types::{
    AccessEvent, AccessKind, FileRecord, FileStatus, GrantPolicy, GrantStatus, OtpChallenge,
    OtpMethod, ShareGrant,
};
