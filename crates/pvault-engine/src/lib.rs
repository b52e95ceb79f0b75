//! pvault-engine: the vault core wired together
//!
//! - `keystore`: the session's single active vault key; rotation holds the
//!   write side so it can never interleave with an in-flight seal/open
//! - `pipeline`: digest → seal → put → persist, and the inverse with
//!   end-to-end integrity verification
//! - `grants`: revocable, policy-bounded share links, independent of the
//!   vault key
//! - `vault`: the facade collaborators call

pub mod grants;
pub mod keystore;
pub mod pipeline;
pub mod vault;

pub use grants::{GrantCredentials, IssuedGrant, ShareGrantManager};
pub use keystore::{KeyRotation, SessionKey, VaultKeyStore};
pub use pipeline::VaultPipeline;
pub use vault::Vault;
