//! pvault-storage: content-addressed blob storage + metadata-store port
//!
//! Blobs (sealed envelopes) are keyed by the BLAKE3 digest of their bytes,
//! so identical content maps to the same address and uploads deduplicate.
//! Pinning is an advisory availability hint; correctness never depends on
//! it. Record persistence goes through the `MetadataStore` port so the
//! backing store (SQL, KV, in-memory) stays swappable.

pub mod content;
pub mod metadata;

pub use content::{build_operator, memory_operator, ContentAddress, ContentStore};
pub use metadata::{MemoryMetadataStore, MetadataStore};
