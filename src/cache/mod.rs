//! Versioned cache generations for offline support.
//!
//! This module provides the storage side of the offline cache:
//! - Named generations (`partyticket-v1`, ...) holding captured responses
//! - Entries keyed by normalized method + URL
//! - Atomic bulk writes so a manifest is never half-stored
//! - A SQLite backend for persistence and an in-memory one for ephemeral runs

mod memory;
mod storage;
mod traits;

pub use memory::MemoryStorage;
pub use storage::SqliteStorage;
pub use traits::{CacheStore, CachedResponse};
