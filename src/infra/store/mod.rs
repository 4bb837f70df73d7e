//! Durable key/value backends for the reference-data cache.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::core::StoreError;

/// Single-key-at-a-time string store that survives process restarts.
///
/// Values read back are untrusted: callers must validate them and treat
/// anything unexpected as absent. Implementations must not block the calling
/// runtime thread on I/O.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Read the value for `key`, `None` if never written.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Replace the value for `key` as a whole.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}
