//! Key-value persistence seam
//!
//! The engine only needs `get`/`set`/`exists`/`delete` by key. No backend
//! offers multi-key transactions; per-session serialization lives in
//! [`crate::locks`].

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;
use mixtune_common::Result;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

/// Byte-oriented key-value store
///
/// Every method fails with `MixtuneError::StoreUnavailable` when the backend
/// cannot be reached.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value at `key`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrite the value at `key`
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Whether `key` holds a value
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}
