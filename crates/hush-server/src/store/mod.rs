pub mod db;
pub mod memory;
pub mod model;

use anyhow::Result;

pub use db::RedbStore;
pub use memory::MemoryStore;
pub use model::{Secret, SecretRow, Timestamp, TIMESTAMP_FORMAT};

/// CRUD surface over the persisted secret collection, keyed by hash.
///
/// The store never decides when a secret expires; it only executes the
/// writes the lifecycle manager asks for.
pub trait SecretStore: Send + Sync {
    fn find_by_hash(&self, hash: &str) -> Result<Option<Secret>>;

    /// Insert a new secret. Callers guarantee the hash is fresh.
    fn insert(&self, secret: &Secret) -> Result<()>;

    /// Overwrite the view counter. No-op if the hash is unknown.
    fn update_remaining_views(&self, hash: &str, remaining_views: i64) -> Result<()>;

    /// Atomically decrement the view counter if it is still positive.
    /// Returns the new count, or `None` if the secret is gone or already exhausted.
    fn consume_view(&self, hash: &str) -> Result<Option<i64>>;

    /// Remove a secret. Returns true if it existed.
    fn delete(&self, hash: &str) -> Result<bool>;
}
