//! Key-value memory for skills and the runtime.
//!
//! [`Memory`] is a process-wide write-through cache in front of zero or more
//! [`StorageBackend`]s. The cache is authoritative while the process runs;
//! backends only matter across restarts.

pub mod error;
pub mod memory;
pub mod registry;
pub mod store;
pub mod store_file;
pub mod store_memory;
pub mod store_sqlite;

pub use {
    error::{Error, Result},
    memory::{BucketGuard, Memory},
    registry::{BackendFactory, BackendRegistry},
    store::StorageBackend,
    store_file::FileStore,
    store_memory::InMemoryStore,
    store_sqlite::SqliteStore,
};

/// Bucket used by backends that partition data when none is configured.
pub const DEFAULT_BUCKET: &str = "skiff";

/// Create the `memory` table. [`SqliteStore::connect`] calls this on its own
/// pool; call it yourself when sharing a pool.
pub async fn run_migrations(pool: &sqlx::SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .set_ignore_missing(true)
        .run(pool)
        .await?;
    Ok(())
}
