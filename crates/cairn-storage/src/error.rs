//! Storage error types

use thiserror::Error;

/// Result of a backend call
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors raised by the persistence backends
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Database(String),

    #[error("record encoding failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record '{key}' in table '{table}' does not decode: {reason}")]
    Corrupt {
        table: &'static str,
        key: String,
        reason: String,
    },

    #[error("store uses schema v{found}, this build reads up to v{supported}")]
    UnsupportedSchema { found: u32, supported: u32 },

    #[error("schema migration failed: {0}")]
    Migration(String),

    #[cfg(feature = "redb")]
    #[error("redb open: {0}")]
    RedbDatabase(#[from] ::redb::DatabaseError),

    #[cfg(feature = "redb")]
    #[error("redb table: {0}")]
    RedbTable(#[from] ::redb::TableError),

    #[cfg(feature = "redb")]
    #[error("redb io: {0}")]
    RedbStorage(#[from] ::redb::StorageError),

    #[cfg(feature = "redb")]
    #[error("redb commit: {0}")]
    RedbCommit(#[from] ::redb::CommitError),

    #[cfg(feature = "redb")]
    #[error("redb transaction: {0}")]
    RedbTransaction(#[from] ::redb::TransactionError),
}
