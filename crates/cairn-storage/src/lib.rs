//! Cairn Storage - Persistence backends for the knowledge graph
//!
//! Every backend implements [`cairn_core::GraphPersistence`] and can be
//! handed to a [`cairn_core::MemoryManager`].

#![allow(clippy::result_large_err)]

pub mod error;
pub mod memory;
pub mod migration;

#[cfg(feature = "redb")]
pub mod redb;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;
pub use migration::{Migratable, SchemaVersion, CURRENT_VERSION};

#[cfg(feature = "redb")]
pub use redb::RedbStorage;
