//! Schema versioning for Cairn storage backends

use crate::{StorageError, StorageResult};

/// Current schema version
pub const CURRENT_VERSION: u32 = 1;

/// One step in the schema history
#[derive(Debug, Clone)]
pub struct SchemaVersion {
    pub version: u32,
    pub description: &'static str,
}

/// Every schema version, oldest first
pub fn schema_history() -> Vec<SchemaVersion> {
    vec![SchemaVersion {
        version: 1,
        description: "Graph stored as entities, relationships and meta tables",
    }]
}

/// Schema version tracking for a backend
///
/// A store written by a newer release is refused rather than silently read.
pub trait Migratable {
    /// Version recorded in storage, 0 for a store that was never stamped
    fn schema_version(&self) -> StorageResult<u32>;

    fn set_schema_version(&self, version: u32) -> StorageResult<()>;

    /// Apply the changes introduced by `version`
    fn apply_migration(&self, version: u32) -> StorageResult<()>;

    /// Bring storage up to `target`, one version at a time
    fn migrate_to(&self, target: u32) -> StorageResult<()> {
        let current = self.schema_version()?;

        if current > target {
            return Err(StorageError::UnsupportedSchema {
                found: current,
                supported: target,
            });
        }
        if current == target {
            tracing::debug!("Schema already at version {}", target);
            return Ok(());
        }

        tracing::info!("Migrating schema from v{} to v{}", current, target);
        for step in schema_history()
            .into_iter()
            .filter(|s| s.version > current && s.version <= target)
        {
            self.apply_migration(step.version)?;
            self.set_schema_version(step.version)?;
            tracing::info!("Schema v{}: {}", step.version, step.description);
        }

        let reached = self.schema_version()?;
        if reached != target {
            return Err(StorageError::Migration(format!(
                "expected schema v{} after migrating, found v{}",
                target, reached
            )));
        }
        Ok(())
    }

    fn migrate_to_latest(&self) -> StorageResult<()> {
        self.migrate_to(CURRENT_VERSION)
    }
}
