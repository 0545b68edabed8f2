//! ReDB storage backend

use crate::error::{StorageError, StorageResult};
use crate::migration::Migratable;
use async_trait::async_trait;
use cairn_core::{Graph, GraphPersistence, MemoryEntity, MemoryRelationship, PersistenceError};
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Mutex;

// Table definitions
const ENTITIES: TableDefinition<&str, &[u8]> = TableDefinition::new("entities");
const RELATIONSHIPS: TableDefinition<&str, &[u8]> = TableDefinition::new("relationships");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SCHEMA_VERSION_KEY: &str = "schema_version";
const SAVED_AT_KEY: &str = "saved_at";

/// ReDB storage backend
///
/// Entities and relationships are stored as JSON keyed by id. A save
/// replaces both tables in one write transaction.
pub struct RedbStorage {
    db: Mutex<Database>,
}

impl RedbStorage {
    /// Open or create a ReDB database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path.as_ref())?;

        // Initialize tables
        {
            let write_txn = db.begin_write()?;
            {
                write_txn.open_table(ENTITIES)?;
                write_txn.open_table(RELATIONSHIPS)?;
                write_txn.open_table(META)?;
            }
            write_txn.commit()?;
        }

        let storage = Self { db: Mutex::new(db) };
        storage.migrate_to_latest()?;
        tracing::debug!("Opened redb store at {}", path.as_ref().display());
        Ok(storage)
    }

    fn lock(&self) -> StorageResult<std::sync::MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))
    }

    fn read_meta(&self, key: &str) -> StorageResult<Option<u64>> {
        let db = self.lock()?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(META)?;
        Ok(table.get(key)?.map(|value| value.value()))
    }

    fn read_all<T: DeserializeOwned>(
        table: &impl ReadableTable<&'static str, &'static [u8]>,
        name: &'static str,
    ) -> StorageResult<Vec<T>> {
        let mut records = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            let record = serde_json::from_slice(value.value()).map_err(|e| StorageError::Corrupt {
                table: name,
                key: key.value().to_string(),
                reason: e.to_string(),
            })?;
            records.push(record);
        }
        Ok(records)
    }

    fn load(&self) -> StorageResult<Option<Graph>> {
        let db = self.lock()?;
        let read_txn = db.begin_read()?;

        let meta = read_txn.open_table(META)?;
        if meta.get(SAVED_AT_KEY)?.is_none() {
            return Ok(None);
        }

        let entities: Vec<MemoryEntity> =
            Self::read_all(&read_txn.open_table(ENTITIES)?, "entities")?;
        let relationships: Vec<MemoryRelationship> =
            Self::read_all(&read_txn.open_table(RELATIONSHIPS)?, "relationships")?;

        tracing::debug!(
            "Loaded {} entities and {} relationships from redb",
            entities.len(),
            relationships.len()
        );
        Ok(Some(Graph {
            entities,
            relationships,
        }))
    }

    fn store(&self, graph: &Graph) -> StorageResult<()> {
        // Serialise before touching the database so a bad record aborts early
        let entities = graph
            .entities
            .iter()
            .map(|e| Ok((e.id.as_str(), serde_json::to_vec(e)?)))
            .collect::<StorageResult<Vec<_>>>()?;
        let relationships = graph
            .relationships
            .iter()
            .map(|r| Ok((r.id.as_str(), serde_json::to_vec(r)?)))
            .collect::<StorageResult<Vec<_>>>()?;

        let db = self.lock()?;
        let write_txn = db.begin_write()?;
        {
            write_txn.delete_table(ENTITIES)?;
            write_txn.delete_table(RELATIONSHIPS)?;

            let mut table = write_txn.open_table(ENTITIES)?;
            for (key, value) in &entities {
                table.insert(*key, value.as_slice())?;
            }
            let mut table = write_txn.open_table(RELATIONSHIPS)?;
            for (key, value) in &relationships {
                table.insert(*key, value.as_slice())?;
            }

            let mut meta = write_txn.open_table(META)?;
            let saved_at = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
            meta.insert(SAVED_AT_KEY, saved_at)?;
        }
        write_txn.commit()?;

        tracing::debug!(
            "Saved {} entities and {} relationships to redb",
            entities.len(),
            relationships.len()
        );
        Ok(())
    }

    /// Milliseconds since the epoch of the last save, if any
    pub fn last_saved_at(&self) -> StorageResult<Option<u64>> {
        self.read_meta(SAVED_AT_KEY)
    }
}

impl Migratable for RedbStorage {
    fn schema_version(&self) -> StorageResult<u32> {
        let version = self.read_meta(SCHEMA_VERSION_KEY)?.unwrap_or(0);
        u32::try_from(version)
            .map_err(|_| StorageError::Migration(format!("invalid schema version {}", version)))
    }

    fn set_schema_version(&self, version: u32) -> StorageResult<()> {
        let db = self.lock()?;
        let write_txn = db.begin_write()?;
        {
            let mut meta = write_txn.open_table(META)?;
            meta.insert(SCHEMA_VERSION_KEY, u64::from(version))?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn apply_migration(&self, version: u32) -> StorageResult<()> {
        match version {
            // Tables are created on open
            1 => Ok(()),
            other => Err(StorageError::Migration(format!(
                "no migration defined for schema v{}",
                other
            ))),
        }
    }
}

#[async_trait]
impl GraphPersistence for RedbStorage {
    async fn load_graph(&self) -> Result<Option<Graph>, PersistenceError> {
        Ok(self.load()?)
    }

    async fn save_graph(&self, graph: &Graph) -> Result<(), PersistenceError> {
        Ok(self.store(graph)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::CURRENT_VERSION;
    use cairn_core::{DecisionStatus, EntityId, RelationshipType};
    use tempfile::tempdir;

    fn graph() -> Graph {
        Graph::new()
            .with_entities(vec![
                MemoryEntity::decision("adr-1", "Use PostgreSQL", DecisionStatus::Accepted),
                MemoryEntity::decision("adr-2", "Use Redis", DecisionStatus::Proposed),
            ])
            .with_relationships(vec![MemoryRelationship::new(
                "adr-2",
                "adr-1",
                RelationshipType::DependsOn,
            )
            .with_id("r1")])
    }

    #[tokio::test]
    async fn test_redb_storage() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();

        assert!(storage.load_graph().await.unwrap().is_none());
        assert!(storage.last_saved_at().unwrap().is_none());

        storage.save_graph(&graph()).await.unwrap();
        let loaded = storage.load_graph().await.unwrap().unwrap();
        assert_eq!(loaded.entities.len(), 2);
        assert_eq!(loaded.relationships.len(), 1);
        assert_eq!(loaded.entities[0].id, EntityId::from("adr-1"));
        assert!(storage.last_saved_at().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_save_replaces_previous_graph() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();
        storage.save_graph(&graph()).await.unwrap();

        let mut smaller = graph();
        smaller.entities.truncate(1);
        smaller.relationships.clear();
        storage.save_graph(&smaller).await.unwrap();

        let loaded = storage.load_graph().await.unwrap().unwrap();
        assert_eq!(loaded.entities.len(), 1);
        assert!(loaded.relationships.is_empty());
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");
        let original = graph();
        {
            let storage = RedbStorage::open(&path).unwrap();
            storage.save_graph(&original).await.unwrap();
        }

        let storage = RedbStorage::open(&path).unwrap();
        let loaded = storage.load_graph().await.unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_schema_version_is_stamped() {
        let dir = tempdir().unwrap();
        let storage = RedbStorage::open(dir.path().join("test.redb")).unwrap();
        assert_eq!(storage.schema_version().unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");
        {
            let storage = RedbStorage::open(&path).unwrap();
            storage.set_schema_version(CURRENT_VERSION + 1).unwrap();
        }

        match RedbStorage::open(&path) {
            Err(StorageError::UnsupportedSchema { found, supported }) => {
                assert_eq!(found, CURRENT_VERSION + 1);
                assert_eq!(supported, CURRENT_VERSION);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("newer schema should be refused"),
        }
    }
}
