//! Manager over the redb backend, across process-like restarts

#![cfg(feature = "redb")]

use std::sync::Arc;

use cairn_core::{
    DecisionStatus, EntityId, Error, ManagerConfig, MemoryEntity, MemoryManager,
    MemoryRelationship, RelationshipType,
};
use cairn_storage::RedbStorage;
use tempfile::tempdir;

fn open_manager(path: &std::path::Path, config: ManagerConfig) -> MemoryManager {
    let storage = RedbStorage::open(path).unwrap();
    MemoryManager::new(Arc::new(storage), config)
}

#[tokio::test]
async fn test_writes_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cairn.redb");

    {
        let manager = open_manager(&path, ManagerConfig::default());
        manager.initialize().await.unwrap();
        manager
            .upsert_entity(MemoryEntity::decision("adr-1", "Use redb", DecisionStatus::Accepted))
            .await
            .unwrap();
        manager
            .upsert_entity(MemoryEntity::decision("adr-2", "Use JSON", DecisionStatus::Proposed))
            .await
            .unwrap();
        manager
            .upsert_relationship(
                MemoryRelationship::new("adr-2", "adr-1", RelationshipType::DependsOn)
                    .with_id("r1")
                    .with_strength(0.9),
            )
            .await
            .unwrap();
    }

    let manager = open_manager(&path, ManagerConfig::default());
    manager.initialize().await.unwrap();

    let entity = manager
        .get_entity(&EntityId::from("adr-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entity.title, "Use redb");
    assert_eq!(entity.version, 1);

    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.total_entities, 2);
    assert_eq!(stats.total_relationships, 1);
    // Revision counter restarts after a load
    assert_eq!(stats.revision, 0);

    let related = manager
        .find_related_entities(&EntityId::from("adr-1"), None)
        .await
        .unwrap();
    assert_eq!(related.entities.len(), 1);
    assert_eq!(related.entities[0].id.as_str(), "adr-2");
}

#[tokio::test]
async fn test_manual_persist_without_auto_save() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cairn.redb");
    let config = ManagerConfig {
        auto_save: false,
        ..Default::default()
    };

    {
        let manager = open_manager(&path, config.clone());
        manager.initialize().await.unwrap();
        manager
            .upsert_entity(MemoryEntity::decision("adr-1", "Draft", DecisionStatus::Proposed))
            .await
            .unwrap();
    }
    {
        let manager = open_manager(&path, config.clone());
        manager.initialize().await.unwrap();
        assert_eq!(manager.stats().await.unwrap().total_entities, 0);

        manager
            .upsert_entity(MemoryEntity::decision("adr-1", "Draft", DecisionStatus::Proposed))
            .await
            .unwrap();
        manager.persist().await.unwrap();
    }

    let manager = open_manager(&path, config);
    manager.initialize().await.unwrap();
    assert_eq!(manager.stats().await.unwrap().total_entities, 1);
}

#[tokio::test]
async fn test_rejected_write_is_not_persisted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cairn.redb");

    {
        let manager = open_manager(&path, ManagerConfig::default());
        manager.initialize().await.unwrap();
        let err = manager
            .upsert_relationship(MemoryRelationship::new(
                "a",
                "b",
                RelationshipType::RelatesTo,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DanglingReference { .. }));
    }

    let storage = RedbStorage::open(&path).unwrap();
    assert_eq!(storage.last_saved_at().unwrap(), None);
}
