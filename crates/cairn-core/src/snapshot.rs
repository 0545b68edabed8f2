//! Point-in-time captures of the graph

use crate::entity::MemoryEntity;
use crate::intelligence::MemoryIntelligence;
use crate::relationship::MemoryRelationship;
use crate::store::GraphState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub average_confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_optimization: Option<DateTime<Utc>>,
}

/// Frozen copy of both stores plus the intelligence computed over them
///
/// Fields are private; once built a snapshot can only be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    id: SnapshotId,
    timestamp: DateTime<Utc>,
    version: u64,
    entities: Vec<MemoryEntity>,
    relationships: Vec<MemoryRelationship>,
    intelligence: MemoryIntelligence,
    metadata: SnapshotMetadata,
}

impl MemorySnapshot {
    /// Copy the state as it is now; entities and relationships come out in id order
    pub fn capture(
        state: &GraphState,
        intelligence: MemoryIntelligence,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let graph = state.to_graph();
        Self {
            id: SnapshotId::generate(),
            timestamp,
            version: state.revision(),
            metadata: SnapshotMetadata {
                total_entities: graph.entities.len(),
                total_relationships: graph.relationships.len(),
                average_confidence: state.average_confidence(),
                last_optimization: state.last_optimization(),
            },
            entities: graph.entities,
            relationships: graph.relationships,
            intelligence,
        }
    }

    pub fn id(&self) -> &SnapshotId {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Store revision at capture time
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entities(&self) -> &[MemoryEntity] {
        &self.entities
    }

    pub fn relationships(&self) -> &[MemoryRelationship] {
        &self.relationships
    }

    pub fn intelligence(&self) -> &MemoryIntelligence {
        &self.intelligence
    }

    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::DecisionStatus;
    use crate::intelligence::IntelligenceEngine;
    use crate::relationship::RelationshipType;

    #[test]
    fn test_capture_copies_state() {
        let mut state = GraphState::new();
        state
            .upsert_entity(MemoryEntity::decision("b", "Second", DecisionStatus::Accepted))
            .unwrap();
        state
            .upsert_entity(
                MemoryEntity::decision("a", "First", DecisionStatus::Accepted).with_confidence(0.9),
            )
            .unwrap();
        state
            .upsert_relationship(
                MemoryRelationship::new("a", "b", RelationshipType::Supersedes).with_id("r1"),
            )
            .unwrap();

        let now = Utc::now();
        let intelligence = IntelligenceEngine::default().analyze(&state, now);
        let snapshot = MemorySnapshot::capture(&state, intelligence, now);

        assert_eq!(snapshot.version(), state.revision());
        let ids: Vec<&str> = snapshot.entities().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(snapshot.metadata().total_entities, 2);
        assert_eq!(snapshot.metadata().total_relationships, 1);
        assert!((snapshot.metadata().average_confidence - 0.7).abs() < 1e-9);

        // Later writes do not reach the captured copy
        state
            .upsert_entity(MemoryEntity::decision("c", "Third", DecisionStatus::Proposed))
            .unwrap();
        assert_eq!(snapshot.entities().len(), 2);
        assert!(snapshot.version() < state.revision());
    }

    #[test]
    fn test_snapshot_ids_are_unique() {
        assert_ne!(SnapshotId::generate(), SnapshotId::generate());
    }
}
