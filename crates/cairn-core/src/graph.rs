//! Graph payload and the persistence collaborator trait

use crate::entity::MemoryEntity;
use crate::error::PersistenceError;
use crate::relationship::MemoryRelationship;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Graph containing entities and their relationships
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub entities: Vec<MemoryEntity>,
    #[serde(default)]
    pub relationships: Vec<MemoryRelationship>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entities(mut self, entities: Vec<MemoryEntity>) -> Self {
        self.entities = entities;
        self
    }

    pub fn with_relationships(mut self, relationships: Vec<MemoryRelationship>) -> Self {
        self.relationships = relationships;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relationships.is_empty()
    }
}

/// Loads and saves raw graph state
///
/// The core is agnostic to the encoding. Errors are handed back to the
/// caller unchanged; the core never retries.
#[async_trait]
pub trait GraphPersistence: Send + Sync {
    /// Load the stored graph, or `None` if nothing was ever saved
    async fn load_graph(&self) -> std::result::Result<Option<Graph>, PersistenceError>;

    /// Replace the stored graph
    async fn save_graph(&self, graph: &Graph) -> std::result::Result<(), PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DecisionStatus, MemoryEntity};

    #[test]
    fn test_graph_builder() {
        let graph = Graph::new().with_entities(vec![]).with_relationships(vec![]);
        assert!(graph.is_empty());

        let graph = Graph::new().with_entities(vec![MemoryEntity::decision(
            "adr-1",
            "Use PostgreSQL",
            DecisionStatus::Accepted,
        )]);
        assert!(!graph.is_empty());
    }

    #[test]
    fn test_graph_json_shape() {
        let graph: Graph = serde_json::from_str(r#"{"entities": []}"#).unwrap();
        assert!(graph.relationships.is_empty());
    }
}
