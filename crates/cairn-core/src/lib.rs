//! Cairn Core - Versioned knowledge graph for project memory
//!
//! This crate provides the data model, the entity and relationship stores,
//! the query, traversal and intelligence engines, and the [`MemoryManager`]
//! facade that ties them to a persistence backend.

pub mod entity;
pub mod error;
pub mod graph;
pub mod intelligence;
pub mod limits;
pub mod manager;
pub mod query;
pub mod relationship;
pub mod snapshot;
pub mod store;
pub mod traversal;

pub use entity::{
    DecisionStatus, EntityContext, EntityId, EntityKind, EntityType, MemoryEntity, Origin,
    Priority, Transformation, TransformationKind,
};
pub use error::{Error, Operation, PersistenceError, Result};
pub use graph::{Graph, GraphPersistence};
pub use intelligence::{IntelligenceConfig, IntelligenceEngine, MemoryIntelligence};
pub use manager::{ManagerConfig, MemoryManager};
pub use query::{ContextFilter, QueryEngine, QueryFilter, QueryResult, SortBy};
pub use relationship::{MemoryRelationship, RelationshipId, RelationshipType};
pub use snapshot::{MemorySnapshot, SnapshotId};
pub use store::{GraphState, GraphStats, ImportReport, OptimizationReport};
pub use traversal::{GraphPath, PathResult, RelatedEntities, TraversalEngine, TraversalQuery};
