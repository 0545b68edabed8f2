//! Memory manager facade
//!
//! One coarse `RwLock` guards both stores. Writers are serialised, readers
//! hold the read lock for the whole logical operation, so a traversal can
//! never observe an entity deleted but its relationships not yet orphaned.

use crate::entity::{EntityId, MemoryEntity, Transformation};
use crate::error::{Error, Operation, Result};
use crate::graph::{Graph, GraphPersistence};
use crate::intelligence::{IntelligenceConfig, IntelligenceEngine, MemoryIntelligence};
use crate::limits;
use crate::query::{QueryEngine, QueryFilter, QueryResult};
use crate::relationship::{MemoryRelationship, RelationshipId};
use crate::snapshot::MemorySnapshot;
use crate::store::{GraphState, GraphStats, ImportReport, OptimizationReport};
use crate::traversal::{
    PathResult, RelatedEntities, TraversalEngine, TraversalQuery, DEFAULT_TRAVERSAL_DEPTH,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};

/// Manager configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Save through the persistence collaborator after every write
    pub auto_save: bool,

    /// Number of snapshots retained; the oldest is evicted first
    pub max_snapshots: usize,

    pub intelligence: IntelligenceConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            auto_save: true,
            max_snapshots: 10,
            intelligence: IntelligenceConfig::default(),
        }
    }
}

/// Entry point for every graph operation
pub struct MemoryManager {
    persistence: Arc<dyn GraphPersistence>,
    config: ManagerConfig,
    intelligence: IntelligenceEngine,
    state: RwLock<Option<GraphState>>,
    snapshots: Mutex<VecDeque<Arc<MemorySnapshot>>>,
}

impl MemoryManager {
    pub fn new(persistence: Arc<dyn GraphPersistence>, config: ManagerConfig) -> Self {
        Self {
            persistence,
            intelligence: IntelligenceEngine::new(config.intelligence.clone()),
            config,
            state: RwLock::new(None),
            snapshots: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Load persisted state; calling it again is a no-op
    pub async fn initialize(&self) -> Result<()> {
        let mut guard = self.state.write().await;
        if guard.is_some() {
            tracing::debug!("Memory manager already initialized");
            return Ok(());
        }

        let loaded = self
            .persistence
            .load_graph()
            .await
            .map_err(|source| Error::Persistence {
                operation: Operation::Initialize,
                source,
            })?;
        let state = match loaded {
            Some(graph) => GraphState::from_graph(graph)?,
            None => GraphState::new(),
        };

        tracing::info!(
            "Initialized memory manager with {} entities and {} relationships",
            state.entities().len(),
            state.relationships().len()
        );
        *guard = Some(state);
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.is_some()
    }

    /// Save the current state explicitly
    pub async fn persist(&self) -> Result<()> {
        let state = self.read(Operation::Persist).await?;
        self.save(Operation::Persist, &state).await?;
        tracing::info!("Persisted {} entities", state.entities().len());
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Entities
    // ─────────────────────────────────────────────────────────────────────────

    /// Create the entity, or replace it with the version bumped
    pub async fn upsert_entity(&self, entity: MemoryEntity) -> Result<MemoryEntity> {
        self.write(Operation::UpsertEntity, |state| state.upsert_entity(entity))
            .await
    }

    pub async fn get_entity(&self, id: &EntityId) -> Result<Option<MemoryEntity>> {
        let state = self.read(Operation::Read).await?;
        Ok(state.entities().get(id).cloned())
    }

    /// Delete an entity, orphaning its relationships; false if it did not exist
    pub async fn delete_entity(&self, id: &EntityId) -> Result<bool> {
        self.write(Operation::DeleteEntity, |state| {
            Ok(state.delete_entity(id).is_some())
        })
        .await
    }

    /// Update the access pattern of an entity
    pub async fn record_access(
        &self,
        id: &EntityId,
        context: Option<&str>,
    ) -> Result<Option<MemoryEntity>> {
        self.write(Operation::RecordAccess, |state| {
            Ok(state.record_access(id, context))
        })
        .await
    }

    /// Change log of an entity, oldest first
    pub async fn entity_history(&self, id: &EntityId) -> Result<Option<Vec<Transformation>>> {
        let state = self.read(Operation::Read).await?;
        Ok(state
            .entities()
            .get(id)
            .map(|entity| entity.history().cloned().collect()))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Relationships
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn upsert_relationship(
        &self,
        relationship: MemoryRelationship,
    ) -> Result<MemoryRelationship> {
        self.write(Operation::UpsertRelationship, |state| {
            state.upsert_relationship(relationship)
        })
        .await
    }

    pub async fn delete_relationship(&self, id: &RelationshipId) -> Result<bool> {
        self.write(Operation::DeleteRelationship, |state| {
            Ok(state.delete_relationship(id))
        })
        .await
    }

    pub async fn get_relationship(&self, id: &RelationshipId) -> Result<Option<MemoryRelationship>> {
        let state = self.read(Operation::Read).await?;
        Ok(state.relationships().get(id).cloned())
    }

    /// Every relationship touching an entity, orphaned ones included
    pub async fn relationships_for(&self, id: &EntityId) -> Result<Vec<MemoryRelationship>> {
        let state = self.read(Operation::Read).await?;
        Ok(state
            .relationships()
            .query_by_endpoint(id)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn list_relationships(
        &self,
        include_orphaned: bool,
    ) -> Result<Vec<MemoryRelationship>> {
        let state = self.read(Operation::Read).await?;
        let relationships = state.relationships();
        Ok(if include_orphaned {
            relationships.iter().cloned().collect()
        } else {
            relationships.iter_active().cloned().collect()
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Batch
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply a batch all-or-nothing
    pub async fn import_graph(&self, graph: Graph) -> Result<ImportReport> {
        let report = self
            .write(Operation::ImportGraph, |state| state.import(graph))
            .await?;
        tracing::info!(
            "Imported {} new and {} updated entities, {} new and {} updated relationships",
            report.entities_created,
            report.entities_updated,
            report.relationships_created,
            report.relationships_updated
        );
        Ok(report)
    }

    /// Copy out the whole graph
    pub async fn export_graph(&self) -> Result<Graph> {
        let state = self.read(Operation::Read).await?;
        Ok(state.to_graph())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn query_entities(&self, filter: &QueryFilter) -> Result<QueryResult> {
        filter
            .validate()
            .map_err(|e| e.into_error(Operation::QueryEntities, "query"))?;
        let state = self.read(Operation::QueryEntities).await?;
        Ok(QueryEngine::execute(&state, filter))
    }

    /// Breadth-first expansion from `root`, two hops unless told otherwise
    pub async fn find_related_entities(
        &self,
        root: &EntityId,
        max_depth: Option<u32>,
    ) -> Result<RelatedEntities> {
        let query = TraversalQuery::new(root.clone())
            .with_depth(max_depth.unwrap_or(DEFAULT_TRAVERSAL_DEPTH));
        self.traverse(&query).await
    }

    /// Expansion with relationship/entity type filters
    pub async fn traverse(&self, query: &TraversalQuery) -> Result<RelatedEntities> {
        limits::validate_traversal_depth(query.max_depth)
            .map_err(|e| e.into_error(Operation::FindRelated, query.root.as_str()))?;
        let state = self.read(Operation::FindRelated).await?;
        Ok(TraversalEngine::find_related(&state, query))
    }

    /// Shortest path between two entities, or the strongest one
    pub async fn find_path(
        &self,
        from: &EntityId,
        to: &EntityId,
        strongest: bool,
    ) -> Result<PathResult> {
        let mut query = TraversalQuery::new(from.clone())
            .find_path_to(to.clone())
            .with_depth(limits::MAX_TRAVERSAL_DEPTH);
        if strongest {
            query = query.strongest();
        }
        let state = self.read(Operation::FindPath).await?;
        TraversalEngine::find_path(&state, &query)
            .ok_or_else(|| Error::Internal("path query without target".to_string()))
    }

    pub async fn stats(&self) -> Result<GraphStats> {
        let state = self.read(Operation::Read).await?;
        Ok(state.stats())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Intelligence & snapshots
    // ─────────────────────────────────────────────────────────────────────────

    /// Recompute the intelligence view
    pub async fn analyze(&self) -> Result<MemoryIntelligence> {
        let state = self.read(Operation::Analyze).await?;
        Ok(self.intelligence.analyze(&state, Utc::now()))
    }

    /// Capture both stores and fresh intelligence under one read lock
    pub async fn create_snapshot(&self) -> Result<Arc<MemorySnapshot>> {
        let snapshot = {
            let state = self.read(Operation::CreateSnapshot).await?;
            let now = Utc::now();
            let intelligence = self.intelligence.analyze(&state, now);
            Arc::new(MemorySnapshot::capture(&state, intelligence, now))
        };

        let mut retained = self.snapshots.lock().await;
        retained.push_back(Arc::clone(&snapshot));
        while retained.len() > self.config.max_snapshots {
            retained.pop_front();
        }

        tracing::info!(
            "Created snapshot {} at revision {} ({} entities)",
            snapshot.id(),
            snapshot.version(),
            snapshot.metadata().total_entities
        );
        Ok(snapshot)
    }

    /// Retained snapshots, oldest first
    pub async fn snapshots(&self) -> Vec<Arc<MemorySnapshot>> {
        self.snapshots.lock().await.iter().cloned().collect()
    }

    /// Decay relevance and purge orphaned relationships
    pub async fn optimize(&self) -> Result<OptimizationReport> {
        let half_life = self.config.intelligence.relevance_half_life_days;
        let report = self
            .write(Operation::Optimize, |state| {
                Ok(state.optimize(Utc::now(), half_life))
            })
            .await?;
        tracing::info!(
            "Optimized graph: {} entities decayed, {} relationships purged",
            report.decayed_entities.len(),
            report.purged_relationships.len()
        );
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Locking helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn read(&self, operation: Operation) -> Result<RwLockReadGuard<'_, GraphState>> {
        let guard = self.state.read().await;
        RwLockReadGuard::try_map(guard, Option::as_ref)
            .map_err(|_| Error::NotInitialized { operation })
    }

    /// Run a mutation under the write lock, then save under a downgraded guard
    async fn write<T>(
        &self,
        operation: Operation,
        mutate: impl FnOnce(&mut GraphState) -> Result<T>,
    ) -> Result<T> {
        let mut guard = self.state.write().await;
        let state = guard.as_mut().ok_or(Error::NotInitialized { operation })?;
        let revision = state.revision();
        let value = mutate(&mut *state)?;
        let changed = state.revision() != revision;

        if self.config.auto_save && changed {
            let guard = guard.downgrade();
            if let Some(state) = guard.as_ref() {
                self.save(operation, state).await?;
            }
        }
        Ok(value)
    }

    async fn save(&self, operation: Operation, state: &GraphState) -> Result<()> {
        let graph = state.to_graph();
        self.persistence
            .save_graph(&graph)
            .await
            .map_err(|source| {
                tracing::warn!("Save after {} failed: {}", operation, source);
                Error::Persistence { operation, source }
            })
    }
}
