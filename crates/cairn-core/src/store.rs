//! Entity and relationship stores
//!
//! The entity store is an arena keyed by id; the relationship store holds
//! edges that refer to entities by id only, plus an endpoint index. Neither
//! store locks: [`GraphState`] bundles both and is guarded as a unit by the
//! manager.

use crate::entity::{
    EntityId, Evolution, MemoryEntity, Origin, Transformation, TransformationKind,
};
use crate::error::{Error, Operation, Result};
use crate::graph::Graph;
use crate::limits::{self, MAX_ACCESS_CONTEXTS};
use crate::relationship::{MemoryRelationship, RelationshipId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

// ─────────────────────────────────────────────────────────────────────────────
// Entity Store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: BTreeMap<EntityId, MemoryEntity>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn get(&self, id: &EntityId) -> Option<&MemoryEntity> {
        self.entities.get(id)
    }

    /// Entities in ascending id order
    pub fn iter(&self) -> impl Iterator<Item = &MemoryEntity> + '_ {
        self.entities.values()
    }

    /// Insert or update an entity, stamping version and timestamps
    pub fn upsert(&mut self, mut entity: MemoryEntity) -> Result<MemoryEntity> {
        if let Err(e) = entity.validate() {
            tracing::warn!("Rejected entity '{}': {}", entity.id, e);
            return Err(e.into_error(Operation::UpsertEntity, entity.id.as_str()));
        }

        let now = Utc::now();
        match self.entities.get(&entity.id) {
            Some(existing) => {
                let changed = existing.changed_fields(&entity);
                entity.version = existing.version + 1;
                entity.created = existing.created;
                entity.last_modified = now.max(existing.last_modified);
                entity.access_pattern = existing.access_pattern.clone();
                entity.evolution = existing.evolution.clone();
                let description = if changed.is_empty() {
                    "re-asserted without content changes".to_string()
                } else {
                    format!("updated {}", changed.join(", "))
                };
                entity.evolution.append(Transformation {
                    timestamp: entity.last_modified,
                    version: entity.version,
                    kind: TransformationKind::Updated,
                    description,
                    changed_fields: changed,
                });
            }
            None => {
                entity.version = 1;
                entity.created = now;
                entity.last_modified = now;
                let origin = entity.evolution.origin;
                entity.evolution = Evolution::new(origin);
                let verb = match origin {
                    Origin::Imported => "imported",
                    _ => "created",
                };
                entity.evolution.append(Transformation {
                    timestamp: now,
                    version: 1,
                    kind: TransformationKind::Created,
                    description: format!("{} as {}", verb, entity.entity_type()),
                    changed_fields: Vec::new(),
                });
            }
        }

        tracing::debug!("Upserted entity '{}' at version {}", entity.id, entity.version);
        self.entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    /// Record an access through the write path
    pub fn record_access(&mut self, id: &EntityId, context: Option<&str>) -> Option<MemoryEntity> {
        let entity = self.entities.get_mut(id)?;
        let now = Utc::now().max(entity.last_modified);

        entity.version += 1;
        entity.last_modified = now;
        entity.access_pattern.last_accessed = now;
        entity.access_pattern.access_count += 1;
        if let Some(context) = context {
            entity.access_pattern.access_context.push(context.to_string());
            let overflow = entity
                .access_pattern
                .access_context
                .len()
                .saturating_sub(MAX_ACCESS_CONTEXTS);
            entity.access_pattern.access_context.drain(..overflow);
        }
        entity.evolution.append(Transformation {
            timestamp: now,
            version: entity.version,
            kind: TransformationKind::Accessed,
            description: format!("accessed ({} total)", entity.access_pattern.access_count),
            changed_fields: vec!["access_pattern".to_string()],
        });
        Some(entity.clone())
    }

    /// Apply relevance decay to every entity; returns ids that changed
    pub fn apply_decay(&mut self, now: DateTime<Utc>, half_life_days: f64) -> Vec<EntityId> {
        let mut changed = Vec::new();
        for entity in self.entities.values_mut() {
            let decayed = entity.decayed_relevance(now, half_life_days);
            if (entity.relevance - decayed).abs() < 1e-6 {
                continue;
            }
            let previous = entity.relevance;
            entity.relevance = decayed;
            entity.version += 1;
            entity.last_modified = now.max(entity.last_modified);
            entity.evolution.append(Transformation {
                timestamp: entity.last_modified,
                version: entity.version,
                kind: TransformationKind::Decayed,
                description: format!("relevance decayed from {:.3} to {:.3}", previous, decayed),
                changed_fields: vec!["relevance".to_string()],
            });
            changed.push(entity.id.clone());
        }
        changed
    }

    pub fn delete(&mut self, id: &EntityId) -> Option<MemoryEntity> {
        self.entities.remove(id)
    }

    /// Insert a persisted entity as-is (load path, no version bump)
    fn restore(&mut self, entity: MemoryEntity) -> Result<()> {
        entity
            .validate()
            .map_err(|e| e.into_error(Operation::Initialize, entity.id.as_str()))?;
        self.entities.insert(entity.id.clone(), entity);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Relationship Store
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct RelationshipStore {
    relationships: BTreeMap<RelationshipId, MemoryRelationship>,
    by_endpoint: HashMap<EntityId, BTreeSet<RelationshipId>>,
}

impl RelationshipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn get(&self, id: &RelationshipId) -> Option<&MemoryRelationship> {
        self.relationships.get(id)
    }

    /// All relationships in ascending id order, orphaned included
    pub fn iter(&self) -> impl Iterator<Item = &MemoryRelationship> + '_ {
        self.relationships.values()
    }

    /// Relationships whose endpoints both exist
    pub fn iter_active(&self) -> impl Iterator<Item = &MemoryRelationship> + '_ {
        self.relationships.values().filter(|r| !r.orphaned)
    }

    pub fn orphaned_count(&self) -> usize {
        self.relationships.values().filter(|r| r.orphaned).count()
    }

    /// Every relationship where `id` is source or target, in id order
    pub fn query_by_endpoint(&self, id: &EntityId) -> Vec<&MemoryRelationship> {
        self.by_endpoint
            .get(id)
            .map(|ids| ids.iter().filter_map(|rid| self.relationships.get(rid)).collect())
            .unwrap_or_default()
    }

    /// Non-orphaned relationships touching `id`, in id order
    pub fn active_for(&self, id: &EntityId) -> Vec<&MemoryRelationship> {
        self.query_by_endpoint(id)
            .into_iter()
            .filter(|r| !r.orphaned)
            .collect()
    }

    /// Insert or update a relationship after checking referential integrity
    pub fn upsert(
        &mut self,
        mut relationship: MemoryRelationship,
        entities: &EntityStore,
    ) -> Result<MemoryRelationship> {
        Self::check(&relationship, entities)?;

        if !self.relationships.contains_key(&relationship.id) {
            if let Some(existing_id) = self.find_same_edge(&relationship) {
                tracing::debug!(
                    "Relationship '{}' matches existing '{}', updating in place",
                    relationship.id,
                    existing_id
                );
                relationship.id = existing_id;
            }
        }

        let now = Utc::now();
        match self.relationships.get(&relationship.id) {
            Some(existing) => {
                relationship.version = existing.version + 1;
                relationship.created = existing.created;
                relationship.last_validated = now.max(existing.last_validated);
                let (old_source, old_target) =
                    (existing.source_id.clone(), existing.target_id.clone());
                self.unindex(&relationship.id, &old_source, &old_target);
            }
            None => {
                relationship.version = 1;
                relationship.created = now;
                relationship.last_validated = now;
            }
        }
        relationship.orphaned = false;

        self.index(&relationship);
        tracing::debug!(
            "Upserted relationship '{}' ({} {} {}) at version {}",
            relationship.id,
            relationship.source_id,
            relationship.relationship_type,
            relationship.target_id,
            relationship.version
        );
        self.relationships
            .insert(relationship.id.clone(), relationship.clone());
        Ok(relationship)
    }

    pub fn delete(&mut self, id: &RelationshipId) -> Option<MemoryRelationship> {
        let removed = self.relationships.remove(id)?;
        self.unindex(id, &removed.source_id, &removed.target_id);
        Some(removed)
    }

    /// Detach every relationship touching a deleted entity
    pub fn mark_orphaned(&mut self, entity_id: &EntityId) -> Vec<RelationshipId> {
        let ids: Vec<RelationshipId> = self
            .by_endpoint
            .get(entity_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        let mut marked = Vec::new();
        for id in ids {
            if let Some(rel) = self.relationships.get_mut(&id) {
                if !rel.orphaned {
                    rel.orphaned = true;
                    rel.version += 1;
                    marked.push(id);
                }
            }
        }
        marked
    }

    /// Drop all orphaned relationships
    pub fn purge_orphaned(&mut self) -> Vec<RelationshipId> {
        let orphaned: Vec<RelationshipId> = self
            .relationships
            .values()
            .filter(|r| r.orphaned)
            .map(|r| r.id.clone())
            .collect();
        for id in &orphaned {
            self.delete(id);
        }
        orphaned
    }

    fn check(relationship: &MemoryRelationship, entities: &EntityStore) -> Result<()> {
        let operation = Operation::UpsertRelationship;
        relationship
            .validate()
            .map_err(|e| e.into_error(operation, relationship.id.as_str()))?;

        if relationship.is_self_loop() && !relationship.relationship_type.allows_self_loop() {
            tracing::warn!("Rejected self-loop relationship '{}'", relationship.id);
            return Err(Error::SelfLoop {
                operation,
                relationship_id: relationship.id.to_string(),
                entity_id: relationship.source_id.to_string(),
                relationship_type: relationship.relationship_type.to_string(),
            });
        }

        for endpoint in [&relationship.source_id, &relationship.target_id] {
            if !entities.contains(endpoint) {
                tracing::warn!(
                    "Rejected relationship '{}': missing entity '{}'",
                    relationship.id,
                    endpoint
                );
                return Err(Error::DanglingReference {
                    operation,
                    relationship_id: relationship.id.to_string(),
                    missing_id: endpoint.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Id of a stored edge with the same source, target and type
    fn find_same_edge(&self, relationship: &MemoryRelationship) -> Option<RelationshipId> {
        self.by_endpoint
            .get(&relationship.source_id)?
            .iter()
            .filter_map(|id| self.relationships.get(id))
            .find(|r| {
                r.source_id == relationship.source_id
                    && r.target_id == relationship.target_id
                    && r.relationship_type == relationship.relationship_type
            })
            .map(|r| r.id.clone())
    }

    fn index(&mut self, relationship: &MemoryRelationship) {
        for endpoint in [&relationship.source_id, &relationship.target_id] {
            self.by_endpoint
                .entry(endpoint.clone())
                .or_default()
                .insert(relationship.id.clone());
        }
    }

    fn unindex(&mut self, id: &RelationshipId, source: &EntityId, target: &EntityId) {
        for endpoint in [source, target] {
            if let Some(ids) = self.by_endpoint.get_mut(endpoint) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_endpoint.remove(endpoint);
                }
            }
        }
    }

    /// Insert a persisted relationship (load path); dangling edges come back orphaned
    fn restore(&mut self, mut relationship: MemoryRelationship, entities: &EntityStore) -> Result<()> {
        relationship
            .validate()
            .map_err(|e| e.into_error(Operation::Initialize, relationship.id.as_str()))?;
        if !entities.contains(&relationship.source_id) || !entities.contains(&relationship.target_id) {
            if !relationship.orphaned {
                tracing::warn!(
                    "Loaded relationship '{}' references a missing entity, marking orphaned",
                    relationship.id
                );
            }
            relationship.orphaned = true;
        }
        self.index(&relationship);
        self.relationships.insert(relationship.id.clone(), relationship);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph State
// ─────────────────────────────────────────────────────────────────────────────

/// Summary of a batch import
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportReport {
    pub entities_created: usize,
    pub entities_updated: usize,
    pub relationships_created: usize,
    pub relationships_updated: usize,
}

/// Summary of an optimisation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub decayed_entities: Vec<EntityId>,
    pub purged_relationships: Vec<RelationshipId>,
    pub optimized_at: DateTime<Utc>,
}

/// Counters over the current state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    pub total_entities: usize,
    pub total_relationships: usize,
    pub orphaned_relationships: usize,
    pub average_confidence: f64,
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_optimization: Option<DateTime<Utc>>,
}

/// Both stores plus a store-wide mutation counter
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    entities: EntityStore,
    relationships: RelationshipStore,
    revision: u64,
    last_optimization: Option<DateTime<Utc>>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild state from persisted data without bumping versions
    pub fn from_graph(graph: Graph) -> Result<Self> {
        let mut state = Self::new();
        for entity in graph.entities {
            state.entities.restore(entity)?;
        }
        for relationship in graph.relationships {
            state.relationships.restore(relationship, &state.entities)?;
        }
        Ok(state)
    }

    /// Copy out the persisted form
    pub fn to_graph(&self) -> Graph {
        Graph {
            entities: self.entities.iter().cloned().collect(),
            relationships: self.relationships.iter().cloned().collect(),
        }
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn relationships(&self) -> &RelationshipStore {
        &self.relationships
    }

    /// Incremented on every successful write
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_optimization(&self) -> Option<DateTime<Utc>> {
        self.last_optimization
    }

    pub fn average_confidence(&self) -> f64 {
        if self.entities.is_empty() {
            return 0.0;
        }
        self.entities.iter().map(|e| e.confidence).sum::<f64>() / self.entities.len() as f64
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            total_entities: self.entities.len(),
            total_relationships: self.relationships.len(),
            orphaned_relationships: self.relationships.orphaned_count(),
            average_confidence: self.average_confidence(),
            revision: self.revision,
            last_optimization: self.last_optimization,
        }
    }

    pub fn upsert_entity(&mut self, entity: MemoryEntity) -> Result<MemoryEntity> {
        let stored = self.entities.upsert(entity)?;
        self.revision += 1;
        Ok(stored)
    }

    pub fn record_access(&mut self, id: &EntityId, context: Option<&str>) -> Option<MemoryEntity> {
        let entity = self.entities.record_access(id, context)?;
        self.revision += 1;
        Some(entity)
    }

    /// Delete an entity and orphan-mark its relationships
    pub fn delete_entity(&mut self, id: &EntityId) -> Option<Vec<RelationshipId>> {
        self.entities.delete(id)?;
        let orphaned = self.relationships.mark_orphaned(id);
        self.revision += 1;
        tracing::debug!(
            "Deleted entity '{}', orphaned {} relationships",
            id,
            orphaned.len()
        );
        Some(orphaned)
    }

    pub fn upsert_relationship(
        &mut self,
        relationship: MemoryRelationship,
    ) -> Result<MemoryRelationship> {
        let stored = self.relationships.upsert(relationship, &self.entities)?;
        self.revision += 1;
        Ok(stored)
    }

    pub fn delete_relationship(&mut self, id: &RelationshipId) -> bool {
        let removed = self.relationships.delete(id).is_some();
        if removed {
            self.revision += 1;
        }
        removed
    }

    /// Apply a batch all-or-nothing: entities first, then relationships
    pub fn import(&mut self, graph: Graph) -> Result<ImportReport> {
        let operation = Operation::ImportGraph;
        limits::validate_batch("entities", graph.entities.len())
            .map_err(|e| e.into_error(operation, "batch"))?;
        limits::validate_batch("relationships", graph.relationships.len())
            .map_err(|e| e.into_error(operation, "batch"))?;

        let mut staged = self.clone();
        let mut report = ImportReport::default();
        for mut entity in graph.entities {
            if !staged.entities.contains(&entity.id) {
                entity.evolution.origin = Origin::Imported;
            }
            if staged.entities.upsert(entity)?.version == 1 {
                report.entities_created += 1;
            } else {
                report.entities_updated += 1;
            }
            staged.revision += 1;
        }
        for relationship in graph.relationships {
            if staged.relationships.upsert(relationship, &staged.entities)?.version == 1 {
                report.relationships_created += 1;
            } else {
                report.relationships_updated += 1;
            }
            staged.revision += 1;
        }

        *self = staged;
        Ok(report)
    }

    /// Decay relevance and purge orphaned relationships
    pub fn optimize(&mut self, now: DateTime<Utc>, half_life_days: f64) -> OptimizationReport {
        let decayed_entities = self.entities.apply_decay(now, half_life_days);
        let purged_relationships = self.relationships.purge_orphaned();
        self.last_optimization = Some(now);
        self.revision += 1;
        OptimizationReport {
            decayed_entities,
            purged_relationships,
            optimized_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DecisionStatus, EntityKind, EntityType};
    use crate::relationship::RelationshipType;
    use chrono::Duration;

    fn decision(id: &str) -> MemoryEntity {
        MemoryEntity::decision(id, format!("Decision {id}"), DecisionStatus::Accepted)
    }

    fn edge(id: &str, from: &str, to: &str) -> MemoryRelationship {
        MemoryRelationship::new(from, to, RelationshipType::RelatesTo).with_id(id)
    }

    #[test]
    fn test_upsert_assigns_versions() {
        let mut store = EntityStore::new();
        let first = store.upsert(decision("adr-1")).unwrap();
        assert_eq!(first.version, 1);

        let second = store.upsert(decision("adr-1")).unwrap();
        assert_eq!(second.version, 2);
        assert_eq!(second.created, first.created);
        assert!(second.last_modified >= first.last_modified);

        let third = store.upsert(decision("adr-1")).unwrap();
        assert_eq!(third.version, 3);
        assert_eq!(store.get(&EntityId::from("adr-1")).unwrap().version, 3);
    }

    #[test]
    fn test_upsert_appends_to_history() {
        let mut store = EntityStore::new();
        store.upsert(decision("adr-1")).unwrap();
        let updated = store
            .upsert(decision("adr-1").with_tag("database"))
            .unwrap();

        let history: Vec<_> = updated.history().collect();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, TransformationKind::Created);
        assert_eq!(history[1].kind, TransformationKind::Updated);
        assert_eq!(history[1].changed_fields, vec!["tags"]);
        assert_eq!(history[1].version, 2);
    }

    #[test]
    fn test_new_entity_starts_a_fresh_log() {
        let mut seeded = decision("adr-1").with_origin(Origin::Migrated);
        seeded.evolution.append(Transformation {
            timestamp: Utc::now(),
            version: 7,
            kind: TransformationKind::Decayed,
            description: "carried over".to_string(),
            changed_fields: Vec::new(),
        });

        let mut store = EntityStore::new();
        let stored = store.upsert(seeded).unwrap();
        let history: Vec<_> = stored.history().collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, TransformationKind::Created);
        assert_eq!(history[0].version, 1);
        assert_eq!(stored.evolution.origin, Origin::Migrated);
    }

    #[test]
    fn test_upsert_rejects_invalid_without_writing() {
        let mut store = EntityStore::new();
        let err = store
            .upsert(decision("adr-1").with_confidence(1.7))
            .unwrap_err();
        match err {
            Error::Validation { field, id, .. } => {
                assert_eq!(field, "confidence");
                assert_eq!(id, "adr-1");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn test_record_access_bumps_version() {
        let mut store = EntityStore::new();
        store.upsert(decision("adr-1")).unwrap();
        let accessed = store
            .record_access(&EntityId::from("adr-1"), Some("review"))
            .unwrap();
        assert_eq!(accessed.version, 2);
        assert_eq!(accessed.access_pattern.access_count, 1);
        assert_eq!(accessed.access_pattern.access_context, vec!["review"]);

        assert!(store.record_access(&EntityId::from("nope"), None).is_none());
    }

    #[test]
    fn test_access_context_is_bounded() {
        let mut store = EntityStore::new();
        store.upsert(decision("adr-1")).unwrap();
        let id = EntityId::from("adr-1");
        for i in 0..(MAX_ACCESS_CONTEXTS + 5) {
            store.record_access(&id, Some(&format!("ctx-{i}")));
        }
        let entity = store.get(&id).unwrap();
        assert_eq!(entity.access_pattern.access_context.len(), MAX_ACCESS_CONTEXTS);
        assert_eq!(entity.access_pattern.access_context[0], "ctx-5");
    }

    #[test]
    fn test_relationship_requires_endpoints() {
        let mut entities = EntityStore::new();
        entities.upsert(decision("adr-1")).unwrap();
        let mut relationships = RelationshipStore::new();

        let err = relationships
            .upsert(edge("r1", "adr-1", "adr-2"), &entities)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DanglingReference { ref missing_id, .. } if missing_id == "adr-2"
        ));
        assert!(relationships.is_empty());
        assert!(relationships.query_by_endpoint(&EntityId::from("adr-1")).is_empty());
    }

    #[test]
    fn test_self_loop_rejected_unless_allowed() {
        let mut entities = EntityStore::new();
        entities.upsert(decision("adr-1")).unwrap();
        let mut relationships = RelationshipStore::new();

        let err = relationships
            .upsert(edge("r1", "adr-1", "adr-1"), &entities)
            .unwrap_err();
        assert!(matches!(err, Error::SelfLoop { .. }));

        let refine = MemoryRelationship::new("adr-1", "adr-1", RelationshipType::Refines)
            .with_id("r2");
        assert!(relationships.upsert(refine, &entities).is_ok());
    }

    #[test]
    fn test_query_by_endpoint_both_directions() {
        let mut entities = EntityStore::new();
        for id in ["a", "b", "c"] {
            entities.upsert(decision(id)).unwrap();
        }
        let mut relationships = RelationshipStore::new();
        relationships.upsert(edge("r2", "b", "c"), &entities).unwrap();
        relationships.upsert(edge("r1", "a", "b"), &entities).unwrap();

        let ids: Vec<_> = relationships
            .query_by_endpoint(&EntityId::from("b"))
            .iter()
            .map(|r| r.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["r1", "r2"]);
    }

    #[test]
    fn test_relationship_upsert_reindexes_endpoints() {
        let mut entities = EntityStore::new();
        for id in ["a", "b", "c"] {
            entities.upsert(decision(id)).unwrap();
        }
        let mut relationships = RelationshipStore::new();
        relationships.upsert(edge("r1", "a", "b"), &entities).unwrap();
        let moved = relationships.upsert(edge("r1", "a", "c"), &entities).unwrap();

        assert_eq!(moved.version, 2);
        assert!(relationships.query_by_endpoint(&EntityId::from("b")).is_empty());
        assert_eq!(relationships.query_by_endpoint(&EntityId::from("c")).len(), 1);
    }

    #[test]
    fn test_delete_entity_orphans_relationships() {
        let mut state = GraphState::new();
        state.upsert_entity(decision("a")).unwrap();
        state.upsert_entity(decision("b")).unwrap();
        state.upsert_relationship(edge("r1", "a", "b")).unwrap();

        let orphaned = state.delete_entity(&EntityId::from("b")).unwrap();
        assert_eq!(orphaned, vec![RelationshipId::from("r1")]);

        let rel = state.relationships().get(&RelationshipId::from("r1")).unwrap();
        assert!(rel.orphaned);
        assert_eq!(rel.version, 2);
        assert!(state.relationships().active_for(&EntityId::from("a")).is_empty());
        assert_eq!(state.relationships().query_by_endpoint(&EntityId::from("a")).len(), 1);

        assert!(state.delete_entity(&EntityId::from("b")).is_none());
    }

    #[test]
    fn test_reupsert_clears_orphan_flag() {
        let mut state = GraphState::new();
        state.upsert_entity(decision("a")).unwrap();
        state.upsert_entity(decision("b")).unwrap();
        state.upsert_relationship(edge("r1", "a", "b")).unwrap();
        state.delete_entity(&EntityId::from("b"));
        state.upsert_entity(decision("b")).unwrap();

        let rel = state.upsert_relationship(edge("r1", "a", "b")).unwrap();
        assert!(!rel.orphaned);
        assert_eq!(rel.version, 3);
    }

    #[test]
    fn test_same_triple_updates_existing_edge() {
        let mut entities = EntityStore::new();
        entities.upsert(decision("a")).unwrap();
        entities.upsert(decision("b")).unwrap();
        let mut relationships = RelationshipStore::new();

        let first = relationships
            .upsert(
                MemoryRelationship::new("a", "b", RelationshipType::RelatesTo),
                &entities,
            )
            .unwrap();
        let second = relationships
            .upsert(
                MemoryRelationship::new("a", "b", RelationshipType::RelatesTo).with_strength(0.9),
                &entities,
            )
            .unwrap();

        assert_eq!(relationships.len(), 1);
        assert_eq!(second.id, first.id);
        assert_eq!(second.version, 2);
        assert_eq!(second.created, first.created);
        assert_eq!(relationships.get(&first.id).unwrap().strength, 0.9);
        assert_eq!(relationships.query_by_endpoint(&EntityId::from("b")).len(), 1);

        relationships
            .upsert(
                MemoryRelationship::new("a", "b", RelationshipType::DependsOn),
                &entities,
            )
            .unwrap();
        relationships
            .upsert(
                MemoryRelationship::new("b", "a", RelationshipType::RelatesTo),
                &entities,
            )
            .unwrap();
        assert_eq!(relationships.len(), 3);
    }

    #[test]
    fn test_import_marks_new_entities_imported() {
        let mut state = GraphState::new();
        state.upsert_entity(decision("existing")).unwrap();

        let graph = Graph {
            entities: vec![decision("existing"), decision("fresh")],
            ..Graph::default()
        };
        state.import(graph).unwrap();

        let fresh = state.entities.get(&EntityId::from("fresh")).unwrap();
        assert_eq!(fresh.evolution.origin, Origin::Imported);
        assert_eq!(fresh.history().count(), 1);
        assert!(fresh.history().all(|t| t.description.starts_with("imported")));

        let existing = state.entities.get(&EntityId::from("existing")).unwrap();
        assert_eq!(existing.evolution.origin, Origin::Created);
        assert_eq!(existing.version, 2);
    }

    #[test]
    fn test_import_is_all_or_nothing() {
        let mut state = GraphState::new();
        state.upsert_entity(decision("a")).unwrap();
        let revision = state.revision();

        let batch = Graph::new()
            .with_entities(vec![decision("b"), decision("c")])
            .with_relationships(vec![edge("r1", "b", "c"), edge("r2", "c", "missing")]);
        assert!(state.import(batch).is_err());
        assert_eq!(state.entities().len(), 1);
        assert!(state.relationships().is_empty());
        assert_eq!(state.revision(), revision);

        let batch = Graph::new()
            .with_entities(vec![decision("a"), decision("b")])
            .with_relationships(vec![edge("r1", "a", "b")]);
        let report = state.import(batch).unwrap();
        assert_eq!(report.entities_created, 1);
        assert_eq!(report.entities_updated, 1);
        assert_eq!(report.relationships_created, 1);
    }

    #[test]
    fn test_from_graph_keeps_versions_and_orphans_dangling() {
        let mut state = GraphState::new();
        state.upsert_entity(decision("a")).unwrap();
        state.upsert_entity(decision("a")).unwrap();
        state.upsert_entity(decision("b")).unwrap();
        state.upsert_relationship(edge("r1", "a", "b")).unwrap();

        let mut graph = state.to_graph();
        graph.entities.retain(|e| e.id.as_str() != "b");

        let restored = GraphState::from_graph(graph).unwrap();
        assert_eq!(restored.entities().get(&EntityId::from("a")).unwrap().version, 2);
        assert!(restored.relationships().get(&RelationshipId::from("r1")).unwrap().orphaned);
    }

    #[test]
    fn test_optimize_decays_and_purges() {
        let mut state = GraphState::new();
        let stale = MemoryEntity::new(
            "k-1",
            EntityKind::empty(EntityType::KnowledgeArtifact),
            "Runbook",
        )
        .with_relevance(0.8);
        state.upsert_entity(stale).unwrap();
        state.upsert_entity(decision("a")).unwrap();
        state.upsert_relationship(edge("r1", "a", "k-1")).unwrap();
        state.delete_entity(&EntityId::from("a"));

        let later = Utc::now() + Duration::days(90);
        let report = state.optimize(later, 90.0);
        assert!(report.decayed_entities.contains(&EntityId::from("k-1")));
        assert_eq!(report.purged_relationships, vec![RelationshipId::from("r1")]);
        assert!(state.relationships().is_empty());
        assert_eq!(state.last_optimization(), Some(later));

        let entity = state.entities().get(&EntityId::from("k-1")).unwrap();
        assert!((entity.relevance - 0.4).abs() < 0.01);

        // A second pass at the same instant does not decay again
        let report = state.optimize(later, 90.0);
        assert!(report.decayed_entities.is_empty());
    }
}
