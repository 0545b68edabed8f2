//! Derived analytics over the graph
//!
//! Everything here is a read-only view recomputed from a [`GraphState`]; no
//! result is ever written back into the stores.

use crate::entity::{DecisionStatus, EntityId, EntityType, MemoryEntity, Priority};
use crate::relationship::{MemoryRelationship, RelationshipId, RelationshipType};
use crate::store::GraphState;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const TOP_STACK_ITEMS: usize = 5;
const RECENT_ENTITIES: usize = 10;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Tuning knobs for the intelligence engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntelligenceConfig {
    /// Patterns seen fewer times than this are dropped
    pub min_pattern_frequency: usize,

    /// Minimum strength for a suggested relationship
    pub inference_threshold: f64,

    /// Relationships weaker than this are reported as weak connections
    pub weak_connection_threshold: f64,

    /// Days without access before a relevant entity counts as stale
    pub stale_after_days: i64,

    /// Relevance at or above which an entity is considered important
    pub high_relevance_threshold: f64,

    /// Unverified entities below this confidence are knowledge gaps
    pub low_confidence_threshold: f64,

    /// Cap on suggested relationships
    pub max_suggestions: usize,

    /// Half-life used by relevance decay during optimisation
    pub relevance_half_life_days: f64,
}

impl Default for IntelligenceConfig {
    fn default() -> Self {
        Self {
            min_pattern_frequency: 2,
            inference_threshold: 0.5,
            weak_connection_threshold: 0.3,
            stale_after_days: 30,
            high_relevance_threshold: 0.7,
            low_confidence_threshold: 0.5,
            max_suggestions: 20,
            relevance_half_life_days: 90.0,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextAwareness {
    /// Most common project phase
    pub current_phase: Option<String>,
    /// Most common business domain
    pub business_domain: Option<String>,
    /// Most common technologies, most frequent first
    pub technical_stack: Vec<String>,
    /// Most recently modified entities, newest first
    pub recent_entities: Vec<EntityId>,
    pub average_confidence: f64,
    pub average_relevance: f64,
    pub computed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Tags (or tag pairs) that recur across entities
    TagCluster,
    /// Recurring `source_type relationship_type target_type` shapes
    Structural,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredPattern {
    pub signature: String,
    pub kind: PatternKind,
    pub confidence: f64,
    pub frequency: usize,
    pub contexts: Vec<String>,
    pub applicability: f64,
    pub entity_ids: Vec<EntityId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternRecognition {
    pub discovered_patterns: Vec<DiscoveredPattern>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedRelationship {
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub relationship_type: RelationshipType,
    pub strength: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeakConnection {
    pub relationship_id: RelationshipId,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub strength: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Same concern, different outcomes, no supersedes link
    DivergentOutcome,
    /// Explicit `conflicts_with` relationship
    ExplicitConflict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionConflict {
    pub entity_ids: Vec<EntityId>,
    pub reason: ConflictReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relationship_id: Option<RelationshipId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipInference {
    pub suggested_relationships: Vec<SuggestedRelationship>,
    pub weak_connections: Vec<WeakConnection>,
    pub conflicts: Vec<DecisionConflict>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapKind {
    /// Entity without any active relationship
    Isolated,
    /// Accepted decision with no recorded alternatives
    MissingAlternatives,
    /// Unverified entity with low confidence
    Unverified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGap {
    pub entity_id: EntityId,
    pub kind: GapKind,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    ResolveConflict,
    ReviewStale,
    DocumentAlternatives,
    VerifyEntity,
    LinkEntity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: ActionKind,
    pub priority: Priority,
    pub score: f64,
    pub reasoning: String,
    pub entity_ids: Vec<EntityId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityKind {
    PruneWeakConnections,
    PurgeOrphaned,
    MergeDuplicates,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOpportunity {
    pub kind: OpportunityKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_ids: Vec<EntityId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationship_ids: Vec<RelationshipId>,
    /// Share of the graph affected, in [0, 1]
    pub estimated_impact: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveRecommendations {
    pub next_actions: Vec<Recommendation>,
    pub knowledge_gaps: Vec<KnowledgeGap>,
    pub optimization_opportunities: Vec<OptimizationOpportunity>,
}

/// Complete derived view of the graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryIntelligence {
    pub context_awareness: ContextAwareness,
    pub pattern_recognition: PatternRecognition,
    pub relationship_inference: RelationshipInference,
    pub adaptive_recommendations: AdaptiveRecommendations,
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// Undirected neighbour sets over active, non-self-loop relationships
type Adjacency<'a> = HashMap<&'a EntityId, BTreeSet<&'a EntityId>>;

pub struct IntelligenceEngine {
    config: IntelligenceConfig,
}

impl IntelligenceEngine {
    pub fn new(config: IntelligenceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IntelligenceConfig {
        &self.config
    }

    /// Compute the full intelligence view as of `now`
    pub fn analyze(&self, state: &GraphState, now: DateTime<Utc>) -> MemoryIntelligence {
        if state.entities().is_empty() {
            return MemoryIntelligence {
                context_awareness: ContextAwareness {
                    computed_at: Some(now),
                    ..Default::default()
                },
                ..Default::default()
            };
        }

        let adjacency = Self::adjacency(state);
        let context_awareness = self.context_awareness(state, now);
        let pattern_recognition = self.recognize_patterns(state);
        let relationship_inference = self.infer_relationships(state, &adjacency);
        let adaptive_recommendations =
            self.recommend(state, &adjacency, &relationship_inference, now);

        tracing::debug!(
            "Analyzed {} entities: {} patterns, {} suggestions, {} conflicts, {} actions",
            state.entities().len(),
            pattern_recognition.discovered_patterns.len(),
            relationship_inference.suggested_relationships.len(),
            relationship_inference.conflicts.len(),
            adaptive_recommendations.next_actions.len()
        );

        MemoryIntelligence {
            context_awareness,
            pattern_recognition,
            relationship_inference,
            adaptive_recommendations,
        }
    }

    fn adjacency(state: &GraphState) -> Adjacency<'_> {
        let mut adjacency: Adjacency<'_> = HashMap::new();
        for rel in state.relationships().iter_active() {
            if rel.is_self_loop() {
                continue;
            }
            adjacency
                .entry(&rel.source_id)
                .or_default()
                .insert(&rel.target_id);
            adjacency
                .entry(&rel.target_id)
                .or_default()
                .insert(&rel.source_id);
        }
        adjacency
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Context
    // ─────────────────────────────────────────────────────────────────────────

    fn context_awareness(&self, state: &GraphState, now: DateTime<Utc>) -> ContextAwareness {
        let entities = state.entities();
        let mut phases: BTreeMap<&str, usize> = BTreeMap::new();
        let mut domains: BTreeMap<&str, usize> = BTreeMap::new();
        let mut stack: BTreeMap<String, usize> = BTreeMap::new();

        for entity in entities.iter() {
            if let Some(phase) = entity.context.project_phase.as_deref() {
                *phases.entry(phase).or_default() += 1;
            }
            if let Some(domain) = entity.context.business_domain.as_deref() {
                *domains.entry(domain).or_default() += 1;
            }
            for tech in &entity.context.technical_stack {
                *stack.entry(tech.to_lowercase()).or_default() += 1;
            }
        }

        let mut technical_stack: Vec<(String, usize)> = stack.into_iter().collect();
        technical_stack.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        technical_stack.truncate(TOP_STACK_ITEMS);

        let mut recent: Vec<&MemoryEntity> = entities.iter().collect();
        recent.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| a.id.cmp(&b.id))
        });

        let count = entities.len() as f64;
        ContextAwareness {
            current_phase: most_common(&phases),
            business_domain: most_common(&domains),
            technical_stack: technical_stack.into_iter().map(|(tech, _)| tech).collect(),
            recent_entities: recent
                .into_iter()
                .take(RECENT_ENTITIES)
                .map(|e| e.id.clone())
                .collect(),
            average_confidence: state.average_confidence(),
            average_relevance: entities.iter().map(|e| e.relevance).sum::<f64>() / count,
            computed_at: Some(now),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Patterns
    // ─────────────────────────────────────────────────────────────────────────

    fn recognize_patterns(&self, state: &GraphState) -> PatternRecognition {
        let entities = state.entities();
        let mut tag_groups: BTreeMap<String, BTreeSet<&EntityId>> = BTreeMap::new();

        for entity in entities.iter() {
            let tags: BTreeSet<String> = entity.tags.iter().map(|t| t.to_lowercase()).collect();
            let tags: Vec<&String> = tags.iter().collect();
            for (i, tag) in tags.iter().enumerate() {
                tag_groups
                    .entry(format!("tag:{tag}"))
                    .or_default()
                    .insert(&entity.id);
                for other in &tags[i + 1..] {
                    tag_groups
                        .entry(format!("tags:{tag}+{other}"))
                        .or_default()
                        .insert(&entity.id);
                }
            }
        }

        let mut structural_groups: BTreeMap<String, (usize, BTreeSet<&EntityId>)> = BTreeMap::new();
        let mut active_relationships = 0usize;
        for rel in state.relationships().iter_active() {
            let (Some(source), Some(target)) =
                (entities.get(&rel.source_id), entities.get(&rel.target_id))
            else {
                continue;
            };
            active_relationships += 1;
            let signature = format!(
                "{} {} {}",
                source.entity_type(),
                rel.relationship_type,
                target.entity_type()
            );
            let group = structural_groups.entry(signature).or_default();
            group.0 += 1;
            group.1.insert(&rel.source_id);
            group.1.insert(&rel.target_id);
        }

        let min = self.config.min_pattern_frequency.max(1);
        let mut patterns = Vec::new();

        for (signature, ids) in tag_groups {
            if ids.len() < min {
                continue;
            }
            patterns.push(self.pattern(
                state,
                signature,
                PatternKind::TagCluster,
                ids.len(),
                entities.len(),
                ids,
            ));
        }
        for (signature, (frequency, ids)) in structural_groups {
            if frequency < min {
                continue;
            }
            patterns.push(self.pattern(
                state,
                signature,
                PatternKind::Structural,
                frequency,
                active_relationships,
                ids,
            ));
        }

        patterns.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.signature.cmp(&b.signature))
        });
        PatternRecognition {
            discovered_patterns: patterns,
        }
    }

    fn pattern(
        &self,
        state: &GraphState,
        signature: String,
        kind: PatternKind,
        frequency: usize,
        population: usize,
        ids: BTreeSet<&EntityId>,
    ) -> DiscoveredPattern {
        let involved: Vec<&MemoryEntity> =
            ids.iter().filter_map(|id| state.entities().get(id)).collect();
        let contexts: BTreeSet<String> = involved
            .iter()
            .flat_map(|e| {
                e.context
                    .project_phase
                    .iter()
                    .chain(e.context.business_domain.iter())
                    .cloned()
            })
            .collect();
        let applicability = if involved.is_empty() {
            0.0
        } else {
            involved.iter().map(|e| e.relevance).sum::<f64>() / involved.len() as f64
        };

        DiscoveredPattern {
            signature,
            kind,
            confidence: ratio(frequency, population),
            frequency,
            contexts: contexts.into_iter().collect(),
            applicability: applicability.clamp(0.0, 1.0),
            entity_ids: ids.into_iter().cloned().collect(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inference
    // ─────────────────────────────────────────────────────────────────────────

    fn infer_relationships(
        &self,
        state: &GraphState,
        adjacency: &Adjacency<'_>,
    ) -> RelationshipInference {
        RelationshipInference {
            suggested_relationships: self.suggest_relationships(state, adjacency),
            weak_connections: self.weak_connections(state),
            conflicts: Self::detect_conflicts(state),
        }
    }

    fn suggest_relationships(
        &self,
        state: &GraphState,
        adjacency: &Adjacency<'_>,
    ) -> Vec<SuggestedRelationship> {
        let entities: Vec<&MemoryEntity> = state.entities().iter().collect();
        let tags: Vec<BTreeSet<String>> = entities.iter().map(|e| lowered(&e.tags)).collect();
        let stacks: Vec<BTreeSet<String>> = entities
            .iter()
            .map(|e| lowered(&e.context.technical_stack))
            .collect();
        let empty = BTreeSet::new();

        let mut suggestions = Vec::new();
        for i in 0..entities.len() {
            let a = entities[i];
            let a_neighbours = adjacency.get(&a.id).unwrap_or(&empty);
            for j in (i + 1)..entities.len() {
                let b = entities[j];
                if a_neighbours.contains(&b.id) {
                    continue;
                }
                let b_neighbours = adjacency.get(&b.id).unwrap_or(&empty);

                let tag_similarity = jaccard(&tags[i], &tags[j]);
                let stack_similarity = jaccard(&stacks[i], &stacks[j]);
                let common = a_neighbours.intersection(b_neighbours).count();
                let structural = (common as f64 / 2.0).min(1.0);
                let strength =
                    (0.6 * tag_similarity + 0.2 * stack_similarity + 0.2 * structural).clamp(0.0, 1.0);
                if strength < self.config.inference_threshold {
                    continue;
                }

                let (source, target, relationship_type) = suggested_direction(a, b);
                suggestions.push(SuggestedRelationship {
                    source_id: source.id.clone(),
                    target_id: target.id.clone(),
                    relationship_type,
                    strength,
                    reasoning: format!(
                        "tag overlap {:.2}, stack overlap {:.2}, {} shared neighbours",
                        tag_similarity, stack_similarity, common
                    ),
                });
            }
        }

        suggestions.sort_by(|a, b| {
            b.strength
                .total_cmp(&a.strength)
                .then_with(|| a.source_id.cmp(&b.source_id))
                .then_with(|| a.target_id.cmp(&b.target_id))
        });
        suggestions.truncate(self.config.max_suggestions);
        suggestions
    }

    fn weak_connections(&self, state: &GraphState) -> Vec<WeakConnection> {
        let threshold = self.config.weak_connection_threshold;
        state
            .relationships()
            .iter_active()
            .filter(|r| r.strength < threshold || r.confidence < threshold)
            .map(|r| WeakConnection {
                relationship_id: r.id.clone(),
                source_id: r.source_id.clone(),
                target_id: r.target_id.clone(),
                strength: r.strength,
                confidence: r.confidence,
            })
            .collect()
    }

    fn detect_conflicts(state: &GraphState) -> Vec<DecisionConflict> {
        let accepted: Vec<&MemoryEntity> = state
            .entities()
            .iter()
            .filter(|e| {
                e.kind
                    .as_decision()
                    .is_some_and(|d| d.status == DecisionStatus::Accepted)
            })
            .collect();
        let is_accepted = |id: &EntityId| accepted.iter().any(|e| &e.id == id);
        let active: Vec<&MemoryRelationship> = state.relationships().iter_active().collect();
        let linked_by = |a: &EntityId, b: &EntityId, kind: RelationshipType| {
            active
                .iter()
                .any(|r| r.relationship_type == kind && r.connects(a, b))
        };

        let mut conflicts: BTreeMap<(EntityId, EntityId), DecisionConflict> = BTreeMap::new();

        for rel in &active {
            if rel.relationship_type != RelationshipType::ConflictsWith
                || rel.is_self_loop()
                || !is_accepted(&rel.source_id)
                || !is_accepted(&rel.target_id)
            {
                continue;
            }
            let key = ordered_pair(&rel.source_id, &rel.target_id);
            conflicts.entry(key.clone()).or_insert(DecisionConflict {
                entity_ids: vec![key.0, key.1],
                reason: ConflictReason::ExplicitConflict,
                concern: None,
                relationship_id: Some(rel.id.clone()),
            });
        }

        for (i, a) in accepted.iter().enumerate() {
            let Some((a_concern, a_outcome)) = concern_and_outcome(a) else {
                continue;
            };
            for b in &accepted[i + 1..] {
                let Some((b_concern, b_outcome)) = concern_and_outcome(b) else {
                    continue;
                };
                if a_concern != b_concern
                    || a_outcome == b_outcome
                    || linked_by(&a.id, &b.id, RelationshipType::Supersedes)
                {
                    continue;
                }
                let key = ordered_pair(&a.id, &b.id);
                conflicts.entry(key.clone()).or_insert(DecisionConflict {
                    entity_ids: vec![key.0, key.1],
                    reason: ConflictReason::DivergentOutcome,
                    concern: a
                        .kind
                        .as_decision()
                        .and_then(|d| d.concern.as_ref())
                        .map(|c| c.trim().to_string()),
                    relationship_id: None,
                });
            }
        }

        conflicts.into_values().collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Recommendations
    // ─────────────────────────────────────────────────────────────────────────

    fn recommend(
        &self,
        state: &GraphState,
        adjacency: &Adjacency<'_>,
        inference: &RelationshipInference,
        now: DateTime<Utc>,
    ) -> AdaptiveRecommendations {
        let knowledge_gaps = self.knowledge_gaps(state, adjacency);
        let mut next_actions = Vec::new();

        for conflict in &inference.conflicts {
            let score = match conflict.reason {
                ConflictReason::ExplicitConflict => 0.95,
                ConflictReason::DivergentOutcome => 0.9,
            };
            let reasoning = match &conflict.concern {
                Some(concern) => format!(
                    "accepted decisions disagree on '{}' without a supersedes link",
                    concern
                ),
                None => "accepted decisions are marked as conflicting".to_string(),
            };
            next_actions.push(recommendation(
                ActionKind::ResolveConflict,
                score,
                reasoning,
                conflict.entity_ids.clone(),
            ));
        }

        let stale_after = Duration::days(self.config.stale_after_days.max(0));
        for entity in state.entities().iter() {
            if entity.relevance < self.config.high_relevance_threshold {
                continue;
            }
            let idle = now - entity.access_pattern.last_accessed;
            if idle <= stale_after {
                continue;
            }
            next_actions.push(recommendation(
                ActionKind::ReviewStale,
                0.5 + 0.3 * entity.relevance,
                format!(
                    "relevance {:.2} but not accessed for {} days",
                    entity.relevance,
                    idle.num_days()
                ),
                vec![entity.id.clone()],
            ));
        }

        for gap in &knowledge_gaps {
            let Some(entity) = state.entities().get(&gap.entity_id) else {
                continue;
            };
            let (action, score) = match gap.kind {
                GapKind::MissingAlternatives => {
                    (ActionKind::DocumentAlternatives, 0.5 + 0.3 * entity.relevance)
                }
                GapKind::Unverified => (ActionKind::VerifyEntity, 0.4 + 0.4 * (1.0 - entity.confidence)),
                GapKind::Isolated => (ActionKind::LinkEntity, 0.3 + 0.2 * entity.relevance),
            };
            next_actions.push(recommendation(
                action,
                score,
                gap.description.clone(),
                vec![gap.entity_id.clone()],
            ));
        }

        next_actions.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.action.cmp(&b.action))
                .then_with(|| a.entity_ids.cmp(&b.entity_ids))
        });

        AdaptiveRecommendations {
            next_actions,
            knowledge_gaps,
            optimization_opportunities: Self::optimization_opportunities(state, inference),
        }
    }

    fn knowledge_gaps(&self, state: &GraphState, adjacency: &Adjacency<'_>) -> Vec<KnowledgeGap> {
        let mut gaps = Vec::new();
        let connected = state.entities().len() > 1;

        for entity in state.entities().iter() {
            if connected && !adjacency.contains_key(&entity.id) {
                gaps.push(KnowledgeGap {
                    entity_id: entity.id.clone(),
                    kind: GapKind::Isolated,
                    description: format!("'{}' has no relationships", entity.title),
                });
            }
            if let Some(decision) = entity.kind.as_decision() {
                if decision.status == DecisionStatus::Accepted && decision.alternatives.is_empty() {
                    gaps.push(KnowledgeGap {
                        entity_id: entity.id.clone(),
                        kind: GapKind::MissingAlternatives,
                        description: format!(
                            "accepted decision '{}' records no alternatives",
                            entity.title
                        ),
                    });
                }
            }
            if !entity.validation.is_verified
                && entity.confidence < self.config.low_confidence_threshold
            {
                gaps.push(KnowledgeGap {
                    entity_id: entity.id.clone(),
                    kind: GapKind::Unverified,
                    description: format!(
                        "'{}' is unverified with confidence {:.2}",
                        entity.title, entity.confidence
                    ),
                });
            }
        }
        gaps
    }

    fn optimization_opportunities(
        state: &GraphState,
        inference: &RelationshipInference,
    ) -> Vec<OptimizationOpportunity> {
        let mut opportunities = Vec::new();
        let total_relationships = state.relationships().len();

        if !inference.weak_connections.is_empty() {
            opportunities.push(OptimizationOpportunity {
                kind: OpportunityKind::PruneWeakConnections,
                description: format!(
                    "{} relationships fall below the weak connection threshold",
                    inference.weak_connections.len()
                ),
                entity_ids: Vec::new(),
                relationship_ids: inference
                    .weak_connections
                    .iter()
                    .map(|w| w.relationship_id.clone())
                    .collect(),
                estimated_impact: ratio(inference.weak_connections.len(), total_relationships),
            });
        }

        let orphaned: Vec<RelationshipId> = state
            .relationships()
            .iter()
            .filter(|r| r.orphaned)
            .map(|r| r.id.clone())
            .collect();
        if !orphaned.is_empty() {
            opportunities.push(OptimizationOpportunity {
                kind: OpportunityKind::PurgeOrphaned,
                description: format!(
                    "{} relationships point at deleted entities",
                    orphaned.len()
                ),
                entity_ids: Vec::new(),
                estimated_impact: ratio(orphaned.len(), total_relationships),
                relationship_ids: orphaned,
            });
        }

        let mut by_title: BTreeMap<String, Vec<EntityId>> = BTreeMap::new();
        for entity in state.entities().iter() {
            by_title
                .entry(normalize_title(&entity.title))
                .or_default()
                .push(entity.id.clone());
        }
        for (title, ids) in by_title {
            if ids.len() < 2 {
                continue;
            }
            opportunities.push(OptimizationOpportunity {
                kind: OpportunityKind::MergeDuplicates,
                description: format!("{} entities share the title '{}'", ids.len(), title),
                estimated_impact: ratio(ids.len() - 1, state.entities().len()),
                entity_ids: ids,
                relationship_ids: Vec::new(),
            });
        }

        opportunities
    }
}

impl Default for IntelligenceEngine {
    fn default() -> Self {
        Self::new(IntelligenceConfig::default())
    }
}

fn most_common(counts: &BTreeMap<&str, usize>) -> Option<String> {
    // BTreeMap iterates ascending, so the first maximum wins ties
    let mut best: Option<(&str, usize)> = None;
    for (&value, &count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.to_string())
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    (part as f64 / whole as f64).clamp(0.0, 1.0)
}

fn lowered<'a>(values: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
    values.into_iter().map(|v| v.to_lowercase()).collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn ordered_pair(a: &EntityId, b: &EntityId) -> (EntityId, EntityId) {
    if a <= b {
        (a.clone(), b.clone())
    } else {
        (b.clone(), a.clone())
    }
}

fn concern_and_outcome(entity: &MemoryEntity) -> Option<(String, String)> {
    let decision = entity.kind.as_decision()?;
    let concern = decision.concern.as_deref()?.trim().to_lowercase();
    let outcome = decision.outcome.as_deref()?.trim().to_lowercase();
    if concern.is_empty() || outcome.is_empty() {
        return None;
    }
    Some((concern, outcome))
}

/// Components implement decisions; every other pair relates in id order
fn suggested_direction<'a>(
    a: &'a MemoryEntity,
    b: &'a MemoryEntity,
) -> (&'a MemoryEntity, &'a MemoryEntity, RelationshipType) {
    match (a.entity_type(), b.entity_type()) {
        (EntityType::CodeComponent, EntityType::ArchitecturalDecision) => {
            (a, b, RelationshipType::Implements)
        }
        (EntityType::ArchitecturalDecision, EntityType::CodeComponent) => {
            (b, a, RelationshipType::Implements)
        }
        _ => (a, b, RelationshipType::RelatesTo),
    }
}

fn normalize_title(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

fn priority_for(score: f64) -> Priority {
    match score {
        s if s >= 0.9 => Priority::Critical,
        s if s >= 0.7 => Priority::High,
        s if s >= 0.5 => Priority::Medium,
        _ => Priority::Low,
    }
}

fn recommendation(
    action: ActionKind,
    score: f64,
    reasoning: String,
    entity_ids: Vec<EntityId>,
) -> Recommendation {
    let score = score.clamp(0.0, 1.0);
    Recommendation {
        action,
        priority: priority_for(score),
        score,
        reasoning,
        entity_ids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Alternative, DecisionData, EntityContext, EntityKind};

    fn engine() -> IntelligenceEngine {
        IntelligenceEngine::default()
    }

    fn accepted(id: &str, concern: &str, outcome: &str) -> MemoryEntity {
        MemoryEntity::new(
            id,
            EntityKind::ArchitecturalDecision(DecisionData {
                status: DecisionStatus::Accepted,
                concern: Some(concern.to_string()),
                outcome: Some(outcome.to_string()),
                ..Default::default()
            }),
            format!("Decision {id}"),
        )
    }

    fn component(id: &str) -> MemoryEntity {
        MemoryEntity::new(id, EntityKind::empty(EntityType::CodeComponent), format!("Component {id}"))
    }

    fn edge(id: &str, from: &str, to: &str, kind: RelationshipType) -> MemoryRelationship {
        MemoryRelationship::new(from, to, kind).with_id(id)
    }

    #[test]
    fn test_empty_graph_yields_default_view() {
        let now = Utc::now();
        let intelligence = engine().analyze(&GraphState::new(), now);
        assert!(intelligence.pattern_recognition.discovered_patterns.is_empty());
        assert!(intelligence.relationship_inference.suggested_relationships.is_empty());
        assert!(intelligence.adaptive_recommendations.next_actions.is_empty());
        assert_eq!(intelligence.context_awareness.computed_at, Some(now));
    }

    #[test]
    fn test_context_awareness() {
        let mut state = GraphState::new();
        let context = EntityContext {
            project_phase: Some("design".to_string()),
            business_domain: Some("billing".to_string()),
            technical_stack: vec!["Rust".to_string(), "Postgres".to_string()],
            stakeholders: Vec::new(),
        };
        state
            .upsert_entity(component("c-1").with_context(context.clone()))
            .unwrap();
        state
            .upsert_entity(component("c-2").with_context(EntityContext {
                technical_stack: vec!["rust".to_string()],
                ..context
            }))
            .unwrap();
        state.upsert_entity(component("c-3")).unwrap();

        let awareness = engine().analyze(&state, Utc::now()).context_awareness;
        assert_eq!(awareness.current_phase.as_deref(), Some("design"));
        assert_eq!(awareness.business_domain.as_deref(), Some("billing"));
        assert_eq!(awareness.technical_stack, vec!["rust", "postgres"]);
        assert_eq!(awareness.recent_entities.len(), 3);
        assert!((awareness.average_confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_tag_cluster_patterns() {
        let mut state = GraphState::new();
        state
            .upsert_entity(component("c-1").with_tags(["storage", "async"]))
            .unwrap();
        state
            .upsert_entity(component("c-2").with_tags(["Storage", "async"]))
            .unwrap();
        state.upsert_entity(component("c-3").with_tag("cli")).unwrap();

        let patterns = engine()
            .analyze(&state, Utc::now())
            .pattern_recognition
            .discovered_patterns;
        let signatures: Vec<&str> = patterns.iter().map(|p| p.signature.as_str()).collect();
        assert_eq!(signatures, vec!["tag:async", "tag:storage", "tags:async+storage"]);

        let pair = &patterns[2];
        assert_eq!(pair.kind, PatternKind::TagCluster);
        assert_eq!(pair.frequency, 2);
        assert!((pair.confidence - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(pair.entity_ids, vec![EntityId::from("c-1"), EntityId::from("c-2")]);
    }

    #[test]
    fn test_structural_patterns() {
        let mut state = GraphState::new();
        for id in ["c-1", "c-2"] {
            state.upsert_entity(component(id)).unwrap();
        }
        state.upsert_entity(accepted("adr-1", "db", "postgres")).unwrap();
        state
            .upsert_relationship(edge("r1", "c-1", "adr-1", RelationshipType::Implements))
            .unwrap();
        state
            .upsert_relationship(edge("r2", "c-2", "adr-1", RelationshipType::Implements))
            .unwrap();

        let patterns = engine()
            .analyze(&state, Utc::now())
            .pattern_recognition
            .discovered_patterns;
        let structural = patterns
            .iter()
            .find(|p| p.kind == PatternKind::Structural)
            .unwrap();
        assert_eq!(
            structural.signature,
            "code_component implements architectural_decision"
        );
        assert_eq!(structural.frequency, 2);
        assert!((structural.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_suggests_similar_unconnected_pairs() {
        let mut state = GraphState::new();
        state
            .upsert_entity(component("c-1").with_tags(["storage", "redb"]))
            .unwrap();
        state
            .upsert_entity(
                MemoryEntity::decision("adr-1", "Use redb", DecisionStatus::Proposed)
                    .with_tags(["storage", "redb"]),
            )
            .unwrap();
        state.upsert_entity(component("c-2").with_tag("cli")).unwrap();

        let suggestions = engine()
            .analyze(&state, Utc::now())
            .relationship_inference
            .suggested_relationships;
        assert_eq!(suggestions.len(), 1);
        let suggestion = &suggestions[0];
        assert_eq!(suggestion.source_id, EntityId::from("c-1"));
        assert_eq!(suggestion.target_id, EntityId::from("adr-1"));
        assert_eq!(suggestion.relationship_type, RelationshipType::Implements);
        assert!((suggestion.strength - 0.6).abs() < 1e-9);

        // Connected pairs are not suggested again
        state
            .upsert_relationship(edge("r1", "c-1", "adr-1", RelationshipType::Implements))
            .unwrap();
        let suggestions = engine()
            .analyze(&state, Utc::now())
            .relationship_inference
            .suggested_relationships;
        assert!(suggestions.is_empty());
    }

    #[test]
    fn test_weak_connections() {
        let mut state = GraphState::new();
        state.upsert_entity(component("c-1")).unwrap();
        state.upsert_entity(component("c-2")).unwrap();
        state
            .upsert_relationship(
                edge("r1", "c-1", "c-2", RelationshipType::DependsOn).with_strength(0.1),
            )
            .unwrap();

        let intelligence = engine().analyze(&state, Utc::now());
        let weak = &intelligence.relationship_inference.weak_connections;
        assert_eq!(weak.len(), 1);
        assert_eq!(weak[0].relationship_id, RelationshipId::from("r1"));

        let opportunities = &intelligence.adaptive_recommendations.optimization_opportunities;
        assert!(opportunities
            .iter()
            .any(|o| o.kind == OpportunityKind::PruneWeakConnections));
    }

    #[test]
    fn test_conflicting_decisions() {
        let mut state = GraphState::new();
        state.upsert_entity(accepted("adr-1", "Database", "PostgreSQL")).unwrap();
        state.upsert_entity(accepted("adr-2", "database ", "MySQL")).unwrap();
        state.upsert_entity(accepted("adr-3", "database", "postgresql")).unwrap();

        let conflicts = engine()
            .analyze(&state, Utc::now())
            .relationship_inference
            .conflicts;
        let pairs: Vec<Vec<&str>> = conflicts
            .iter()
            .map(|c| c.entity_ids.iter().map(|id| id.as_str()).collect())
            .collect();
        assert_eq!(pairs, vec![vec!["adr-1", "adr-2"], vec!["adr-2", "adr-3"]]);
        assert!(conflicts
            .iter()
            .all(|c| c.reason == ConflictReason::DivergentOutcome));

        // A supersedes link settles the disagreement
        state
            .upsert_relationship(edge("r1", "adr-2", "adr-1", RelationshipType::Supersedes))
            .unwrap();
        let conflicts = engine()
            .analyze(&state, Utc::now())
            .relationship_inference
            .conflicts;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].entity_ids[0], EntityId::from("adr-2"));
    }

    #[test]
    fn test_explicit_conflict_edge() {
        let mut state = GraphState::new();
        state.upsert_entity(accepted("adr-1", "cache", "redis")).unwrap();
        state.upsert_entity(accepted("adr-2", "queue", "kafka")).unwrap();
        state
            .upsert_relationship(edge("r1", "adr-1", "adr-2", RelationshipType::ConflictsWith))
            .unwrap();

        let intelligence = engine().analyze(&state, Utc::now());
        let conflicts = &intelligence.relationship_inference.conflicts;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].reason, ConflictReason::ExplicitConflict);
        assert_eq!(conflicts[0].relationship_id, Some(RelationshipId::from("r1")));

        let top = &intelligence.adaptive_recommendations.next_actions[0];
        assert_eq!(top.action, ActionKind::ResolveConflict);
        assert_eq!(top.priority, Priority::Critical);
    }

    #[test]
    fn test_knowledge_gaps() {
        let mut state = GraphState::new();
        state.upsert_entity(accepted("adr-1", "db", "postgres")).unwrap();
        state
            .upsert_entity(MemoryEntity::new(
                "adr-2",
                EntityKind::ArchitecturalDecision(DecisionData {
                    status: DecisionStatus::Accepted,
                    alternatives: vec![Alternative {
                        name: "MySQL".to_string(),
                        description: String::new(),
                        rejection_reason: None,
                    }],
                    ..Default::default()
                }),
                "Documented",
            ))
            .unwrap();
        state
            .upsert_entity(component("c-1").with_confidence(0.2))
            .unwrap();
        state
            .upsert_relationship(edge("r1", "adr-2", "c-1", RelationshipType::RelatesTo))
            .unwrap();

        let gaps = engine()
            .analyze(&state, Utc::now())
            .adaptive_recommendations
            .knowledge_gaps;
        let found: Vec<(&str, GapKind)> = gaps
            .iter()
            .map(|g| (g.entity_id.as_str(), g.kind))
            .collect();
        assert_eq!(
            found,
            vec![
                ("adr-1", GapKind::Isolated),
                ("adr-1", GapKind::MissingAlternatives),
                ("c-1", GapKind::Unverified),
            ]
        );
    }

    #[test]
    fn test_stale_relevant_entities() {
        let mut state = GraphState::new();
        state
            .upsert_entity(component("c-1").with_relevance(0.9))
            .unwrap();
        state
            .upsert_entity(component("c-2").with_relevance(0.2))
            .unwrap();

        let later = Utc::now() + Duration::days(45);
        let actions = engine()
            .analyze(&state, later)
            .adaptive_recommendations
            .next_actions;
        let stale: Vec<&Recommendation> = actions
            .iter()
            .filter(|a| a.action == ActionKind::ReviewStale)
            .collect();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].entity_ids, vec![EntityId::from("c-1")]);

        let scores: Vec<f64> = actions.iter().map(|a| a.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_duplicate_titles_and_orphans() {
        let mut state = GraphState::new();
        state
            .upsert_entity(MemoryEntity::new(
                "a",
                EntityKind::empty(EntityType::KnowledgeArtifact),
                "Deploy  Runbook",
            ))
            .unwrap();
        state
            .upsert_entity(MemoryEntity::new(
                "b",
                EntityKind::empty(EntityType::KnowledgeArtifact),
                "deploy runbook",
            ))
            .unwrap();
        state.upsert_entity(component("c")).unwrap();
        state
            .upsert_relationship(edge("r1", "a", "c", RelationshipType::RelatesTo))
            .unwrap();
        state.delete_entity(&EntityId::from("c"));

        let opportunities = engine()
            .analyze(&state, Utc::now())
            .adaptive_recommendations
            .optimization_opportunities;
        let merge = opportunities
            .iter()
            .find(|o| o.kind == OpportunityKind::MergeDuplicates)
            .unwrap();
        assert_eq!(merge.entity_ids, vec![EntityId::from("a"), EntityId::from("b")]);
        let purge = opportunities
            .iter()
            .find(|o| o.kind == OpportunityKind::PurgeOrphaned)
            .unwrap();
        assert_eq!(purge.relationship_ids, vec![RelationshipId::from("r1")]);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let mut state = GraphState::new();
        for i in 0..6 {
            state
                .upsert_entity(component(&format!("c-{i}")).with_tags(["shared", "core"]))
                .unwrap();
        }
        let now = Utc::now();
        let first = engine().analyze(&state, now);
        let second = engine().analyze(&state, now);
        assert_eq!(first, second);
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: IntelligenceConfig =
            serde_json::from_str(r#"{"inference_threshold": 0.8}"#).unwrap();
        assert_eq!(config.inference_threshold, 0.8);
        assert_eq!(config.min_pattern_frequency, 2);
        assert_eq!(config.max_suggestions, 20);
    }
}
