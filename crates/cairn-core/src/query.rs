//! Query filters and the query engine

use crate::entity::{EntityType, MemoryEntity};
use crate::limits::{self, ValidationError};
use crate::relationship::{MemoryRelationship, RelationshipId};
use crate::store::GraphState;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// Sort key for query results (always descending, ties by id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Relevance,
    Confidence,
    LastModified,
    Created,
    AccessCount,
    TextScore,
}

/// Filters over the entity context
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_phase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_domain: Option<String>,

    /// Match entities using any of these technologies
    #[serde(default)]
    pub technical_stack: Vec<String>,

    /// Match entities involving any of these stakeholders
    #[serde(default)]
    pub stakeholders: Vec<String>,
}

impl ContextFilter {
    fn is_empty(&self) -> bool {
        self.project_phase.is_none()
            && self.business_domain.is_none()
            && self.technical_stack.is_empty()
            && self.stakeholders.is_empty()
    }

    fn matches(&self, entity: &MemoryEntity) -> bool {
        let context = &entity.context;
        let same = |want: &Option<String>, have: &Option<String>| match want {
            None => true,
            Some(want) => have
                .as_deref()
                .is_some_and(|have| have.eq_ignore_ascii_case(want)),
        };
        let any = |want: &[String], have: &[String]| {
            want.is_empty()
                || want
                    .iter()
                    .any(|w| have.iter().any(|h| h.eq_ignore_ascii_case(w)))
        };

        same(&self.project_phase, &context.project_phase)
            && same(&self.business_domain, &context.business_domain)
            && any(&self.technical_stack, &context.technical_stack)
            && any(&self.stakeholders, &context.stakeholders)
    }
}

/// Entity query
///
/// Fields combine with AND; multi-valued fields match on ANY listed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilter {
    #[serde(default)]
    pub entity_types: Vec<EntityType>,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Keywords scored against title, description and tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_query: Option<String>,

    /// Minimum confidence (inclusive)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_threshold: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_filters: Option<ContextFilter>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(default)]
    pub sort_by: SortBy,

    /// Include first-degree relationships of the returned entities
    #[serde(default)]
    pub include_related: bool,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a keyword query
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text_query: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.entity_types.push(entity_type);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_confidence_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    /// Reject thresholds that could never match, NaN included
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(threshold) = self.confidence_threshold {
            limits::validate_unit("confidence_threshold", threshold)?;
        }
        Ok(())
    }

    pub fn with_context(mut self, context: ContextFilter) -> Self {
        self.context_filters = Some(context);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sorted_by(mut self, sort_by: SortBy) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn include_related(mut self) -> Self {
        self.include_related = true;
        self
    }
}

/// Confidence histogram: low < 0.4 <= medium < 0.7 <= high
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceBuckets {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl ConfidenceBuckets {
    fn add(&mut self, confidence: f64) {
        if confidence < 0.4 {
            self.low += 1;
        } else if confidence < 0.7 {
            self.medium += 1;
        } else {
            self.high += 1;
        }
    }
}

/// Counts over the full (pre-truncation) match set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryAggregations {
    pub by_type: BTreeMap<EntityType, usize>,
    pub by_tag: BTreeMap<String, usize>,
    pub by_confidence: ConfidenceBuckets,
}

/// Result of an entity query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub entities: Vec<MemoryEntity>,

    /// First-degree relationships, only when requested
    pub relationships: Vec<MemoryRelationship>,

    /// Matches before `limit` was applied
    pub total_count: usize,

    pub query_time_ms: f64,

    pub aggregations: QueryAggregations,
}

/// Stateless entity query engine
pub struct QueryEngine;

impl QueryEngine {
    /// Execute a query against the current state
    pub fn execute(state: &GraphState, filter: &QueryFilter) -> QueryResult {
        let started = Instant::now();
        let keywords = filter.text_query.as_deref().map(Self::keywords);

        let mut matches: Vec<(&MemoryEntity, u32)> = state
            .entities()
            .iter()
            .filter(|entity| Self::matches_filters(entity, filter))
            .filter_map(|entity| match &keywords {
                Some(keywords) if !keywords.is_empty() => {
                    let phrase = filter.text_query.as_deref().unwrap_or_default();
                    let score = Self::text_score(entity, keywords, phrase);
                    (score > 0).then_some((entity, score))
                }
                _ => Some((entity, 0)),
            })
            .collect();

        let mut aggregations = QueryAggregations::default();
        for (entity, _) in &matches {
            *aggregations.by_type.entry(entity.entity_type()).or_default() += 1;
            for tag in &entity.tags {
                *aggregations.by_tag.entry(tag.clone()).or_default() += 1;
            }
            aggregations.by_confidence.add(entity.confidence);
        }

        matches.sort_by(|a, b| Self::compare(a, b, filter.sort_by));
        let total_count = matches.len();
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }

        let entities: Vec<MemoryEntity> = matches.into_iter().map(|(e, _)| e.clone()).collect();

        let relationships = if filter.include_related {
            let mut seen: BTreeSet<RelationshipId> = BTreeSet::new();
            let mut related: Vec<MemoryRelationship> = Vec::new();
            for entity in &entities {
                for rel in state.relationships().active_for(&entity.id) {
                    if seen.insert(rel.id.clone()) {
                        related.push(rel.clone());
                    }
                }
            }
            related.sort_by(|a, b| a.id.cmp(&b.id));
            related
        } else {
            Vec::new()
        };

        let query_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(
            "Query matched {} entities ({} returned) in {:.3}ms",
            total_count,
            entities.len(),
            query_time_ms
        );

        QueryResult {
            entities,
            relationships,
            total_count,
            query_time_ms,
            aggregations,
        }
    }

    fn matches_filters(entity: &MemoryEntity, filter: &QueryFilter) -> bool {
        if !filter.entity_types.is_empty() && !filter.entity_types.contains(&entity.entity_type()) {
            return false;
        }

        if !filter.tags.is_empty() && !filter.tags.iter().any(|t| entity.has_tag(t)) {
            return false;
        }

        if let Some(threshold) = filter.confidence_threshold {
            if entity.confidence < threshold {
                return false;
            }
        }

        if let Some(context) = &filter.context_filters {
            if !context.is_empty() && !context.matches(entity) {
                return false;
            }
        }

        true
    }

    fn keywords(text: &str) -> Vec<String> {
        let mut keywords: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect();
        keywords.sort();
        keywords.dedup();
        keywords
    }

    /// Keyword score: title +3, exact tag +2, partial tag +1, description +1,
    /// whole phrase in title +2
    fn text_score(entity: &MemoryEntity, keywords: &[String], phrase: &str) -> u32 {
        let title = entity.title.to_lowercase();
        let description = entity.description.to_lowercase();
        let tags: Vec<String> = entity.tags.iter().map(|t| t.to_lowercase()).collect();

        let mut score = 0;
        for keyword in keywords {
            if title.contains(keyword.as_str()) {
                score += 3;
            }
            if tags.iter().any(|t| t == keyword) {
                score += 2;
            } else if tags.iter().any(|t| t.contains(keyword.as_str())) {
                score += 1;
            }
            if description.contains(keyword.as_str()) {
                score += 1;
            }
        }

        let phrase = phrase.trim().to_lowercase();
        if keywords.len() > 1 && !phrase.is_empty() && title.contains(&phrase) {
            score += 2;
        }
        score
    }

    fn compare(a: &(&MemoryEntity, u32), b: &(&MemoryEntity, u32), sort_by: SortBy) -> Ordering {
        let (ea, sa) = a;
        let (eb, sb) = b;
        let primary = match sort_by {
            SortBy::Relevance => eb.relevance.total_cmp(&ea.relevance),
            SortBy::Confidence => eb.confidence.total_cmp(&ea.confidence),
            SortBy::LastModified => eb.last_modified.cmp(&ea.last_modified),
            SortBy::Created => eb.created.cmp(&ea.created),
            SortBy::AccessCount => eb
                .access_pattern
                .access_count
                .cmp(&ea.access_pattern.access_count),
            SortBy::TextScore => sb.cmp(sa),
        };
        primary.then_with(|| ea.id.cmp(&eb.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DecisionStatus, EntityContext, EntityKind};
    use crate::relationship::RelationshipType;

    fn state_with(entities: Vec<MemoryEntity>) -> GraphState {
        let mut state = GraphState::new();
        for entity in entities {
            state.upsert_entity(entity).unwrap();
        }
        state
    }

    fn ids(result: &QueryResult) -> Vec<&str> {
        result.entities.iter().map(|e| e.id.as_str()).collect()
    }

    fn adr_scenario() -> GraphState {
        let mut state = state_with(vec![
            MemoryEntity::decision("adr-1", "Use PostgreSQL", DecisionStatus::Accepted)
                .with_confidence(0.9)
                .with_tag("database"),
            MemoryEntity::decision("adr-2", "Shard the orders table", DecisionStatus::Proposed)
                .with_confidence(0.4)
                .with_tag("database"),
        ]);
        state
            .upsert_relationship(
                MemoryRelationship::new("adr-1", "adr-2", RelationshipType::RelatesTo)
                    .with_strength(0.7),
            )
            .unwrap();
        state
    }

    #[test]
    fn test_tag_and_confidence_filter() {
        let state = adr_scenario();
        let filter = QueryFilter::new()
            .with_tag("database")
            .with_confidence_threshold(0.5);
        let result = QueryEngine::execute(&state, &filter);
        assert_eq!(ids(&result), vec!["adr-1"]);
        assert_eq!(result.total_count, 1);
        assert!(result.relationships.is_empty());
    }

    #[test]
    fn test_type_and_confidence_filter() {
        let state = state_with(vec![
            MemoryEntity::decision("adr-1", "Use gRPC", DecisionStatus::Accepted)
                .with_confidence(0.8),
            MemoryEntity::decision("adr-2", "Use REST", DecisionStatus::Accepted)
                .with_confidence(0.6),
            MemoryEntity::new("c-1", EntityKind::empty(EntityType::CodeComponent), "Gateway")
                .with_confidence(0.95),
        ]);
        let filter = QueryFilter::new()
            .with_entity_type(EntityType::ArchitecturalDecision)
            .with_confidence_threshold(0.7);
        let result = QueryEngine::execute(&state, &filter);
        assert_eq!(ids(&result), vec!["adr-1"]);
        assert!(result
            .entities
            .iter()
            .all(|e| e.entity_type() == EntityType::ArchitecturalDecision && e.confidence >= 0.7));
    }

    #[test]
    fn test_threshold_must_be_a_unit_score() {
        assert!(QueryFilter::new().validate().is_ok());
        assert!(QueryFilter::new()
            .with_confidence_threshold(1.0)
            .validate()
            .is_ok());
        for bad in [f64::NAN, -0.1, 1.5, f64::INFINITY] {
            let err = QueryFilter::new()
                .with_confidence_threshold(bad)
                .validate()
                .unwrap_err();
            assert_eq!(err.field, "confidence_threshold");
        }
    }

    #[test]
    fn test_tags_match_any() {
        let state = state_with(vec![
            MemoryEntity::decision("a", "A", DecisionStatus::Accepted).with_tag("api"),
            MemoryEntity::decision("b", "B", DecisionStatus::Accepted).with_tag("db"),
            MemoryEntity::decision("c", "C", DecisionStatus::Accepted).with_tag("ui"),
        ]);
        let filter = QueryFilter::new().with_tag("API").with_tag("db");
        let result = QueryEngine::execute(&state, &filter);
        assert_eq!(ids(&result), vec!["a", "b"]);
    }

    #[test]
    fn test_text_query_scores_and_excludes_zero() {
        let state = state_with(vec![
            MemoryEntity::decision("a", "Cache sessions in Redis", DecisionStatus::Accepted)
                .with_tag("caching"),
            MemoryEntity::decision("b", "Adopt Kafka", DecisionStatus::Accepted)
                .with_description("Kafka replaces the redis pub/sub bridge"),
            MemoryEntity::decision("c", "Use Terraform", DecisionStatus::Accepted),
        ]);
        let filter = QueryFilter::text("redis").sorted_by(SortBy::TextScore);
        let result = QueryEngine::execute(&state, &filter);
        assert_eq!(ids(&result), vec!["a", "b"]);
    }

    #[test]
    fn test_sort_ties_broken_by_id_and_stable() {
        let state = state_with(vec![
            MemoryEntity::decision("c", "C", DecisionStatus::Accepted).with_relevance(0.5),
            MemoryEntity::decision("a", "A", DecisionStatus::Accepted).with_relevance(0.5),
            MemoryEntity::decision("b", "B", DecisionStatus::Accepted).with_relevance(0.9),
        ]);
        let filter = QueryFilter::new();
        let first = QueryEngine::execute(&state, &filter);
        let second = QueryEngine::execute(&state, &filter);
        assert_eq!(ids(&first), vec!["b", "a", "c"]);
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_limit_keeps_total_count() {
        let state = state_with(
            (0..5)
                .map(|i| MemoryEntity::decision(format!("adr-{i}"), "x", DecisionStatus::Accepted))
                .collect(),
        );
        let result = QueryEngine::execute(&state, &QueryFilter::new().with_limit(2));
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.total_count, 5);
        assert_eq!(
            result.aggregations.by_type[&EntityType::ArchitecturalDecision],
            5
        );
    }

    #[test]
    fn test_context_filter() {
        let backend = EntityContext {
            project_phase: Some("design".to_string()),
            technical_stack: vec!["rust".to_string(), "postgres".to_string()],
            ..Default::default()
        };
        let state = state_with(vec![
            MemoryEntity::decision("a", "A", DecisionStatus::Accepted).with_context(backend),
            MemoryEntity::decision("b", "B", DecisionStatus::Accepted),
        ]);
        let filter = QueryFilter::new().with_context(ContextFilter {
            project_phase: Some("Design".to_string()),
            technical_stack: vec!["Postgres".to_string(), "mysql".to_string()],
            ..Default::default()
        });
        let result = QueryEngine::execute(&state, &filter);
        assert_eq!(ids(&result), vec!["a"]);
    }

    #[test]
    fn test_include_related_and_aggregations() {
        let state = adr_scenario();
        let result = QueryEngine::execute(&state, &QueryFilter::new().include_related());
        assert_eq!(result.relationships.len(), 1);
        assert_eq!(result.aggregations.by_tag["database"], 2);
        assert_eq!(result.aggregations.by_confidence.high, 1);
        assert_eq!(result.aggregations.by_confidence.medium, 1);
        assert_eq!(result.aggregations.by_confidence.low, 0);
    }

    #[test]
    fn test_empty_graph() {
        let result = QueryEngine::execute(&GraphState::new(), &QueryFilter::text("anything"));
        assert!(result.entities.is_empty());
        assert_eq!(result.total_count, 0);
    }
}
