//! Memory entity (node) types

use crate::limits::{self, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use ulid::Ulid;

/// Unique identifier for an entity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh ULID-backed id
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Entity type tag, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    ArchitecturalDecision,
    CodeComponent,
    BusinessRequirement,
    TechnicalConstraint,
    QualityConcern,
    ImplementationPattern,
    KnowledgeArtifact,
    TroubleshootingSession,
}

impl EntityType {
    pub const ALL: [EntityType; 8] = [
        Self::ArchitecturalDecision,
        Self::CodeComponent,
        Self::BusinessRequirement,
        Self::TechnicalConstraint,
        Self::QualityConcern,
        Self::ImplementationPattern,
        Self::KnowledgeArtifact,
        Self::TroubleshootingSession,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArchitecturalDecision => "architectural_decision",
            Self::CodeComponent => "code_component",
            Self::BusinessRequirement => "business_requirement",
            Self::TechnicalConstraint => "technical_constraint",
            Self::QualityConcern => "quality_concern",
            Self::ImplementationPattern => "implementation_pattern",
            Self::KnowledgeArtifact => "knowledge_artifact",
            Self::TroubleshootingSession => "troubleshooting_session",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown entity type: {s}"))
    }
}

/// Lifecycle status of an architectural decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    #[default]
    Proposed,
    Accepted,
    Deprecated,
    Superseded,
    Rejected,
}

/// Priority used by requirements and recommendations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Alternative considered for a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

/// Consequences recorded for a decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Consequences {
    #[serde(default)]
    pub positive: Vec<String>,
    #[serde(default)]
    pub negative: Vec<String>,
    #[serde(default)]
    pub risks: Vec<String>,
}

/// Payload of an architectural decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionData {
    #[serde(default)]
    pub status: DecisionStatus,
    /// The question being decided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concern: Option<String>,
    /// The option that was chosen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub consequences: Consequences,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentData {
    #[serde(default)]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub component_type: String,
    /// Normalised complexity score (0.0-1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequirementData {
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stakeholder: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstraintData {
    #[serde(default)]
    pub constraint_type: String,
    #[serde(default)]
    pub severity: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitigation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityConcernData {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub severity: Priority,
    #[serde(default)]
    pub affected_components: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternData {
    #[serde(default)]
    pub pattern_name: String,
    #[serde(default)]
    pub use_cases: Vec<String>,
    #[serde(default)]
    pub anti_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactData {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub format: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TroubleshootingData {
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default)]
    pub resolved: bool,
}

/// Entity kind with its type-specific payload
///
/// Serialised as `{"type": "architectural_decision", "data": {...}}`; unknown
/// type tags fail deserialisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EntityKind {
    ArchitecturalDecision(DecisionData),
    CodeComponent(ComponentData),
    BusinessRequirement(RequirementData),
    TechnicalConstraint(ConstraintData),
    QualityConcern(QualityConcernData),
    ImplementationPattern(PatternData),
    KnowledgeArtifact(ArtifactData),
    TroubleshootingSession(TroubleshootingData),
}

impl EntityKind {
    /// Kind with an empty payload for the given type
    pub fn empty(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::ArchitecturalDecision => Self::ArchitecturalDecision(Default::default()),
            EntityType::CodeComponent => Self::CodeComponent(Default::default()),
            EntityType::BusinessRequirement => Self::BusinessRequirement(Default::default()),
            EntityType::TechnicalConstraint => Self::TechnicalConstraint(Default::default()),
            EntityType::QualityConcern => Self::QualityConcern(Default::default()),
            EntityType::ImplementationPattern => Self::ImplementationPattern(Default::default()),
            EntityType::KnowledgeArtifact => Self::KnowledgeArtifact(Default::default()),
            EntityType::TroubleshootingSession => Self::TroubleshootingSession(Default::default()),
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Self::ArchitecturalDecision(_) => EntityType::ArchitecturalDecision,
            Self::CodeComponent(_) => EntityType::CodeComponent,
            Self::BusinessRequirement(_) => EntityType::BusinessRequirement,
            Self::TechnicalConstraint(_) => EntityType::TechnicalConstraint,
            Self::QualityConcern(_) => EntityType::QualityConcern,
            Self::ImplementationPattern(_) => EntityType::ImplementationPattern,
            Self::KnowledgeArtifact(_) => EntityType::KnowledgeArtifact,
            Self::TroubleshootingSession(_) => EntityType::TroubleshootingSession,
        }
    }

    pub fn as_decision(&self) -> Option<&DecisionData> {
        match self {
            Self::ArchitecturalDecision(data) => Some(data),
            _ => None,
        }
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::ArchitecturalDecision(data) => {
                if data.alternatives.iter().any(|a| a.name.trim().is_empty()) {
                    return Err(ValidationError::new(
                        "kind.alternatives",
                        "alternative name cannot be empty",
                    ));
                }
            }
            Self::CodeComponent(data) => {
                if let Some(complexity) = data.complexity {
                    limits::validate_unit("kind.complexity", complexity)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Structured context an entity was captured in
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_phase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_domain: Option<String>,
    #[serde(default)]
    pub technical_stack: Vec<String>,
    #[serde(default)]
    pub stakeholders: Vec<String>,
}

/// Access statistics used for relevance decay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPattern {
    pub last_accessed: DateTime<Utc>,
    #[serde(default)]
    pub access_count: u64,
    /// Most recent access contexts, oldest first
    #[serde(default)]
    pub access_context: Vec<String>,
}

impl Default for AccessPattern {
    fn default() -> Self {
        Self {
            last_accessed: Utc::now(),
            access_count: 0,
            access_context: Vec::new(),
        }
    }
}

/// How an entity entered the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    #[default]
    Created,
    Imported,
    Inferred,
    Migrated,
}

/// Kind of recorded transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformationKind {
    Created,
    Updated,
    Accessed,
    Decayed,
}

/// One entry of an entity's change log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transformation {
    pub timestamp: DateTime<Utc>,
    pub version: u64,
    pub kind: TransformationKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed_fields: Vec<String>,
}

/// Origin plus append-only change log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evolution {
    #[serde(default)]
    pub origin: Origin,
    #[serde(default)]
    transformations: Vec<Transformation>,
}

impl Evolution {
    pub fn new(origin: Origin) -> Self {
        Self {
            origin,
            transformations: Vec::new(),
        }
    }

    pub fn transformations(&self) -> &[Transformation] {
        &self.transformations
    }

    pub(crate) fn append(&mut self, transformation: Transformation) {
        self.transformations.push(transformation);
    }
}

/// Verification state of an entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationState {
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
}

/// A memory entity in the knowledge graph (a node)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntity {
    /// Unique identifier
    pub id: EntityId,

    /// Entity kind and type-specific payload
    pub kind: EntityKind,

    /// Creation timestamp
    pub created: DateTime<Utc>,

    /// Stamped by the store on every write
    pub last_modified: DateTime<Utc>,

    /// Incremented by the store on every write
    #[serde(default)]
    pub version: u64,

    /// Certainty that the content is accurate (0.0-1.0)
    pub confidence: f64,

    /// Current importance (0.0-1.0), subject to decay
    pub relevance: f64,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    #[serde(default)]
    pub context: EntityContext,

    #[serde(default)]
    pub access_pattern: AccessPattern,

    #[serde(default)]
    pub evolution: Evolution,

    #[serde(default)]
    pub validation: ValidationState,
}

impl MemoryEntity {
    /// Create a new entity with default scores
    pub fn new(id: impl Into<EntityId>, kind: EntityKind, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            created: now,
            last_modified: now,
            version: 0,
            confidence: 0.5,
            relevance: 0.5,
            title: title.into(),
            description: String::new(),
            tags: BTreeSet::new(),
            context: EntityContext::default(),
            access_pattern: AccessPattern::default(),
            evolution: Evolution::default(),
            validation: ValidationState::default(),
        }
    }

    /// Create an architectural decision with the given status
    pub fn decision(
        id: impl Into<EntityId>,
        title: impl Into<String>,
        status: DecisionStatus,
    ) -> Self {
        Self::new(
            id,
            EntityKind::ArchitecturalDecision(DecisionData {
                status,
                ..Default::default()
            }),
            title,
        )
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.relevance = relevance;
        self
    }

    pub fn with_context(mut self, context: EntityContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.evolution.origin = origin;
        self
    }

    pub fn entity_type(&self) -> EntityType {
        self.kind.entity_type()
    }

    /// Check if entity has a specific tag (case-insensitive)
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Change log, oldest entry first
    pub fn history(&self) -> impl Iterator<Item = &Transformation> + Clone + '_ {
        self.evolution.transformations.iter()
    }

    /// Start of the idle period: last access or last applied decay, whichever is later
    pub fn decay_reference(&self) -> DateTime<Utc> {
        self.history()
            .filter(|t| t.kind == TransformationKind::Decayed)
            .map(|t| t.timestamp)
            .last()
            .map_or(self.access_pattern.last_accessed, |decayed| {
                decayed.max(self.access_pattern.last_accessed)
            })
    }

    /// Relevance after exponential decay over the idle period
    pub fn decayed_relevance(&self, now: DateTime<Utc>, half_life_days: f64) -> f64 {
        if half_life_days <= 0.0 {
            return self.relevance;
        }
        let idle = (now - self.decay_reference()).num_seconds().max(0) as f64;
        let idle_days = idle / 86_400.0;
        (self.relevance * 0.5f64.powf(idle_days / half_life_days)).clamp(0.0, 1.0)
    }

    /// Validate shape and value ranges
    pub fn validate(&self) -> Result<(), ValidationError> {
        limits::validate_id("id", self.id.as_str())?;
        limits::validate_title(&self.title)?;
        limits::validate_text("description", &self.description)?;
        limits::validate_unit("confidence", self.confidence)?;
        limits::validate_unit("relevance", self.relevance)?;
        limits::validate_tags(self.tags.iter())?;
        limits::validate_evidence("validation.evidence", &self.validation.evidence)?;
        self.kind.validate()
    }

    /// Names of content fields that differ from `other`
    pub(crate) fn changed_fields(&self, other: &MemoryEntity) -> Vec<String> {
        let mut changed = Vec::new();
        if self.kind != other.kind {
            changed.push("kind");
        }
        if self.title != other.title {
            changed.push("title");
        }
        if self.description != other.description {
            changed.push("description");
        }
        if self.confidence != other.confidence {
            changed.push("confidence");
        }
        if self.relevance != other.relevance {
            changed.push("relevance");
        }
        if self.tags != other.tags {
            changed.push("tags");
        }
        if self.context != other.context {
            changed.push("context");
        }
        if self.validation != other.validation {
            changed.push("validation");
        }
        changed.into_iter().map(String::from).collect()
    }
}
