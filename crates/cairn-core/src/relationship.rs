//! Memory relationship (edge) types

use crate::entity::EntityId;
use crate::limits::{self, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for a relationship
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipId(pub String);

impl RelationshipId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelationshipId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RelationshipId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Type of relationship between two entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    RelatesTo,
    DependsOn,
    Supersedes,
    ConflictsWith,
    Implements,
    Influences,
    DerivedFrom,
    Impacts,
    /// An entity refining an earlier revision of itself
    Refines,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 9] = [
        Self::RelatesTo,
        Self::DependsOn,
        Self::Supersedes,
        Self::ConflictsWith,
        Self::Implements,
        Self::Influences,
        Self::DerivedFrom,
        Self::Impacts,
        Self::Refines,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RelatesTo => "relates_to",
            Self::DependsOn => "depends_on",
            Self::Supersedes => "supersedes",
            Self::ConflictsWith => "conflicts_with",
            Self::Implements => "implements",
            Self::Influences => "influences",
            Self::DerivedFrom => "derived_from",
            Self::Impacts => "impacts",
            Self::Refines => "refines",
        }
    }

    /// Whether source and target may be the same entity
    pub fn allows_self_loop(&self) -> bool {
        matches!(self, Self::Refines)
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RelationshipType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown relationship type: {s}"))
    }
}

/// A relationship (edge) between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRelationship {
    /// Unique identifier
    pub id: RelationshipId,

    /// Source entity ID
    pub source_id: EntityId,

    /// Target entity ID
    pub target_id: EntityId,

    /// Type of relationship
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,

    /// Strength of the connection (0.0-1.0)
    pub strength: f64,

    /// Certainty that the relationship holds (0.0-1.0)
    pub confidence: f64,

    #[serde(default)]
    pub context: String,

    #[serde(default)]
    pub evidence: Vec<String>,

    pub created: DateTime<Utc>,

    pub last_validated: DateTime<Utc>,

    /// Incremented by the store on every write
    #[serde(default)]
    pub version: u64,

    /// Set when an endpoint entity was deleted
    #[serde(default)]
    pub orphaned: bool,
}

impl MemoryRelationship {
    /// Create a new relationship with a generated id
    pub fn new(
        source_id: impl Into<EntityId>,
        target_id: impl Into<EntityId>,
        relationship_type: RelationshipType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RelationshipId::generate(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relationship_type,
            strength: 0.5,
            confidence: 0.5,
            context: String::new(),
            evidence: Vec::new(),
            created: now,
            last_validated: now,
            version: 0,
            orphaned: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<RelationshipId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    pub fn is_self_loop(&self) -> bool {
        self.source_id == self.target_id
    }

    /// Whether `id` is one of the endpoints
    pub fn touches(&self, id: &EntityId) -> bool {
        &self.source_id == id || &self.target_id == id
    }

    /// The endpoint opposite to `id`
    pub fn other_end(&self, id: &EntityId) -> &EntityId {
        if &self.source_id == id {
            &self.target_id
        } else {
            &self.source_id
        }
    }

    /// Whether this edge connects `a` and `b` in either direction
    pub fn connects(&self, a: &EntityId, b: &EntityId) -> bool {
        (&self.source_id == a && &self.target_id == b)
            || (&self.source_id == b && &self.target_id == a)
    }

    /// Validate shape and value ranges (endpoints are checked by the store)
    pub fn validate(&self) -> Result<(), ValidationError> {
        limits::validate_id("id", self.id.as_str())?;
        limits::validate_id("source_id", self.source_id.as_str())?;
        limits::validate_id("target_id", self.target_id.as_str())?;
        limits::validate_unit("strength", self.strength)?;
        limits::validate_unit("confidence", self.confidence)?;
        limits::validate_text("context", &self.context)?;
        limits::validate_evidence("evidence", &self.evidence)
    }
}
