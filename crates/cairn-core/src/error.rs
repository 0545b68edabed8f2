//! Error types for Cairn Core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using Cairn's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by a persistence collaborator, passed through untouched
pub type PersistenceError = Box<dyn std::error::Error + Send + Sync>;

/// Name of the operation an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Initialize,
    UpsertEntity,
    DeleteEntity,
    RecordAccess,
    UpsertRelationship,
    DeleteRelationship,
    ImportGraph,
    QueryEntities,
    FindRelated,
    FindPath,
    Analyze,
    CreateSnapshot,
    Optimize,
    Persist,
    Read,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::UpsertEntity => "upsert_entity",
            Self::DeleteEntity => "delete_entity",
            Self::RecordAccess => "record_access",
            Self::UpsertRelationship => "upsert_relationship",
            Self::DeleteRelationship => "delete_relationship",
            Self::ImportGraph => "import_graph",
            Self::QueryEntities => "query_entities",
            Self::FindRelated => "find_related_entities",
            Self::FindPath => "find_path",
            Self::Analyze => "analyze",
            Self::CreateSnapshot => "create_snapshot",
            Self::Optimize => "optimize",
            Self::Persist => "persist",
            Self::Read => "read",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cairn error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("{operation}: invalid `{field}` on '{id}': {reason}")]
    Validation {
        operation: Operation,
        id: String,
        field: &'static str,
        reason: String,
    },

    #[error("{operation}: relationship '{relationship_id}' references missing entity '{missing_id}'")]
    DanglingReference {
        operation: Operation,
        relationship_id: String,
        missing_id: String,
    },

    #[error("{operation}: relationship '{relationship_id}' is a {relationship_type} self-loop on '{entity_id}'")]
    SelfLoop {
        operation: Operation,
        relationship_id: String,
        entity_id: String,
        relationship_type: String,
    },

    #[error("{operation}: memory manager is not initialized")]
    NotInitialized { operation: Operation },

    #[error("{operation}: persistence failed: {source}")]
    Persistence {
        operation: Operation,
        #[source]
        source: PersistenceError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Operation the error was raised by, if it carries one
    pub fn operation(&self) -> Option<Operation> {
        match self {
            Self::Validation { operation, .. }
            | Self::DanglingReference { operation, .. }
            | Self::SelfLoop { operation, .. }
            | Self::NotInitialized { operation }
            | Self::Persistence { operation, .. } => Some(*operation),
            Self::Serialization(_) | Self::Internal(_) => None,
        }
    }

    /// Whether the error was raised while validating caller input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::DanglingReference { .. } | Self::SelfLoop { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_operation_and_ids() {
        let err = Error::DanglingReference {
            operation: Operation::UpsertRelationship,
            relationship_id: "rel-1".to_string(),
            missing_id: "adr-9".to_string(),
        };
        let message = err.to_string();
        assert!(message.starts_with("upsert_relationship"));
        assert!(message.contains("rel-1"));
        assert!(message.contains("adr-9"));
        assert_eq!(err.operation(), Some(Operation::UpsertRelationship));
        assert!(err.is_validation());
    }

    #[test]
    fn test_persistence_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err = Error::Persistence {
            operation: Operation::Persist,
            source: Box::new(io),
        };
        assert!(!err.is_validation());
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.downcast_ref::<std::io::Error>().is_some());
    }
}
