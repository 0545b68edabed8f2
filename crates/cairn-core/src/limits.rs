//! Input validation limits for the write path

use crate::error::{Error, Operation};

/// Maximum length for entity and relationship ids (256 bytes)
pub const MAX_ID_LEN: usize = 256;

/// Maximum length for an entity title (512 bytes)
pub const MAX_TITLE_LEN: usize = 512;

/// Maximum length for descriptions and relationship context (64KB)
pub const MAX_TEXT_LEN: usize = 64 * 1024;

/// Maximum tags per entity (100)
pub const MAX_TAGS_PER_ENTITY: usize = 100;

/// Maximum tag length (64 bytes)
pub const MAX_TAG_LEN: usize = 64;

/// Maximum evidence items on an entity or relationship (200)
pub const MAX_EVIDENCE_ITEMS: usize = 200;

/// Maximum entities or relationships in one imported batch (10000)
pub const MAX_BATCH_ITEMS: usize = 10_000;

/// Maximum traversal depth (50)
pub const MAX_TRAVERSAL_DEPTH: u32 = 50;

/// Access contexts retained per entity (20)
pub const MAX_ACCESS_CONTEXTS: usize = 20;

/// Field-level validation failure
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }

    /// Attach the operation and offending id
    pub fn into_error(self, operation: Operation, id: impl Into<String>) -> Error {
        Error::Validation {
            operation,
            id: id.into(),
            field: self.field,
            reason: self.reason,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

impl std::error::Error for ValidationError {}

/// Validate an id
pub fn validate_id(field: &'static str, id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::new(field, "cannot be empty"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::new(
            field,
            format!("too long: {} bytes (max {})", id.len(), MAX_ID_LEN),
        ));
    }
    Ok(())
}

/// Validate a score that must lie in [0, 1]
pub fn validate_unit(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::new(
            field,
            format!("{} is out of range [0.0, 1.0]", value),
        ));
    }
    Ok(())
}

/// Validate an entity title
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::new("title", "cannot be empty"));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(ValidationError::new(
            "title",
            format!("too long: {} bytes (max {})", title.len(), MAX_TITLE_LEN),
        ));
    }
    Ok(())
}

/// Validate free text (description, relationship context)
pub fn validate_text(field: &'static str, text: &str) -> Result<(), ValidationError> {
    if text.len() > MAX_TEXT_LEN {
        return Err(ValidationError::new(
            field,
            format!("too long: {} bytes (max {})", text.len(), MAX_TEXT_LEN),
        ));
    }
    Ok(())
}

/// Validate a tag set
pub fn validate_tags<'a>(tags: impl ExactSizeIterator<Item = &'a String>) -> Result<(), ValidationError> {
    if tags.len() > MAX_TAGS_PER_ENTITY {
        return Err(ValidationError::new(
            "tags",
            format!("too many tags: {} (max {})", tags.len(), MAX_TAGS_PER_ENTITY),
        ));
    }
    for tag in tags {
        if tag.trim().is_empty() {
            return Err(ValidationError::new("tags", "tag cannot be empty"));
        }
        if tag.len() > MAX_TAG_LEN {
            return Err(ValidationError::new(
                "tags",
                format!("tag '{}' too long: {} bytes (max {})", tag, tag.len(), MAX_TAG_LEN),
            ));
        }
    }
    Ok(())
}

/// Validate an evidence list
pub fn validate_evidence(field: &'static str, evidence: &[String]) -> Result<(), ValidationError> {
    if evidence.len() > MAX_EVIDENCE_ITEMS {
        return Err(ValidationError::new(
            field,
            format!("too many items: {} (max {})", evidence.len(), MAX_EVIDENCE_ITEMS),
        ));
    }
    if let Some(item) = evidence.iter().find(|e| e.len() > MAX_TEXT_LEN) {
        return Err(ValidationError::new(
            field,
            format!("item too long: {} bytes (max {})", item.len(), MAX_TEXT_LEN),
        ));
    }
    Ok(())
}

/// Validate batch size
pub fn validate_batch(field: &'static str, count: usize) -> Result<(), ValidationError> {
    if count > MAX_BATCH_ITEMS {
        return Err(ValidationError::new(
            field,
            format!("too many items in batch: {} (max {})", count, MAX_BATCH_ITEMS),
        ));
    }
    Ok(())
}

/// Validate traversal depth
pub fn validate_traversal_depth(depth: u32) -> Result<(), ValidationError> {
    if depth > MAX_TRAVERSAL_DEPTH {
        return Err(ValidationError::new(
            "max_depth",
            format!("traversal depth too large: {} (max {})", depth, MAX_TRAVERSAL_DEPTH),
        ));
    }
    Ok(())
}
