//! Documents: the unit of storage.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metadata::Metadata;

/// Identity of a document, unique within its collection.
///
/// Identities are opaque strings. Ordering is byte-wise, which is what the
/// search engine uses to break distance ties.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    #[inline]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identity (UUID v4).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A document submitted for upsert. The identity is optional; the store
/// generates one when it is absent.
///
/// # Example
///
/// ```
/// use ragstore_core::{Document, Metadata};
///
/// let doc = Document::new("Rust ownership explained", vec![0.1, 0.2, 0.3])
///     .with_id("chapter-4")
///     .with_metadata(Metadata::new().with_field("scope", "book"));
///
/// assert_eq!(doc.id.as_ref().map(|id| id.as_str()), Some("chapter-4"));
/// assert_eq!(doc.dimension(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DocumentId>,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(content: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: None,
            content: content.into(),
            embedding,
            metadata: Metadata::new(),
        }
    }

    /// Sets the identity. Chainable.
    pub fn with_id(mut self, id: impl Into<DocumentId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the metadata. Chainable.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }
}

/// A document as stored: identity is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: DocumentId,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: Metadata,
}

impl StoredDocument {
    /// Returns the first `max_chars` characters of the content, for logging.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{head}...")
        } else {
            head
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = DocumentId::generate();
        let b = DocumentId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_id_ordering_is_bytewise() {
        let mut ids: Vec<DocumentId> = vec!["b".into(), "a".into(), "10".into(), "2".into()];
        ids.sort();
        let ids: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["10", "2", "a", "b"]);
    }

    #[test]
    fn test_document_deserializes_without_id() {
        let doc: Document =
            serde_json::from_str(r#"{"content": "hello", "embedding": [1.0, 0.0]}"#).unwrap();
        assert!(doc.id.is_none());
        assert!(doc.metadata.is_empty());
        assert_eq!(doc.dimension(), 2);
    }

    #[test]
    fn test_preview_truncates() {
        let doc = StoredDocument {
            id: "1".into(),
            content: "abcdef".into(),
            embedding: vec![],
            metadata: Metadata::new(),
        };
        assert_eq!(doc.preview(3), "abc...");
        assert_eq!(doc.preview(10), "abcdef");
    }
}
