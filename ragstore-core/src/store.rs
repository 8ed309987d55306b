//! Document store: upsert, delete and fetch of documents within a collection.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{RowSelector, StorageBackend};
use crate::collection::CollectionManager;
use crate::document::{Document, DocumentId, StoredDocument};
use crate::error::{BackendError, Error, Result};
use crate::filter::Filter;

/// Maximum content characters included in log lines.
pub(crate) const LOG_PREVIEW_CHARS: usize = 100;

/// Reads and writes documents of the collections a [`CollectionManager`] owns.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    collections: Arc<CollectionManager>,
}

impl DocumentStore {
    pub fn new(collections: Arc<CollectionManager>) -> Self {
        Self { collections }
    }

    fn backend(&self) -> &Arc<dyn StorageBackend> {
        self.collections.backend()
    }

    /// Inserts or replaces documents, returning their identities in input order.
    ///
    /// Documents without an identity get a generated one. An existing
    /// identity has its content, embedding and metadata replaced as a whole.
    /// The batch is validated before anything is written: one bad document
    /// rejects the whole call.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown collection,
    /// [`Error::DimensionMismatch`] for a wrong-length embedding, and
    /// [`Error::InvalidArgument`] for metadata a structured collection does
    /// not declare.
    pub fn upsert(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<DocumentId>> {
        let config = self.collections.get(collection)?;
        for document in &documents {
            config.check_dimension(document.embedding.len())?;
            config.check_metadata(&document.metadata)?;
        }
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<StoredDocument> = documents
            .into_iter()
            .map(|document| StoredDocument {
                id: document.id.unwrap_or_else(DocumentId::generate),
                content: document.content,
                embedding: document.embedding,
                metadata: document.metadata,
            })
            .collect();
        let ids: Vec<DocumentId> = rows.iter().map(|row| row.id.clone()).collect();
        if let Some(first) = rows.first() {
            debug!(
                collection,
                first = %first.id,
                preview = %first.preview(LOG_PREVIEW_CHARS),
                "upserting batch"
            );
        }

        let written = self
            .backend()
            .upsert_rows(collection, rows)
            .map_err(|e| backend_failure(collection, "upsert", e))?;
        info!(collection, count = written, "upserted documents");
        Ok(ids)
    }

    /// Deletes documents by identity. Unknown identities are ignored.
    /// Returns the number removed.
    pub fn delete_by_ids(&self, collection: &str, ids: &[DocumentId]) -> Result<usize> {
        self.collections.get(collection)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let removed = self
            .backend()
            .delete_rows(collection, &RowSelector::Ids(ids.to_vec()))
            .map_err(|e| backend_failure(collection, "delete", e))?;
        info!(collection, requested = ids.len(), removed, "deleted documents by id");
        Ok(removed)
    }

    /// Deletes every document matching `filter`. Returns the number removed.
    pub fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let config = self.collections.get(collection)?;
        let condition = filter.to_condition(&config)?;

        let removed = self
            .backend()
            .delete_rows(collection, &RowSelector::Condition(condition))
            .map_err(|e| backend_failure(collection, "delete", e))?;
        info!(collection, removed, "deleted documents by filter");
        Ok(removed)
    }

    /// Fetches documents by identity, omitting identities not stored.
    pub fn get(&self, collection: &str, ids: &[DocumentId]) -> Result<Vec<StoredDocument>> {
        self.collections.get(collection)?;
        self.backend()
            .fetch_rows(collection, ids)
            .map_err(|e| backend_failure(collection, "fetch", e))
    }

    /// Counts documents, optionally only those matching `filter`.
    pub fn count(&self, collection: &str, filter: Option<&Filter>) -> Result<usize> {
        let config = self.collections.get(collection)?;
        let condition = Filter::condition_for(filter, &config)?;
        self.backend()
            .count_rows(collection, &condition)
            .map_err(|e| backend_failure(collection, "count", e))
    }
}

/// Logs a backend failure and converts it. A table missing underneath a
/// registered collection (dropped concurrently) reads as the collection
/// being gone.
pub(crate) fn backend_failure(collection: &str, operation: &str, err: BackendError) -> Error {
    if let BackendError::TableNotFound(_) = err {
        return Error::NotFound(collection.to_string());
    }
    warn!(collection, operation, error = %err, "backend call failed");
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::collection::CollectionConfig;
    use crate::distance::DistanceMetric;
    use crate::filter::ValueType;
    use crate::metadata::Metadata;
    use serde_json::json;

    fn store() -> DocumentStore {
        let manager = CollectionManager::open(Arc::new(MemoryBackend::new())).unwrap();
        manager
            .create("docs", CollectionConfig::new(3, DistanceMetric::Cosine))
            .unwrap();
        DocumentStore::new(Arc::new(manager))
    }

    fn doc(id: &str, content: &str, price: i64) -> Document {
        Document::new(content, vec![1.0, 0.0, 0.0])
            .with_id(id)
            .with_metadata(Metadata::new().with_field("price", price))
    }

    #[test]
    fn test_upsert_generates_ids_in_order() {
        let store = store();
        let ids = store
            .upsert(
                "docs",
                vec![
                    Document::new("first", vec![1.0, 0.0, 0.0]),
                    doc("fixed", "second", 1),
                    Document::new("third", vec![0.0, 1.0, 0.0]),
                ],
            )
            .unwrap();

        assert_eq!(ids.len(), 3);
        assert_eq!(ids[1].as_str(), "fixed");
        assert_ne!(ids[0], ids[2]);

        let fetched = store.get("docs", &ids).unwrap();
        assert_eq!(fetched.len(), 3);
    }

    #[test]
    fn test_upsert_same_id_replaces() {
        let store = store();
        store.upsert("docs", vec![doc("5", "old", 1)]).unwrap();
        store
            .upsert(
                "docs",
                vec![Document::new("new", vec![0.0, 1.0, 0.0]).with_id("5")],
            )
            .unwrap();

        let fetched = store.get("docs", &[DocumentId::from("5")]).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].content, "new");
        assert_eq!(fetched[0].embedding, vec![0.0, 1.0, 0.0]);
        // no field merging with the previous version
        assert!(fetched[0].metadata.is_empty());
        assert_eq!(store.count("docs", None).unwrap(), 1);
    }

    #[test]
    fn test_upsert_rejects_whole_batch_on_bad_dimension() {
        let store = store();
        let err = store
            .upsert(
                "docs",
                vec![doc("ok", "fine", 1), Document::new("bad", vec![1.0, 0.0])],
            )
            .unwrap_err();

        assert!(matches!(err, Error::DimensionMismatch { expected: 3, got: 2 }));
        assert_eq!(store.count("docs", None).unwrap(), 0);
    }

    #[test]
    fn test_upsert_structured_metadata_is_checked() {
        let manager = CollectionManager::open(Arc::new(MemoryBackend::new())).unwrap();
        manager
            .create(
                "typed",
                CollectionConfig::new(3, DistanceMetric::Cosine)
                    .with_column("price", ValueType::Number),
            )
            .unwrap();
        let store = DocumentStore::new(Arc::new(manager));

        assert!(store.upsert("typed", vec![doc("a", "x", 3)]).is_ok());
        let bad = Document::new("y", vec![1.0, 0.0, 0.0])
            .with_metadata(Metadata::new().with_field("price", "cheap"));
        assert!(matches!(
            store.upsert("typed", vec![bad]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_unknown_collection() {
        let store = store();
        assert!(matches!(
            store.upsert("nope", vec![doc("a", "x", 1)]),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(store.get("nope", &[]), Err(Error::NotFound(_))));
        assert!(matches!(
            store.delete_by_ids("nope", &[DocumentId::from("a")]),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_by_ids_is_idempotent() {
        let store = store();
        store.upsert("docs", vec![doc("a", "x", 1), doc("b", "y", 2)]).unwrap();

        let ids = [DocumentId::from("a"), DocumentId::from("missing")];
        assert_eq!(store.delete_by_ids("docs", &ids).unwrap(), 1);
        assert_eq!(store.delete_by_ids("docs", &ids).unwrap(), 0);
        assert_eq!(store.count("docs", None).unwrap(), 1);
    }

    #[test]
    fn test_delete_by_filter_returns_count() {
        let store = store();
        store
            .upsert(
                "docs",
                vec![doc("a", "x", 9), doc("b", "y", 10), doc("c", "z", 20), doc("d", "w", 21)],
            )
            .unwrap();

        let filter = Filter::from_json(json!({"price": {"$between": [10, 20]}}));
        assert_eq!(store.count("docs", Some(&filter)).unwrap(), 2);
        assert_eq!(store.delete_by_filter("docs", &filter).unwrap(), 2);

        let left: Vec<String> = store
            .get("docs", &[DocumentId::from("a"), DocumentId::from("d")])
            .unwrap()
            .into_iter()
            .map(|d| d.id.to_string())
            .collect();
        assert_eq!(left.len(), 2);
        assert_eq!(store.count("docs", None).unwrap(), 2);
    }

    #[test]
    fn test_invalid_filter_deletes_nothing() {
        let store = store();
        store.upsert("docs", vec![doc("a", "x", 1)]).unwrap();
        let err = store
            .delete_by_filter("docs", &Filter::from_json(json!({"price": {"$regex": "."}})))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
        assert_eq!(store.count("docs", None).unwrap(), 1);
    }
}
