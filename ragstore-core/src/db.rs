//! [`VectorStore`]: collections, documents and search behind one handle.

use std::sync::Arc;

use tracing::info;

use crate::backend::{DurableBackend, MemoryBackend, StorageBackend};
use crate::collection::{CollectionConfig, CollectionInfo, CollectionManager};
use crate::config::StoreConfig;
use crate::document::{Document, DocumentId, StoredDocument};
use crate::error::Result;
use crate::filter::Filter;
use crate::search::{MmrOptions, SearchEngine, SearchRequest, SearchResult};
use crate::store::DocumentStore;

/// A vector document store.
///
/// Thread-safe: share it behind an `Arc` and call it from any number of
/// threads. Writes are atomic per document; a search may observe a state
/// between two concurrent writes.
///
/// # Example
///
/// ```
/// use ragstore_core::prelude::*;
/// use serde_json::json;
///
/// let store = VectorStore::in_memory().unwrap();
/// store
///     .create_collection("docs", CollectionConfig::new(3, DistanceMetric::Cosine))
///     .unwrap();
///
/// store
///     .upsert(
///         "docs",
///         vec![
///             Document::new("rust ownership", vec![1.0, 0.0, 0.0])
///                 .with_id("1")
///                 .with_metadata(Metadata::new().with_field("topic", "x")),
///             Document::new("gardening", vec![0.0, 1.0, 0.0])
///                 .with_id("2")
///                 .with_metadata(Metadata::new().with_field("topic", "y")),
///         ],
///     )
///     .unwrap();
///
/// let request = SearchRequest::new(vec![1.0, 0.0, 0.0], 5)
///     .with_filter(Filter::from_json(json!({"topic": {"$eq": "x"}})));
/// let results = store.search("docs", &request).unwrap();
/// assert_eq!(results.len(), 1);
/// assert_eq!(results[0].document.id.as_str(), "1");
/// ```
#[derive(Debug)]
pub struct VectorStore {
    config: StoreConfig,
    collections: Arc<CollectionManager>,
    documents: DocumentStore,
    engine: SearchEngine,
    durable: Option<Arc<DurableBackend>>,
}

impl VectorStore {
    /// Creates a store over any backend.
    pub fn new(backend: Arc<dyn StorageBackend>, config: StoreConfig) -> Result<Self> {
        Self::build(backend, None, config)
    }

    /// Creates an empty in-memory store with default configuration.
    pub fn in_memory() -> Result<Self> {
        Self::new(Arc::new(MemoryBackend::new()), StoreConfig::default())
    }

    /// Opens a store as configured: durable when `data_dir` is set,
    /// in-memory otherwise.
    pub fn open(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        match &config.data_dir {
            Some(dir) => {
                let durable = Arc::new(DurableBackend::open(dir, config.sync_mode)?);
                let backend: Arc<dyn StorageBackend> = durable.clone();
                Self::build(backend, Some(durable), config)
            }
            None => Self::build(Arc::new(MemoryBackend::new()), None, config),
        }
    }

    fn build(
        backend: Arc<dyn StorageBackend>,
        durable: Option<Arc<DurableBackend>>,
        config: StoreConfig,
    ) -> Result<Self> {
        config.validate()?;
        let collections = Arc::new(CollectionManager::open(backend)?);
        info!(
            durable = durable.is_some(),
            collections = collections.list().len(),
            "vector store ready"
        );
        Ok(Self {
            config,
            documents: DocumentStore::new(Arc::clone(&collections)),
            engine: SearchEngine::new(Arc::clone(&collections)),
            collections,
            durable,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The collection registry shared by the store's components.
    pub fn collections(&self) -> &Arc<CollectionManager> {
        &self.collections
    }

    pub fn create_collection(&self, name: &str, config: CollectionConfig) -> Result<()> {
        self.collections.create(name, config)
    }

    /// Drops a collection and its documents. Returns false if it did not exist.
    pub fn drop_collection(&self, name: &str) -> Result<bool> {
        self.collections.remove(name)
    }

    pub fn collection(&self, name: &str) -> Result<Arc<CollectionConfig>> {
        self.collections.get(name)
    }

    pub fn list_collections(&self) -> Vec<CollectionInfo> {
        self.collections.list()
    }

    /// See [`DocumentStore::upsert`].
    pub fn upsert(&self, collection: &str, documents: Vec<Document>) -> Result<Vec<DocumentId>> {
        self.documents.upsert(collection, documents)
    }

    pub fn delete_by_ids(&self, collection: &str, ids: &[DocumentId]) -> Result<usize> {
        self.documents.delete_by_ids(collection, ids)
    }

    pub fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<usize> {
        self.documents.delete_by_filter(collection, filter)
    }

    pub fn get(&self, collection: &str, ids: &[DocumentId]) -> Result<Vec<StoredDocument>> {
        self.documents.get(collection, ids)
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> Result<usize> {
        self.documents.count(collection, None)
    }

    /// Number of documents in a collection matching `filter`.
    pub fn count_matching(&self, collection: &str, filter: &Filter) -> Result<usize> {
        self.documents.count(collection, Some(filter))
    }

    /// Runs a search. A request without `min_score` uses the configured
    /// similarity threshold.
    pub fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        match (request.min_score, self.config.similarity_threshold) {
            (None, Some(threshold)) => {
                let mut request = request.clone();
                request.min_score = Some(threshold);
                self.engine.search(collection, &request)
            }
            _ => self.engine.search(collection, request),
        }
    }

    /// Searches with the configured default `k`.
    pub fn similarity_search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        filter: Option<Filter>,
    ) -> Result<Vec<SearchResult>> {
        let mut request = SearchRequest::new(vector, self.config.default_k);
        request.filter = filter;
        self.search(collection, &request)
    }

    /// Diversity-aware search with the configured default `k` and MMR options.
    pub fn mmr_search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        filter: Option<Filter>,
    ) -> Result<Vec<SearchResult>> {
        let mut request = SearchRequest::new(vector, self.config.default_k).with_mmr(MmrOptions {
            fetch_k: self.config.mmr_fetch_k,
            lambda: self.config.mmr_lambda,
        });
        request.filter = filter;
        self.search(collection, &request)
    }

    /// Snapshots durable state and empties the write-ahead log. No-op for
    /// in-memory stores.
    pub fn checkpoint(&self) -> Result<()> {
        if let Some(durable) = &self.durable {
            durable.checkpoint()?;
        }
        Ok(())
    }

    /// Syncs buffered log records to disk. No-op for in-memory stores.
    pub fn flush(&self) -> Result<()> {
        if let Some(durable) = &self.durable {
            durable.sync()?;
        }
        Ok(())
    }
}

// Async API when tokio feature is enabled
#[cfg(feature = "async")]
mod async_api {
    use super::*;
    use crate::error::Error;

    /// Async wrapper for [`VectorStore`].
    ///
    /// Each call runs on tokio's blocking pool via `spawn_blocking`, so
    /// backend I/O never stalls the async executor.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use ragstore_core::{AsyncVectorStore, CollectionConfig, DistanceMetric, StoreConfig};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let store = AsyncVectorStore::open(StoreConfig::default()).await.unwrap();
    ///     store
    ///         .create_collection("docs", CollectionConfig::new(384, DistanceMetric::Cosine))
    ///         .await
    ///         .unwrap();
    /// }
    /// ```
    #[derive(Debug, Clone)]
    pub struct AsyncVectorStore {
        inner: Arc<VectorStore>,
    }

    impl AsyncVectorStore {
        /// Opens a store asynchronously.
        pub async fn open(config: StoreConfig) -> Result<Self> {
            let store = tokio::task::spawn_blocking(move || VectorStore::open(config))
                .await
                .map_err(join_failed)??;
            Ok(Self::from_sync(store))
        }

        /// Wraps an existing store.
        pub fn from_sync(store: VectorStore) -> Self {
            Self {
                inner: Arc::new(store),
            }
        }

        async fn run<T, F>(&self, call: F) -> Result<T>
        where
            F: FnOnce(&VectorStore) -> Result<T> + Send + 'static,
            T: Send + 'static,
        {
            let inner = Arc::clone(&self.inner);
            tokio::task::spawn_blocking(move || call(&inner))
                .await
                .map_err(join_failed)?
        }

        pub async fn create_collection(&self, name: &str, config: CollectionConfig) -> Result<()> {
            let name = name.to_string();
            self.run(move |store| store.create_collection(&name, config))
                .await
        }

        pub async fn drop_collection(&self, name: &str) -> Result<bool> {
            let name = name.to_string();
            self.run(move |store| store.drop_collection(&name)).await
        }

        pub fn collection(&self, name: &str) -> Result<Arc<CollectionConfig>> {
            self.inner.collection(name)
        }

        pub fn list_collections(&self) -> Vec<CollectionInfo> {
            self.inner.list_collections()
        }

        pub async fn upsert(
            &self,
            collection: &str,
            documents: Vec<Document>,
        ) -> Result<Vec<DocumentId>> {
            let collection = collection.to_string();
            self.run(move |store| store.upsert(&collection, documents))
                .await
        }

        pub async fn delete_by_ids(&self, collection: &str, ids: Vec<DocumentId>) -> Result<usize> {
            let collection = collection.to_string();
            self.run(move |store| store.delete_by_ids(&collection, &ids))
                .await
        }

        pub async fn delete_by_filter(&self, collection: &str, filter: Filter) -> Result<usize> {
            let collection = collection.to_string();
            self.run(move |store| store.delete_by_filter(&collection, &filter))
                .await
        }

        pub async fn get(
            &self,
            collection: &str,
            ids: Vec<DocumentId>,
        ) -> Result<Vec<StoredDocument>> {
            let collection = collection.to_string();
            self.run(move |store| store.get(&collection, &ids)).await
        }

        pub async fn count(&self, collection: &str) -> Result<usize> {
            let collection = collection.to_string();
            self.run(move |store| store.count(&collection)).await
        }

        pub async fn search(
            &self,
            collection: &str,
            request: SearchRequest,
        ) -> Result<Vec<SearchResult>> {
            let collection = collection.to_string();
            self.run(move |store| store.search(&collection, &request))
                .await
        }

        pub async fn checkpoint(&self) -> Result<()> {
            self.run(|store| store.checkpoint()).await
        }

        pub async fn flush(&self) -> Result<()> {
            self.run(|store| store.flush()).await
        }

        /// Returns reference to inner sync store.
        pub fn inner(&self) -> &VectorStore {
            &self.inner
        }
    }

    fn join_failed(e: tokio::task::JoinError) -> Error {
        Error::Internal(format!("spawn_blocking failed: {e}"))
    }
}

#[cfg(feature = "async")]
pub use async_api::AsyncVectorStore;
