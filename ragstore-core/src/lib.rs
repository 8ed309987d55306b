//! # ragstore core
//!
//! Core library for ragstore, a vector document store for retrieval-augmented
//! generation: documents (content, embedding, metadata) live in named
//! collections and are retrieved by similarity search constrained with
//! metadata filters.
//!
//! ## Crate Features
//!
//! - `async` - Enables [`AsyncVectorStore`] for tokio-compatible async operations
//!
//! ## Core Types
//!
//! ### Store
//!
//! - [`VectorStore`] - Collections, documents and search behind one thread-safe handle
//! - [`AsyncVectorStore`] - Async wrapper for tokio compatibility (requires `async` feature)
//! - [`StoreConfig`] - Defaults for `k`, score threshold, MMR and storage location
//!
//! ### Components
//!
//! - [`CollectionManager`] - Registry of collections and their configuration
//! - [`DocumentStore`] - Upsert, delete and fetch by identity or filter
//! - [`SearchEngine`] - Filter-then-rank k-nearest-neighbor search, with MMR re-ranking
//!
//! ### Filtering
//!
//! - [`Filter`] - Filter expressions (`$eq`, `$in`, `$between`, `$like`, `$and`, ...)
//! - [`filter::compile`] - Validates an expression into a typed [`Predicate`]
//! - [`filter::to_query_condition`] - Lowers a predicate to a parameterized backend condition
//!
//! ### Storage
//!
//! - [`StorageBackend`] - The contract a vector-capable storage engine implements
//! - [`MemoryBackend`] - In-memory tables with exact ranking
//! - [`DurableBackend`] - In-memory tables made crash-safe with a write-ahead log
//!
//! ### Types
//!
//! - [`Document`] / [`StoredDocument`] - A document before and after it gets an identity
//! - [`DocumentId`] - Opaque string identity
//! - [`Metadata`] - JSON key/value metadata attached to documents
//! - [`DistanceMetric`] - Cosine, inner product, Euclidean

pub mod backend;
pub mod collection;
pub mod config;
pub mod db;
pub mod distance;
pub mod document;
pub mod error;
pub mod filter;
pub mod metadata;
pub mod search;
pub mod store;

// Re-exports for convenient access
pub use backend::{DurableBackend, MemoryBackend, StorageBackend};
pub use collection::{CollectionConfig, CollectionInfo, CollectionManager, MetadataMode, Schema};
pub use config::{StoreConfig, SyncMode};
pub use db::VectorStore;
#[cfg(feature = "async")]
pub use db::AsyncVectorStore;
pub use distance::DistanceMetric;
pub use document::{Document, DocumentId, StoredDocument};
pub use error::{BackendError, Error, Result};
pub use filter::{Filter, Predicate, ScopeFilter, ValueType};
pub use metadata::Metadata;
pub use search::{MmrOptions, SearchEngine, SearchRequest, SearchResult};
pub use store::DocumentStore;

/// Re-export commonly used types for convenience.
///
/// # Example
///
/// ```rust
/// use ragstore_core::prelude::*;
///
/// let store = VectorStore::in_memory().unwrap();
/// store
///     .create_collection("notes", CollectionConfig::new(3, DistanceMetric::Euclidean))
///     .unwrap();
/// let ids = store
///     .upsert("notes", vec![Document::new("hello", vec![1.0, 2.0, 3.0])])
///     .unwrap();
/// assert_eq!(store.get("notes", &ids).unwrap().len(), 1);
/// ```
pub mod prelude {
    pub use crate::{
        CollectionConfig, DistanceMetric, Document, DocumentId, Error, Filter, Metadata,
        MetadataMode, MmrOptions, Result, ScopeFilter, SearchRequest, SearchResult,
        StoredDocument, StoreConfig, ValueType, VectorStore,
    };
}
