//! # ragstore
//!
//! **A vector document store for retrieval-augmented generation.**
//!
//! Documents carry text content, an embedding and JSON metadata. They live in
//! named collections and come back through k-nearest-neighbor search narrowed
//! by metadata filters.
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | **Distance Metrics** | Cosine, inner product, Euclidean |
//! | **Filter Language** | `$eq`, `$ne`, `$lt`, `$lte`, `$gt`, `$gte`, `$in`, `$nin`, `$between`, `$like`, `$ilike`, `$and`, `$or` |
//! | **MMR Re-ranking** | Maximal marginal relevance for diverse results |
//! | **Structured Collections** | Declared metadata columns with type checks |
//! | **Persistence** | Write-ahead log plus snapshot checkpoints |
//! | **Async API** | Tokio-compatible async operations (feature flag) |
//!
//! ## Quick Start
//!
//! ```rust
//! use ragstore::prelude::*;
//! use serde_json::json;
//!
//! let store = VectorStore::in_memory().unwrap();
//! store
//!     .create_collection("docs", CollectionConfig::new(3, DistanceMetric::Cosine))
//!     .unwrap();
//!
//! store
//!     .upsert(
//!         "docs",
//!         vec![
//!             Document::new("rust ownership", vec![1.0, 0.0, 0.0])
//!                 .with_id("1")
//!                 .with_metadata(Metadata::new().with_field("topic", "x")),
//!             Document::new("gardening", vec![0.0, 1.0, 0.0])
//!                 .with_id("2")
//!                 .with_metadata(Metadata::new().with_field("topic", "y")),
//!             Document::new("rust lifetimes", vec![0.9, 0.1, 0.0])
//!                 .with_id("3")
//!                 .with_metadata(Metadata::new().with_field("topic", "x")),
//!         ],
//!     )
//!     .unwrap();
//!
//! let request = SearchRequest::new(vec![1.0, 0.0, 0.0], 2)
//!     .with_filter(Filter::from_json(json!({"topic": {"$eq": "x"}})));
//! let results = store.search("docs", &request).unwrap();
//!
//! let ids: Vec<_> = results.iter().map(|r| r.document.id.as_str()).collect();
//! assert_eq!(ids, ["1", "3"]);
//! ```
//!
//! ### Persistent Store
//!
//! Setting a data directory makes every write go through a write-ahead log:
//!
//! ```no_run
//! use ragstore::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = StoreConfig::default().with_data_dir("./ragstore-data");
//!     let store = VectorStore::open(config)?;
//!     if store.collection("docs").is_err() {
//!         store.create_collection("docs", CollectionConfig::new(384, DistanceMetric::Cosine))?;
//!     }
//!
//!     store.upsert("docs", vec![Document::new("hello", vec![0.1; 384])])?;
//!
//!     // Folds the log into a snapshot
//!     store.checkpoint()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Diverse Results
//!
//! ```rust
//! use ragstore::prelude::*;
//!
//! let store = VectorStore::in_memory().unwrap();
//! store
//!     .create_collection("docs", CollectionConfig::new(2, DistanceMetric::Cosine))
//!     .unwrap();
//! store
//!     .upsert(
//!         "docs",
//!         vec![
//!             Document::new("a", vec![1.0, 0.0]).with_id("a"),
//!             Document::new("a copy", vec![1.0, 0.01]).with_id("b"),
//!             Document::new("different", vec![0.6, 0.8]).with_id("c"),
//!         ],
//!     )
//!     .unwrap();
//!
//! let request = SearchRequest::new(vec![1.0, 0.0], 2).with_mmr(MmrOptions {
//!     fetch_k: 3,
//!     lambda: 0.3,
//! });
//! let results = store.search("docs", &request).unwrap();
//! assert_eq!(results[0].document.id.as_str(), "a");
//! assert_eq!(results[1].document.id.as_str(), "c");
//! ```
//!
//! ## Crate Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `async` | Enables `AsyncVectorStore` for tokio compatibility |
//!
//! ```toml
//! [dependencies]
//! ragstore = { version = "0.1", features = ["async"] }
//! ```
//!
//! ## Architecture
//!
//! - **`ragstore-core`** - Core library with no async runtime dependency
//! - **`ragstore`** - Main crate that re-exports everything
//! - **`ragstore-server`** - HTTP front end over the async store
//!
//! Filter expressions compile to a typed [`Predicate`], which lowers to a
//! parameterized condition that a [`StorageBackend`] evaluates. The bundled
//! backends are [`MemoryBackend`] and [`DurableBackend`].
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`](crate::Result). Backend
//! outages surface as [`Error::BackendUnavailable`], which
//! [`Error::is_retryable`] reports as retryable.
//!
//! ## Thread Safety
//!
//! [`VectorStore`] is `Send + Sync`; share it behind an `Arc`.
//! [`AsyncVectorStore`] is `Clone` and safe to share across tasks.

pub use ragstore_core::*;
