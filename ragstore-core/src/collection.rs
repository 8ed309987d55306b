//! Collections and the registry that owns them.
//!
//! A collection fixes an embedding dimensionality, a distance metric and a
//! metadata mode at creation. The [`CollectionManager`] is the single owner
//! of which collections exist; the document store and the search engine
//! look collections up through a shared handle to it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::backend::{StorageBackend, TableSpec};
use crate::distance::DistanceMetric;
use crate::error::{BackendError, Error, Result};
use crate::filter::ValueType;
use crate::metadata::Metadata;

/// Declared metadata columns of a structured collection.
pub type Schema = BTreeMap<String, ValueType>;

/// How document metadata is stored and addressed by filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataMode {
    /// Fixed set of typed columns declared in the collection schema.
    Structured,
    /// Open-ended key/value container; types are inferred per query.
    #[default]
    Schemaless,
}

/// Configuration for a collection. Immutable once the collection exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Dimensionality of embeddings.
    pub dimension: usize,
    /// Distance metric.
    pub metric: DistanceMetric,
    pub metadata_mode: MetadataMode,
    /// Declared columns; empty unless `metadata_mode` is structured.
    #[serde(default)]
    pub schema: Schema,
}

impl CollectionConfig {
    /// Creates a schemaless config with the given dimension and metric.
    pub fn new(dimension: usize, metric: DistanceMetric) -> Self {
        Self {
            dimension,
            metric,
            metadata_mode: MetadataMode::Schemaless,
            schema: Schema::new(),
        }
    }

    /// Creates a structured config with the given typed columns.
    pub fn structured(dimension: usize, metric: DistanceMetric, schema: Schema) -> Self {
        Self {
            dimension,
            metric,
            metadata_mode: MetadataMode::Structured,
            schema,
        }
    }

    /// Declares a column, switching the config to structured mode. Chainable.
    pub fn with_column(mut self, name: impl Into<String>, value_type: ValueType) -> Self {
        self.metadata_mode = MetadataMode::Structured;
        self.schema.insert(name.into(), value_type);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::InvalidArgument(
                "dimension must be at least 1".to_string(),
            ));
        }
        match self.metadata_mode {
            MetadataMode::Structured if self.schema.is_empty() => Err(Error::InvalidArgument(
                "structured collections need at least one declared column".to_string(),
            )),
            MetadataMode::Schemaless if !self.schema.is_empty() => Err(Error::InvalidArgument(
                "schemaless collections cannot declare columns".to_string(),
            )),
            _ if self.schema.keys().any(String::is_empty) => Err(Error::InvalidArgument(
                "column names must not be empty".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Fails with [`Error::DimensionMismatch`] unless `len` equals the dimension.
    #[inline]
    pub fn check_dimension(&self, len: usize) -> Result<()> {
        if len == self.dimension {
            Ok(())
        } else {
            Err(Error::DimensionMismatch {
                expected: self.dimension,
                got: len,
            })
        }
    }

    /// Checks document metadata against the schema of a structured collection.
    /// Undeclared keys and values of the wrong type are rejected; `null` is
    /// accepted for any column.
    pub fn check_metadata(&self, metadata: &Metadata) -> Result<()> {
        if self.metadata_mode == MetadataMode::Schemaless {
            return Ok(());
        }
        for (key, value) in metadata.iter() {
            let declared = self.schema.get(key).ok_or_else(|| {
                Error::InvalidArgument(format!("metadata field `{key}` is not a declared column"))
            })?;
            if !value.is_null() && ValueType::of(value) != Some(*declared) {
                return Err(Error::InvalidArgument(format!(
                    "metadata field `{key}` must be {declared}, got {}",
                    describe(value)
                )));
            }
        }
        Ok(())
    }
}

fn describe(value: &Value) -> String {
    match ValueType::of(value) {
        Some(t) => t.to_string(),
        None if value.is_array() => "sequence".to_string(),
        None => "mapping".to_string(),
    }
}

/// A named collection as listed by the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    #[serde(flatten)]
    pub config: CollectionConfig,
}

/// Registry slot. A name is reserved while its backend table is being
/// created or dropped so that concurrent lifecycle calls see it.
#[derive(Debug, Clone)]
enum Slot {
    Reserved,
    Ready(Arc<CollectionConfig>),
}

/// Owns the set of collections and their backing tables.
pub struct CollectionManager {
    backend: Arc<dyn StorageBackend>,
    collections: RwLock<HashMap<String, Slot>>,
}

impl CollectionManager {
    /// Creates a manager, loading the collections the backend already holds.
    pub fn open(backend: Arc<dyn StorageBackend>) -> Result<Self> {
        let tables = backend.list_tables()?;
        let collections = tables
            .into_iter()
            .map(|spec| (spec.name, Slot::Ready(Arc::new(spec.config))))
            .collect::<HashMap<_, _>>();
        if !collections.is_empty() {
            info!(count = collections.len(), "loaded collections");
        }

        Ok(Self {
            backend,
            collections: RwLock::new(collections),
        })
    }

    /// Returns the backend the collections live in.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Creates a collection.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyExists`] if the name is taken or another create or
    /// remove of it is in flight, [`Error::InvalidArgument`] for an empty
    /// name or an invalid config.
    pub fn create(&self, name: &str, config: CollectionConfig) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidArgument(
                "collection name must not be empty".to_string(),
            ));
        }
        config.validate()?;

        {
            let mut collections = self.collections.write();
            if collections.contains_key(name) {
                return Err(Error::AlreadyExists(name.to_string()));
            }
            collections.insert(name.to_string(), Slot::Reserved);
        }

        let spec = TableSpec {
            name: name.to_string(),
            config,
        };
        if let Err(e) = self.backend.create_table(&spec) {
            self.collections.write().remove(name);
            return Err(match e {
                BackendError::TableExists(_) => Error::AlreadyExists(spec.name),
                e => e.into(),
            });
        }

        info!(
            collection = name,
            dimension = spec.config.dimension,
            metric = %spec.config.metric,
            mode = ?spec.config.metadata_mode,
            "created collection"
        );
        self.collections
            .write()
            .insert(spec.name, Slot::Ready(Arc::new(spec.config)));
        Ok(())
    }

    /// Drops a collection and all its documents. Returns false if it did not
    /// exist, or if a create or remove of the same name is still in flight.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let config = {
            let mut collections = self.collections.write();
            let config = match collections.get(name) {
                Some(Slot::Ready(config)) => Arc::clone(config),
                Some(Slot::Reserved) | None => return Ok(false),
            };
            collections.insert(name.to_string(), Slot::Reserved);
            config
        };

        match self.backend.drop_table(name) {
            Ok(_) | Err(BackendError::TableNotFound(_)) => {}
            Err(e) => {
                self.collections
                    .write()
                    .insert(name.to_string(), Slot::Ready(config));
                return Err(e.into());
            }
        }

        self.collections.write().remove(name);
        info!(collection = name, "dropped collection");
        Ok(true)
    }

    /// Looks a collection up by name.
    pub fn get(&self, name: &str) -> Result<Arc<CollectionConfig>> {
        match self.collections.read().get(name) {
            Some(Slot::Ready(config)) => Ok(Arc::clone(config)),
            _ => Err(Error::NotFound(name.to_string())),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        matches!(self.collections.read().get(name), Some(Slot::Ready(_)))
    }

    /// Lists collections sorted by name.
    pub fn list(&self) -> Vec<CollectionInfo> {
        let mut infos: Vec<CollectionInfo> = self
            .collections
            .read()
            .iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Ready(config) => Some(CollectionInfo {
                    name: name.clone(),
                    config: config.as_ref().clone(),
                }),
                Slot::Reserved => None,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

impl std::fmt::Debug for CollectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionManager")
            .field("collections", &self.collections.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, MemoryBackend, QueryRow, RowSelector, VectorQuery};
    use crate::document::{DocumentId, StoredDocument};
    use crate::filter::QueryCondition;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::mpsc;
    use std::thread;

    fn manager() -> CollectionManager {
        CollectionManager::open(Arc::new(MemoryBackend::new())).unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let m = manager();
        m.create("docs", CollectionConfig::new(3, DistanceMetric::Cosine))
            .unwrap();

        let config = m.get("docs").unwrap();
        assert_eq!(config.dimension, 3);
        assert_eq!(config.metric, DistanceMetric::Cosine);
        assert_eq!(config.metadata_mode, MetadataMode::Schemaless);
    }

    #[test]
    fn test_create_duplicate_fails() {
        let m = manager();
        let config = CollectionConfig::new(3, DistanceMetric::Cosine);
        m.create("docs", config.clone()).unwrap();
        assert!(matches!(
            m.create("docs", config),
            Err(Error::AlreadyExists(name)) if name == "docs"
        ));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let m = manager();
        m.create("docs", CollectionConfig::new(3, DistanceMetric::Cosine))
            .unwrap();

        assert!(m.remove("docs").unwrap());
        assert!(!m.remove("docs").unwrap());
        assert!(!m.remove("never-existed").unwrap());
        assert!(matches!(m.get("docs"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_recreate_after_drop() {
        let m = manager();
        m.create("docs", CollectionConfig::new(3, DistanceMetric::Cosine))
            .unwrap();
        m.remove("docs").unwrap();
        m.create("docs", CollectionConfig::new(5, DistanceMetric::Euclidean))
            .unwrap();
        assert_eq!(m.get("docs").unwrap().dimension, 5);
    }

    #[test]
    fn test_invalid_configs() {
        let m = manager();
        assert!(matches!(
            m.create("a", CollectionConfig::new(0, DistanceMetric::Cosine)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            m.create("", CollectionConfig::new(3, DistanceMetric::Cosine)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            m.create(
                "b",
                CollectionConfig::structured(3, DistanceMetric::Cosine, Schema::new())
            ),
            Err(Error::InvalidArgument(_))
        ));
        assert!(m.list().is_empty());
    }

    #[test]
    fn test_list_sorted() {
        let m = manager();
        for name in ["zeta", "alpha", "mid"] {
            m.create(name, CollectionConfig::new(2, DistanceMetric::Cosine))
                .unwrap();
        }
        let names: Vec<String> = m.list().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_structured_metadata_checks() {
        let config = CollectionConfig::new(2, DistanceMetric::Cosine)
            .with_column("topic", ValueType::Text)
            .with_column("price", ValueType::Number);
        assert!(config.validate().is_ok());

        let undeclared =
            Metadata::try_from(json!({"topic": "x", "price": 3, "price_old": null})).unwrap();
        assert!(config.check_metadata(&undeclared).is_err());

        let ok = Metadata::try_from(json!({"topic": "x", "price": null})).unwrap();
        assert!(config.check_metadata(&ok).is_ok());

        let wrong = Metadata::try_from(json!({"price": "3"})).unwrap();
        assert!(matches!(
            config.check_metadata(&wrong),
            Err(Error::InvalidArgument(msg)) if msg.contains("price")
        ));
    }

    #[test]
    fn test_reopen_loads_existing_collections() {
        let backend: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new());
        {
            let m = CollectionManager::open(Arc::clone(&backend)).unwrap();
            m.create("docs", CollectionConfig::new(4, DistanceMetric::InnerProduct))
                .unwrap();
        }
        let m = CollectionManager::open(backend).unwrap();
        assert_eq!(m.get("docs").unwrap().metric, DistanceMetric::InnerProduct);
    }

    /// Pauses `create_table` until the test releases it.
    struct GatedBackend {
        inner: MemoryBackend,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl StorageBackend for GatedBackend {
        fn create_table(&self, spec: &TableSpec) -> BackendResult<()> {
            self.entered.lock().send(()).unwrap();
            self.release.lock().recv().unwrap();
            self.inner.create_table(spec)
        }

        fn drop_table(&self, name: &str) -> BackendResult<bool> {
            self.inner.drop_table(name)
        }

        fn list_tables(&self) -> BackendResult<Vec<TableSpec>> {
            self.inner.list_tables()
        }

        fn execute_query(&self, table: &str, query: &VectorQuery) -> BackendResult<Vec<QueryRow>> {
            self.inner.execute_query(table, query)
        }

        fn fetch_rows(
            &self,
            table: &str,
            ids: &[DocumentId],
        ) -> BackendResult<Vec<StoredDocument>> {
            self.inner.fetch_rows(table, ids)
        }

        fn upsert_rows(&self, table: &str, rows: Vec<StoredDocument>) -> BackendResult<usize> {
            self.inner.upsert_rows(table, rows)
        }

        fn delete_rows(&self, table: &str, selector: &RowSelector) -> BackendResult<usize> {
            self.inner.delete_rows(table, selector)
        }

        fn count_rows(&self, table: &str, condition: &QueryCondition) -> BackendResult<usize> {
            self.inner.count_rows(table, condition)
        }
    }

    #[test]
    fn test_remove_during_create_leaves_consistent_state() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let backend = Arc::new(GatedBackend {
            inner: MemoryBackend::new(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let m = Arc::new(CollectionManager::open(backend.clone()).unwrap());

        let creator = {
            let m = Arc::clone(&m);
            thread::spawn(move || m.create("docs", CollectionConfig::new(3, DistanceMetric::Cosine)))
        };
        entered_rx.recv().unwrap();

        // the name is reserved but not yet visible
        assert!(matches!(m.get("docs"), Err(Error::NotFound(_))));
        assert!(m.list().is_empty());
        assert!(matches!(
            m.create("docs", CollectionConfig::new(3, DistanceMetric::Cosine)),
            Err(Error::AlreadyExists(_))
        ));
        assert!(!m.remove("docs").unwrap());

        release_tx.send(()).unwrap();
        creator.join().unwrap().unwrap();

        assert_eq!(m.get("docs").unwrap().dimension, 3);
        assert_eq!(backend.list_tables().unwrap().len(), 1);

        assert!(m.remove("docs").unwrap());
        assert!(backend.list_tables().unwrap().is_empty());

        let recreate = {
            let m = Arc::clone(&m);
            thread::spawn(move || m.create("docs", CollectionConfig::new(2, DistanceMetric::Cosine)))
        };
        entered_rx.recv().unwrap();
        release_tx.send(()).unwrap();
        recreate.join().unwrap().unwrap();
        assert_eq!(m.get("docs").unwrap().dimension, 2);
    }
}
