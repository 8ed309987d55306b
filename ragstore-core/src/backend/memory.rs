//! In-memory backend with exact (brute-force) ranking.
//!
//! Every query scans the table: O(n) per search with 100% recall. Rows are
//! held as `Arc<StoredDocument>` so a query clones the row handles under a
//! short read lock and filters and ranks outside it; a writer swaps whole
//! rows, so readers never observe a partially written document.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{cmp_ranked, BackendResult, QueryRow, RowSelector, StorageBackend, TableSpec, VectorQuery};
use crate::document::{DocumentId, StoredDocument};
use crate::error::BackendError;
use crate::filter::{QueryCondition, RowMatcher};

#[derive(Debug)]
struct Table {
    spec: TableSpec,
    rows: RwLock<HashMap<DocumentId, Arc<StoredDocument>>>,
}

impl Table {
    fn new(spec: TableSpec) -> Self {
        Self {
            spec,
            rows: RwLock::new(HashMap::new()),
        }
    }

    fn snapshot(&self) -> Vec<Arc<StoredDocument>> {
        self.rows.read().values().cloned().collect()
    }
}

/// A table and its rows, as written to a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TableDump {
    pub spec: TableSpec,
    pub rows: Vec<StoredDocument>,
}

/// Backend keeping all tables in process memory.
///
/// # Example
///
/// ```
/// use ragstore_core::backend::{MemoryBackend, StorageBackend, TableSpec, VectorQuery};
/// use ragstore_core::filter::QueryCondition;
/// use ragstore_core::{CollectionConfig, DistanceMetric, DocumentId, Metadata, StoredDocument};
///
/// let backend = MemoryBackend::new();
/// backend
///     .create_table(&TableSpec {
///         name: "docs".into(),
///         config: CollectionConfig::new(2, DistanceMetric::Euclidean),
///     })
///     .unwrap();
///
/// let row = |id: &str, embedding: Vec<f32>| StoredDocument {
///     id: DocumentId::from(id),
///     content: String::new(),
///     embedding,
///     metadata: Metadata::new(),
/// };
/// backend
///     .upsert_rows("docs", vec![row("far", vec![5.0, 5.0]), row("near", vec![1.0, 0.0])])
///     .unwrap();
///
/// let query = VectorQuery::nearest(
///     QueryCondition::always(),
///     vec![0.0, 0.0],
///     DistanceMetric::Euclidean,
///     1,
/// );
/// let rows = backend.execute_query("docs", &query).unwrap();
/// assert_eq!(rows[0].document.id.as_str(), "near");
/// assert_eq!(rows[0].distance, Some(1.0));
/// ```
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Arc<Table>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, name: &str) -> BackendResult<Arc<Table>> {
        self.tables
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::TableNotFound(name.to_string()))
    }

    /// Spec of an existing table.
    pub(crate) fn spec(&self, name: &str) -> BackendResult<TableSpec> {
        Ok(self.table(name)?.spec.clone())
    }

    /// Rows of `table` that satisfy `condition`.
    fn matching(table: &Table, condition: &QueryCondition) -> BackendResult<Vec<Arc<StoredDocument>>> {
        let matcher = matcher(condition)?;
        let mut rows = table.snapshot();
        rows.retain(|row| matcher.matches(&row.metadata));
        Ok(rows)
    }

    /// Copies every table and its rows.
    pub(crate) fn dump(&self) -> Vec<TableDump> {
        let tables: Vec<Arc<Table>> = self.tables.read().values().cloned().collect();
        let mut dumps: Vec<TableDump> = tables
            .iter()
            .map(|table| {
                let mut rows: Vec<StoredDocument> =
                    table.snapshot().iter().map(|r| r.as_ref().clone()).collect();
                rows.sort_by(|a, b| a.id.cmp(&b.id));
                TableDump {
                    spec: table.spec.clone(),
                    rows,
                }
            })
            .collect();
        dumps.sort_by(|a, b| a.spec.name.cmp(&b.spec.name));
        dumps
    }

    /// Builds a backend holding the dumped tables.
    pub(crate) fn restore(dumps: Vec<TableDump>) -> Self {
        let tables = dumps
            .into_iter()
            .map(|dump| {
                let rows = dump
                    .rows
                    .into_iter()
                    .map(|row| (row.id.clone(), Arc::new(row)))
                    .collect();
                let table = Table {
                    spec: dump.spec,
                    rows: RwLock::new(rows),
                };
                (table.spec.name.clone(), Arc::new(table))
            })
            .collect();
        Self {
            tables: RwLock::new(tables),
        }
    }
}

fn matcher(condition: &QueryCondition) -> BackendResult<RowMatcher<'_>> {
    condition
        .matcher()
        .map_err(|e| BackendError::InvalidQuery(e.to_string()))
}

/// Fails unless every row's embedding matches the table dimension.
pub(crate) fn check_dimensions(spec: &TableSpec, rows: &[StoredDocument]) -> BackendResult<()> {
    let dimension = spec.config.dimension;
    match rows.iter().find(|r| r.embedding.len() != dimension) {
        Some(bad) => Err(BackendError::InvalidQuery(format!(
            "row `{}` has {} dimensions, table `{}` has {dimension}",
            bad.id,
            bad.embedding.len(),
            spec.name
        ))),
        None => Ok(()),
    }
}

impl StorageBackend for MemoryBackend {
    fn create_table(&self, spec: &TableSpec) -> BackendResult<()> {
        let mut tables = self.tables.write();
        if tables.contains_key(&spec.name) {
            return Err(BackendError::TableExists(spec.name.clone()));
        }
        tables.insert(spec.name.clone(), Arc::new(Table::new(spec.clone())));
        Ok(())
    }

    fn drop_table(&self, name: &str) -> BackendResult<bool> {
        Ok(self.tables.write().remove(name).is_some())
    }

    fn list_tables(&self) -> BackendResult<Vec<TableSpec>> {
        let mut specs: Vec<TableSpec> = self
            .tables
            .read()
            .values()
            .map(|t| t.spec.clone())
            .collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specs)
    }

    fn execute_query(&self, table: &str, query: &VectorQuery) -> BackendResult<Vec<QueryRow>> {
        let table = self.table(table)?;
        let rows = Self::matching(&table, &query.condition)?;

        let Some(order) = &query.order_by else {
            let mut rows = rows;
            rows.sort_by(|a, b| a.id.cmp(&b.id));
            if let Some(limit) = query.limit {
                rows.truncate(limit);
            }
            return Ok(rows
                .into_iter()
                .map(|row| QueryRow {
                    document: row.as_ref().clone(),
                    distance: None,
                })
                .collect());
        };

        if order.vector.len() != table.spec.config.dimension {
            return Err(BackendError::InvalidQuery(format!(
                "query vector has {} dimensions, table `{}` has {}",
                order.vector.len(),
                table.spec.name,
                table.spec.config.dimension
            )));
        }

        let mut ranked: Vec<(f32, Arc<StoredDocument>)> = rows
            .into_iter()
            .map(|row| (order.metric.compute(&order.vector, &row.embedding), row))
            .collect();

        let by_rank = |a: &(f32, Arc<StoredDocument>), b: &(f32, Arc<StoredDocument>)| {
            cmp_ranked((a.0, &a.1.id), (b.0, &b.1.id))
        };
        if let Some(limit) = query.limit {
            if limit < ranked.len() {
                // partition so only the kept prefix needs a full sort
                ranked.select_nth_unstable_by(limit, by_rank);
                ranked.truncate(limit);
            }
        }
        ranked.sort_by(by_rank);

        Ok(ranked
            .into_iter()
            .map(|(distance, row)| QueryRow {
                document: row.as_ref().clone(),
                distance: Some(distance),
            })
            .collect())
    }

    fn fetch_rows(&self, table: &str, ids: &[DocumentId]) -> BackendResult<Vec<StoredDocument>> {
        let table = self.table(table)?;
        let rows = table.rows.read();
        let mut seen = HashSet::with_capacity(ids.len());
        Ok(ids
            .iter()
            .filter(|id| seen.insert(*id))
            .filter_map(|id| rows.get(id))
            .map(|row| row.as_ref().clone())
            .collect())
    }

    fn upsert_rows(&self, table: &str, rows: Vec<StoredDocument>) -> BackendResult<usize> {
        let table = self.table(table)?;
        check_dimensions(&table.spec, &rows)?;

        let count = rows.len();
        let mut stored = table.rows.write();
        for row in rows {
            stored.insert(row.id.clone(), Arc::new(row));
        }
        Ok(count)
    }

    fn delete_rows(&self, table: &str, selector: &RowSelector) -> BackendResult<usize> {
        let table = self.table(table)?;
        match selector {
            RowSelector::Ids(ids) => {
                let mut rows = table.rows.write();
                Ok(ids.iter().filter(|id| rows.remove(*id).is_some()).count())
            }
            RowSelector::Condition(condition) => {
                let matcher = matcher(condition)?;
                let mut rows = table.rows.write();
                let before = rows.len();
                rows.retain(|_, row| !matcher.matches(&row.metadata));
                Ok(before - rows.len())
            }
        }
    }

    fn count_rows(&self, table: &str, condition: &QueryCondition) -> BackendResult<usize> {
        let table = self.table(table)?;
        if matches!(condition.condition, crate::filter::Condition::True) {
            return Ok(table.rows.read().len());
        }
        Ok(Self::matching(&table, condition)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MetadataMode;
    use crate::distance::DistanceMetric;
    use crate::filter::{compile, to_query_condition};
    use crate::metadata::Metadata;
    use crate::CollectionConfig;
    use serde_json::json;

    fn row(id: &str, embedding: Vec<f32>, metadata: serde_json::Value) -> StoredDocument {
        StoredDocument {
            id: DocumentId::from(id),
            content: format!("content of {id}"),
            embedding,
            metadata: Metadata::try_from(metadata).unwrap(),
        }
    }

    fn backend_with_rows() -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend
            .create_table(&TableSpec {
                name: "docs".into(),
                config: CollectionConfig::new(3, DistanceMetric::Cosine),
            })
            .unwrap();
        backend
            .upsert_rows(
                "docs",
                vec![
                    row("1", vec![1.0, 0.0, 0.0], json!({"topic": "x"})),
                    row("2", vec![0.0, 1.0, 0.0], json!({"topic": "y"})),
                    row("3", vec![0.9, 0.1, 0.0], json!({"topic": "x"})),
                ],
            )
            .unwrap();
        backend
    }

    fn condition(expr: serde_json::Value) -> QueryCondition {
        to_query_condition(&compile(&expr).unwrap(), MetadataMode::Schemaless)
    }

    #[test]
    fn test_create_table_twice() {
        let backend = backend_with_rows();
        let err = backend
            .create_table(&TableSpec {
                name: "docs".into(),
                config: CollectionConfig::new(3, DistanceMetric::Cosine),
            })
            .unwrap_err();
        assert!(matches!(err, BackendError::TableExists(_)));
    }

    #[test]
    fn test_filter_then_rank() {
        let backend = backend_with_rows();
        let query = VectorQuery::nearest(
            condition(json!({"topic": {"$eq": "x"}})),
            vec![1.0, 0.0, 0.0],
            DistanceMetric::Cosine,
            2,
        );
        let rows = backend.execute_query("docs", &query).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert!(rows[0].distance.unwrap() < rows[1].distance.unwrap());
    }

    #[test]
    fn test_limit_larger_than_matches() {
        let backend = backend_with_rows();
        let query = VectorQuery::nearest(
            condition(json!({"topic": "y"})),
            vec![1.0, 0.0, 0.0],
            DistanceMetric::Cosine,
            10,
        );
        assert_eq!(backend.execute_query("docs", &query).unwrap().len(), 1);
    }

    #[test]
    fn test_ties_break_by_id() {
        let backend = MemoryBackend::new();
        backend
            .create_table(&TableSpec {
                name: "t".into(),
                config: CollectionConfig::new(2, DistanceMetric::Euclidean),
            })
            .unwrap();
        backend
            .upsert_rows(
                "t",
                vec![
                    row("c", vec![1.0, 0.0], json!({})),
                    row("a", vec![0.0, 1.0], json!({})),
                    row("b", vec![-1.0, 0.0], json!({})),
                ],
            )
            .unwrap();

        let query =
            VectorQuery::nearest(QueryCondition::always(), vec![0.0, 0.0], DistanceMetric::Euclidean, 2);
        let rows = backend.execute_query("t", &query).unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.document.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_wrong_query_dimension() {
        let backend = backend_with_rows();
        let query =
            VectorQuery::nearest(QueryCondition::always(), vec![1.0], DistanceMetric::Cosine, 1);
        assert!(matches!(
            backend.execute_query("docs", &query),
            Err(BackendError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_upsert_replaces_row() {
        let backend = backend_with_rows();
        backend
            .upsert_rows("docs", vec![row("1", vec![0.0, 0.0, 1.0], json!({"topic": "z"}))])
            .unwrap();

        let rows = backend.fetch_rows("docs", &[DocumentId::from("1")]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].embedding, vec![0.0, 0.0, 1.0]);
        assert_eq!(rows[0].metadata.get_str("topic"), Some("z"));
        assert_eq!(backend.count_rows("docs", &QueryCondition::always()).unwrap(), 3);
    }

    #[test]
    fn test_fetch_skips_missing() {
        let backend = backend_with_rows();
        let rows = backend
            .fetch_rows("docs", &[DocumentId::from("2"), DocumentId::from("nope")])
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_fetch_returns_each_row_once() {
        let backend = backend_with_rows();
        let two = DocumentId::from("2");
        let rows = backend
            .fetch_rows("docs", &[two.clone(), DocumentId::from("1"), two.clone()])
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[test]
    fn test_delete_by_ids_and_condition() {
        let backend = backend_with_rows();
        let removed = backend
            .delete_rows(
                "docs",
                &RowSelector::Ids(vec![DocumentId::from("2"), DocumentId::from("missing")]),
            )
            .unwrap();
        assert_eq!(removed, 1);

        let removed = backend
            .delete_rows("docs", &RowSelector::Condition(condition(json!({"topic": "x"}))))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(backend.count_rows("docs", &QueryCondition::always()).unwrap(), 0);
    }

    #[test]
    fn test_unknown_table() {
        let backend = MemoryBackend::new();
        assert!(matches!(
            backend.fetch_rows("nope", &[]),
            Err(BackendError::TableNotFound(_))
        ));
        assert!(!backend.drop_table("nope").unwrap());
    }

    #[test]
    fn test_dump_and_restore() {
        let backend = backend_with_rows();
        let restored = MemoryBackend::restore(backend.dump());

        assert_eq!(restored.list_tables().unwrap(), backend.list_tables().unwrap());
        assert_eq!(
            restored.count_rows("docs", &QueryCondition::always()).unwrap(),
            3
        );
    }
}
