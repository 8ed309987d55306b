//! The storage backend contract.
//!
//! The document store and search engine never touch rows directly; they
//! hand a [`QueryCondition`] (plus ordering and limit) to a
//! [`StorageBackend`] and receive rows with computed distances back. Any
//! vector-capable engine can sit behind the trait. Two implementations ship
//! with the crate:
//!
//! - [`MemoryBackend`]: tables held in memory, evaluated with the same
//!   condition tree a SQL backend would receive.
//! - [`DurableBackend`]: the memory backend made crash-safe with a
//!   write-ahead log and checkpoint snapshots.

mod durable;
mod memory;
pub mod wal;

pub use durable::DurableBackend;
pub use memory::MemoryBackend;

use std::cmp::Ordering;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::collection::CollectionConfig;
use crate::distance::DistanceMetric;
use crate::document::{DocumentId, StoredDocument};
use crate::error::BackendError;
use crate::filter::QueryCondition;

/// Result type of backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// A table to create: one per collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub config: CollectionConfig,
}

/// Ranking clause of a [`VectorQuery`].
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub vector: Vec<f32>,
    pub metric: DistanceMetric,
}

/// One filtered, ranked and limited read.
///
/// Filtering and ranking happen in the same query: the limit applies to rows
/// that already satisfy the condition.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub condition: QueryCondition,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl VectorQuery {
    /// All rows matching `condition`, unordered.
    pub fn filter(condition: QueryCondition) -> Self {
        Self {
            condition,
            order_by: None,
            limit: None,
        }
    }

    /// The `limit` rows matching `condition` closest to `vector`.
    pub fn nearest(
        condition: QueryCondition,
        vector: Vec<f32>,
        metric: DistanceMetric,
        limit: usize,
    ) -> Self {
        Self {
            condition,
            order_by: Some(OrderBy { vector, metric }),
            limit: Some(limit),
        }
    }

    /// Renders the query as pgvector SQL against `table`.
    ///
    /// The query vector is bound as the parameter following the condition's
    /// parameters.
    ///
    /// # Example
    ///
    /// ```
    /// use ragstore_core::backend::VectorQuery;
    /// use ragstore_core::filter::{compile, to_query_condition};
    /// use ragstore_core::{DistanceMetric, MetadataMode};
    /// use serde_json::json;
    ///
    /// let predicate = compile(&json!({"topic": "x"})).unwrap();
    /// let condition = to_query_condition(&predicate, MetadataMode::Schemaless);
    /// let query = VectorQuery::nearest(condition, vec![1.0, 0.0], DistanceMetric::Cosine, 2);
    ///
    /// assert_eq!(
    ///     query.to_sql("docs"),
    ///     "SELECT id, content, embedding, metadata, embedding <=> $3 AS distance \
    ///      FROM \"docs\" WHERE (CASE WHEN jsonb_typeof(metadata -> $1) \
    ///      IN ('string', 'number', 'boolean') THEN metadata ->> $1 END) = $2 \
    ///      ORDER BY distance, id LIMIT 2"
    /// );
    /// ```
    pub fn to_sql(&self, table: &str) -> String {
        let mut sql = String::from("SELECT id, content, embedding, metadata");
        if let Some(order) = &self.order_by {
            let _ = write!(
                sql,
                ", embedding {} ${} AS distance",
                distance_operator(order.metric),
                self.condition.params.len() + 1
            );
        }
        let _ = write!(
            sql,
            " FROM \"{}\" WHERE {}",
            table.replace('"', "\"\""),
            self.condition.to_sql()
        );
        if self.order_by.is_some() {
            sql.push_str(" ORDER BY distance, id");
        }
        if let Some(limit) = self.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }
        sql
    }
}

/// pgvector operator computing the metric's distance.
fn distance_operator(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "<=>",
        DistanceMetric::InnerProduct => "<#>",
        DistanceMetric::Euclidean => "<->",
    }
}

/// A row returned by [`StorageBackend::execute_query`].
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRow {
    pub document: StoredDocument,
    /// Present when the query was ordered by a vector.
    pub distance: Option<f32>,
}

/// Which rows a delete applies to.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSelector {
    Ids(Vec<DocumentId>),
    Condition(QueryCondition),
}

/// A vector-capable table store.
///
/// Implementations must make each row write atomic: a reader sees either
/// the old or the new version of a row, never a mix.
pub trait StorageBackend: Send + Sync {
    /// Creates a table. Fails with [`BackendError::TableExists`] if the name is taken.
    fn create_table(&self, spec: &TableSpec) -> BackendResult<()>;

    /// Drops a table and its rows. Returns false if it did not exist.
    fn drop_table(&self, name: &str) -> BackendResult<bool>;

    /// Lists existing tables.
    fn list_tables(&self) -> BackendResult<Vec<TableSpec>>;

    /// Runs a filtered (and optionally ranked and limited) read.
    fn execute_query(&self, table: &str, query: &VectorQuery) -> BackendResult<Vec<QueryRow>>;

    /// Fetches rows by identity, skipping identities not present. Each stored
    /// row is returned at most once.
    fn fetch_rows(&self, table: &str, ids: &[DocumentId]) -> BackendResult<Vec<StoredDocument>>;

    /// Inserts or replaces rows keyed by identity. Returns the number written.
    fn upsert_rows(&self, table: &str, rows: Vec<StoredDocument>) -> BackendResult<usize>;

    /// Deletes the selected rows. Returns the number removed.
    fn delete_rows(&self, table: &str, selector: &RowSelector) -> BackendResult<usize>;

    /// Counts rows matching a condition.
    fn count_rows(&self, table: &str, condition: &QueryCondition) -> BackendResult<usize>;
}

/// Orders by distance ascending, then identity ascending. NaN distances sort last.
pub(crate) fn cmp_ranked(a: (f32, &DocumentId), b: (f32, &DocumentId)) -> Ordering {
    let by_distance = match (a.0.is_nan(), b.0.is_nan()) {
        (false, false) => a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (true, true) => Ordering::Equal,
    };
    by_distance.then_with(|| a.1.cmp(b.1))
}
