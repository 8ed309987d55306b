//! Filter expressions for metadata-constrained similarity search.
//!
//! Filters travel as JSON-compatible expressions (see [`compile`] for the
//! accepted shapes). [`Filter`] wraps such an expression and offers a
//! builder so callers do not have to write JSON by hand:
//!
//! ```
//! use ragstore_core::Filter;
//! use serde_json::json;
//!
//! let filter = Filter::field("topic")
//!     .eq("rust")
//!     .and(Filter::field("year").gte(2020));
//!
//! assert_eq!(
//!     filter.as_json(),
//!     &json!({"$and": [{"topic": {"$eq": "rust"}}, {"year": {"$gte": 2020}}]})
//! );
//! ```

pub mod compile;
pub mod condition;
pub mod pattern;
pub mod predicate;
pub mod scope;

pub use compile::{compile, FilterCompiler};
pub use condition::{to_query_condition, CompareOp, Condition, FieldRef, QueryCondition, RowMatcher};
pub use predicate::{Comparison, Operand, Operator, Predicate, Scalar, ValueType};
pub use scope::ScopeFilter;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::collection::CollectionConfig;

/// A filter expression in its wire form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(Value);

impl Filter {
    /// Starts a constraint on a single field.
    pub fn field(name: &str) -> FieldFilter {
        FieldFilter {
            field_name: name.to_string(),
        }
    }

    /// Wraps a raw JSON expression. Validation happens at compile time.
    pub fn from_json(expr: Value) -> Self {
        Self(expr)
    }

    /// Conjunction of this filter and another. Chained calls extend one `$and` node.
    pub fn and(self, other: Filter) -> Self {
        self.combine("$and", other)
    }

    /// Disjunction of this filter and another. Chained calls extend one `$or` node.
    pub fn or(self, other: Filter) -> Self {
        self.combine("$or", other)
    }

    /// Conjunction of all filters. An empty list matches everything.
    pub fn all(filters: impl IntoIterator<Item = Filter>) -> Self {
        let items: Vec<Value> = filters.into_iter().map(|f| f.0).collect();
        Self(json!({ "$and": items }))
    }

    /// Disjunction of all filters. An empty list matches nothing.
    pub fn any(filters: impl IntoIterator<Item = Filter>) -> Self {
        let items: Vec<Value> = filters.into_iter().map(|f| f.0).collect();
        Self(json!({ "$or": items }))
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }

    pub fn into_json(self) -> Value {
        self.0
    }

    /// Compiles against a schemaless collection.
    pub fn compile(&self) -> crate::Result<Predicate> {
        compile(&self.0)
    }

    /// Compiles against `config` and lowers to a backend condition.
    pub fn to_condition(&self, config: &CollectionConfig) -> crate::Result<QueryCondition> {
        let predicate = FilterCompiler::for_collection(config).compile(&self.0)?;
        Ok(to_query_condition(&predicate, config.metadata_mode))
    }

    /// Lowers an optional filter; `None` matches every row.
    pub(crate) fn condition_for(
        filter: Option<&Filter>,
        config: &CollectionConfig,
    ) -> crate::Result<QueryCondition> {
        match filter {
            Some(filter) => filter.to_condition(config),
            None => Ok(QueryCondition::always()),
        }
    }

    fn combine(self, key: &str, other: Filter) -> Self {
        let mut items = match self.0 {
            Value::Object(mut map) if map.len() == 1 && map.contains_key(key) => {
                match map.remove(key) {
                    Some(Value::Array(items)) => items,
                    Some(other) => vec![json!({ key: other })],
                    None => Vec::new(),
                }
            }
            lhs => vec![lhs],
        };
        items.push(other.0);
        Self(json!({ key: items }))
    }
}

impl From<Value> for Filter {
    fn from(expr: Value) -> Self {
        Self(expr)
    }
}

/// Builder for field-specific filter conditions.
#[derive(Debug)]
pub struct FieldFilter {
    field_name: String,
}

impl FieldFilter {
    fn op(self, op: &str, operand: Value) -> Filter {
        Filter(json!({ self.field_name: { op: operand } }))
    }

    pub fn eq<V: Into<Value>>(self, value: V) -> Filter {
        self.op("$eq", value.into())
    }

    pub fn ne<V: Into<Value>>(self, value: V) -> Filter {
        self.op("$ne", value.into())
    }

    pub fn gt<V: Into<Value>>(self, value: V) -> Filter {
        self.op("$gt", value.into())
    }

    pub fn gte<V: Into<Value>>(self, value: V) -> Filter {
        self.op("$gte", value.into())
    }

    pub fn lt<V: Into<Value>>(self, value: V) -> Filter {
        self.op("$lt", value.into())
    }

    pub fn lte<V: Into<Value>>(self, value: V) -> Filter {
        self.op("$lte", value.into())
    }

    /// Field value is in the given list.
    pub fn contained_in<V: Into<Value>>(self, values: Vec<V>) -> Filter {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.op("$in", Value::Array(values))
    }

    /// Field value is not in the given list (or the field is absent).
    pub fn not_in<V: Into<Value>>(self, values: Vec<V>) -> Filter {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.op("$nin", Value::Array(values))
    }

    /// Inclusive range `low <= field <= high`.
    pub fn between<V: Into<Value>>(self, low: V, high: V) -> Filter {
        self.op("$between", Value::Array(vec![low.into(), high.into()]))
    }

    /// Case-sensitive `LIKE` pattern with `%` and `_` wildcards.
    pub fn like(self, pattern: &str) -> Filter {
        self.op("$like", Value::String(pattern.to_string()))
    }

    /// Case-insensitive `LIKE` pattern.
    pub fn ilike(self, pattern: &str) -> Filter {
        self.op("$ilike", Value::String(pattern.to_string()))
    }
}
