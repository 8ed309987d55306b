//! Scoping fields: the `scope` / `username` / `document_name` metadata that
//! partitions documents between knowledge bases and users.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::filter::Filter;

/// Metadata key holding the knowledge-base scope.
pub const SCOPE_FIELD: &str = "scope";
/// Metadata key holding the owning user.
pub const USER_FIELD: &str = "username";
/// Metadata key holding the source document name.
pub const DOCUMENT_NAME_FIELD: &str = "document_name";

/// Optional scoping constraints. Each present field becomes an `$eq`
/// constraint; together they form an implicit `$and`.
///
/// # Example
///
/// ```
/// use ragstore_core::filter::ScopeFilter;
/// use serde_json::json;
///
/// let scope = ScopeFilter::default().scope("handbook").user("alice");
/// assert_eq!(
///     scope.to_expression(),
///     json!({"scope": {"$eq": "handbook"}, "username": {"$eq": "alice"}})
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeFilter {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub document_name: Option<String>,
}

impl ScopeFilter {
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn document_name(mut self, name: impl Into<String>) -> Self {
        self.document_name = Some(name.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.scope.is_none() && self.user.is_none() && self.document_name.is_none()
    }

    /// Builds the filter expression. With no fields set this is `{}`,
    /// which compiles to always-true.
    pub fn to_expression(&self) -> Value {
        let mut map = Map::new();
        for (field, value) in [
            (SCOPE_FIELD, &self.scope),
            (USER_FIELD, &self.user),
            (DOCUMENT_NAME_FIELD, &self.document_name),
        ] {
            if let Some(value) = value {
                map.insert(field.to_string(), json!({ "$eq": value }));
            }
        }
        Value::Object(map)
    }

    /// Returns `None` when no scoping field is set.
    pub fn to_filter(&self) -> Option<Filter> {
        (!self.is_empty()).then(|| Filter::from_json(self.to_expression()))
    }
}
