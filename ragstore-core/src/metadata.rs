//! Metadata attached to stored documents.
//!
//! Metadata is a flat mapping from string keys to JSON values (scalars or
//! arrays). Filters address metadata keys by name.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Metadata mapping attached to a document.
///
/// Keys are kept sorted so serialized metadata is stable.
///
/// # Example
///
/// ```
/// use ragstore_core::Metadata;
///
/// let meta = Metadata::new()
///     .with_field("scope", "handbook")
///     .with_field("page", 12)
///     .with_field("tags", vec!["hr", "policy"]);
///
/// assert_eq!(meta.get_str("scope"), Some("handbook"));
/// assert_eq!(meta.get_f64("page"), Some(12.0));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata {
    data: BTreeMap<String, Value>,
}

impl Metadata {
    /// Creates an empty metadata mapping.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
        }
    }

    /// Adds a field. Chainable.
    pub fn with_field<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Sets a field value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<Value>,
    {
        self.data.insert(key.into(), value.into());
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    #[inline]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    #[inline]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.data.get(key).and_then(|v| v.as_f64())
    }

    #[inline]
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.data.get(key).and_then(|v| v.as_bool())
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns an iterator over the fields in key order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }
}

/// Converts a JSON object into metadata. Non-objects are handed back unchanged.
impl TryFrom<Value> for Metadata {
    type Error = Value;

    fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self {
                data: map.into_iter().collect(),
            }),
            other => Err(other),
        }
    }
}

impl FromIterator<(String, Value)> for Metadata {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metadata_with_field() {
        let m = Metadata::new()
            .with_field("name", "test")
            .with_field("count", 42);

        assert_eq!(m.len(), 2);
        assert_eq!(m.get_str("name"), Some("test"));
        assert_eq!(m.get_f64("count"), Some(42.0));
    }

    #[test]
    fn test_metadata_set_overwrites() {
        let mut m = Metadata::new().with_field("key", "old");
        m.set("key", "new");
        assert_eq!(m.get_str("key"), Some("new"));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_metadata_from_json_object() {
        let m = Metadata::try_from(json!({"topic": "x", "draft": false})).unwrap();
        assert_eq!(m.get_str("topic"), Some("x"));
        assert_eq!(m.get_bool("draft"), Some(false));

        assert!(Metadata::try_from(json!([1, 2])).is_err());
    }

    #[test]
    fn test_metadata_serializes_as_plain_object() {
        let m = Metadata::new().with_field("b", 2).with_field("a", 1);
        assert_eq!(serde_json::to_string(&m).unwrap(), r#"{"a":1,"b":2}"#);
    }
}
