//! The compiled, validated form of a filter expression.
//!
//! A [`Predicate`] is produced only by the [`FilterCompiler`](super::FilterCompiler):
//! every leaf carries a concrete field, operator, and an operand whose type
//! has already been checked.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Value types a metadata field can be compared as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Text,
    Number,
    Boolean,
}

impl ValueType {
    /// Returns the type of a scalar JSON value, `None` for null, arrays and objects.
    pub fn of(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(ValueType::Text),
            Value::Number(_) => Some(ValueType::Number),
            Value::Bool(_) => Some(ValueType::Boolean),
            _ => None,
        }
    }

    /// True for types that support `$lt`, `$gt`, `$between` and friends.
    #[inline]
    pub fn is_ordered(&self) -> bool {
        matches!(self, ValueType::Text | ValueType::Number)
    }

    /// Casts a stored value to this type, the way a `->>` extraction followed
    /// by a cast behaves. Values that do not cast yield `None` (SQL `NULL`).
    pub fn cast(&self, value: &Value) -> Option<Scalar> {
        match (self, value) {
            (ValueType::Text, Value::String(s)) => Some(Scalar::Text(s.clone())),
            (ValueType::Text, Value::Number(n)) => Some(Scalar::Text(n.to_string())),
            (ValueType::Text, Value::Bool(b)) => Some(Scalar::Text(b.to_string())),
            (ValueType::Number, Value::Number(n)) => n.as_f64().map(Scalar::Number),
            (ValueType::Number, Value::String(s)) => {
                s.trim().parse::<f64>().ok().map(Scalar::Number)
            }
            (ValueType::Boolean, Value::Bool(b)) => Some(Scalar::Boolean(*b)),
            (ValueType::Boolean, Value::String(s)) => match s.as_str() {
                "true" => Some(Scalar::Boolean(true)),
                "false" => Some(Scalar::Boolean(false)),
                _ => None,
            },
            _ => None,
        }
    }

    /// SQL type name used when lowering schemaless field access.
    pub fn sql_cast(&self) -> &'static str {
        match self {
            ValueType::Text => "text",
            ValueType::Number => "numeric",
            ValueType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Text => f.write_str("text"),
            ValueType::Number => f.write_str("number"),
            ValueType::Boolean => f.write_str("boolean"),
        }
    }
}

/// A typed scalar operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Number(f64),
    Boolean(bool),
}

impl Scalar {
    /// Converts a JSON scalar. Returns `None` for null, arrays and objects.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Number(n) => n.as_f64().map(Scalar::Number),
            Value::Bool(b) => Some(Scalar::Boolean(*b)),
            _ => None,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Scalar::Text(_) => ValueType::Text,
            Scalar::Number(_) => ValueType::Number,
            Scalar::Boolean(_) => ValueType::Boolean,
        }
    }

    /// Converts back to JSON for use as a bound parameter.
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Text(s) => Value::String(s.clone()),
            Scalar::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
            Scalar::Boolean(b) => Value::Bool(*b),
        }
    }

    /// Compares two scalars of the same type. Mixed types are incomparable.
    pub fn compare(&self, other: &Scalar) -> Option<Ordering> {
        match (self, other) {
            (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
            (Scalar::Number(a), Scalar::Number(b)) => a.partial_cmp(b),
            (Scalar::Boolean(a), Scalar::Boolean(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Comparison operators accepted in filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Nin,
    Between,
    Like,
    ILike,
}

impl Operator {
    /// Parses a `$`-prefixed operator key.
    pub fn parse(key: &str) -> Option<Self> {
        Some(match key {
            "$eq" => Operator::Eq,
            "$ne" => Operator::Ne,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$in" => Operator::In,
            "$nin" => Operator::Nin,
            "$between" => Operator::Between,
            "$like" => Operator::Like,
            "$ilike" => Operator::ILike,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Between => "$between",
            Operator::Like => "$like",
            Operator::ILike => "$ilike",
        }
    }

    /// True for `$lt`, `$lte`, `$gt`, `$gte` and `$between`.
    pub fn requires_order(&self) -> bool {
        matches!(
            self,
            Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte | Operator::Between
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The checked operand of a comparison. Its shape always agrees with the operator.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// `$eq`, `$ne`, `$lt`, `$lte`, `$gt`, `$gte`
    Scalar(Scalar),
    /// `$in`, `$nin`
    List(Vec<Scalar>),
    /// `$between` (inclusive)
    Range(Scalar, Scalar),
    /// `$like`, `$ilike`
    Pattern(String),
}

/// A leaf comparison bound to one field.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub field: String,
    pub op: Operator,
    pub operand: Operand,
    /// Declared (structured) or inferred (schemaless) type of the field.
    pub value_type: ValueType,
}

/// A compiled predicate tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Compare(Comparison),
    /// Conjunction. Empty means always true.
    And(Vec<Predicate>),
    /// Disjunction. Empty means always false.
    Or(Vec<Predicate>),
}

impl Predicate {
    /// The predicate that matches every document.
    pub fn always() -> Self {
        Predicate::And(Vec::new())
    }

    /// Returns the field names referenced by the tree, in traversal order.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Predicate::Compare(c) => out.push(&c.field),
            Predicate::And(children) | Predicate::Or(children) => {
                for child in children {
                    child.collect_fields(out);
                }
            }
        }
    }
}
