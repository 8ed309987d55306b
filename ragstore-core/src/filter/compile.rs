//! Filter compiler: JSON filter expressions to [`Predicate`] trees.
//!
//! Accepted shapes:
//!
//! ```text
//! {"topic": "x"}                               bare scalar, defaults to $eq
//! {"price": {"$between": [10, 20]}}            field with a single operator
//! {"topic": "x", "year": {"$gte": 2020}}       several fields, implicit $and
//! {"$or": [{"topic": "x"}, {"topic": "y"}]}    logical node over sub-expressions
//! ```
//!
//! A field value that is a mapping whose sole key is a recognized operator
//! applies that operator. Any other field value is compared with `$eq`, which
//! then rejects non-scalar operands. A `$`-prefixed key that is not a
//! recognized operator is always an error.

use serde_json::{Map, Value};
use tracing::debug;

use crate::collection::{CollectionConfig, MetadataMode, Schema};
use crate::error::{Error, Result};
use crate::filter::pattern::compile_like;
use crate::filter::predicate::{Comparison, Operand, Operator, Predicate, Scalar, ValueType};

const AND: &str = "$and";
const OR: &str = "$or";

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidFilter(msg.into())
}

/// Compiles a filter expression for a schemaless collection.
///
/// Field types are inferred from the operands.
///
/// # Example
///
/// ```
/// use ragstore_core::filter::compile;
/// use serde_json::json;
///
/// let predicate = compile(&json!({"topic": "x", "year": {"$gte": 2020}})).unwrap();
/// assert_eq!(predicate.fields(), vec!["topic", "year"]);
///
/// assert!(compile(&json!({"topic": {"$regex": "x.*"}})).is_err());
/// ```
pub fn compile(expr: &Value) -> Result<Predicate> {
    FilterCompiler::schemaless().compile(expr)
}

/// Compiles filter expressions, checking field types against an optional schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterCompiler<'a> {
    schema: Option<&'a Schema>,
}

impl<'a> FilterCompiler<'a> {
    /// Compiler that infers field types from operands.
    pub fn schemaless() -> Self {
        Self { schema: None }
    }

    /// Compiler that only accepts declared fields with matching operand types.
    pub fn structured(schema: &'a Schema) -> Self {
        Self {
            schema: Some(schema),
        }
    }

    /// Compiler matching a collection's metadata mode.
    pub fn for_collection(config: &'a CollectionConfig) -> Self {
        match config.metadata_mode {
            MetadataMode::Structured => Self::structured(&config.schema),
            MetadataMode::Schemaless => Self::schemaless(),
        }
    }

    /// Compiles and validates a filter expression.
    pub fn compile(&self, expr: &Value) -> Result<Predicate> {
        let predicate = self.compile_expr(expr)?;
        debug!(fields = ?predicate.fields(), "compiled filter");
        Ok(predicate)
    }

    fn compile_expr(&self, expr: &Value) -> Result<Predicate> {
        let map = expr.as_object().ok_or_else(|| {
            invalid(format!(
                "filter expression must be a mapping, got {}",
                json_kind(expr)
            ))
        })?;

        if map.keys().any(|k| k.starts_with('$')) {
            return self.compile_logical(map);
        }

        let mut constraints = map
            .iter()
            .map(|(field, value)| self.compile_field(field, value))
            .collect::<Result<Vec<_>>>()?;

        if constraints.len() == 1 {
            Ok(constraints.remove(0))
        } else {
            // an empty mapping lands here too and becomes always-true
            Ok(Predicate::And(constraints))
        }
    }

    fn compile_logical(&self, map: &Map<String, Value>) -> Result<Predicate> {
        if map.len() != 1 {
            return Err(invalid(format!(
                "a logical operator must be the only key of its mapping, got keys {:?}",
                map.keys().collect::<Vec<_>>()
            )));
        }
        let (key, operand) = map.iter().next().ok_or_else(|| invalid("empty mapping"))?;

        if key != AND && key != OR {
            return Err(match Operator::parse(key) {
                Some(op) => invalid(format!("operator `{op}` must be applied to a field")),
                None => invalid(format!("unrecognized operator `{key}`")),
            });
        }

        let items = operand.as_array().ok_or_else(|| {
            invalid(format!(
                "`{key}` expects a sequence of filter expressions, got {}",
                json_kind(operand)
            ))
        })?;

        let children = items
            .iter()
            .map(|item| self.compile_expr(item))
            .collect::<Result<Vec<_>>>()?;

        Ok(if key == AND {
            Predicate::And(children)
        } else {
            Predicate::Or(children)
        })
    }

    fn compile_field(&self, field: &str, value: &Value) -> Result<Predicate> {
        if field.is_empty() {
            return Err(invalid("field name must not be empty"));
        }

        let (op, operand) = match value {
            Value::Object(inner) if inner.keys().any(|k| k.starts_with('$')) => {
                if inner.len() != 1 {
                    return Err(invalid(format!(
                        "field `{field}` expects a single operator, got {} keys",
                        inner.len()
                    )));
                }
                let (key, operand) = inner
                    .iter()
                    .next()
                    .ok_or_else(|| invalid("empty mapping"))?;
                let op = Operator::parse(key).ok_or_else(|| {
                    invalid(format!("unrecognized operator `{key}` on field `{field}`"))
                })?;
                (op, operand)
            }
            other => (Operator::Eq, other),
        };

        self.compile_comparison(field, op, operand)
            .map(Predicate::Compare)
    }

    fn compile_comparison(&self, field: &str, op: Operator, operand: &Value) -> Result<Comparison> {
        let operand = match op {
            Operator::Eq
            | Operator::Ne
            | Operator::Lt
            | Operator::Lte
            | Operator::Gt
            | Operator::Gte => Operand::Scalar(scalar(field, op, operand)?),
            Operator::In | Operator::Nin => {
                let items = operand.as_array().ok_or_else(|| {
                    invalid(format!(
                        "`{op}` on field `{field}` expects a sequence, got {}",
                        json_kind(operand)
                    ))
                })?;
                let items = items
                    .iter()
                    .map(|item| scalar(field, op, item))
                    .collect::<Result<Vec<_>>>()?;
                Operand::List(items)
            }
            Operator::Between => match operand.as_array().map(Vec::as_slice) {
                Some([lo, hi]) => Operand::Range(scalar(field, op, lo)?, scalar(field, op, hi)?),
                _ => {
                    return Err(invalid(format!(
                        "`$between` on field `{field}` expects a [low, high] pair"
                    )))
                }
            },
            Operator::Like | Operator::ILike => {
                let pattern = operand.as_str().ok_or_else(|| {
                    invalid(format!(
                        "`{op}` on field `{field}` expects a string pattern, got {}",
                        json_kind(operand)
                    ))
                })?;
                compile_like(pattern, op == Operator::ILike)
                    .map_err(|e| invalid(format!("bad pattern for field `{field}`: {e}")))?;
                Operand::Pattern(pattern.to_string())
            }
        };

        let value_type = self.resolve_type(field, op, &operand)?;
        Ok(Comparison {
            field: field.to_string(),
            op,
            operand,
            value_type,
        })
    }

    /// Determines the field type and checks the operator/operand pair against it.
    fn resolve_type(&self, field: &str, op: Operator, operand: &Operand) -> Result<ValueType> {
        let operand_types: Vec<ValueType> = match operand {
            Operand::Scalar(s) => vec![s.value_type()],
            Operand::List(items) => items.iter().map(Scalar::value_type).collect(),
            Operand::Range(lo, hi) => vec![lo.value_type(), hi.value_type()],
            Operand::Pattern(_) => vec![ValueType::Text],
        };

        let value_type = match self.schema {
            Some(schema) => *schema
                .get(field)
                .ok_or_else(|| invalid(format!("unknown field `{field}`")))?,
            // empty $in/$nin carry no type; they lower to constants anyway
            None => operand_types.first().copied().unwrap_or(ValueType::Text),
        };

        if let Some(bad) = operand_types.iter().find(|t| **t != value_type) {
            return Err(invalid(format!(
                "`{op}` on field `{field}` mixes {value_type} with {bad} operands"
            )));
        }
        if op.requires_order() && !value_type.is_ordered() {
            return Err(invalid(format!(
                "`{op}` on field `{field}` requires an ordered type, got {value_type}"
            )));
        }
        if matches!(op, Operator::Like | Operator::ILike) && value_type != ValueType::Text {
            return Err(invalid(format!(
                "`{op}` on field `{field}` requires a text field, got {value_type}"
            )));
        }

        Ok(value_type)
    }
}

fn scalar(field: &str, op: Operator, value: &Value) -> Result<Scalar> {
    Scalar::from_json(value).ok_or_else(|| {
        invalid(format!(
            "`{op}` on field `{field}` expects scalar operands, got {}",
            json_kind(value)
        ))
    })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}
