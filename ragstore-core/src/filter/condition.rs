//! Lowering of predicate trees into backend query conditions.
//!
//! [`to_query_condition`] is a pure transform from a [`Predicate`] into a
//! [`QueryCondition`]: a boolean condition tree whose operands all live in a
//! bound parameter list. Backends either render it to SQL with
//! [`QueryCondition::to_sql`] or evaluate it directly with a [`RowMatcher`].
//!
//! Null semantics: a field that is missing, or whose stored value does not
//! cast to the comparison type, never satisfies `$eq`, `$in`, ordering,
//! `$between` or pattern comparisons, and always satisfies `$ne` and `$nin`.

use std::collections::HashMap;
use std::fmt::Write as _;

use regex::Regex;
use serde_json::Value;

use crate::collection::MetadataMode;
use crate::filter::pattern::compile_like;
use crate::filter::predicate::{Comparison, Operand, Operator, Predicate, Scalar, ValueType};
use crate::metadata::Metadata;

/// Name of the semi-structured metadata column in SQL renderings.
pub const METADATA_COLUMN: &str = "metadata";

/// JSON types whose extracted text is a usable text value.
const TEXT_JSON_TYPES: &str = "('string', 'number', 'boolean')";

/// Text that parses as a number, surrounding whitespace allowed.
const NUMERIC_TEXT: &str = r"^\s*[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?\s*$";

/// How a condition reads a field from a stored row.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldRef {
    /// Typed column of a structured collection.
    Column { name: String, value_type: ValueType },
    /// Key extracted from the metadata container and cast to `cast`.
    /// The key itself is bound as parameter `key_param`.
    Extract {
        key: String,
        key_param: usize,
        cast: ValueType,
    },
}

impl FieldRef {
    pub fn name(&self) -> &str {
        match self {
            FieldRef::Column { name, .. } => name,
            FieldRef::Extract { key, .. } => key,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            FieldRef::Column { value_type, .. } => *value_type,
            FieldRef::Extract { cast, .. } => *cast,
        }
    }
}

/// Scalar comparison operators of a lowered condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
    ILike,
}

impl CompareOp {
    fn sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Like => "LIKE",
            CompareOp::ILike => "ILIKE",
        }
    }
}

/// A backend-agnostic boolean condition. Parameter indexes are zero-based
/// positions in [`QueryCondition::params`].
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    True,
    False,
    Compare {
        field: FieldRef,
        op: CompareOp,
        param: usize,
    },
    Between {
        field: FieldRef,
        low: usize,
        high: usize,
    },
    InList {
        field: FieldRef,
        params: Vec<usize>,
        negated: bool,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
}

/// A condition together with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCondition {
    pub condition: Condition,
    pub params: Vec<Value>,
}

/// Lowers a predicate tree for a collection with the given metadata mode.
///
/// # Example
///
/// ```
/// use ragstore_core::collection::MetadataMode;
/// use ragstore_core::filter::{compile, to_query_condition};
/// use serde_json::json;
///
/// let predicate = compile(&json!({"price": {"$between": [10, 20]}})).unwrap();
/// let query = to_query_condition(&predicate, MetadataMode::Schemaless);
///
/// let sql = query.to_sql();
/// assert!(sql.starts_with("(CASE WHEN (metadata ->> $1) ~ "));
/// assert!(sql.ends_with("THEN (metadata ->> $1)::numeric END) BETWEEN $2 AND $3"));
/// assert_eq!(query.params, vec![json!("price"), json!(10.0), json!(20.0)]);
/// ```
pub fn to_query_condition(predicate: &Predicate, mode: MetadataMode) -> QueryCondition {
    let mut builder = Builder {
        mode,
        params: Vec::new(),
    };
    let condition = builder.lower(predicate);
    QueryCondition {
        condition,
        params: builder.params,
    }
}

struct Builder {
    mode: MetadataMode,
    params: Vec<Value>,
}

impl Builder {
    fn bind(&mut self, value: Value) -> usize {
        self.params.push(value);
        self.params.len() - 1
    }

    fn field(&mut self, comparison: &Comparison) -> FieldRef {
        match self.mode {
            MetadataMode::Structured => FieldRef::Column {
                name: comparison.field.clone(),
                value_type: comparison.value_type,
            },
            MetadataMode::Schemaless => FieldRef::Extract {
                key: comparison.field.clone(),
                key_param: self.bind(Value::String(comparison.field.clone())),
                cast: comparison.value_type,
            },
        }
    }

    fn lower(&mut self, predicate: &Predicate) -> Condition {
        match predicate {
            Predicate::And(children) if children.is_empty() => Condition::True,
            Predicate::Or(children) if children.is_empty() => Condition::False,
            Predicate::And(children) => {
                Condition::And(children.iter().map(|c| self.lower(c)).collect())
            }
            Predicate::Or(children) => {
                Condition::Or(children.iter().map(|c| self.lower(c)).collect())
            }
            Predicate::Compare(comparison) => self.lower_comparison(comparison),
        }
    }

    fn lower_comparison(&mut self, comparison: &Comparison) -> Condition {
        match (&comparison.op, &comparison.operand) {
            (Operator::In, Operand::List(items)) if items.is_empty() => Condition::False,
            (Operator::Nin, Operand::List(items)) if items.is_empty() => Condition::True,
            (op @ (Operator::In | Operator::Nin), Operand::List(items)) => {
                let field = self.field(comparison);
                let params = items.iter().map(|s| self.bind(s.to_json())).collect();
                Condition::InList {
                    field,
                    params,
                    negated: *op == Operator::Nin,
                }
            }
            (_, Operand::Range(lo, hi)) => {
                let field = self.field(comparison);
                Condition::Between {
                    field,
                    low: self.bind(lo.to_json()),
                    high: self.bind(hi.to_json()),
                }
            }
            (op, Operand::Pattern(pattern)) => {
                let field = self.field(comparison);
                Condition::Compare {
                    field,
                    op: if *op == Operator::ILike {
                        CompareOp::ILike
                    } else {
                        CompareOp::Like
                    },
                    param: self.bind(Value::String(pattern.clone())),
                }
            }
            (op, Operand::Scalar(scalar)) => {
                let field = self.field(comparison);
                let op = match op {
                    Operator::Ne => CompareOp::Ne,
                    Operator::Lt => CompareOp::Lt,
                    Operator::Lte => CompareOp::Lte,
                    Operator::Gt => CompareOp::Gt,
                    Operator::Gte => CompareOp::Gte,
                    _ => CompareOp::Eq,
                };
                Condition::Compare {
                    field,
                    op,
                    param: self.bind(scalar.to_json()),
                }
            }
            // the compiler never pairs a list with anything but $in/$nin
            (_, Operand::List(_)) => Condition::False,
        }
    }
}

impl QueryCondition {
    /// A condition that matches every row.
    pub fn always() -> Self {
        Self {
            condition: Condition::True,
            params: Vec::new(),
        }
    }

    /// Renders PostgreSQL-flavoured SQL with `$n` placeholders (1-based).
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        render(&self.condition, &mut out);
        out
    }

    /// Prepares an evaluator for this condition, compiling pattern operands once.
    pub fn matcher(&self) -> Result<RowMatcher<'_>, regex::Error> {
        let mut patterns = HashMap::new();
        collect_patterns(&self.condition, &self.params, &mut patterns)?;
        Ok(RowMatcher {
            query: self,
            patterns,
        })
    }
}

fn render(condition: &Condition, out: &mut String) {
    match condition {
        Condition::True => out.push_str("TRUE"),
        Condition::False => out.push_str("FALSE"),
        Condition::Compare {
            field,
            op: CompareOp::Ne,
            param,
        } => {
            let f = render_field(field);
            let _ = write!(out, "({f} IS NULL OR {f} <> ${})", param + 1);
        }
        Condition::Compare { field, op, param } => {
            let _ = write!(out, "{} {} ${}", render_field(field), op.sql(), param + 1);
        }
        Condition::Between { field, low, high } => {
            let _ = write!(
                out,
                "{} BETWEEN ${} AND ${}",
                render_field(field),
                low + 1,
                high + 1
            );
        }
        Condition::InList {
            field,
            params,
            negated,
        } => {
            let f = render_field(field);
            let list = params
                .iter()
                .map(|p| format!("${}", p + 1))
                .collect::<Vec<_>>()
                .join(", ");
            if *negated {
                let _ = write!(out, "({f} IS NULL OR {f} NOT IN ({list}))");
            } else {
                let _ = write!(out, "{f} IN ({list})");
            }
        }
        Condition::And(children) => render_joined(children, " AND ", "TRUE", out),
        Condition::Or(children) => render_joined(children, " OR ", "FALSE", out),
    }
}

fn render_joined(children: &[Condition], sep: &str, empty: &str, out: &mut String) {
    if children.is_empty() {
        out.push_str(empty);
        return;
    }
    out.push('(');
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            out.push_str(sep);
        }
        render(child, out);
    }
    out.push(')');
}

fn render_field(field: &FieldRef) -> String {
    match field {
        FieldRef::Column { name, .. } => format!("\"{}\"", name.replace('"', "\"\"")),
        FieldRef::Extract { key_param, cast, .. } => {
            let k = key_param + 1;
            let text = format!("{METADATA_COLUMN} ->> ${k}");
            // values that do not cast read as NULL instead of failing the query
            match cast {
                ValueType::Text => format!(
                    "(CASE WHEN jsonb_typeof({METADATA_COLUMN} -> ${k}) IN {TEXT_JSON_TYPES} \
                     THEN {text} END)"
                ),
                ValueType::Number => format!(
                    "(CASE WHEN ({text}) ~ '{NUMERIC_TEXT}' THEN ({text})::{} END)",
                    cast.sql_cast()
                ),
                ValueType::Boolean => format!(
                    "(CASE WHEN ({text}) IN ('true', 'false') THEN ({text})::{} END)",
                    cast.sql_cast()
                ),
            }
        }
    }
}

fn collect_patterns(
    condition: &Condition,
    params: &[Value],
    out: &mut HashMap<usize, Regex>,
) -> Result<(), regex::Error> {
    match condition {
        Condition::Compare {
            op: op @ (CompareOp::Like | CompareOp::ILike),
            param,
            ..
        } => {
            let pattern = params.get(*param).and_then(Value::as_str).unwrap_or_default();
            out.insert(*param, compile_like(pattern, *op == CompareOp::ILike)?);
        }
        Condition::And(children) | Condition::Or(children) => {
            for child in children {
                collect_patterns(child, params, out)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Evaluates a [`QueryCondition`] against document metadata.
#[derive(Debug)]
pub struct RowMatcher<'a> {
    query: &'a QueryCondition,
    patterns: HashMap<usize, Regex>,
}

impl RowMatcher<'_> {
    /// Returns true if the metadata satisfies the condition.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.eval(&self.query.condition, metadata)
    }

    fn eval(&self, condition: &Condition, metadata: &Metadata) -> bool {
        match condition {
            Condition::True => true,
            Condition::False => false,
            Condition::And(children) => children.iter().all(|c| self.eval(c, metadata)),
            Condition::Or(children) => children.iter().any(|c| self.eval(c, metadata)),
            Condition::Compare { field, op, param } => {
                let Some(actual) = self.resolve(field, metadata) else {
                    return *op == CompareOp::Ne;
                };
                match op {
                    CompareOp::Like | CompareOp::ILike => match (&actual, self.patterns.get(param)) {
                        (Scalar::Text(text), Some(re)) => re.is_match(text),
                        _ => false,
                    },
                    _ => {
                        let Some(ordering) = self.param(*param).and_then(|p| actual.compare(&p))
                        else {
                            return false;
                        };
                        match op {
                            CompareOp::Eq => ordering.is_eq(),
                            CompareOp::Ne => ordering.is_ne(),
                            CompareOp::Lt => ordering.is_lt(),
                            CompareOp::Lte => ordering.is_le(),
                            CompareOp::Gt => ordering.is_gt(),
                            CompareOp::Gte => ordering.is_ge(),
                            CompareOp::Like | CompareOp::ILike => false,
                        }
                    }
                }
            }
            Condition::Between { field, low, high } => {
                let Some(actual) = self.resolve(field, metadata) else {
                    return false;
                };
                let above = self
                    .param(*low)
                    .and_then(|lo| actual.compare(&lo))
                    .is_some_and(|o| o.is_ge());
                let below = self
                    .param(*high)
                    .and_then(|hi| actual.compare(&hi))
                    .is_some_and(|o| o.is_le());
                above && below
            }
            Condition::InList {
                field,
                params,
                negated,
            } => {
                let Some(actual) = self.resolve(field, metadata) else {
                    return *negated;
                };
                let member = params.iter().any(|p| {
                    self.param(*p)
                        .and_then(|candidate| actual.compare(&candidate))
                        .is_some_and(|o| o.is_eq())
                });
                member != *negated
            }
        }
    }

    fn resolve(&self, field: &FieldRef, metadata: &Metadata) -> Option<Scalar> {
        metadata
            .get(field.name())
            .and_then(|value| field.value_type().cast(value))
    }

    fn param(&self, index: usize) -> Option<Scalar> {
        self.query.params.get(index).and_then(Scalar::from_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::Schema;
    use crate::filter::compile;
    use serde_json::json;

    fn lower(expr: Value) -> QueryCondition {
        to_query_condition(&compile(&expr).unwrap(), MetadataMode::Schemaless)
    }

    fn matches(expr: Value, metadata: &Metadata) -> bool {
        let query = lower(expr);
        let matcher = query.matcher().unwrap();
        matcher.matches(metadata)
    }

    fn meta(value: Value) -> Metadata {
        Metadata::try_from(value).unwrap()
    }

    #[test]
    fn test_empty_in_is_always_false() {
        let q = lower(json!({"topic": {"$in": []}}));
        assert_eq!(q.condition, Condition::False);
        assert!(q.params.is_empty());
        assert_eq!(q.to_sql(), "FALSE");
    }

    #[test]
    fn test_empty_nin_is_always_true() {
        let q = lower(json!({"topic": {"$nin": []}}));
        assert_eq!(q.condition, Condition::True);
        assert_eq!(q.to_sql(), "TRUE");
    }

    #[test]
    fn test_empty_and_is_always_true() {
        let q = lower(json!({"$and": []}));
        assert_eq!(q.condition, Condition::True);
        assert!(matches(json!({"$and": []}), &Metadata::new()));
    }

    #[test]
    fn test_empty_or_is_always_false() {
        let q = lower(json!({"$or": []}));
        assert_eq!(q.condition, Condition::False);
        assert!(!matches(json!({"$or": []}), &meta(json!({"topic": "x"}))));
    }

    #[test]
    fn test_schemaless_sql_binds_keys_and_operands() {
        let q = lower(json!({"topic": "x", "year": {"$gte": 2020}}));
        assert_eq!(
            q.to_sql(),
            concat!(
                "((CASE WHEN jsonb_typeof(metadata -> $1) IN ('string', 'number', 'boolean') ",
                "THEN metadata ->> $1 END) = $2 AND ",
                r"(CASE WHEN (metadata ->> $3) ~ '^\s*[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?\s*$' ",
                "THEN (metadata ->> $3)::numeric END) >= $4)"
            )
        );
        assert_eq!(
            q.params,
            vec![json!("topic"), json!("x"), json!("year"), json!(2020.0)]
        );
    }

    #[test]
    fn test_operands_are_never_interpolated() {
        let q = lower(json!({"topic": "x'; DROP TABLE documents; --"}));
        let sql = q.to_sql();
        assert!(!sql.contains("DROP"));
        assert_eq!(q.params[1], json!("x'; DROP TABLE documents; --"));
    }

    #[test]
    fn test_structured_sql_uses_quoted_columns() {
        let schema: Schema = [("ti\"tle".to_string(), ValueType::Text)]
            .into_iter()
            .collect();
        let predicate = crate::filter::FilterCompiler::structured(&schema)
            .compile(&json!({"ti\"tle": {"$ne": "draft"}}))
            .unwrap();
        let q = to_query_condition(&predicate, MetadataMode::Structured);
        assert_eq!(
            q.to_sql(),
            "(\"ti\"\"tle\" IS NULL OR \"ti\"\"tle\" <> $1)"
        );
        assert_eq!(q.params, vec![json!("draft")]);
    }

    #[test]
    fn test_in_list_sql() {
        let q = lower(json!({"topic": {"$nin": ["a", "b"]}}));
        let topic = "(CASE WHEN jsonb_typeof(metadata -> $1) IN ('string', 'number', 'boolean') \
                     THEN metadata ->> $1 END)";
        assert_eq!(
            q.to_sql(),
            format!("({topic} IS NULL OR {topic} NOT IN ($2, $3))")
        );
        let q = lower(json!({"$or": [{"n": {"$in": [1]}}, {"flag": true}]}));
        assert_eq!(
            q.to_sql(),
            concat!(
                r"((CASE WHEN (metadata ->> $1) ~ '^\s*[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?\s*$' ",
                "THEN (metadata ->> $1)::numeric END) IN ($2) OR ",
                "(CASE WHEN (metadata ->> $3) IN ('true', 'false') ",
                "THEN (metadata ->> $3)::boolean END) = $4)"
            )
        );
    }

    #[test]
    fn test_schemaless_sql_guards_casts() {
        // an uncastable stored value reads as NULL, as it does in RowMatcher
        let q = lower(json!({"year": {"$gt": 1}}));
        assert_eq!(
            q.to_sql(),
            concat!(
                r"(CASE WHEN (metadata ->> $1) ~ '^\s*[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?\s*$' ",
                "THEN (metadata ->> $1)::numeric END) > $2"
            )
        );

        let pattern = Regex::new(NUMERIC_TEXT).unwrap();
        for castable in ["2024", "-1.5", " 12 ", "1e3", ".5", "3."] {
            assert!(pattern.is_match(castable), "{castable}");
            assert!(ValueType::Number.cast(&json!(castable)).is_some(), "{castable}");
        }
        for uncastable in ["unknown", "", "1,000", "[1]", "true"] {
            assert!(!pattern.is_match(uncastable), "{uncastable}");
            assert!(ValueType::Number.cast(&json!(uncastable)).is_none(), "{uncastable}");
        }
    }

    #[test]
    fn test_between_is_inclusive() {
        let filter = json!({"price": {"$between": [10, 20]}});
        assert!(matches(filter.clone(), &meta(json!({"price": 10}))));
        assert!(matches(filter.clone(), &meta(json!({"price": 20}))));
        assert!(matches(filter.clone(), &meta(json!({"price": 15.5}))));
        assert!(!matches(filter.clone(), &meta(json!({"price": 9}))));
        assert!(!matches(filter, &meta(json!({"price": 21}))));
    }

    #[test]
    fn test_ordering_comparisons() {
        let m = meta(json!({"year": 2024, "title": "beta"}));
        assert!(matches(json!({"year": {"$gt": 2020}}), &m));
        assert!(matches(json!({"year": {"$gte": 2024}}), &m));
        assert!(matches(json!({"year": {"$lt": 2025}}), &m));
        assert!(matches(json!({"year": {"$lte": 2024}}), &m));
        assert!(!matches(json!({"year": {"$lt": 2024}}), &m));
        assert!(matches(json!({"title": {"$gt": "alpha"}}), &m));
    }

    #[test]
    fn test_numeric_equality_ignores_representation() {
        assert!(matches(json!({"page": 12}), &meta(json!({"page": 12.0}))));
        assert!(matches(json!({"page": 12}), &meta(json!({"page": "12"}))));
    }

    #[test]
    fn test_like_and_ilike() {
        let m = meta(json!({"name": "Rust Handbook"}));
        assert!(matches(json!({"name": {"$like": "Rust%"}}), &m));
        assert!(!matches(json!({"name": {"$like": "rust%"}}), &m));
        assert!(matches(json!({"name": {"$ilike": "rust%"}}), &m));
        assert!(matches(json!({"name": {"$like": "Rust _andbook"}}), &m));
    }

    #[test]
    fn test_missing_field_null_semantics() {
        let m = meta(json!({"other": 1}));
        assert!(!matches(json!({"topic": "x"}), &m));
        assert!(!matches(json!({"topic": {"$in": ["x"]}}), &m));
        assert!(!matches(json!({"year": {"$gt": 1}}), &m));
        assert!(!matches(json!({"year": {"$between": [1, 2]}}), &m));
        assert!(!matches(json!({"topic": {"$like": "%"}}), &m));
        assert!(matches(json!({"topic": {"$ne": "x"}}), &m));
        assert!(matches(json!({"topic": {"$nin": ["x"]}}), &m));
    }

    #[test]
    fn test_uncastable_value_is_treated_as_missing() {
        let m = meta(json!({"year": "unknown", "tags": ["a", "b"]}));
        assert!(!matches(json!({"year": {"$gt": 1}}), &m));
        assert!(matches(json!({"year": {"$ne": 1}}), &m));
        assert!(!matches(json!({"tags": "a"}), &m));
        assert!(matches(json!({"tags": {"$nin": ["a"]}}), &m));
    }

    #[test]
    fn test_logical_combinations() {
        let m = meta(json!({"topic": "x", "year": 2024}));
        assert!(matches(
            json!({"$or": [{"topic": "y"}, {"year": 2024}]}),
            &m
        ));
        assert!(!matches(
            json!({"$and": [{"topic": "x"}, {"year": {"$gt": 2024}}]}),
            &m
        ));
        assert!(!matches(
            json!({"$and": [{"topic": {"$in": []}}, {"year": 2024}]}),
            &m
        ));
        assert!(matches(
            json!({"$or": [{"topic": {"$nin": []}}, {"year": 1999}]}),
            &m
        ));
    }
}
