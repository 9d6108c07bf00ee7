//! Query conditions and in-process query evaluation.
//!
//! # Invariants
//! - Ordering comparisons between different JSON types never match.
//! - A missing field matches only `NotExists`.
//! - `Query::apply` is deterministic: filter, stable sort, offset, limit.

use crate::mapping::Document;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Binary comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }
}

/// Predicate over one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Compare {
        field: String,
        op: CompareOp,
        value: Value,
    },
    In {
        field: String,
        values: Vec<Value>,
    },
    /// Field present and not null.
    Exists(String),
    /// Field absent or null.
    NotExists(String),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Le, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, CompareOp::Ge, value)
    }

    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self::Exists(field.into())
    }

    pub fn not_exists(field: impl Into<String>) -> Self {
        Self::NotExists(field.into())
    }

    /// Conjunction; nested `And`s are flattened.
    pub fn and(self, other: Condition) -> Self {
        match (self, other) {
            (Self::And(mut left), Self::And(right)) => {
                left.extend(right);
                Self::And(left)
            }
            (Self::And(mut left), right) => {
                left.push(right);
                Self::And(left)
            }
            (left, right) => Self::And(vec![left, right]),
        }
    }

    /// Disjunction; nested `Or`s are flattened.
    pub fn or(self, other: Condition) -> Self {
        match (self, other) {
            (Self::Or(mut left), Self::Or(right)) => {
                left.extend(right);
                Self::Or(left)
            }
            (Self::Or(mut left), right) => {
                left.push(right);
                Self::Or(left)
            }
            (left, right) => Self::Or(vec![left, right]),
        }
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Self::Compare { field, op, value } => match document.lookup(field) {
                Some(actual) => match compare_values(&actual, value) {
                    Some(ordering) => op.accepts(ordering),
                    None => *op == CompareOp::Ne,
                },
                None => false,
            },
            Self::In { field, values } => match document.lookup(field) {
                Some(actual) => values
                    .iter()
                    .any(|value| compare_values(&actual, value) == Some(Ordering::Equal)),
                None => false,
            },
            Self::Exists(field) => document
                .lookup(field)
                .is_some_and(|value| !value.is_null()),
            Self::NotExists(field) => document
                .lookup(field)
                .map_or(true, |value| value.is_null()),
            Self::And(conditions) => conditions.iter().all(|c| c.matches(document)),
            Self::Or(conditions) => conditions.iter().any(|c| c.matches(document)),
            Self::Not(condition) => !condition.matches(document),
        }
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compare { field, op, value } => write!(f, "{field} {} {value}", op.symbol()),
            Self::In { field, values } => {
                let rendered: Vec<String> = values.iter().map(Value::to_string).collect();
                write!(f, "{field} IN ({})", rendered.join(", "))
            }
            Self::Exists(field) => write!(f, "{field} IS NOT NULL"),
            Self::NotExists(field) => write!(f, "{field} IS NULL"),
            Self::And(conditions) => write_joined(f, conditions, " AND "),
            Self::Or(conditions) => write_joined(f, conditions, " OR "),
            Self::Not(condition) => write!(f, "NOT ({condition})"),
        }
    }
}

fn write_joined(f: &mut Formatter<'_>, conditions: &[Condition], separator: &str) -> std::fmt::Result {
    f.write_str("(")?;
    for (index, condition) in conditions.iter().enumerate() {
        if index > 0 {
            f.write_str(separator)?;
        }
        write!(f, "{condition}")?;
    }
    f.write_str(")")
}

/// Orders two JSON values of the same kind; `None` when incomparable.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
        },
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            (left == right).then_some(Ordering::Equal)
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub order: SortOrder,
}

/// Find query: optional condition plus ordering and pagination.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    condition: Option<Condition>,
    order_by: Vec<SortKey>,
    limit: Option<usize>,
    offset: usize,
}

impl Query {
    /// Unconstrained query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a condition, combining with an existing one by conjunction.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.order_by.push(SortKey {
            field: field.into(),
            order,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn is_unconstrained(&self) -> bool {
        self.condition.is_none() && self.limit.is_none() && self.offset == 0
    }

    /// Evaluates the query over `documents`, keeping their relative order
    /// where the sort keys tie.
    pub fn apply(&self, documents: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut selected: Vec<Document> = documents
            .into_iter()
            .filter(|document| {
                self.condition
                    .as_ref()
                    .map_or(true, |condition| condition.matches(document))
            })
            .collect();

        if !self.order_by.is_empty() {
            selected.sort_by(|a, b| self.compare_documents(a, b));
        }

        let limit = self.limit.unwrap_or(usize::MAX);
        selected.into_iter().skip(self.offset).take(limit).collect()
    }

    fn compare_documents(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.order_by {
            let ordering = match (a.lookup(&key.field), b.lookup(&key.field)) {
                (Some(left), Some(right)) => {
                    compare_values(&left, &right).unwrap_or(Ordering::Equal)
                }
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            let ordering = match key.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.condition {
            Some(condition) => write!(f, "WHERE {condition}")?,
            None => f.write_str("ALL")?,
        }
        for key in &self.order_by {
            let order = match key.order {
                SortOrder::Asc => "ASC",
                SortOrder::Desc => "DESC",
            };
            write!(f, " ORDER BY {} {order}", key.field)?;
        }
        if let Some(limit) = self.limit {
            write!(f, " LIMIT {limit}")?;
        }
        if self.offset > 0 {
            write!(f, " OFFSET {}", self.offset)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Condition, Query, SortOrder};
    use crate::mapping::{Document, DocumentKey};
    use serde_json::json;

    fn doc(key: &str, name: &str, age: i64) -> Document {
        let mut document = Document::with_key(DocumentKey::from(key));
        document.set("name", name);
        document.set("age", age);
        document
    }

    #[test]
    fn compare_conditions_follow_json_types() {
        let document = doc("a", "ada", 36);

        assert!(Condition::eq("name", "ada").matches(&document));
        assert!(Condition::gt("age", 30).matches(&document));
        assert!(Condition::le("age", 36.0).matches(&document));
        assert!(!Condition::lt("name", 5).matches(&document));
        assert!(Condition::ne("name", 5).matches(&document));
        assert!(!Condition::eq("missing", json!(null)).matches(&document));
    }

    #[test]
    fn presence_conditions_treat_null_as_absent() {
        let mut document = doc("a", "ada", 36);
        document.set("nickname", json!(null));

        assert!(Condition::exists("name").matches(&document));
        assert!(Condition::not_exists("nickname").matches(&document));
        assert!(Condition::not_exists("email").matches(&document));
        assert!(!Condition::exists("nickname").matches(&document));
    }

    #[test]
    fn logical_conditions_compose() {
        let document = doc("a", "ada", 36);
        let condition = Condition::eq("name", "bob")
            .or(Condition::is_in("age", [35, 36]))
            .and(Condition::eq("_id", "a").negate().negate());

        assert!(condition.matches(&document));
        assert!(!condition.clone().negate().matches(&document));
    }

    #[test]
    fn query_filters_sorts_and_paginates() {
        let documents = vec![
            doc("a", "carol", 40),
            doc("b", "ada", 36),
            doc("c", "bob", 20),
            doc("d", "dan", 18),
        ];
        let query = Query::new()
            .filter(Condition::gt("age", 19))
            .order_by("name", SortOrder::Desc)
            .offset(1)
            .limit(1);

        let result = query.apply(documents);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].lookup("name").as_deref(), Some(&json!("bob")));
    }

    #[test]
    fn filter_combines_conditions_by_conjunction() {
        let query = Query::new()
            .filter(Condition::eq("a", 1))
            .filter(Condition::eq("b", 2));

        assert_eq!(
            query.condition(),
            Some(&Condition::And(vec![
                Condition::eq("a", 1),
                Condition::eq("b", 2)
            ]))
        );
        assert!(!query.is_unconstrained());
        assert!(Query::new().is_unconstrained());
    }
}
