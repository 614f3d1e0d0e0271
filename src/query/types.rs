//! Query builder types - clause kinds for the structured representation

use std::fmt;

use crate::value::SqlValue;

/// SQL command kinds; mutually exclusive on a query, last write wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Select,
    Insert,
    Update,
    Delete,
}

/// Join kinds, rendered verbatim by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "INNER JOIN"),
            JoinKind::Left => write!(f, "LEFT JOIN"),
            JoinKind::Right => write!(f, "RIGHT JOIN"),
            JoinKind::Full => write!(f, "FULL JOIN"),
        }
    }
}

/// A join target and its raw ON condition, kept in call order.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub table: String,
    pub condition: String,
}

/// One value in a mapping-form condition.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionValue {
    /// Renders as `column IS NULL`, adds no bind
    Null,
    /// Renders as `column = :vN` with one bind
    Scalar(SqlValue),
    /// Renders as `column IN (...)` with one bind per element;
    /// an empty list is skipped entirely
    List(Vec<SqlValue>),
}

impl ConditionValue {
    /// A single comparison value; NULL collapses to the `IS NULL` form.
    pub fn scalar(value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        if value.is_null() {
            ConditionValue::Null
        } else {
            ConditionValue::Scalar(value)
        }
    }

    pub fn list<T: Into<SqlValue>>(values: Vec<T>) -> Self {
        ConditionValue::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<SqlValue> for ConditionValue {
    fn from(value: SqlValue) -> Self {
        ConditionValue::scalar(value)
    }
}

/// A where-clause argument: either a raw boolean expression or a
/// column-to-value mapping expanded by the builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Conditions {
    Raw(String),
    Map(Vec<(String, ConditionValue)>),
}

impl Conditions {
    pub fn raw(expr: impl Into<String>) -> Self {
        Conditions::Raw(expr.into())
    }

    pub fn map(pairs: Vec<(&str, ConditionValue)>) -> Self {
        Conditions::Map(
            pairs
                .into_iter()
                .map(|(column, value)| (column.to_string(), value))
                .collect(),
        )
    }
}

impl From<&str> for Conditions {
    fn from(expr: &str) -> Self {
        Conditions::Raw(expr.to_string())
    }
}

impl From<String> for Conditions {
    fn from(expr: String) -> Self {
        Conditions::Raw(expr)
    }
}
