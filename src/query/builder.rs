//! DbQuery - the structured query accumulator
//!
//! Accumulates clauses into a normalized representation and a bind map.
//! It never renders SQL text itself; dialect rendering (placeholder
//! syntax, quoting) lives behind the adapter boundary so it stays
//! swappable.

use std::collections::BTreeMap;

use crate::value::{Record, SqlValue};

use super::types::{Command, Conditions, JoinClause, JoinKind};

/// Mutable, chainable query accumulator. Every mutator consumes and
/// returns the builder and never fails on well-formed input.
#[derive(Debug, Clone)]
pub struct DbQuery {
    pub(crate) command: Command,
    pub(crate) columns: Option<String>,
    pub(crate) table: Option<String>,
    pub(crate) schema: Option<String>,
    pub(crate) distinct: bool,
    /// Rendered boolean fragments, each already carrying its own leading
    /// connector; the first carries none.
    pub(crate) where_clauses: Vec<String>,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) left_joins: Vec<JoinClause>,
    pub(crate) right_joins: Vec<JoinClause>,
    pub(crate) full_joins: Vec<JoinClause>,
    pub(crate) order: Option<String>,
    pub(crate) group: Option<String>,
    pub(crate) having: Option<String>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    /// Column-to-value map populated only by insert/update; doubles as
    /// the SET/VALUES source and the bind source.
    pub(crate) data: Record,
    /// Placeholder name (`:`-prefixed) to value; rebinding overwrites.
    pub(crate) bind: BTreeMap<String, SqlValue>,
}

impl Default for DbQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl DbQuery {
    pub fn new() -> Self {
        Self {
            command: Command::Select,
            columns: None,
            table: None,
            schema: None,
            distinct: false,
            where_clauses: Vec::new(),
            joins: Vec::new(),
            left_joins: Vec::new(),
            right_joins: Vec::new(),
            full_joins: Vec::new(),
            order: None,
            group: None,
            having: None,
            limit: None,
            offset: None,
            data: Record::new(),
            bind: BTreeMap::new(),
        }
    }

    /// Set the SELECT command. Columns stay as previously set (or `*`
    /// at render time when never set).
    pub fn select(mut self) -> Self {
        self.command = Command::Select;
        self
    }

    /// Set the INSERT command; `data` feeds both VALUES and the bind
    /// map, each column `c` bound under `:c`.
    pub fn insert(mut self, data: Record) -> Self {
        for (column, value) in &data {
            self.bind.insert(format!(":{}", column), value.clone());
        }
        self.data = data;
        self.command = Command::Insert;
        self
    }

    /// Set the UPDATE command; same data/bind double duty as `insert`.
    pub fn update(mut self, data: Record) -> Self {
        for (column, value) in &data {
            self.bind.insert(format!(":{}", column), value.clone());
        }
        self.data = data;
        self.command = Command::Update;
        self
    }

    pub fn delete(mut self) -> Self {
        self.command = Command::Delete;
        self
    }

    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = Some(columns.to_string());
        self
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn order(mut self, criteria: &str) -> Self {
        self.order = Some(criteria.to_string());
        self
    }

    pub fn group(mut self, columns: &str) -> Self {
        self.group = Some(columns.to_string());
        self
    }

    pub fn having(mut self, conditions: &str) -> Self {
        self.having = Some(conditions.to_string());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Merge bind entries; keys are prefixed with `:` and collisions
    /// overwrite.
    pub fn bind(mut self, entries: Vec<(&str, SqlValue)>) -> Self {
        for (name, value) in entries {
            self.bind.insert(format!(":{}", name), value);
        }
        self
    }

    /// Set a single bind entry, overwriting on collision.
    pub fn bind_value(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.bind.insert(format!(":{}", name), value.into());
        self
    }

    /// Append an AND-connected where clause.
    pub fn and_where(self, conditions: impl Into<Conditions>) -> Self {
        self.push_conditions(conditions.into(), false)
    }

    /// Append an OR-connected where clause.
    pub fn or_where(self, conditions: impl Into<Conditions>) -> Self {
        self.push_conditions(conditions.into(), true)
    }

    pub fn join(mut self, table: &str, condition: &str) -> Self {
        self.joins.push(JoinClause {
            table: table.to_string(),
            condition: condition.to_string(),
        });
        self
    }

    pub fn left_join(mut self, table: &str, condition: &str) -> Self {
        self.left_joins.push(JoinClause {
            table: table.to_string(),
            condition: condition.to_string(),
        });
        self
    }

    pub fn right_join(mut self, table: &str, condition: &str) -> Self {
        self.right_joins.push(JoinClause {
            table: table.to_string(),
            condition: condition.to_string(),
        });
        self
    }

    pub fn full_join(mut self, table: &str, condition: &str) -> Self {
        self.full_joins.push(JoinClause {
            table: table.to_string(),
            condition: condition.to_string(),
        });
        self
    }

    // Read-only views of the accumulated representation.

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn table_name(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn schema_name(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn selected_columns(&self) -> Option<&str> {
        self.columns.as_deref()
    }

    pub fn where_clauses(&self) -> &[String] {
        &self.where_clauses
    }

    pub fn joins_of(&self, kind: JoinKind) -> &[JoinClause] {
        match kind {
            JoinKind::Inner => &self.joins,
            JoinKind::Left => &self.left_joins,
            JoinKind::Right => &self.right_joins,
            JoinKind::Full => &self.full_joins,
        }
    }

    pub fn insert_data(&self) -> &Record {
        &self.data
    }

    /// The accumulated bind map; empty when nothing was bound.
    pub fn bind_values(&self) -> &BTreeMap<String, SqlValue> {
        &self.bind
    }
}
