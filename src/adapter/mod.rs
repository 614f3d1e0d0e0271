//! Adapter boundary: the prepared-statement collaborator traits
//!
//! The engine talks to storage exclusively through these traits. An
//! adapter wraps a driver connection and turns the structured query
//! representation into an executable statement; the engine never sees
//! driver types.

pub mod memory;
pub mod rendering;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::OrmResult;
use crate::metadata::Metadata;
use crate::query::DbQuery;
use crate::value::{Record, SqlValue};

pub use memory::MemoryAdapter;

/// A prepared statement: execute with a bind map, then fetch.
///
/// Fetching yields plain records; the engine owns the typed decode
/// paths (records, generic objects, hydrated models).
#[async_trait]
pub trait PreparedStatement: Send {
    /// Execute with the given binds; returns the affected row count for
    /// DML, 0 for selects.
    async fn execute(&mut self, binds: &BTreeMap<String, SqlValue>) -> OrmResult<u64>;

    /// Rows affected by the last execution.
    fn row_count(&self) -> u64;

    /// Next result row, if any.
    fn fetch_one(&mut self) -> Option<Record>;

    /// All remaining result rows.
    fn fetch_all(&mut self) -> Vec<Record>;
}

/// A prepared-statement-capable connection plus schema introspection.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Prepare a raw SQL string. Adapters that only understand the
    /// structured representation may reject this.
    async fn prepare(&self, sql: &str) -> OrmResult<Box<dyn PreparedStatement>>;

    /// Prepare from the structured query representation; this is the
    /// path the engine uses.
    async fn prepare_query(&self, query: &DbQuery) -> OrmResult<Box<dyn PreparedStatement>>;

    /// Identifier generated by the last successful insert.
    async fn last_insert_id(&self) -> OrmResult<SqlValue>;

    async fn begin(&self) -> OrmResult<()>;
    async fn commit(&self) -> OrmResult<()>;
    async fn rollback(&self) -> OrmResult<()>;

    /// Column definitions and primary key for a table.
    async fn describe(&self, table: &str, schema: Option<&str>) -> OrmResult<Metadata>;
}
