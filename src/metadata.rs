//! Table metadata: column definitions and primary keys
//!
//! Metadata is produced by `Adapter::describe`, cached per model class
//! for the process lifetime and never invalidated; schema changes
//! require a restart.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::adapter::Adapter;
use crate::error::{OrmError, OrmResult};
use crate::model::Model;

/// One column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub primary_key: bool,
    pub foreign_key: bool,
    pub not_null: bool,
    pub has_default: bool,
    pub data_type: Option<String>,
    pub length: Option<u32>,
    pub unique: bool,
    pub auto_increment: bool,
}

impl Attribute {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            primary_key: false,
            foreign_key: false,
            not_null: false,
            has_default: false,
            data_type: None,
            length: None,
            unique: false,
            auto_increment: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn foreign_key(mut self) -> Self {
        self.foreign_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }
}

/// Primary key description: a single column or an ordered composite.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

impl PrimaryKey {
    pub fn columns(&self) -> Vec<&str> {
        match self {
            PrimaryKey::Single(c) => vec![c.as_str()],
            PrimaryKey::Composite(cs) => cs.iter().map(String::as_str).collect(),
        }
    }

    pub fn as_single(&self) -> Option<&str> {
        match self {
            PrimaryKey::Single(c) => Some(c.as_str()),
            PrimaryKey::Composite(_) => None,
        }
    }
}

/// Per-table metadata, created once per model class and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub table: String,
    pub schema: Option<String>,
    pub primary_key: PrimaryKey,
    pub attributes: Vec<Attribute>,
}

impl Metadata {
    /// Derive the primary key from attributes; errors when the table
    /// declares none.
    pub fn new(table: &str, schema: Option<&str>, attributes: Vec<Attribute>) -> OrmResult<Self> {
        let mut pk_columns = attributes
            .iter()
            .filter(|a| a.primary_key)
            .map(|a| a.name.clone());

        let primary_key = match (pk_columns.next(), pk_columns.next()) {
            (None, _) => {
                return Err(OrmError::Configuration(format!(
                    "table '{}' declares no primary key",
                    table
                )))
            }
            (Some(single), None) => PrimaryKey::Single(single),
            (Some(first), Some(second)) => {
                let mut columns = vec![first, second];
                columns.extend(pk_columns);
                PrimaryKey::Composite(columns)
            }
        };

        Ok(Self {
            table: table.to_string(),
            schema: schema.map(str::to_string),
            primary_key,
            attributes,
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn attribute_names(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.name.as_str()).collect()
    }
}

static METADATA_CACHE: Lazy<DashMap<&'static str, Arc<Metadata>>> = Lazy::new(DashMap::new);

/// Metadata for a model class, describing the table through the adapter
/// on first access and serving the cached copy afterwards.
pub async fn for_model<M: Model>(adapter: &dyn Adapter) -> OrmResult<Arc<Metadata>> {
    if let Some(cached) = METADATA_CACHE.get(M::model_name()) {
        return Ok(Arc::clone(cached.value()));
    }

    let described = Arc::new(adapter.describe(M::table_name(), M::schema()).await?);
    // Concurrent first lookups may both describe; the first insert wins
    // and both see a consistent value.
    let entry = METADATA_CACHE
        .entry(M::model_name())
        .or_insert(described);
    Ok(Arc::clone(entry.value()))
}

/// Drop all cached metadata. Test-only escape hatch; production code
/// never invalidates.
#[doc(hidden)]
pub fn clear_cache() {
    METADATA_CACHE.clear();
}
