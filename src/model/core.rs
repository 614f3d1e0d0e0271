//! Model trait
//!
//! Implemented by application structs that map to a table. The engine
//! drives everything else: column metadata is described through the
//! adapter, persistence happens through [`crate::model::Db`], and
//! associations are declared by returning [`RelationDef`]s.

use crate::error::OrmResult;
use crate::relations::RelationDef;
use crate::value::Record;

/// A persistable entity.
///
/// Hooks return `bool`: `false` vetoes the operation without raising
/// an error, and the engine reports it as `Ok(false)`.
pub trait Model: Send + Sync + Sized + 'static {
    /// Stable name used in errors, events and the relation registry.
    fn model_name() -> &'static str;

    fn table_name() -> &'static str;

    fn schema() -> Option<&'static str> {
        None
    }

    /// Build an instance from a result row.
    fn from_record(record: &Record) -> OrmResult<Self>;

    /// Current attribute values, keyed by column name.
    fn to_record(&self) -> Record;

    /// Assign the given columns onto the instance, ignoring keys the
    /// model does not know. Used for identity write-back after insert
    /// and for mass assignment.
    fn apply_record(&mut self, record: &Record);

    /// Associations, read once at first use and cached in the global
    /// registry.
    fn relations() -> Vec<RelationDef> {
        Vec::new()
    }

    fn before_create(&mut self) -> bool {
        true
    }

    fn before_update(&mut self) -> bool {
        true
    }

    fn before_save(&mut self) -> bool {
        true
    }

    /// `updating` is true when called from the update path.
    fn validate(&mut self, _updating: bool) -> bool {
        true
    }

    fn after_create(&mut self) {}

    fn after_update(&mut self) {}

    fn after_save(&mut self) {}
}
