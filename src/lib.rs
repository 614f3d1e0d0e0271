//! # registro-orm: ActiveRecord-style data layer
//!
//! Models are plain structs implementing [`model::Model`]; the engine
//! in [`model::Db`] drives finding, persistence hooks, lifecycle
//! events and transactions against any [`adapter::Adapter`]. Queries
//! are accumulated as a structured representation ([`query::DbQuery`])
//! and rendered to SQL only at the adapter boundary, so the in-memory
//! adapter can execute the representation directly in tests.

pub mod adapter;
pub mod error;
pub mod events;
pub mod metadata;
pub mod model;
pub mod paginator;
pub mod query;
pub mod relations;
pub mod value;

// Re-export the types a typical caller touches.
pub use adapter::{Adapter, MemoryAdapter, PreparedStatement};
pub use error::{OrmError, OrmResult};
pub use events::{
    AfterQuery, BeforeQuery, DeleteEvent, EventDispatcher, EventListener, PersistEvent, QueryEvent,
};
pub use metadata::{Attribute, Metadata, PrimaryKey};
pub use model::{Db, Model, ModelQuery};
pub use paginator::{paginate, Page};
pub use query::{Command, ConditionValue, Conditions, DbQuery, JoinClause, JoinKind};
pub use relations::{get_many, get_one, RelationDef, RelationKind};
pub use value::{record_to_object, Record, SqlValue};
