//! Associations: declaration, registry and lazy resolution.

mod registry;
mod resolve;

pub use registry::{relation_of, relations_of, RelationDef, RelationKind};
pub use resolve::{get_many, get_one};
