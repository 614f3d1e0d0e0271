//! Model trait and persistence engine.

mod core;
mod operations;

pub use self::core::Model;
pub use self::operations::{Db, ModelQuery};
