//! Relation definitions and the process-wide registry.
//!
//! A model declares its associations once via [`Model::relations`];
//! the registry materializes them atomically on first use so
//! concurrent lookups never observe a half-registered model.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::error::{OrmError, OrmResult};
use crate::model::Model;

/// Association arity and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    /// Owner carries the foreign key; target row is the key's record.
    BelongsTo,
    /// Inverse single-row lookup, same shape as [`RelationKind::BelongsTo`].
    HasOne,
    /// Target rows carry the owner's key.
    HasMany,
    /// Many-to-many through a junction table.
    HasAndBelongsToMany,
}

/// One declared association.
#[derive(Debug, Clone)]
pub struct RelationDef {
    pub kind: RelationKind,
    pub name: String,
    pub target_model: &'static str,
    pub target_table: &'static str,
    /// For `BelongsTo`/`HasOne`: the owner's column holding the key.
    /// For `HasMany`: the target's column holding the owner's key.
    /// For `HasAndBelongsToMany`: the junction column pointing at the
    /// target.
    pub foreign_key: String,
    /// Junction table, many-to-many only.
    pub through: Option<String>,
    /// Junction column pointing at the owner, many-to-many only.
    pub junction_key: Option<String>,
}

impl RelationDef {
    pub fn belongs_to(
        name: &str,
        target_model: &'static str,
        target_table: &'static str,
        foreign_key: &str,
    ) -> Self {
        Self {
            kind: RelationKind::BelongsTo,
            name: name.to_string(),
            target_model,
            target_table,
            foreign_key: foreign_key.to_string(),
            through: None,
            junction_key: None,
        }
    }

    pub fn has_one(
        name: &str,
        target_model: &'static str,
        target_table: &'static str,
        foreign_key: &str,
    ) -> Self {
        Self {
            kind: RelationKind::HasOne,
            ..Self::belongs_to(name, target_model, target_table, foreign_key)
        }
    }

    pub fn has_many(
        name: &str,
        target_model: &'static str,
        target_table: &'static str,
        foreign_key: &str,
    ) -> Self {
        Self {
            kind: RelationKind::HasMany,
            ..Self::belongs_to(name, target_model, target_table, foreign_key)
        }
    }

    pub fn has_and_belongs_to_many(
        name: &str,
        target_model: &'static str,
        target_table: &'static str,
        foreign_key: &str,
        through: &str,
        junction_key: &str,
    ) -> Self {
        Self {
            kind: RelationKind::HasAndBelongsToMany,
            through: Some(through.to_string()),
            junction_key: Some(junction_key.to_string()),
            ..Self::belongs_to(name, target_model, target_table, foreign_key)
        }
    }

    pub fn is_collection(&self) -> bool {
        matches!(
            self.kind,
            RelationKind::HasMany | RelationKind::HasAndBelongsToMany
        )
    }
}

type RelationMap = HashMap<(String, RelationKind), RelationDef>;

static REGISTRY: Lazy<DashMap<&'static str, Arc<RelationMap>>> = Lazy::new(DashMap::new);

// Lookup order when no kind is given.
const KIND_ORDER: [RelationKind; 4] = [
    RelationKind::BelongsTo,
    RelationKind::HasOne,
    RelationKind::HasMany,
    RelationKind::HasAndBelongsToMany,
];

/// Definitions for a model keyed by name and kind, built on first
/// access. The same name may appear under different kinds; duplicates
/// of the same name and kind resolve to the last definition.
pub fn relations_of<M: Model>() -> Arc<RelationMap> {
    REGISTRY
        .entry(M::model_name())
        .or_insert_with(|| {
            let mut map = RelationMap::new();
            for def in M::relations() {
                map.insert((def.name.clone(), def.kind), def);
            }
            Arc::new(map)
        })
        .clone()
}

/// A single definition by name and, optionally, kind. Without a kind
/// the kinds are searched in declaration-arity order (belongs-to
/// first, many-to-many last). Unknown associations are
/// [`OrmError::Configuration`] naming the model and the name.
pub fn relation_of<M: Model>(name: &str, kind: Option<RelationKind>) -> OrmResult<RelationDef> {
    let map = relations_of::<M>();
    let found = match kind {
        Some(kind) => map.get(&(name.to_string(), kind)),
        None => KIND_ORDER
            .iter()
            .find_map(|kind| map.get(&(name.to_string(), *kind))),
    };
    found
        .cloned()
        .ok_or_else(|| OrmError::unknown_relation(M::model_name(), name))
}
