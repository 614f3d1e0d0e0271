//! Lazy association resolution.
//!
//! Every lookup issues a fresh query at call time; nothing is cached
//! on the owner. An unset key on the owner short-circuits to an empty
//! result instead of querying for NULL.

use crate::error::{OrmError, OrmResult};
use crate::model::{Db, Model};
use crate::query::{ConditionValue, Conditions};

use super::registry::{self, RelationKind};

/// Resolve a single-row association (`belongs_to` or `has_one`).
///
/// The target row is the one whose primary key equals the owner's
/// foreign-key value; `extra` narrows the lookup further.
pub async fn get_one<O: Model, T: Model>(
    db: &Db,
    owner: &O,
    name: &str,
    extra: Option<Conditions>,
) -> OrmResult<Option<T>> {
    let def = registry::relation_of::<O>(name, None)?;
    if def.is_collection() {
        return Err(OrmError::Configuration(format!(
            "{}: association '{}' is a collection, use get_many",
            O::model_name(),
            name
        )));
    }
    check_target::<O, T>(&def.target_model, name)?;

    let key = match owner.to_record().get(&def.foreign_key) {
        Some(value) if !value.is_unset() => value.clone(),
        _ => return Ok(None),
    };

    let target_meta = db.metadata_for::<T>().await?;
    let target_pk = single_pk::<T>(&target_meta)?;

    let mut query = db
        .query::<T>()
        .and_where(Conditions::map(vec![(target_pk, ConditionValue::from(key))]));
    if let Some(conditions) = extra {
        query = query.and_where(conditions);
    }
    query.find().await
}

/// Resolve a collection association (`has_many` or the many-to-many
/// form through a junction table).
pub async fn get_many<O: Model, T: Model>(
    db: &Db,
    owner: &O,
    name: &str,
    extra: Option<Conditions>,
) -> OrmResult<Vec<T>> {
    let def = registry::relation_of::<O>(name, None)?;
    if !def.is_collection() {
        return Err(OrmError::Configuration(format!(
            "{}: association '{}' is single-valued, use get_one",
            O::model_name(),
            name
        )));
    }
    check_target::<O, T>(&def.target_model, name)?;

    let owner_meta = db.metadata_for::<O>().await?;
    let owner_pk = single_pk::<O>(&owner_meta)?;
    let owner_key = match owner.to_record().get(owner_pk) {
        Some(value) if !value.is_unset() => value.clone(),
        _ => return Ok(Vec::new()),
    };

    let mut query = match def.kind {
        RelationKind::HasMany => db.query::<T>().and_where(Conditions::map(vec![(
            def.foreign_key.as_str(),
            ConditionValue::from(owner_key),
        )])),
        RelationKind::HasAndBelongsToMany => {
            let through = def.through.as_deref().ok_or_else(|| {
                OrmError::Configuration(format!(
                    "{}: association '{}' has no junction table",
                    O::model_name(),
                    name
                ))
            })?;
            let junction_key = def.junction_key.as_deref().ok_or_else(|| {
                OrmError::Configuration(format!(
                    "{}: association '{}' has no junction key",
                    O::model_name(),
                    name
                ))
            })?;
            let target_meta = db.metadata_for::<T>().await?;
            let target_pk = single_pk::<T>(&target_meta)?;

            db.query::<T>()
                .columns(&format!("{}.*", def.target_table))
                .join(
                    &format!("{} AS th", through),
                    &format!("th.{} = {}.{}", def.foreign_key, def.target_table, target_pk),
                )
                .and_where(format!("th.{} = :owner_pk", junction_key))
                .bind_value("owner_pk", owner_key)
        }
        RelationKind::BelongsTo | RelationKind::HasOne => unreachable!(),
    };
    if let Some(conditions) = extra {
        query = query.and_where(conditions);
    }
    query.find_all().await
}

fn check_target<O: Model, T: Model>(declared: &str, name: &str) -> OrmResult<()> {
    if declared != T::model_name() {
        return Err(OrmError::Configuration(format!(
            "{}: association '{}' targets {}, not {}",
            O::model_name(),
            name,
            declared,
            T::model_name()
        )));
    }
    Ok(())
}

fn single_pk<M: Model>(meta: &crate::metadata::Metadata) -> OrmResult<&str> {
    meta.primary_key.as_single().ok_or_else(|| {
        OrmError::Configuration(format!(
            "{}: associations require a single-column primary key",
            M::model_name()
        ))
    })
}
