//! Persistence engine
//!
//! [`Db`] executes structured queries through the adapter and carries
//! the event dispatcher. All per-model operations (find, create,
//! update, save, delete, counting, transactions) live here; models
//! stay plain data plus hook methods.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::{debug, warn};

use crate::adapter::rendering::{interpolate, render};
use crate::adapter::{Adapter, PreparedStatement};
use crate::error::{OrmError, OrmResult};
use crate::events::{
    AfterQuery, BeforeQuery, DeleteEvent, EventDispatcher, PersistEvent, QueryEvent,
};
use crate::metadata::{self, Metadata};
use crate::query::{ConditionValue, Conditions, DbQuery};
use crate::value::{record_to_object, Record, SqlValue};

use super::core::Model;

/// Handle to a connection plus the subscribed event listeners.
#[derive(Clone)]
pub struct Db {
    adapter: Arc<dyn Adapter>,
    events: EventDispatcher,
}

impl Db {
    pub fn new(adapter: Arc<dyn Adapter>) -> Self {
        Self {
            adapter,
            events: EventDispatcher::new(),
        }
    }

    pub fn with_events(adapter: Arc<dyn Adapter>, events: EventDispatcher) -> Self {
        Self { adapter, events }
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    /// Start a query scoped to a model's table.
    pub fn query<M: Model>(&self) -> ModelQuery<'_, M> {
        let mut query = DbQuery::new().select().table(M::table_name());
        if let Some(schema) = M::schema() {
            query = query.schema(schema);
        }
        ModelQuery {
            db: self,
            query,
            _marker: PhantomData,
        }
    }

    /// Render, announce, prepare and execute one query. Listeners see
    /// the rendered SQL and may rewrite the bind map before execution.
    pub(crate) async fn run(
        &self,
        query: &DbQuery,
    ) -> OrmResult<(Box<dyn PreparedStatement>, u64)> {
        let sql = render(query)?;
        let mut before = BeforeQuery {
            sql: sql.clone(),
            parameters: query.bind_values().clone(),
        };
        self.events.emit_before_query(&mut before).await;

        let mut statement = self.adapter.prepare_query(query).await?;
        let row_count = match statement.execute(&before.parameters).await {
            Ok(count) => count,
            Err(OrmError::Adapter(source)) => {
                return Err(OrmError::Sql {
                    message: source.to_string(),
                    sql: interpolate(&sql, &before.parameters),
                })
            }
            Err(other) => return Err(other),
        };
        debug!(%sql, rows = row_count, "query executed");

        self.events
            .emit_after_query(&AfterQuery {
                sql,
                row_count,
            })
            .await;
        Ok((statement, row_count))
    }

    /// Run a model-scoped SELECT and fetch every row, announcing the
    /// loaded result set to listeners.
    pub(crate) async fn fetch_rows_for<M: Model>(
        &self,
        query: &DbQuery,
    ) -> OrmResult<Vec<Record>> {
        let (mut statement, _) = self.run(query).await?;
        let rows = statement.fetch_all();
        if self.events.has_listeners() {
            self.events
                .emit_model_queried(&QueryEvent {
                    model: M::model_name(),
                    sql: render(query)?,
                    rows: rows.clone(),
                })
                .await;
        }
        Ok(rows)
    }

    pub async fn find_by<M: Model>(
        &self,
        conditions: impl Into<Conditions>,
    ) -> OrmResult<Option<M>> {
        self.query::<M>().and_where(conditions).find().await
    }

    pub async fn find_all_by<M: Model>(
        &self,
        conditions: impl Into<Conditions>,
    ) -> OrmResult<Vec<M>> {
        self.query::<M>().and_where(conditions).find_all().await
    }

    /// Look up by primary key. With `strict`, a missing row is
    /// [`OrmError::NotFound`] instead of `Ok(None)`.
    pub async fn find_by_pk<M: Model>(
        &self,
        value: impl Into<SqlValue>,
        strict: bool,
    ) -> OrmResult<Option<M>> {
        let meta = self.metadata_for::<M>().await?;
        let pk = single_pk::<M>(&meta)?;
        let found = self
            .query::<M>()
            .and_where(Conditions::map(vec![(pk, ConditionValue::scalar(value))]))
            .find()
            .await?;
        if found.is_none() && strict {
            return Err(OrmError::NotFound {
                model: M::model_name().to_string(),
            });
        }
        Ok(found)
    }

    pub async fn find_by_id<M: Model>(&self, value: impl Into<SqlValue>) -> OrmResult<Option<M>> {
        self.find_by_pk(value, false).await
    }

    /// Insert a new row. Returns `Ok(false)` when a hook or validation
    /// vetoes; on success a freshly generated identity is written back
    /// onto the model.
    pub async fn create<M: Model>(&self, model: &mut M) -> OrmResult<bool> {
        if !(model.before_create() && model.before_save() && model.validate(false)) {
            return Ok(false);
        }

        let meta = self.metadata_for::<M>().await?;
        let mut data = extract_table_values(&meta, &model.to_record());
        let identity = meta.primary_key.as_single().map(str::to_string);
        if let Some(pk) = &identity {
            let unset = data.get(pk).map(SqlValue::is_unset).unwrap_or(true);
            if unset {
                data.remove(pk);
            }
        }

        let query = self.base_query::<M>().insert(data.clone());
        let event = PersistEvent {
            model: M::model_name(),
            sql: render(&query)?,
            data,
        };
        self.events.emit_before_create(&event).await;

        let (_statement, affected) = self.run(&query).await?;
        if affected == 0 {
            return Ok(false);
        }

        if let Some(pk) = identity {
            let current = model.to_record();
            let unset = current.get(&pk).map(SqlValue::is_unset).unwrap_or(true);
            if unset {
                let id = self.adapter.last_insert_id().await?;
                if !id.is_null() {
                    let mut patch = Record::new();
                    patch.insert(pk, id);
                    model.apply_record(&patch);
                }
            }
        }

        self.events.emit_after_create(&event).await;
        model.after_create();
        model.after_save();
        Ok(true)
    }

    /// Update an existing row by primary key. `Ok(false)` when a hook
    /// vetoes or when no row with that key exists.
    pub async fn update<M: Model>(&self, model: &mut M) -> OrmResult<bool> {
        if !(model.before_update() && model.before_save() && model.validate(true)) {
            return Ok(false);
        }

        let meta = self.metadata_for::<M>().await?;
        let record = model.to_record();
        if !self.pk_exists::<M>(&meta, &record).await? {
            return Ok(false);
        }

        let data = extract_table_values(&meta, &record);
        let query = where_pk::<M>(&meta, &record, self.base_query::<M>().update(data.clone()))?;
        let event = PersistEvent {
            model: M::model_name(),
            sql: render(&query)?,
            data,
        };
        self.events.emit_before_update(&event).await;
        self.run(&query).await?;
        self.events.emit_after_update(&event).await;

        model.after_update();
        model.after_save();
        Ok(true)
    }

    /// Create or update, routed by whether the primary key is set and
    /// a matching row exists.
    pub async fn save<M: Model>(&self, model: &mut M) -> OrmResult<bool> {
        let meta = self.metadata_for::<M>().await?;
        let record = model.to_record();
        let key_is_set = meta.primary_key.columns().iter().all(|column| {
            record
                .get(*column)
                .map(|value| !value.is_unset())
                .unwrap_or(false)
        });
        if key_is_set && self.pk_exists::<M>(&meta, &record).await? {
            self.update(model).await
        } else {
            self.create(model).await
        }
    }

    /// Delete the row matching the model's primary key.
    pub async fn delete<M: Model>(&self, model: &M) -> OrmResult<bool> {
        let meta = self.metadata_for::<M>().await?;
        let record = model.to_record();
        let query = where_pk::<M>(&meta, &record, self.base_query::<M>().delete())?;
        let event = DeleteEvent {
            model: M::model_name(),
            sql: render(&query)?,
        };
        self.events.emit_before_delete(&event).await;
        let (_statement, affected) = self.run(&query).await?;
        self.events.emit_after_delete(&event).await;
        Ok(affected > 0)
    }

    /// Fetch by primary key, then delete. `Ok(false)` when no row
    /// matched. Fetching first means delete listeners always observe a
    /// row that really existed.
    pub async fn delete_by_pk<M: Model>(&self, value: impl Into<SqlValue>) -> OrmResult<bool> {
        match self.find_by_pk::<M>(value, false).await? {
            Some(model) => self.delete(&model).await,
            None => Ok(false),
        }
    }

    pub async fn delete_by_id<M: Model>(&self, value: impl Into<SqlValue>) -> OrmResult<bool> {
        self.delete_by_pk::<M>(value).await
    }

    /// Bulk UPDATE built by the caller; the table is forced to the
    /// model's. Returns the affected row count.
    pub async fn update_all<M: Model>(&self, query: DbQuery) -> OrmResult<u64> {
        let query = self.rescope::<M>(query);
        let (_statement, affected) = self.run(&query).await?;
        Ok(affected)
    }

    /// Bulk DELETE built by the caller; the table is forced to the
    /// model's. Returns the affected row count.
    pub async fn delete_all<M: Model>(&self, query: DbQuery) -> OrmResult<u64> {
        let query = self.rescope::<M>(query.delete());
        let (_statement, affected) = self.run(&query).await?;
        Ok(affected)
    }

    pub async fn count<M: Model>(&self, query: Option<DbQuery>) -> OrmResult<u64> {
        let base = match query {
            Some(q) => self.rescope::<M>(q.select()),
            None => self.base_query::<M>().select(),
        };
        self.count_query(base).await
    }

    /// Whether a row with the model's primary key exists.
    pub async fn exists<M: Model>(&self, model: &M) -> OrmResult<bool> {
        let meta = self.metadata_for::<M>().await?;
        self.pk_exists::<M>(&meta, &model.to_record()).await
    }

    /// Run `work` inside a transaction. `Ok(true)` commits, `Ok(false)`
    /// rolls back and is returned as-is, an error rolls back best
    /// effort and propagates.
    pub async fn transaction<F, Fut>(&self, work: F) -> OrmResult<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = OrmResult<bool>>,
    {
        self.adapter.begin().await?;
        debug!("transaction started");
        match work().await {
            Ok(true) => {
                self.adapter.commit().await?;
                debug!("transaction committed");
                Ok(true)
            }
            Ok(false) => {
                self.adapter.rollback().await?;
                debug!("transaction rolled back by caller");
                Ok(false)
            }
            Err(error) => {
                if let Err(rollback_error) = self.adapter.rollback().await {
                    warn!(error = %rollback_error, "rollback failed after transaction error");
                }
                Err(error)
            }
        }
    }

    pub(crate) async fn metadata_for<M: Model>(&self) -> OrmResult<Arc<Metadata>> {
        metadata::for_model::<M>(self.adapter.as_ref()).await
    }

    pub(crate) async fn count_query(&self, query: DbQuery) -> OrmResult<u64> {
        let query = query.columns("COUNT(*) AS n");
        let (mut statement, _) = self.run(&query).await?;
        let row = statement.fetch_one().unwrap_or_default();
        Ok(row.get("n").and_then(SqlValue::as_i64).unwrap_or(0) as u64)
    }

    fn base_query<M: Model>(&self) -> DbQuery {
        let mut query = DbQuery::new().table(M::table_name());
        if let Some(schema) = M::schema() {
            query = query.schema(schema);
        }
        query
    }

    fn rescope<M: Model>(&self, query: DbQuery) -> DbQuery {
        let mut query = query.table(M::table_name());
        if let Some(schema) = M::schema() {
            query = query.schema(schema);
        }
        query
    }

    async fn pk_exists<M: Model>(&self, meta: &Metadata, record: &Record) -> OrmResult<bool> {
        let query = where_pk::<M>(meta, record, self.base_query::<M>().select())?;
        Ok(self.count_query(query).await? > 0)
    }
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").field("events", &self.events).finish()
    }
}

/// Keep only columns the table actually has. The empty string and an
/// absent value both collapse to NULL unless the column declares a
/// database default, in which case the column is omitted so the
/// default applies.
fn extract_table_values(meta: &Metadata, record: &Record) -> Record {
    let mut data = Record::new();
    for attribute in &meta.attributes {
        match record.get(&attribute.name) {
            Some(value) if value.is_unset() => {
                if !attribute.has_default {
                    data.insert(attribute.name.clone(), SqlValue::Null);
                }
            }
            Some(value) => {
                data.insert(attribute.name.clone(), value.clone());
            }
            None => {
                if !attribute.has_default {
                    data.insert(attribute.name.clone(), SqlValue::Null);
                }
            }
        }
    }
    data
}

/// Constrain a query to the primary key values found on `record`,
/// binding each column as `:pk_{column}`.
fn where_pk<M: Model>(meta: &Metadata, record: &Record, query: DbQuery) -> OrmResult<DbQuery> {
    let mut query = query;
    for column in meta.primary_key.columns() {
        let value = record
            .get(column)
            .filter(|value| !value.is_unset())
            .cloned()
            .ok_or_else(|| {
                OrmError::Configuration(format!(
                    "{}: primary key column '{}' has no value",
                    M::model_name(),
                    column
                ))
            })?;
        let bind = format!("pk_{}", column);
        query = query
            .and_where(format!("{} = :{}", column, bind))
            .bind_value(&bind, value);
    }
    Ok(query)
}

fn single_pk<M: Model>(meta: &Metadata) -> OrmResult<&str> {
    meta.primary_key.as_single().ok_or_else(|| {
        OrmError::Configuration(format!(
            "{}: operation requires a single-column primary key",
            M::model_name()
        ))
    })
}

/// Typed fluent query over one model's table.
pub struct ModelQuery<'a, M: Model> {
    db: &'a Db,
    query: DbQuery,
    _marker: PhantomData<M>,
}

impl<'a, M: Model> ModelQuery<'a, M> {
    pub fn and_where(mut self, conditions: impl Into<Conditions>) -> Self {
        self.query = self.query.and_where(conditions);
        self
    }

    pub fn or_where(mut self, conditions: impl Into<Conditions>) -> Self {
        self.query = self.query.or_where(conditions);
        self
    }

    pub fn bind_value(mut self, name: &str, value: impl Into<SqlValue>) -> Self {
        self.query = self.query.bind_value(name, value);
        self
    }

    pub fn columns(mut self, columns: &str) -> Self {
        self.query = self.query.columns(columns);
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.query = self.query.distinct(distinct);
        self
    }

    pub fn join(mut self, table: &str, condition: &str) -> Self {
        self.query = self.query.join(table, condition);
        self
    }

    pub fn left_join(mut self, table: &str, condition: &str) -> Self {
        self.query = self.query.left_join(table, condition);
        self
    }

    pub fn order(mut self, criteria: &str) -> Self {
        self.query = self.query.order(criteria);
        self
    }

    pub fn group(mut self, columns: &str) -> Self {
        self.query = self.query.group(columns);
        self
    }

    pub fn having(mut self, conditions: &str) -> Self {
        self.query = self.query.having(conditions);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query = self.query.limit(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.query = self.query.offset(offset);
        self
    }

    /// The accumulated representation, for hand-off to bulk operations.
    pub fn into_query(self) -> DbQuery {
        self.query
    }

    /// First matching model, if any.
    pub async fn find(mut self) -> OrmResult<Option<M>> {
        self.query = self.query.limit(1);
        let rows = self.db.fetch_rows_for::<M>(&self.query).await?;
        rows.first().map(M::from_record).transpose()
    }

    pub async fn find_all(self) -> OrmResult<Vec<M>> {
        let rows = self.db.fetch_rows_for::<M>(&self.query).await?;
        rows.iter().map(M::from_record).collect()
    }

    /// Raw result rows, bypassing model construction.
    pub async fn fetch_rows(self) -> OrmResult<Vec<Record>> {
        self.db.fetch_rows_for::<M>(&self.query).await
    }

    /// Result rows as loose JSON objects.
    pub async fn fetch_objects(self) -> OrmResult<Vec<JsonValue>> {
        let rows = self.fetch_rows().await?;
        Ok(rows.iter().map(record_to_object).collect())
    }

    pub async fn count(self) -> OrmResult<u64> {
        self.db.count_query(self.query).await
    }

    pub async fn exists_one(self) -> OrmResult<bool> {
        Ok(self.count().await? > 0)
    }

    pub async fn paginate(self, page: u32, per_page: u32) -> OrmResult<crate::paginator::Page<M>> {
        crate::paginator::paginate::<M>(self.db, self.query, page, per_page).await
    }
}
