//! In-memory adapter
//!
//! Executes the structured query representation against vector-backed
//! tables. It understands exactly the fragment shapes the builder
//! emits (`col = :bind`, `col IS NULL`, `col IN (:a,:b)`, column
//! equality for joins) which is enough to exercise the whole engine in
//! tests and in downstream test suites without a database.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{OrmError, OrmResult};
use crate::metadata::Metadata;
use crate::query::{Command, DbQuery, JoinKind};
use crate::value::{Record, SqlValue};

use super::{Adapter, PreparedStatement};

#[derive(Default)]
struct State {
    tables: HashMap<String, Vec<Record>>,
    schemas: HashMap<String, Metadata>,
    next_ids: HashMap<String, i64>,
    last_insert_id: SqlValue,
    snapshot: Option<Snapshot>,
}

struct Snapshot {
    tables: HashMap<String, Vec<Record>>,
    next_ids: HashMap<String, i64>,
    last_insert_id: SqlValue,
}

/// Adapter over in-process tables; cheap to clone and share.
#[derive(Clone)]
pub struct MemoryAdapter {
    state: Arc<Mutex<State>>,
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Register a table with its metadata; `describe` serves it back.
    pub fn register_table(&self, metadata: Metadata) {
        let mut state = self.state.lock().expect("memory adapter poisoned");
        state.tables.entry(metadata.table.clone()).or_default();
        state.schemas.insert(metadata.table.clone(), metadata);
    }

    /// Seed rows directly, bypassing the engine.
    pub fn seed(&self, table: &str, rows: Vec<Record>) {
        let mut state = self.state.lock().expect("memory adapter poisoned");
        state.tables.entry(table.to_string()).or_default().extend(rows);
    }

    /// Current rows of a table, for assertions.
    pub fn rows(&self, table: &str) -> Vec<Record> {
        let state = self.state.lock().expect("memory adapter poisoned");
        state.tables.get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    async fn prepare(&self, _sql: &str) -> OrmResult<Box<dyn PreparedStatement>> {
        Err(OrmError::Configuration(
            "memory adapter executes the query representation, not raw SQL".to_string(),
        ))
    }

    async fn prepare_query(&self, query: &DbQuery) -> OrmResult<Box<dyn PreparedStatement>> {
        Ok(Box::new(MemoryStatement {
            state: Arc::clone(&self.state),
            query: query.clone(),
            results: Vec::new(),
            affected: 0,
            cursor: 0,
        }))
    }

    async fn last_insert_id(&self) -> OrmResult<SqlValue> {
        let state = self.state.lock().expect("memory adapter poisoned");
        Ok(state.last_insert_id.clone())
    }

    async fn begin(&self) -> OrmResult<()> {
        let mut state = self.state.lock().expect("memory adapter poisoned");
        if state.snapshot.is_some() {
            return Err(OrmError::Transaction(
                "memory adapter does not nest transactions".to_string(),
            ));
        }
        let snapshot = Snapshot {
            tables: state.tables.clone(),
            next_ids: state.next_ids.clone(),
            last_insert_id: state.last_insert_id.clone(),
        };
        state.snapshot = Some(snapshot);
        Ok(())
    }

    async fn commit(&self) -> OrmResult<()> {
        let mut state = self.state.lock().expect("memory adapter poisoned");
        state
            .snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| OrmError::Transaction("no transaction to commit".to_string()))
    }

    async fn rollback(&self) -> OrmResult<()> {
        let mut state = self.state.lock().expect("memory adapter poisoned");
        let snapshot = state
            .snapshot
            .take()
            .ok_or_else(|| OrmError::Transaction("no transaction to roll back".to_string()))?;
        state.tables = snapshot.tables;
        state.next_ids = snapshot.next_ids;
        state.last_insert_id = snapshot.last_insert_id;
        Ok(())
    }

    async fn describe(&self, table: &str, _schema: Option<&str>) -> OrmResult<Metadata> {
        let state = self.state.lock().expect("memory adapter poisoned");
        state
            .schemas
            .get(table)
            .cloned()
            .ok_or_else(|| OrmError::Configuration(format!("unknown table '{}'", table)))
    }
}

struct MemoryStatement {
    state: Arc<Mutex<State>>,
    query: DbQuery,
    results: Vec<Record>,
    affected: u64,
    cursor: usize,
}

#[async_trait]
impl PreparedStatement for MemoryStatement {
    async fn execute(&mut self, binds: &BTreeMap<String, SqlValue>) -> OrmResult<u64> {
        let mut state = self.state.lock().expect("memory adapter poisoned");
        let table = self
            .query
            .table_name()
            .ok_or_else(|| OrmError::Configuration("query has no table".to_string()))?
            .to_string();

        self.results.clear();
        self.cursor = 0;
        self.affected = 0;

        match self.query.command() {
            Command::Select => {
                self.results = run_select(&state, &self.query, binds)?;
            }
            Command::Insert => {
                let mut record = self.query.insert_data().clone();
                let pk_column = state
                    .schemas
                    .get(&table)
                    .and_then(|meta| meta.primary_key.as_single())
                    .map(str::to_string);
                if let Some(pk) = pk_column {
                    let missing = record.get(&pk).map(SqlValue::is_unset).unwrap_or(true);
                    if missing {
                        let next = state.next_ids.entry(table.clone()).or_insert(0);
                        *next += 1;
                        let id = SqlValue::Int(*next);
                        record.insert(pk, id.clone());
                        state.last_insert_id = id;
                    }
                }
                state.tables.entry(table).or_default().push(record);
                self.affected = 1;
            }
            Command::Update => {
                let query = &self.query;
                let rows = state.tables.entry(table).or_default();
                let mut affected = 0;
                for row in rows.iter_mut() {
                    if matches_where(query, row, binds)? {
                        for (column, _) in query.insert_data() {
                            if let Some(value) = binds.get(&format!(":{}", column)) {
                                row.insert(column.clone(), value.clone());
                            }
                        }
                        affected += 1;
                    }
                }
                self.affected = affected;
            }
            Command::Delete => {
                let query = &self.query;
                let rows = state.tables.entry(table).or_default();
                let before = rows.len();
                let mut failure = None;
                rows.retain(|row| match matches_where(query, row, binds) {
                    Ok(matched) => !matched,
                    Err(e) => {
                        failure.get_or_insert(e);
                        true
                    }
                });
                if let Some(e) = failure {
                    return Err(e);
                }
                self.affected = (before - rows.len()) as u64;
            }
        }

        Ok(self.affected)
    }

    fn row_count(&self) -> u64 {
        self.affected
    }

    fn fetch_one(&mut self) -> Option<Record> {
        let row = self.results.get(self.cursor).cloned();
        if row.is_some() {
            self.cursor += 1;
        }
        row
    }

    fn fetch_all(&mut self) -> Vec<Record> {
        let rest = self.results.split_off(self.cursor);
        self.cursor = self.results.len();
        rest
    }
}

/// One result-set row during evaluation: aliased records, first entry
/// is the base table.
struct Scope<'a> {
    entries: Vec<(String, &'a Record)>,
}

impl<'a> Scope<'a> {
    fn lookup(&self, reference: &str) -> Option<&SqlValue> {
        if let Some((qualifier, column)) = reference.split_once('.') {
            self.entries
                .iter()
                .find(|(alias, _)| alias == qualifier)
                .and_then(|(_, record)| record.get(column))
        } else {
            self.entries
                .iter()
                .find_map(|(_, record)| record.get(reference))
        }
    }
}

fn run_select(
    state: &State,
    query: &DbQuery,
    binds: &BTreeMap<String, SqlValue>,
) -> OrmResult<Vec<Record>> {
    for kind in [JoinKind::Left, JoinKind::Right, JoinKind::Full] {
        if !query.joins_of(kind).is_empty() {
            return Err(OrmError::Configuration(format!(
                "memory adapter does not evaluate {} clauses",
                kind
            )));
        }
    }

    let base_table = query.table_name().unwrap_or_default().to_string();
    let base_rows = state.tables.get(&base_table).cloned().unwrap_or_default();

    // Expand inner joins into row combinations whose ON condition holds.
    let mut combos: Vec<Vec<(String, Record)>> = base_rows
        .into_iter()
        .map(|row| vec![(base_table.clone(), row)])
        .collect();

    for join in query.joins_of(JoinKind::Inner) {
        let (join_table, alias) = parse_join_target(&join.table);
        let join_rows = state.tables.get(&join_table).cloned().unwrap_or_default();
        let mut expanded = Vec::new();
        for combo in combos {
            for join_row in &join_rows {
                let mut candidate = combo.clone();
                candidate.push((alias.clone(), join_row.clone()));
                let scope = Scope {
                    entries: candidate
                        .iter()
                        .map(|(a, r)| (a.clone(), r))
                        .collect(),
                };
                if eval_expression(&join.condition, &scope, binds)? {
                    expanded.push(candidate);
                }
            }
        }
        combos = expanded;
    }

    let mut matched: Vec<Vec<(String, Record)>> = Vec::new();
    for combo in combos {
        let scope = Scope {
            entries: combo.iter().map(|(a, r)| (a.clone(), r)).collect(),
        };
        if eval_where(query, &scope, binds)? {
            matched.push(combo);
        }
    }

    let columns = query.selected_columns().unwrap_or("*");
    if is_count_star(columns) {
        let alias = count_alias(columns);
        let mut row = Record::new();
        row.insert(alias, SqlValue::Int(matched.len() as i64));
        return Ok(vec![row]);
    }

    let mut rows: Vec<Record> = matched
        .into_iter()
        .map(|combo| project(columns, &combo))
        .collect();

    if let Some(order) = &query.order {
        sort_rows(&mut rows, order);
    }

    let offset = query.offset.unwrap_or(0) as usize;
    let rows: Vec<Record> = rows.into_iter().skip(offset).collect();
    let rows = match query.limit {
        Some(limit) => rows.into_iter().take(limit as usize).collect(),
        None => rows,
    };

    Ok(rows)
}

fn matches_where(
    query: &DbQuery,
    row: &Record,
    binds: &BTreeMap<String, SqlValue>,
) -> OrmResult<bool> {
    let table = query.table_name().unwrap_or_default().to_string();
    let scope = Scope {
        entries: vec![(table, row)],
    };
    eval_where(query, &scope, binds)
}

// AND binds tighter than OR, matching SQL: each OR starts a new
// conjunction group and the groups are disjoined.
fn eval_where(
    query: &DbQuery,
    scope: &Scope<'_>,
    binds: &BTreeMap<String, SqlValue>,
) -> OrmResult<bool> {
    let mut any = false;
    let mut current = true;
    let mut started = false;
    for clause in query.where_clauses() {
        let (or, inner) = split_connector(clause);
        let value = eval_expression(inner, scope, binds)?;
        if started && or {
            any = any || current;
            current = value;
        } else {
            current = current && value;
        }
        started = true;
    }
    if !started {
        return Ok(true);
    }
    Ok(any || current)
}

fn split_connector(clause: &str) -> (bool, &str) {
    if let Some(rest) = clause.strip_prefix(" OR ") {
        (true, rest)
    } else if let Some(rest) = clause.strip_prefix(" AND ") {
        (false, rest)
    } else {
        (false, clause)
    }
}

fn eval_expression(
    expression: &str,
    scope: &Scope<'_>,
    binds: &BTreeMap<String, SqlValue>,
) -> OrmResult<bool> {
    let expr = expression
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim();

    if let Some(column) = expr.strip_suffix(" IS NULL") {
        return Ok(scope
            .lookup(column.trim())
            .map(SqlValue::is_null)
            .unwrap_or(true));
    }

    if let Some((column, list)) = expr.split_once(" IN ") {
        let column_value = scope.lookup(column.trim());
        let list = list.trim().trim_start_matches('(').trim_end_matches(')');
        for placeholder in list.split(',') {
            let bound = resolve_bind(placeholder.trim(), binds)?;
            if column_value == Some(&bound) {
                return Ok(true);
            }
        }
        return Ok(false);
    }

    if let Some((lhs, rhs)) = expr.split_once('=') {
        let lhs = lhs.trim();
        let rhs = rhs.trim();
        let left = scope.lookup(lhs).cloned().unwrap_or(SqlValue::Null);
        let right = if rhs.starts_with(':') {
            resolve_bind(rhs, binds)?
        } else {
            scope.lookup(rhs).cloned().unwrap_or(SqlValue::Null)
        };
        return Ok(!left.is_null() && left == right);
    }

    Err(OrmError::Configuration(format!(
        "memory adapter cannot evaluate condition '{}'",
        expression
    )))
}

fn resolve_bind(placeholder: &str, binds: &BTreeMap<String, SqlValue>) -> OrmResult<SqlValue> {
    binds.get(placeholder).cloned().ok_or_else(|| OrmError::Sql {
        message: format!("no bind value for placeholder '{}'", placeholder),
        sql: String::new(),
    })
}

fn parse_join_target(target: &str) -> (String, String) {
    let lowered = target.to_ascii_lowercase();
    if let Some(position) = lowered.find(" as ") {
        let table = target[..position].trim().to_string();
        let alias = target[position + 4..].trim().to_string();
        (table, alias)
    } else {
        (target.trim().to_string(), target.trim().to_string())
    }
}

fn is_count_star(columns: &str) -> bool {
    columns.to_ascii_lowercase().starts_with("count(")
}

fn count_alias(columns: &str) -> String {
    let lowered = columns.to_ascii_lowercase();
    match lowered.find(" as ") {
        Some(position) => columns[position + 4..].trim().to_string(),
        None => "count".to_string(),
    }
}

fn project(columns: &str, combo: &[(String, Record)]) -> Record {
    let trimmed = columns.trim();
    if trimmed == "*" {
        return combo[0].1.clone();
    }
    if let Some(qualifier) = trimmed.strip_suffix(".*") {
        if let Some((_, record)) = combo.iter().find(|(alias, _)| alias == qualifier) {
            return record.clone();
        }
        return combo[0].1.clone();
    }

    let scope = Scope {
        entries: combo.iter().map(|(a, r)| (a.clone(), r)).collect(),
    };
    let mut row = Record::new();
    for column in trimmed.split(',') {
        let column = column.trim();
        let key = column.rsplit('.').next().unwrap_or(column).to_string();
        let value = scope.lookup(column).cloned().unwrap_or(SqlValue::Null);
        row.insert(key, value);
    }
    row
}

fn sort_rows(rows: &mut [Record], order: &str) {
    let mut parts = order.split_whitespace();
    let column = match parts.next() {
        Some(c) => c.rsplit('.').next().unwrap_or(c).to_string(),
        None => return,
    };
    let descending = parts
        .next()
        .map(|d| d.eq_ignore_ascii_case("DESC"))
        .unwrap_or(false);

    rows.sort_by(|a, b| {
        let ordering = compare(a.get(&column), b.get(&column));
        if descending {
            ordering.reverse()
        } else {
            ordering
        }
    });
}

fn compare(a: Option<&SqlValue>, b: Option<&SqlValue>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Some(SqlValue::Int(x)), Some(SqlValue::Int(y))) => x.cmp(y),
        (Some(SqlValue::Float(x)), Some(SqlValue::Float(y))) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        (Some(SqlValue::String(x)), Some(SqlValue::String(y))) => x.cmp(y),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        _ => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Attribute;
    use crate::query::Conditions;

    fn users_adapter() -> MemoryAdapter {
        let adapter = MemoryAdapter::new();
        adapter.register_table(
            Metadata::new(
                "users",
                None,
                vec![
                    Attribute::new("id").primary_key().auto_increment(),
                    Attribute::new("name"),
                ],
            )
            .unwrap(),
        );
        adapter
    }

    fn user(id: i64, name: &str) -> Record {
        let mut r = Record::new();
        r.insert("id".to_string(), SqlValue::Int(id));
        r.insert("name".to_string(), SqlValue::from(name));
        r
    }

    #[tokio::test]
    async fn insert_assigns_identity_and_tracks_last_id() {
        let adapter = users_adapter();
        let mut data = Record::new();
        data.insert("name".to_string(), SqlValue::from("ada"));
        let q = DbQuery::new().table("users").insert(data);

        let mut stmt = adapter.prepare_query(&q).await.unwrap();
        let binds = q.bind_values().clone();
        assert_eq!(stmt.execute(&binds).await.unwrap(), 1);
        assert_eq!(adapter.last_insert_id().await.unwrap(), SqlValue::Int(1));
        assert_eq!(adapter.rows("users")[0].get("id"), Some(&SqlValue::Int(1)));
    }

    #[tokio::test]
    async fn select_filters_and_orders() {
        let adapter = users_adapter();
        adapter.seed("users", vec![user(1, "bob"), user(2, "ada"), user(3, "cyd")]);

        let q = DbQuery::new()
            .select()
            .table("users")
            .and_where(Conditions::map(vec![(
                "id",
                crate::query::ConditionValue::list(vec![1i64, 2]),
            )]))
            .order("name ASC");

        let mut stmt = adapter.prepare_query(&q).await.unwrap();
        stmt.execute(q.bind_values()).await.unwrap();
        let rows = stmt.fetch_all();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&SqlValue::from("ada")));
    }

    #[tokio::test]
    async fn and_binds_tighter_than_or() {
        let adapter = users_adapter();
        adapter.seed("users", vec![user(1, "ada"), user(2, "bob")]);

        // id = 1 OR (id = 2 AND name = 'zzz'): left-to-right folding
        // would drop the id = 1 match.
        let q = DbQuery::new()
            .select()
            .table("users")
            .and_where("id = :a")
            .or_where("id = :b")
            .and_where("name = :n")
            .bind_value("a", 1i64)
            .bind_value("b", 2i64)
            .bind_value("n", "zzz");

        let mut stmt = adapter.prepare_query(&q).await.unwrap();
        stmt.execute(q.bind_values()).await.unwrap();
        let rows = stmt.fetch_all();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("id"), Some(&SqlValue::Int(1)));
    }

    #[tokio::test]
    async fn count_star_produces_aliased_single_row() {
        let adapter = users_adapter();
        adapter.seed("users", vec![user(1, "a"), user(2, "b")]);

        let q = DbQuery::new().select().columns("COUNT(*) AS n").table("users");
        let mut stmt = adapter.prepare_query(&q).await.unwrap();
        stmt.execute(q.bind_values()).await.unwrap();
        assert_eq!(stmt.fetch_one().unwrap().get("n"), Some(&SqlValue::Int(2)));
    }

    #[tokio::test]
    async fn rollback_restores_snapshot() {
        let adapter = users_adapter();
        adapter.seed("users", vec![user(1, "a")]);

        adapter.begin().await.unwrap();
        let q = DbQuery::new()
            .table("users")
            .delete()
            .and_where("id = :id")
            .bind_value("id", 1i64);
        let mut stmt = adapter.prepare_query(&q).await.unwrap();
        stmt.execute(q.bind_values()).await.unwrap();
        assert!(adapter.rows("users").is_empty());

        adapter.rollback().await.unwrap();
        assert_eq!(adapter.rows("users").len(), 1);
    }
}
