//! Rendering the structured representation into SQL text
//!
//! Placeholders stay in `:name` form; adapters for drivers with
//! positional placeholders rewrite them when preparing. Rendering is
//! also where placeholder/bind consistency is enforced: a placeholder
//! with no bind entry fails here, the last point where the whole
//! picture exists.

use std::collections::BTreeMap;

use crate::error::{OrmError, OrmResult};
use crate::query::{Command, DbQuery, JoinKind};
use crate::value::SqlValue;

/// Render a query into SQL text, validating that every referenced
/// placeholder has a bind entry. Surplus bind entries are tolerated.
pub fn render(query: &DbQuery) -> OrmResult<String> {
    let sql = match query.command() {
        Command::Select => render_select(query)?,
        Command::Insert => render_insert(query)?,
        Command::Update => render_update(query)?,
        Command::Delete => render_delete(query)?,
    };

    for placeholder in placeholders(&sql) {
        if !query.bind_values().contains_key(&placeholder) {
            return Err(OrmError::Sql {
                message: format!("no bind value for placeholder '{}'", placeholder),
                sql,
            });
        }
    }

    Ok(sql)
}

fn qualified_table(query: &DbQuery) -> OrmResult<String> {
    let table = query.table_name().ok_or_else(|| OrmError::Sql {
        message: "query has no table".to_string(),
        sql: String::new(),
    })?;
    Ok(match query.schema_name() {
        Some(schema) => format!("{}.{}", schema, table),
        None => table.to_string(),
    })
}

fn render_select(query: &DbQuery) -> OrmResult<String> {
    let mut sql = String::from("SELECT ");
    if query.distinct {
        sql.push_str("DISTINCT ");
    }
    sql.push_str(query.selected_columns().unwrap_or("*"));
    sql.push_str(" FROM ");
    sql.push_str(&qualified_table(query)?);

    for kind in [JoinKind::Inner, JoinKind::Left, JoinKind::Right, JoinKind::Full] {
        for join in query.joins_of(kind) {
            sql.push_str(&format!(" {} {} ON {}", kind, join.table, join.condition));
        }
    }

    push_where(&mut sql, query);

    if let Some(group) = &query.group {
        sql.push_str(&format!(" GROUP BY {}", group));
    }
    if let Some(having) = &query.having {
        sql.push_str(&format!(" HAVING {}", having));
    }
    if let Some(order) = &query.order {
        sql.push_str(&format!(" ORDER BY {}", order));
    }
    if let Some(limit) = query.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    if let Some(offset) = query.offset {
        sql.push_str(&format!(" OFFSET {}", offset));
    }

    Ok(sql)
}

fn render_insert(query: &DbQuery) -> OrmResult<String> {
    let columns: Vec<&str> = query.insert_data().keys().map(String::as_str).collect();
    let placeholders: Vec<String> = columns.iter().map(|c| format!(":{}", c)).collect();
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table(query)?,
        columns.join(", "),
        placeholders.join(", ")
    ))
}

fn render_update(query: &DbQuery) -> OrmResult<String> {
    let assignments: Vec<String> = query
        .insert_data()
        .keys()
        .map(|c| format!("{} = :{}", c, c))
        .collect();
    let mut sql = format!(
        "UPDATE {} SET {}",
        qualified_table(query)?,
        assignments.join(", ")
    );
    push_where(&mut sql, query);
    Ok(sql)
}

fn render_delete(query: &DbQuery) -> OrmResult<String> {
    let mut sql = format!("DELETE FROM {}", qualified_table(query)?);
    push_where(&mut sql, query);
    Ok(sql)
}

fn push_where(sql: &mut String, query: &DbQuery) {
    if !query.where_clauses().is_empty() {
        sql.push_str(" WHERE ");
        for clause in query.where_clauses() {
            sql.push_str(clause);
        }
    }
}

/// All `:name` placeholders referenced by the SQL text, `:`-prefixed.
/// Colons inside single-quoted literals (time values, `'{"a":1}'`) and
/// `::type` casts are not placeholders and are skipped.
pub fn placeholders(sql: &str) -> Vec<String> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            // quoted literal; '' inside is an escaped quote, not a close
            b'\'' => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == b'\'' {
                        if i + 1 < bytes.len() && bytes[i + 1] == b'\'' {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
                i += 1;
            }
            b':' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b':' {
                    // cast operator, skip both colons and the type name
                    i += 2;
                    while i < bytes.len()
                        && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_')
                    {
                        i += 1;
                    }
                    continue;
                }
                let start = i + 1;
                let mut end = start;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                if end > start {
                    found.push(format!(":{}", &sql[start..end]));
                }
                i = end.max(start);
            }
            _ => i += 1,
        }
    }
    found
}

/// Best-effort reconstruction of the literal SQL for diagnostics; bind
/// values are substituted in as literals. Never executed.
pub fn interpolate(sql: &str, binds: &BTreeMap<String, SqlValue>) -> String {
    // Longest names first so `:v1` never clobbers the front of `:v10`.
    let mut names: Vec<&String> = binds.keys().collect();
    names.sort_by_key(|n| std::cmp::Reverse(n.len()));

    let mut out = sql.to_string();
    for name in names {
        out = out.replace(name.as_str(), &binds[name].literal());
    }
    out
}
