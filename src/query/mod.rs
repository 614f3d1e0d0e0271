//! Structured SQL query building
//!
//! `DbQuery` accumulates clauses into a normalized representation plus a
//! bind map; the adapter layer is responsible for rendering it into
//! dialect-specific SQL text.

pub mod builder;
pub mod types;
mod where_clause;

pub use builder::DbQuery;
pub use types::{Command, ConditionValue, Conditions, JoinClause, JoinKind};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Record, SqlValue};

    #[test]
    fn builder_is_chainable() {
        let q = DbQuery::new()
            .select()
            .columns("*")
            .table("usuarios")
            .and_where("usuarios.id = :id")
            .bind_value("id", 100i64);

        assert_eq!(q.command(), Command::Select);
        assert_eq!(q.table_name(), Some("usuarios"));
        assert_eq!(q.selected_columns(), Some("*"));
        assert_eq!(q.where_clauses(), &["(usuarios.id = :id)".to_string()]);
        assert_eq!(q.bind_values().get(":id"), Some(&SqlValue::Int(100)));
    }

    #[test]
    fn command_is_last_write_wins() {
        let q = DbQuery::new().select().delete();
        assert_eq!(q.command(), Command::Delete);
    }

    #[test]
    fn insert_merges_data_into_bind_under_prefixed_keys() {
        let mut data = Record::new();
        data.insert("name".to_string(), SqlValue::from("ada"));
        data.insert("email".to_string(), SqlValue::from("ada@example.com"));

        let q = DbQuery::new().insert(data.clone());

        assert_eq!(q.command(), Command::Insert);
        assert_eq!(q.insert_data(), &data);
        assert_eq!(q.bind_values().len(), data.len());
        assert_eq!(q.bind_values().get(":name"), Some(&SqlValue::from("ada")));
        assert_eq!(
            q.bind_values().get(":email"),
            Some(&SqlValue::from("ada@example.com"))
        );
    }

    #[test]
    fn update_binds_exactly_one_entry_per_data_key() {
        let mut data = Record::new();
        data.insert("active".to_string(), SqlValue::Bool(true));

        let q = DbQuery::new().update(data);
        assert_eq!(q.command(), Command::Update);
        assert_eq!(q.bind_values().len(), 1);
        assert!(q.bind_values().contains_key(":active"));
    }

    #[test]
    fn joins_preserve_call_order_per_kind() {
        let q = DbQuery::new()
            .join("a", "a.x = t.x")
            .join("b", "b.y = t.y")
            .left_join("c", "c.z = t.z");

        let inner = q.joins_of(JoinKind::Inner);
        assert_eq!(inner.len(), 2);
        assert_eq!(inner[0].table, "a");
        assert_eq!(inner[1].table, "b");
        assert_eq!(q.joins_of(JoinKind::Left).len(), 1);
        assert!(q.joins_of(JoinKind::Full).is_empty());
    }

    #[test]
    fn scalar_clauses_are_last_write_wins() {
        let q = DbQuery::new().order("a ASC").order("b DESC").limit(5).limit(10);
        assert_eq!(q.order.as_deref(), Some("b DESC"));
        assert_eq!(q.limit, Some(10));
    }

    #[test]
    fn bind_merge_prefixes_keys() {
        let q = DbQuery::new().bind(vec![
            ("id", SqlValue::Int(100)),
            ("login", SqlValue::from("admin")),
        ]);
        assert_eq!(q.bind_values().get(":id"), Some(&SqlValue::Int(100)));
        assert_eq!(q.bind_values().get(":login"), Some(&SqlValue::from("admin")));
    }
}
