//! WHERE clause accumulation and the mapping-form sugar

use super::builder::DbQuery;
use super::types::{ConditionValue, Conditions};

impl DbQuery {
    /// Append a fragment with its connector. The first clause carries no
    /// connector; later clauses carry the connector of the method that
    /// produced them.
    pub(crate) fn push_where(&mut self, fragment: &str, or: bool) {
        let connector = if self.where_clauses.is_empty() {
            ""
        } else if or {
            " OR "
        } else {
            " AND "
        };
        self.where_clauses
            .push(format!("{}({})", connector, fragment));
    }

    pub(crate) fn push_conditions(mut self, conditions: Conditions, or: bool) -> Self {
        match conditions {
            Conditions::Raw(expr) => {
                if !expr.trim().is_empty() {
                    self.push_where(&expr, or);
                }
                self
            }
            // Mapping form expands to one fragment per column, always
            // AND-connected, with binds generated per call:
            //   NULL       -> `col IS NULL`, no bind
            //   empty list -> skipped (`IN ()` is invalid SQL and always false)
            //   list       -> `col IN (:_0,:_1,...)`, one bind per element
            //   scalar     -> `col = :vN`, positional names scoped to the call
            Conditions::Map(pairs) => {
                let mut position = 0usize;
                for (column, value) in pairs {
                    match value {
                        ConditionValue::Null => {
                            self.push_where(&format!("{} IS NULL", column), false);
                        }
                        ConditionValue::List(values) => {
                            if !values.is_empty() {
                                let placeholders: Vec<String> = (0..values.len())
                                    .map(|i| format!(":_{}", i))
                                    .collect();
                                self.push_where(
                                    &format!("{} IN ({})", column, placeholders.join(",")),
                                    false,
                                );
                                for (i, v) in values.into_iter().enumerate() {
                                    self.bind.insert(format!(":_{}", i), v);
                                }
                            }
                        }
                        ConditionValue::Scalar(v) => {
                            self.push_where(&format!("{} = :v{}", column, position), false);
                            self.bind.insert(format!(":v{}", position), v);
                        }
                    }
                    position += 1;
                }
                self
            }
        }
    }
}
