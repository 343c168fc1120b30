//! LEFT JOIN clauses with collision-free aliases.

use std::sync::atomic::{AtomicU64, Ordering};

use modeldb_core::{Escape, aliased_column};

use crate::wrap::PrefixedField;

static JOIN_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Right-hand side of a join predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinValue {
    /// Escaped and single-quoted.
    Literal(String),
    /// A column of another table, e.g. `m.`author_id``.
    Field(PrefixedField),
}

impl From<&str> for JoinValue {
    fn from(v: &str) -> Self {
        JoinValue::Literal(v.to_string())
    }
}

impl From<String> for JoinValue {
    fn from(v: String) -> Self {
        JoinValue::Literal(v)
    }
}

impl From<i64> for JoinValue {
    fn from(v: i64) -> Self {
        JoinValue::Literal(v.to_string())
    }
}

impl From<PrefixedField> for JoinValue {
    fn from(v: PrefixedField) -> Self {
        JoinValue::Field(v)
    }
}

/// `LEFT JOIN <table> j<N> ON j<N>.`col` = ... AND ...`
///
/// Every instance draws a fresh alias from a process-wide counter, so any
/// number of joins can appear in one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    table: String,
    alias: String,
    on: Vec<(String, JoinValue)>,
}

impl Join {
    pub fn new(table: impl Into<String>) -> Self {
        let n = JOIN_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
        Self {
            table: table.into(),
            alias: format!("j{n}"),
            on: Vec::new(),
        }
    }

    /// Add `alias.`column` = value` to the ON clause.
    #[must_use]
    pub fn on(mut self, column: impl Into<String>, value: impl Into<JoinValue>) -> Self {
        self.on.push((column.into(), value.into()));
        self
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// A column of the joined table, for use in conditions and field lists.
    pub fn field(&self, column: impl Into<String>) -> PrefixedField {
        PrefixedField::new(column, self.alias.clone())
    }

    pub fn build<E: Escape + ?Sized>(&self, escaper: &E) -> String {
        let predicates: Vec<String> = self
            .on
            .iter()
            .map(|(column, value)| {
                let rhs = match value {
                    JoinValue::Literal(raw) => format!("'{}'", escaper.escape(raw)),
                    JoinValue::Field(field) => field.aliased_name(),
                };
                format!("{} = {rhs}", aliased_column(&self.alias, column))
            })
            .collect();

        let mut sql = format!("LEFT JOIN {} {}", self.table, self.alias);
        if !predicates.is_empty() {
            sql.push_str(" ON ");
            sql.push_str(&predicates.join(" AND "));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modeldb_core::MysqlEscape;

    #[test]
    fn test_join_rendering() {
        let join = Join::new("author")
            .on("id", PrefixedField::main("author_id"))
            .on("active", "1");
        let alias = join.alias().to_string();
        assert_eq!(
            join.build(&MysqlEscape),
            format!("LEFT JOIN author {alias} ON {alias}.`id` = m.`author_id` AND {alias}.`active` = '1'")
        );
    }

    #[test]
    fn test_aliases_never_collide() {
        let a = Join::new("tag");
        let b = Join::new("tag");
        assert_ne!(a.alias(), b.alias());
        assert!(a.alias().starts_with('j'));
    }

    #[test]
    fn test_joined_field_reference() {
        let join = Join::new("author");
        assert_eq!(
            join.field("name").aliased_name(),
            format!("{}.`name`", join.alias())
        );
    }
}
