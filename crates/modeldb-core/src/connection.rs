//! Contracts consumed from the database driver.
//!
//! The engine is synchronous: every statement is a blocking call that either
//! yields a fully buffered [`RowCursor`] or a [`DatabaseError`]. Drivers report
//! all column values in their textual wire form; typing happens above this
//! layer through [`crate::Value::convert`].

use std::collections::VecDeque;

use crate::error::{DatabaseError, Result};
use crate::identifiers::escape_string;

/// String escaping primitive used when rendering SQL literals.
pub trait Escape {
    /// Neutralize quotes and backslashes for embedding inside `'...'`.
    fn escape(&self, raw: &str) -> String {
        escape_string(raw)
    }
}

/// MySQL-compatible escaping without a live connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlEscape;

impl Escape for MysqlEscape {}

/// A live database connection.
pub trait Connection: Escape {
    /// Execute one statement and buffer its result rows.
    fn execute(&mut self, sql: &str) -> std::result::Result<RowCursor, DatabaseError>;

    /// Rows affected by the last data-modifying statement.
    fn affected_rows(&self) -> u64;

    /// Id generated by the last insert into an autoincrement table.
    fn last_insert_id(&self) -> i64;

    /// SQLSTATE of the last failure, if the last statement failed.
    fn error_code(&self) -> Option<String> {
        self.error_info().map(|err| err.code)
    }

    /// Full description of the last failure.
    fn error_info(&self) -> Option<DatabaseError>;
}

/// Opens connections from a DSN.
pub trait Driver {
    type Connection: Connection;

    fn connect(&self, dsn: &str) -> Result<Self::Connection>;
}

/// One result row: ordered `(column, value)` pairs, `None` for SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    columns: Vec<(String, Option<String>)>,
}

impl Row {
    pub fn new(columns: Vec<(String, Option<String>)>) -> Self {
        Self { columns }
    }

    /// Build a row from borrowed pairs. Handy for drivers and tests.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> Self {
        Self {
            columns: pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.map(str::to_string)))
                .collect(),
        }
    }

    /// Value of `column`; `None` both for a missing column and for NULL.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|(name, _)| name == column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.columns
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Buffered statement result.
#[derive(Debug, Clone, Default)]
pub struct RowCursor {
    rows: VecDeque<Row>,
}

impl RowCursor {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fetch_next_row(&mut self) -> Option<Row> {
        self.rows.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for RowCursor {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        self.fetch_next_row()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_lookup() {
        let row = Row::from_pairs([("id", Some("1")), ("name", None)]);
        assert_eq!(row.get("id"), Some("1"));
        assert_eq!(row.get("name"), None);
        assert!(row.contains("name"));
        assert!(!row.contains("email"));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn test_cursor_drains_in_order() {
        let mut cursor = RowCursor::new(vec![
            Row::from_pairs([("id", Some("1"))]),
            Row::from_pairs([("id", Some("2"))]),
        ]);
        assert_eq!(cursor.remaining(), 2);
        assert_eq!(cursor.fetch_next_row().unwrap().get("id"), Some("1"));
        let rest: Vec<Row> = cursor.collect();
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn test_default_escape() {
        assert_eq!(MysqlEscape.escape("O'Brien"), "O\\'Brien");
    }
}
