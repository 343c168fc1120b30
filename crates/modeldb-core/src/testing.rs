//! Scripted in-memory connection for tests.
//!
//! [`MockConnection`] answers statements by substring rules and records every
//! statement it sees, so tests can assert on the generated SQL.
//!
//! # Example
//!
//! ```ignore
//! let mut conn = MockConnection::new();
//! conn.once("INSERT INTO person", Reply::affected(1, 7));
//! conn.always("SHOW FULL COLUMNS FROM person", Reply::rows(vec![/* ... */]));
//! ```

use crate::connection::{Connection, Escape, Row, RowCursor};
use crate::error::DatabaseError;

/// Canned answer to a statement.
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<Row>),
    Affected { rows: u64, last_insert_id: i64 },
    Fail(DatabaseError),
}

impl Reply {
    pub fn rows(rows: Vec<Row>) -> Self {
        Reply::Rows(rows)
    }

    pub fn affected(rows: u64, last_insert_id: i64) -> Self {
        Reply::Affected {
            rows,
            last_insert_id,
        }
    }

    pub fn fail(code: &str, message: &str) -> Self {
        Reply::Fail(DatabaseError::new(code, message))
    }
}

#[derive(Debug, Clone)]
struct Rule {
    pattern: String,
    reply: Reply,
    persistent: bool,
}

/// Connection double driven by substring-matched rules.
///
/// One-shot rules are consulted first, in registration order, and consumed
/// when they match. Persistent rules are consulted next. Anything unmatched
/// yields an empty result with zero affected rows.
#[derive(Debug, Default)]
pub struct MockConnection {
    rules: Vec<Rule>,
    executed: Vec<String>,
    affected: u64,
    last_insert_id: i64,
    last_error: Option<DatabaseError>,
}

impl MockConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next statement containing `pattern` once.
    pub fn once(&mut self, pattern: &str, reply: Reply) -> &mut Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            reply,
            persistent: false,
        });
        self
    }

    /// Answer every statement containing `pattern`.
    pub fn always(&mut self, pattern: &str, reply: Reply) -> &mut Self {
        self.rules.push(Rule {
            pattern: pattern.to_string(),
            reply,
            persistent: true,
        });
        self
    }

    /// Every statement executed so far.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Statements containing `pattern`.
    pub fn matching(&self, pattern: &str) -> Vec<&str> {
        self.executed
            .iter()
            .filter(|sql| sql.contains(pattern))
            .map(String::as_str)
            .collect()
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.matching(pattern).len()
    }

    pub fn clear_log(&mut self) {
        self.executed.clear();
    }

    fn take_reply(&mut self, sql: &str) -> Option<Reply> {
        if let Some(pos) = self
            .rules
            .iter()
            .position(|rule| !rule.persistent && sql.contains(&rule.pattern))
        {
            return Some(self.rules.remove(pos).reply);
        }
        self.rules
            .iter()
            .find(|rule| rule.persistent && sql.contains(&rule.pattern))
            .map(|rule| rule.reply.clone())
    }
}

impl Escape for MockConnection {}

impl Connection for MockConnection {
    fn execute(&mut self, sql: &str) -> Result<RowCursor, DatabaseError> {
        self.executed.push(sql.to_string());
        self.last_error = None;
        match self.take_reply(sql) {
            Some(Reply::Rows(rows)) => {
                self.affected = rows.len() as u64;
                Ok(RowCursor::new(rows))
            }
            Some(Reply::Affected {
                rows,
                last_insert_id,
            }) => {
                self.affected = rows;
                if last_insert_id != 0 {
                    self.last_insert_id = last_insert_id;
                }
                Ok(RowCursor::empty())
            }
            Some(Reply::Fail(err)) => {
                self.affected = 0;
                self.last_error = Some(err.clone());
                Err(err)
            }
            None => {
                self.affected = 0;
                Ok(RowCursor::empty())
            }
        }
    }

    fn affected_rows(&self) -> u64 {
        self.affected
    }

    fn last_insert_id(&self) -> i64 {
        self.last_insert_id
    }

    fn error_info(&self) -> Option<DatabaseError> {
        self.last_error.clone()
    }
}
