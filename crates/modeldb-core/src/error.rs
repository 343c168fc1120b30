//! Error types shared by every modeldb crate.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

/// SQLSTATE reported by the driver for duplicate-key violations.
pub const UNIQUE_VIOLATION_CODE: &str = "23000";

/// The primary error type for all modeldb operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Mandatory columns were null after applying field defaults. No SQL was issued.
    #[error("{0}: mandatory field missing")]
    MandatoryFieldMissing(WriteFailure),
    /// The database rejected a write because of a unique index.
    #[error("{0}: unique constraint violated")]
    UniqueViolation(WriteFailure),
    /// A primary-key dependent operation was attempted without key values.
    #[error("missing primary key values for table `{table}`")]
    MissingPrimaryKey { table: String },
    /// Classification or coercion fell outside the closed type enumeration.
    #[error("unsupported type conversion: {0}")]
    UnsupportedType(String),
    /// Opaque driver failure.
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// A JSON property received text that does not decode.
    #[error("invalid json for property `{key}`: {source}")]
    InvalidJson {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// The driver could not open a connection.
    #[error("connection failed: {0}")]
    Connection(String),
    /// The property is neither a column nor a declared property of the class.
    #[error("class `{class}` has no property `{key}`")]
    UnknownProperty { class: String, key: String },
    /// A mandatory property was set to null and has no field default.
    #[error("property `{key}` of class `{class}` is mandatory")]
    MandatoryProperty { class: String, key: String },
    /// The class was never registered.
    #[error("unknown model class `{0}`")]
    UnknownClass(String),
    /// Filesystem failure (cache artifact, uploads).
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The cache artifact could not be encoded.
    #[error("schema cache: {0}")]
    Cache(String),
}

/// Result type alias for modeldb operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Per-column messages for validation failures, if any.
    pub fn field_errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Error::MandatoryFieldMissing(failure) | Error::UniqueViolation(failure) => {
                Some(&failure.errors)
            }
            _ => None,
        }
    }

    /// The underlying driver error, if this is one.
    pub fn as_database(&self) -> Option<&DatabaseError> {
        match self {
            Error::Database(err) => Some(err),
            _ => None,
        }
    }
}

/// A rejected write: the table and one message per offending column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    pub table: String,
    pub errors: BTreeMap<String, String>,
}

impl WriteFailure {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            errors: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, message: impl Into<String>) {
        self.errors.insert(column.into(), message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Columns carrying an error, in sorted order.
    pub fn columns(&self) -> Vec<&str> {
        self.errors.keys().map(String::as_str).collect()
    }
}

impl fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table `{}` [", self.table)?;
        for (i, column) in self.errors.keys().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(column)?;
        }
        f.write_str("]")
    }
}

/// Error reported by the database driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("database error {code}: {message}")]
pub struct DatabaseError {
    /// SQLSTATE or driver specific code.
    pub code: String,
    pub message: String,
}

impl DatabaseError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.code == UNIQUE_VIOLATION_CODE
    }

    /// Name of the index named in a duplicate-key message.
    ///
    /// Newer servers qualify the name with the table (`person.name_unique`);
    /// the qualifier is stripped.
    pub fn violated_index(&self) -> Option<String> {
        static KEY_RE: OnceLock<Option<Regex>> = OnceLock::new();
        let re = KEY_RE
            .get_or_init(|| Regex::new(r".* for key '(.*)'$").ok())
            .as_ref()?;
        let name = re.captures(self.message.trim_end())?.get(1)?.as_str();
        let name = match name.split_once('.') {
            Some((_, rest)) => rest,
            None => name,
        };
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violated_index_plain() {
        let err = DatabaseError::new(
            "23000",
            "SQLSTATE[23000]: Integrity constraint violation: 1062 Duplicate entry 'Ann' for key 'name_unique'",
        );
        assert!(err.is_unique_violation());
        assert_eq!(err.violated_index().as_deref(), Some("name_unique"));
    }

    #[test]
    fn test_violated_index_strips_table_qualifier() {
        let err = DatabaseError::new(
            "23000",
            "Duplicate entry 'a-b' for key 'person.first_last'",
        );
        assert_eq!(err.violated_index().as_deref(), Some("first_last"));
    }

    #[test]
    fn test_violated_index_absent() {
        let err = DatabaseError::new("42S02", "Table 'x.y' doesn't exist");
        assert!(!err.is_unique_violation());
        assert_eq!(err.violated_index(), None);
    }

    #[test]
    fn test_write_failure_display_and_field_errors() {
        let mut failure = WriteFailure::new("person");
        failure.push("name", "mandatory field missing");
        failure.push("email", "mandatory field missing");
        assert_eq!(failure.to_string(), "table `person` [email, name]");

        let err = Error::MandatoryFieldMissing(failure);
        let errors = err.field_errors().unwrap();
        assert_eq!(errors.len(), 2);
        assert!(err.to_string().contains("mandatory field missing"));
    }
}
