//! Core types and contracts for modeldb.
//!
//! `modeldb-core` is the **foundation layer** of the workspace. It defines the
//! value model, the type system and the driver contracts the other crates
//! build on.
//!
//! # Role In The Architecture
//!
//! - **Type system**: [`PropertyType`] and the classification functions map raw
//!   SQL column types and declared annotations to semantic types.
//! - **Data model**: [`Value`] holds property values; [`Value::convert`] and
//!   [`Value::to_sql_string`] move between typed values and their SQL text.
//! - **Driver contract**: [`Connection`], [`Driver`], [`Row`] and [`RowCursor`]
//!   describe the blocking database driver the engine consumes.
//! - **Collaborators**: [`LocalDateTime`] for timestamps and [`FileStore`] for
//!   uploads behind file-typed properties.
//!
//! # Who Uses This Crate
//!
//! - `modeldb-query` renders predicates with the [`Escape`] primitive.
//! - `modeldb-schema` classifies columns and persists [`PropertyType`]s.
//! - `modeldb-entity` coerces and formats property values.

pub mod config;
pub mod connection;
pub mod datetime;
pub mod error;
pub mod files;
pub mod identifiers;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod types;
pub mod value;

pub use config::{DEFAULT_ALIAS, ModelDbConfig};
pub use connection::{Connection, Driver, Escape, MysqlEscape, Row, RowCursor};
pub use datetime::{DateFormat, LocalDateTime};
pub use error::{DatabaseError, Error, Result, WriteFailure};
pub use files::{FileStore, LocalFileStore, PathUrl};
pub use identifiers::{aliased_column, escape_string, quote_identifier, table_name_for};
pub use types::{PropertyType, classify_annotation, classify_column, classify_sql};
pub use value::{Value, loosely_equal};

/// Conventional primary key column.
pub const ID: &str = "id";
/// Creation timestamp column, stamped on insert.
pub const CREATED: &str = "created";
/// Update timestamp column, stamped on update.
pub const UPDATED: &str = "updated";
