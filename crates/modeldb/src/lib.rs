//! ModelDb: active-record style table mapping for MySQL-compatible databases.
//!
//! Classes are registered once with a [`ClassDescriptor`]. The first time a
//! class is used its table is introspected and the resulting metadata is
//! cached in a file shared by every process using the same configuration.
//! Entities of the class then read, write and delete themselves through a
//! [`ModelDb`] connection handle, tracking which columns changed.
//!
//! # Crates
//!
//! - `modeldb-core`: values, the type system, the driver contract.
//! - `modeldb-query`: conditions, joins and select building.
//! - `modeldb-schema`: class descriptors, discovery and the schema cache.
//! - `modeldb-entity`: entities, the registry and the connection handle.
//!
//! # Example
//!
//! ```ignore
//! use modeldb::prelude::*;
//!
//! let config = ModelDbConfig::from_env();
//! let registry = Arc::new(ModelRegistry::from_config(&config));
//! registry.register(ClassDescriptor::new("Person").column("active", "bool"));
//!
//! let mut db = ModelDb::connect(&driver, registry, &config)?;
//! let mut person = db.create("Person")?;
//! person.set("name", "Ann")?;
//! person.write(&mut db)?;
//!
//! let active = db.read_multiple(
//!     "Person",
//!     &SelectQuery::matching(Condition::new("active", true)).order_by("name", Order::Asc),
//! )?;
//! ```

pub use modeldb_core as core;
pub use modeldb_entity as entity;
pub use modeldb_query as query;
pub use modeldb_schema as schema;

pub use modeldb_core::{
    CREATED, Connection, DatabaseError, DateFormat, Driver, Error, FileStore, ID, LocalDateTime,
    LocalFileStore, ModelDbConfig, PathUrl, PropertyType, Result, Row, RowCursor, UPDATED, Value,
    WriteFailure,
};
pub use modeldb_entity::{
    Entity, EntityState, ModelClass, ModelDb, ModelDefinition, ModelRegistry, PropertyAccessor,
};
pub use modeldb_query::{
    BoolOp, Comparison, Condition, ConditionKey, ConditionValue, FieldRef, FieldWrap, Join, Order,
    PrefixedField, SelectQuery,
};
pub use modeldb_schema::{
    CacheStore, ClassDescriptor, FileCacheStore, MemoryCacheStore, SchemaMetadata, SchemaRegistry,
};

#[cfg(feature = "testing")]
pub use modeldb_core::testing;

/// Everything needed to declare classes and work with entities.
pub mod prelude {
    pub use std::sync::Arc;

    pub use crate::{
        ClassDescriptor, Comparison, Condition, Connection, Driver, Entity, Error, Join,
        ModelDb, ModelDbConfig, ModelDefinition, ModelRegistry, Order, PrefixedField,
        PropertyType, Result, SelectQuery, Value,
    };
}
