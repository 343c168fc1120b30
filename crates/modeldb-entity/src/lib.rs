//! Entities with dirty tracking and their database lifecycle.
//!
//! `modeldb-entity` ties the lower layers together:
//!
//! - [`ModelRegistry`] resolves registered classes into [`ModelClass`]es
//!   using discovered schema metadata.
//! - [`Entity`] holds property values, coerces assignments and tracks which
//!   columns changed since the last load or write.
//! - [`ModelDb`] owns the connection and runs reads, writes and bulk
//!   operations.
//!
//! # Example
//!
//! ```ignore
//! let registry = Arc::new(ModelRegistry::from_config(&config));
//! registry.register(ClassDescriptor::new("Person").column("active", "bool"));
//! let mut db = ModelDb::new(registry, conn);
//!
//! let mut person = db.create("Person")?;
//! person.set("name", "Ann")?;
//! person.write(&mut db)?;
//! assert!(person.get("id")?.as_i64().is_some());
//! ```

pub mod class;
pub mod db;
pub mod entity;
pub mod lifecycle;

pub use class::{Getter, ModelClass, ModelDefinition, ModelRegistry, PropertyAccessor, Setter};
pub use db::ModelDb;
pub use entity::{Entity, EntityState};
