//! Schema discovery and caching for modeldb.
//!
//! Each mapped class is described once with a [`ClassDescriptor`]. On first
//! use, [`SchemaRegistry::discover`] queries the live schema, classifies every
//! column and stores the resulting [`SchemaMetadata`] in a [`CacheStore`]
//! shared with other processes.
//!
//! # Example
//!
//! ```ignore
//! let registry = SchemaRegistry::with_cache_file("/var/cache/app/schema.json");
//! registry.register(ClassDescriptor::new("Person").column("active", "bool"));
//! let meta = registry.discover(&mut conn, "Person")?;
//! assert_eq!(meta.property_type("active"), Some(PropertyType::Bool));
//! ```

pub mod cache;
pub mod descriptor;
pub mod introspect;
pub mod metadata;
pub mod registry;

pub use cache::{CacheSnapshot, CacheStore, FileCacheStore, MemoryCacheStore};
pub use descriptor::{ClassDescriptor, PropertyDecl};
pub use metadata::{ForeignTarget, SchemaMetadata, TableField};
pub use registry::SchemaRegistry;
