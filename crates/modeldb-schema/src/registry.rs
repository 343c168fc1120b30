//! Registry of mapped classes and their discovered metadata.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use modeldb_core::{Connection, Error, Result, identifiers::simple_class_name};

use crate::cache::{CacheSnapshot, CacheStore, FileCacheStore, MemoryCacheStore};
use crate::descriptor::ClassDescriptor;
use crate::introspect;
use crate::metadata::SchemaMetadata;

/// Class descriptors plus the metadata discovered for them.
///
/// Build one per process and share it by reference. Metadata for a class is
/// discovered at most once per process; a class already present in the
/// cache store is never queried at all.
pub struct SchemaRegistry {
    store: Box<dyn CacheStore>,
    descriptors: RwLock<HashMap<String, Arc<ClassDescriptor>>>,
    handled: RwLock<HashMap<String, Arc<SchemaMetadata>>>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("classes", &self.class_names())
            .field("handled", &self.handled_count())
            .finish_non_exhaustive()
    }
}

impl SchemaRegistry {
    /// Registry backed by `store`, preloaded with what it holds.
    pub fn new(store: impl CacheStore + 'static) -> Self {
        let registry = Self {
            store: Box::new(store),
            descriptors: RwLock::new(HashMap::new()),
            handled: RwLock::new(HashMap::new()),
        };
        registry.absorb(registry.store.load());
        registry
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryCacheStore::new())
    }

    pub fn with_cache_file(path: impl Into<std::path::PathBuf>) -> Self {
        Self::new(FileCacheStore::new(path))
    }

    /// Register a class. Re-registering a name replaces its descriptor.
    pub fn register(&self, descriptor: ClassDescriptor) -> Arc<ClassDescriptor> {
        let descriptor = Arc::new(descriptor);
        self.descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(descriptor.name().to_string(), Arc::clone(&descriptor));
        descriptor
    }

    /// Look up a class by its registered name or its simple name.
    pub fn descriptor(&self, class: &str) -> Option<Arc<ClassDescriptor>> {
        let descriptors = self.descriptors.read().unwrap_or_else(PoisonError::into_inner);
        descriptors.get(class).cloned().or_else(|| {
            let simple = simple_class_name(class);
            descriptors
                .values()
                .find(|d| simple_class_name(d.name()) == simple)
                .cloned()
        })
    }

    pub fn table_of(&self, class: &str) -> Option<String> {
        self.descriptor(class).map(|d| d.table_name().to_string())
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn is_handled(&self, class: &str) -> bool {
        self.handled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(class)
    }

    fn handled_count(&self) -> usize {
        self.handled.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn cached(&self, class: &str) -> Option<Arc<SchemaMetadata>> {
        self.handled
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class)
            .cloned()
    }

    /// Add persisted entries that are not known in memory yet.
    fn absorb(&self, snapshot: CacheSnapshot) {
        let mut handled = self.handled.write().unwrap_or_else(PoisonError::into_inner);
        for (class, meta) in snapshot {
            handled.entry(class).or_insert_with(|| Arc::new(meta));
        }
    }

    /// Metadata for `class`, discovering it on first use.
    ///
    /// Lookup order: memory, then the cache store (another process may have
    /// discovered the class meanwhile), then live discovery. Fresh results are
    /// merged into the store. If the store's artifact disappeared, memory is
    /// dropped first so everything is rediscovered.
    pub fn discover<C: Connection + ?Sized>(
        &self,
        conn: &mut C,
        class: &str,
    ) -> Result<Arc<SchemaMetadata>> {
        let descriptor = self
            .descriptor(class)
            .ok_or_else(|| Error::UnknownClass(class.to_string()))?;
        let key = descriptor.name();

        if !self.store.exists() && self.handled_count() > 0 {
            tracing::info!("schema cache artifact removed, dropping cached metadata");
            self.handled
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }

        if let Some(meta) = self.cached(key) {
            return Ok(meta);
        }

        self.absorb(self.store.load());
        if let Some(meta) = self.cached(key) {
            tracing::debug!(class = key, "schema metadata loaded from cache store");
            return Ok(meta);
        }

        let meta = Arc::new(introspect::discover(conn, &descriptor, &|name: &str| self.table_of(name)));
        self.handled
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), Arc::clone(&meta));

        let delta = CacheSnapshot::from([(key.to_string(), (*meta).clone())]);
        if let Err(err) = self.store.merge_and_save(&delta) {
            tracing::warn!(class = key, error = %err, "could not persist schema metadata");
        }
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modeldb_core::Row;
    use modeldb_core::testing::{MockConnection, Reply};

    fn connection() -> MockConnection {
        let mut conn = MockConnection::new();
        conn.always(
            "SHOW FULL COLUMNS FROM `person`",
            Reply::rows(vec![Row::from_pairs([
                ("Field", Some("id")),
                ("Type", Some("int(11)")),
                ("Null", Some("NO")),
                ("Default", None),
                ("Extra", Some("auto_increment")),
            ])]),
        );
        conn.always(
            "SHOW INDEX FROM `person`",
            Reply::rows(vec![Row::from_pairs([
                ("Key_name", Some("PRIMARY")),
                ("Column_name", Some("id")),
                ("Non_unique", Some("0")),
            ])]),
        );
        conn
    }

    #[test]
    fn test_unknown_class() {
        let registry = SchemaRegistry::in_memory();
        let mut conn = MockConnection::new();
        let err = registry.discover(&mut conn, "Nope").unwrap_err();
        assert!(matches!(err, Error::UnknownClass(name) if name == "Nope"));
    }

    #[test]
    fn test_discover_runs_schema_queries_once() {
        let registry = SchemaRegistry::in_memory();
        registry.register(ClassDescriptor::new("Person"));
        let mut conn = connection();

        let first = registry.discover(&mut conn, "Person").unwrap();
        let second = registry.discover(&mut conn, "Person").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(conn.count_matching("SHOW FULL COLUMNS"), 1);
        assert!(registry.is_handled("Person"));
    }

    #[test]
    fn test_second_process_reads_shared_store() {
        let store = MemoryCacheStore::new();
        let first = SchemaRegistry::new(store.clone());
        first.register(ClassDescriptor::new("Person"));
        let mut conn = connection();
        first.discover(&mut conn, "Person").unwrap();

        let second = SchemaRegistry::new(store);
        second.register(ClassDescriptor::new("Person"));
        let mut other_conn = connection();
        let meta = second.discover(&mut other_conn, "Person").unwrap();

        assert_eq!(meta.primary_key_columns, vec!["id"]);
        assert!(other_conn.executed().is_empty());
    }

    #[test]
    fn test_store_written_after_registry_start_is_consulted() {
        let store = MemoryCacheStore::new();
        let late = SchemaRegistry::new(store.clone());
        late.register(ClassDescriptor::new("Person"));

        let early = SchemaRegistry::new(store);
        early.register(ClassDescriptor::new("Person"));
        early.discover(&mut connection(), "Person").unwrap();

        let mut conn = connection();
        late.discover(&mut conn, "Person").unwrap();
        assert!(conn.executed().is_empty());
    }

    #[test]
    fn test_removed_artifact_forces_rediscovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.json");
        let registry = SchemaRegistry::with_cache_file(&path);
        registry.register(ClassDescriptor::new("Person"));
        let mut conn = connection();

        registry.discover(&mut conn, "Person").unwrap();
        assert!(path.exists());
        std::fs::remove_file(&path).unwrap();
        registry.discover(&mut conn, "Person").unwrap();

        assert_eq!(conn.count_matching("SHOW FULL COLUMNS"), 2);
        assert!(path.exists());
    }

    #[test]
    fn test_lookup_by_simple_name() {
        let registry = SchemaRegistry::in_memory();
        registry.register(ClassDescriptor::new("app::model::Team"));
        assert_eq!(registry.table_of("Team").as_deref(), Some("team"));
        assert_eq!(registry.class_names(), vec!["app::model::Team"]);
    }
}
