//! Resolved model classes and the registry that builds them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use modeldb_core::{Connection, ModelDbConfig, PropertyType, Result, Value};
use modeldb_schema::{ClassDescriptor, FileCacheStore, SchemaMetadata, SchemaRegistry};

use crate::entity::Entity;

/// Custom getter for one property.
pub type Getter = fn(&Entity) -> Value;
/// Custom setter for one property. Receives the already coerced value and
/// usually ends in [`Entity::store`].
pub type Setter = fn(&mut Entity, Value) -> Result<()>;

/// Per-property override of the default map-backed access.
#[derive(Clone, Copy, Default)]
pub struct PropertyAccessor {
    pub get: Option<Getter>,
    pub set: Option<Setter>,
}

impl fmt::Debug for PropertyAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAccessor")
            .field("get", &self.get.is_some())
            .field("set", &self.set.is_some())
            .finish()
    }
}

/// A class descriptor plus its accessor overrides, ready to register.
#[derive(Debug, Clone)]
pub struct ModelDefinition {
    descriptor: ClassDescriptor,
    accessors: HashMap<String, PropertyAccessor>,
}

impl ModelDefinition {
    pub fn new(descriptor: ClassDescriptor) -> Self {
        Self {
            descriptor,
            accessors: HashMap::new(),
        }
    }

    #[must_use]
    pub fn getter(mut self, key: impl Into<String>, get: Getter) -> Self {
        self.accessors.entry(key.into()).or_default().get = Some(get);
        self
    }

    #[must_use]
    pub fn setter(mut self, key: impl Into<String>, set: Setter) -> Self {
        self.accessors.entry(key.into()).or_default().set = Some(set);
        self
    }
}

impl From<ClassDescriptor> for ModelDefinition {
    fn from(descriptor: ClassDescriptor) -> Self {
        Self::new(descriptor)
    }
}

/// Everything an entity needs to know about its class: descriptor,
/// discovered metadata, class-level defaults and accessor overrides.
///
/// Shared read-only by all entities of the class.
pub struct ModelClass {
    descriptor: Arc<ClassDescriptor>,
    meta: Arc<SchemaMetadata>,
    defaults: BTreeMap<String, Value>,
    property_keys: Vec<String>,
    accessors: Arc<HashMap<String, PropertyAccessor>>,
}

impl fmt::Debug for ModelClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClass")
            .field("name", &self.name())
            .field("table", &self.table())
            .field("properties", &self.property_keys)
            .finish_non_exhaustive()
    }
}

impl ModelClass {
    pub fn new(
        descriptor: Arc<ClassDescriptor>,
        meta: Arc<SchemaMetadata>,
        accessors: Arc<HashMap<String, PropertyAccessor>>,
    ) -> Self {
        let mut property_keys: Vec<String> = meta.field_names().map(str::to_string).collect();
        for key in meta.reflected_properties.keys() {
            if !property_keys.contains(key) {
                property_keys.push(key.clone());
            }
        }

        let mut defaults = BTreeMap::new();
        for key in &property_keys {
            let raw = descriptor.default_for(key);
            let ty = meta.property_type(key).unwrap_or(PropertyType::None);
            let value = match raw.clone().convert(ty, key) {
                Ok(value) => value,
                Err(err) => {
                    tracing::warn!(class = descriptor.name(), key = %key, error = %err, "class default does not fit its type");
                    raw
                }
            };
            defaults.insert(key.clone(), value);
        }

        Self {
            descriptor,
            meta,
            defaults,
            property_keys,
            accessors,
        }
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn table(&self) -> &str {
        &self.meta.table_name
    }

    pub fn descriptor(&self) -> &ClassDescriptor {
        &self.descriptor
    }

    pub fn meta(&self) -> &SchemaMetadata {
        &self.meta
    }

    pub(crate) fn meta_arc(&self) -> &Arc<SchemaMetadata> {
        &self.meta
    }

    /// Table columns first (database order), then declared properties.
    pub fn property_keys(&self) -> &[String] {
        &self.property_keys
    }

    pub fn table_keys(&self) -> impl Iterator<Item = &str> {
        self.meta.field_names()
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.meta.has_property(key)
    }

    pub fn property_type(&self, key: &str) -> Option<PropertyType> {
        self.meta.property_type(key)
    }

    pub fn is_table_field(&self, key: &str) -> bool {
        self.meta.is_table_field(key)
    }

    pub fn is_mandatory(&self, key: &str) -> bool {
        self.meta.is_mandatory(key)
    }

    /// Column default as reported by the server.
    pub fn field_default(&self, key: &str) -> Value {
        Value::from_sql(self.meta.field_default(key))
    }

    pub fn primary_key(&self) -> &[String] {
        &self.meta.primary_key_columns
    }

    pub fn defaults(&self) -> &BTreeMap<String, Value> {
        &self.defaults
    }

    pub fn accessor(&self, key: &str) -> Option<PropertyAccessor> {
        self.accessors.get(key).copied()
    }

    pub fn file_property_keys(&self) -> Vec<&str> {
        self.descriptor.file_property_keys()
    }

    pub fn is_read_only(&self) -> bool {
        self.descriptor.is_read_only()
    }
}

/// Registry of model classes, built once per process and shared.
#[derive(Debug)]
pub struct ModelRegistry {
    schema: SchemaRegistry,
    accessors: RwLock<HashMap<String, Arc<HashMap<String, PropertyAccessor>>>>,
    classes: RwLock<HashMap<String, Arc<ModelClass>>>,
}

impl ModelRegistry {
    pub fn new(schema: SchemaRegistry) -> Self {
        Self {
            schema,
            accessors: RwLock::new(HashMap::new()),
            classes: RwLock::new(HashMap::new()),
        }
    }

    /// Registry whose schema cache lives only in this process.
    pub fn in_memory() -> Self {
        Self::new(SchemaRegistry::in_memory())
    }

    /// Registry sharing the cache artifact at `config.cache_path`.
    pub fn from_config(config: &ModelDbConfig) -> Self {
        Self::new(SchemaRegistry::new(FileCacheStore::from_config(config)))
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn register(&self, definition: impl Into<ModelDefinition>) {
        let definition = definition.into();
        let name = definition.descriptor.name().to_string();
        self.schema.register(definition.descriptor);
        self.accessors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), Arc::new(definition.accessors));
        self.classes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name);
    }

    /// The resolved class, discovering its schema on first use.
    pub fn class<C: Connection + ?Sized>(&self, conn: &mut C, name: &str) -> Result<Arc<ModelClass>> {
        let meta = self.schema.discover(conn, name)?;
        let descriptor = self
            .schema
            .descriptor(name)
            .ok_or_else(|| modeldb_core::Error::UnknownClass(name.to_string()))?;
        let key = descriptor.name().to_string();

        if let Some(class) = self
            .classes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .filter(|class| Arc::ptr_eq(class.meta_arc(), &meta))
        {
            return Ok(Arc::clone(class));
        }

        let accessors = self
            .accessors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .unwrap_or_default();
        let class = Arc::new(ModelClass::new(descriptor, meta, accessors));
        self.classes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&class));
        Ok(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modeldb_schema::TableField;

    fn meta() -> SchemaMetadata {
        let mut meta = SchemaMetadata::empty("person");
        for (name, ty) in [("id", "int(11)"), ("name", "varchar(20)"), ("active", "tinyint(1)")] {
            meta.fields.push(TableField {
                name: name.into(),
                sql_type: ty.into(),
            });
        }
        meta.reflected_properties.insert("id".into(), PropertyType::Int);
        meta.reflected_properties.insert("name".into(), PropertyType::String);
        meta.reflected_properties.insert("active".into(), PropertyType::Bool);
        meta.reflected_properties.insert("label".into(), PropertyType::String);
        meta
    }

    #[test]
    fn test_property_order_and_defaults() {
        let descriptor = ClassDescriptor::new("Person")
            .default("active", "1")
            .property("label", "string");
        let class = ModelClass::new(Arc::new(descriptor), Arc::new(meta()), Arc::default());

        assert_eq!(class.property_keys(), ["id", "name", "active", "label"]);
        assert_eq!(class.defaults()["active"], Value::Bool(true));
        assert_eq!(class.defaults()["name"], Value::Null);
        assert_eq!(class.table(), "person");
    }

    #[test]
    fn test_definition_collects_accessors() {
        fn shout(entity: &Entity) -> Value {
            entity
                .value("name")
                .map_or(Value::Null, |v| Value::from(v.to_string().to_uppercase()))
        }
        let definition = ModelDefinition::new(ClassDescriptor::new("Person")).getter("name", shout);
        let accessor = definition.accessors["name"];
        assert!(accessor.get.is_some());
        assert!(accessor.set.is_none());
    }
}
