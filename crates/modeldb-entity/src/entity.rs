//! The mapped entity: property values, coercion and dirty tracking.
//!
//! An [`Entity`] holds one value per property of its [`ModelClass`] plus a
//! snapshot of the table columns' string forms taken when it was last
//! loaded or written. [`Entity::fields_changed`] compares the two.
//!
//! # Example
//!
//! ```ignore
//! let mut person = db.create("Person")?;
//! person.set("name", "Ann")?;
//! assert!(person.has_changed());
//! person.write(&mut db)?;
//! assert!(!person.has_changed());
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use modeldb_core::{CREATED, DateFormat, Error, ID, PropertyType, Result, Row, UPDATED, Value, loosely_equal};
use modeldb_query::{Condition, ConditionValue};

use crate::class::ModelClass;

// ============================================================================
// Entity State
// ============================================================================

/// Whether the entity is known to exist in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntityState {
    /// Constructed or reset, not known to be stored.
    #[default]
    New,
    /// Loaded from or written to the database.
    Persistent,
}

// ============================================================================
// Entity
// ============================================================================

/// One row of a mapped class.
#[derive(Clone)]
pub struct Entity {
    class: Arc<ModelClass>,
    field_values: BTreeMap<String, Value>,
    initial_field_values: BTreeMap<String, Option<String>>,
    foreign: BTreeMap<String, Entity>,
    state: EntityState,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("class", &self.class.name())
            .field("state", &self.state)
            .field("values", &self.field_values)
            .finish_non_exhaustive()
    }
}

impl Entity {
    /// A fresh entity holding the class defaults. The defaults count as
    /// unchanged.
    pub fn new(class: Arc<ModelClass>) -> Self {
        let field_values = class.defaults().clone();
        let mut entity = Self {
            class,
            field_values,
            initial_field_values: BTreeMap::new(),
            foreign: BTreeMap::new(),
            state: EntityState::New,
        };
        entity.snapshot();
        entity
    }

    pub fn class(&self) -> &Arc<ModelClass> {
        &self.class
    }

    pub fn state(&self) -> EntityState {
        self.state
    }

    pub fn is_persistent(&self) -> bool {
        self.state == EntityState::Persistent
    }

    pub(crate) fn mark(&mut self, state: EntityState) {
        self.state = state;
    }

    // ------------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------------

    pub fn has_property(&self, key: &str) -> bool {
        self.class.has_property(key)
    }

    pub fn property_keys(&self) -> &[String] {
        self.class.property_keys()
    }

    pub fn table_keys(&self) -> impl Iterator<Item = &str> {
        self.class.table_keys()
    }

    /// The stored value, bypassing custom getters.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.field_values.get(key)
    }

    /// Read a property through its custom getter if one is registered.
    ///
    /// The conventional `id`, `created` and `updated` keys read as null on
    /// classes without those columns.
    pub fn get(&self, key: &str) -> Result<Value> {
        if let Some(get) = self.class.accessor(key).and_then(|a| a.get) {
            return Ok(get(self));
        }
        if self.class.has_property(key) {
            return Ok(self.field_values.get(key).cloned().unwrap_or_default());
        }
        if is_conventional(key) {
            return Ok(Value::Null);
        }
        Err(self.unknown(key))
    }

    /// SQL string form of a property, `None` for null.
    pub fn get_string(&self, key: &str) -> Result<Option<String>> {
        let value = self.get(key)?;
        Ok(value.to_sql_string(self.type_of(key)))
    }

    /// Assign a property.
    ///
    /// Null on a mandatory column falls back to the column default; without
    /// one the assignment fails with [`Error::MandatoryProperty`].
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.set_checked(key, value.into(), true)
    }

    /// Like [`Entity::set`], but a null mandatory column without default is
    /// accepted and left to write-time validation.
    pub fn set_unchecked(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.set_checked(key, value.into(), false)
    }

    fn set_checked(&mut self, key: &str, mut value: Value, check_mandatory: bool) -> Result<()> {
        if value.is_null() && self.class.is_mandatory(key) {
            value = self.class.field_default(key);
            if value.is_null() && check_mandatory {
                return Err(Error::MandatoryProperty {
                    class: self.class.name().to_string(),
                    key: key.to_string(),
                });
            }
        }
        self.internal_set(key, value, false)
    }

    /// Normalize and coerce `value`, then store it.
    ///
    /// Null, or an empty value on a nullable column, becomes null. With
    /// `internal` false a registered custom setter receives the coerced value
    /// instead of the map.
    pub(crate) fn internal_set(&mut self, key: &str, value: Value, internal: bool) -> Result<()> {
        let setter = if internal {
            None
        } else {
            self.class.accessor(key).and_then(|a| a.set)
        };

        let Some(ty) = self.class.property_type(key) else {
            if let Some(set) = setter {
                return set(self, value);
            }
            if is_conventional(key) {
                return Ok(());
            }
            return Err(self.unknown(key));
        };

        let blank = value.is_empty() && self.class.is_table_field(key) && !self.class.is_mandatory(key);
        let value = if value.is_null() || blank {
            Value::Null
        } else {
            value.convert(ty, key)?
        };

        match setter {
            Some(set) => set(self, value),
            None => {
                self.store(key, value);
                Ok(())
            }
        }
    }

    /// Put an already coerced value into the map. Custom setters end here.
    pub fn store(&mut self, key: &str, value: Value) {
        self.foreign.remove(key);
        self.field_values.insert(key.to_string(), value);
    }

    /// Assign several properties and take a fresh snapshot. Unknown keys are
    /// skipped.
    pub fn initialize<K, V>(&mut self, values: impl IntoIterator<Item = (K, V)>) -> Result<()>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        for (key, value) in values {
            let key = key.as_ref();
            if !self.class.has_property(key) && self.class.accessor(key).is_none() {
                tracing::trace!(class = self.class.name(), key, "skipping unknown column");
                continue;
            }
            self.internal_set(key, value.into(), false)?;
        }
        self.snapshot();
        Ok(())
    }

    pub(crate) fn initialize_from_row(&mut self, row: &Row) -> Result<()> {
        self.initialize(row.iter().map(|(column, raw)| (column, Value::from_sql(raw))))
    }

    // ------------------------------------------------------------------------
    // Dirty tracking
    // ------------------------------------------------------------------------

    /// Remember the current string form of every table column.
    pub(crate) fn snapshot(&mut self) {
        let snapshot = self
            .class
            .table_keys()
            .map(|key| (key.to_string(), self.stored_sql_string(key)))
            .collect();
        self.initial_field_values = snapshot;
    }

    pub(crate) fn forget_snapshot(&mut self, key: &str) {
        self.initial_field_values.remove(key);
    }

    /// SQL string form of the stored value, bypassing custom getters.
    pub(crate) fn stored_sql_string(&self, key: &str) -> Option<String> {
        self.field_values
            .get(key)
            .and_then(|v| v.to_sql_string(self.type_of(key)))
    }

    /// Table columns whose value differs from the snapshot, with their
    /// current values.
    ///
    /// Numeric strings compare by value, so `1` and `1.0` are the same; a
    /// change between null and non-null always counts.
    pub fn fields_changed(&self) -> BTreeMap<String, Value> {
        self.class
            .table_keys()
            .filter(|key| self.column_changed(key))
            .map(|key| (key.to_string(), self.field_values.get(key).cloned().unwrap_or_default()))
            .collect()
    }

    fn column_changed(&self, key: &str) -> bool {
        let Some(initial) = self.initial_field_values.get(key) else {
            return true;
        };
        match (self.stored_sql_string(key), initial) {
            (Some(current), Some(initial)) => !loosely_equal(&current, initial),
            (None, None) => false,
            _ => true,
        }
    }

    pub fn has_changed(&self) -> bool {
        self.class.table_keys().any(|key| self.column_changed(key))
    }

    pub fn property_has_changed(&self, key: &str) -> bool {
        self.class.is_table_field(key) && self.column_changed(key)
    }

    // ------------------------------------------------------------------------
    // Primary key
    // ------------------------------------------------------------------------

    /// Primary key columns with their values; `None` if any is null.
    pub fn primary_tuple(&self) -> Option<Vec<(String, Value)>> {
        let keys = self.class.primary_key();
        if keys.is_empty() {
            return None;
        }
        keys.iter()
            .map(|key| {
                let value = self.field_values.get(key).cloned().unwrap_or_default();
                (!value.is_null()).then(|| (key.clone(), value))
            })
            .collect()
    }

    /// `1 = 1 AND pk = value ...` for the current primary key.
    pub fn primary_condition(&self) -> Option<Condition> {
        self.primary_tuple().map(|tuple| self.tuple_condition(&tuple))
    }

    pub(crate) fn tuple_condition(&self, tuple: &[(String, Value)]) -> Condition {
        tuple.iter().fold(Condition::match_all(), |cond, (key, value)| {
            let text: ConditionValue = value.to_sql_string(self.type_of(key)).into();
            cond.and(Condition::new(key.as_str(), text))
        })
    }

    /// Null out the primary key and clear the snapshot, so every non-null
    /// column counts as changed.
    pub fn unset_primary_key_values(&mut self) {
        for key in self.class.primary_key().to_vec() {
            self.store(&key, Value::Null);
        }
        self.initial_field_values.clear();
    }

    // ------------------------------------------------------------------------
    // Reset and copy
    // ------------------------------------------------------------------------

    /// Back to class defaults, keeping the values of `skip`.
    ///
    /// `created` survives when every primary key column is skipped. Skipped
    /// keys are left out of the new snapshot, so they count as changed.
    pub fn reset(&mut self, skip: &[&str]) -> Result<()> {
        let pk = self.class.primary_key();
        let keep_created = !pk.is_empty() && pk.iter().all(|key| skip.contains(&key.as_str()));

        let mut values = self.class.defaults().clone();
        for key in skip {
            if let Some(value) = self.field_values.get(*key) {
                values.insert((*key).to_string(), value.clone());
            }
        }
        if keep_created && let Some(created) = self.field_values.get(CREATED).filter(|v| !v.is_null()) {
            values.insert(CREATED.to_string(), created.clone());
        }

        self.field_values.clear();
        self.foreign.clear();
        self.initialize(values)?;
        for key in skip {
            self.forget_snapshot(key);
        }
        self.state = EntityState::New;
        Ok(())
    }

    /// A new entity with the same values, except timestamps and primary
    /// key. Writing it inserts a new row.
    pub fn copy(&self) -> Entity {
        let mut copy = Entity::new(Arc::clone(&self.class));
        for key in self.class.property_keys() {
            if key == CREATED || key == UPDATED {
                continue;
            }
            if let Some(value) = self.field_values.get(key) {
                copy.field_values.insert(key.clone(), value.clone());
            }
        }
        copy.unset_primary_key_values();
        copy
    }

    // ------------------------------------------------------------------------
    // Presentation
    // ------------------------------------------------------------------------

    /// Display strings of all properties, dates in German notation.
    pub fn property_strings(&self) -> Result<Vec<(String, String)>> {
        self.class
            .property_keys()
            .iter()
            .map(|key| Ok((key.clone(), display_string(&self.get(key)?))))
            .collect()
    }

    /// MD5 over all display strings except timestamps and `ignore`.
    pub fn compute_md5_hash(&self, ignore: &[&str]) -> Result<String> {
        let mut input = String::new();
        for (key, text) in self.property_strings()? {
            if key == CREATED || key == UPDATED || ignore.contains(&key.as_str()) {
                continue;
            }
            input.push_str(&key);
            input.push('=');
            input.push_str(&text);
            input.push('\n');
        }
        Ok(format!("{:x}", md5::compute(input.as_bytes())))
    }

    /// All properties as a JSON object.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut object = serde_json::Map::new();
        for key in self.class.property_keys() {
            object.insert(key.clone(), self.get(key)?.to_json());
        }
        Ok(serde_json::Value::Object(object))
    }

    // ------------------------------------------------------------------------
    // Foreign entities
    // ------------------------------------------------------------------------

    pub(crate) fn cached_foreign(&self, key: &str) -> Option<&Entity> {
        self.foreign.get(key)
    }

    pub(crate) fn cache_foreign(&mut self, key: &str, entity: Entity) {
        self.foreign.insert(key.to_string(), entity);
    }

    /// Point foreign key `key` at `target` and cache it.
    pub fn set_foreign(&mut self, key: &str, target: &Entity) -> Result<()> {
        let id = target.value(ID).cloned().unwrap_or_default();
        self.internal_set(key, id, true)?;
        self.cache_foreign(key, target.clone());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    pub(crate) fn type_of(&self, key: &str) -> PropertyType {
        self.class.property_type(key).unwrap_or(PropertyType::None)
    }

    fn unknown(&self, key: &str) -> Error {
        Error::UnknownProperty {
            class: self.class.name().to_string(),
            key: key.to_string(),
        }
    }
}

fn is_conventional(key: &str) -> bool {
    key == ID || key == CREATED || key == UPDATED
}

fn display_string(value: &Value) -> String {
    match value {
        Value::Date(d) => d.format(DateFormat::DateGerman.pattern()).to_string(),
        Value::DateTime(dt) => dt.format(DateFormat::DateTimeGerman.pattern()).to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ModelClass, PropertyAccessor};
    use modeldb_schema::{ClassDescriptor, SchemaMetadata, TableField};
    use std::collections::HashMap;

    fn person_meta() -> SchemaMetadata {
        let mut meta = SchemaMetadata::empty("person");
        let columns = [
            ("id", "int(11)", PropertyType::Int),
            ("name", "varchar(50)", PropertyType::String),
            ("active", "tinyint(1)", PropertyType::Bool),
            ("score", "double", PropertyType::Float),
            ("born", "date", PropertyType::Date),
            ("created", "datetime", PropertyType::DateTime),
            ("updated", "datetime", PropertyType::DateTime),
            ("payload", "json", PropertyType::Json),
        ];
        for (name, sql_type, ty) in columns {
            meta.fields.push(TableField {
                name: name.into(),
                sql_type: sql_type.into(),
            });
            meta.reflected_properties.insert(name.into(), ty);
            meta.field_defaults.insert(name.into(), None);
        }
        meta.field_defaults.insert("active".into(), Some("0".into()));
        meta.mandatory_fields = vec!["name".into(), "active".into()];
        meta.primary_key_columns = vec!["id".into()];
        meta.autoincrement_column = Some("id".into());
        meta.reflected_properties.insert("nickname".into(), PropertyType::String);
        meta
    }

    fn class_with(accessors: HashMap<String, PropertyAccessor>) -> Arc<ModelClass> {
        let descriptor = ClassDescriptor::new("Person").property("nickname", "string");
        Arc::new(ModelClass::new(
            Arc::new(descriptor),
            Arc::new(person_meta()),
            Arc::new(accessors),
        ))
    }

    fn person() -> Entity {
        Entity::new(class_with(HashMap::new()))
    }

    #[test]
    fn test_new_entity_is_unchanged() {
        let entity = person();
        assert!(entity.fields_changed().is_empty());
        assert!(!entity.has_changed());
        assert_eq!(entity.state(), EntityState::New);
    }

    #[test]
    fn test_set_coerces_to_property_type() {
        let mut entity = person();
        entity.set("score", "2.5").unwrap();
        entity.set("active", "yes").unwrap();
        entity.set("born", "1990-04-01").unwrap();
        entity.set("payload", r#"{"a":1}"#).unwrap();

        assert_eq!(entity.get("score").unwrap(), Value::Float(2.5));
        assert_eq!(entity.get("active").unwrap(), Value::Bool(true));
        assert_eq!(entity.get_string("born").unwrap().as_deref(), Some("1990-04-01"));
        assert_eq!(entity.get("payload").unwrap(), Value::Json(serde_json::json!({"a": 1})));
        assert_eq!(entity.get_string("score").unwrap().as_deref(), Some("2.500000"));
    }

    #[test]
    fn test_empty_value_on_nullable_column_becomes_null() {
        let mut entity = person();
        entity.set("born", "").unwrap();
        entity.set("nickname", "").unwrap();
        assert!(entity.get("born").unwrap().is_null());
        assert_eq!(entity.get("nickname").unwrap(), Value::from(""));
    }

    #[test]
    fn test_null_on_mandatory_column() {
        let mut entity = person();
        entity.set("active", Value::Null).unwrap();
        assert_eq!(entity.get("active").unwrap(), Value::Bool(false));

        let err = entity.set("name", Value::Null).unwrap_err();
        assert!(matches!(err, Error::MandatoryProperty { key, .. } if key == "name"));

        entity.set_unchecked("name", Value::Null).unwrap();
        assert!(entity.get("name").unwrap().is_null());
    }

    #[test]
    fn test_invalid_json_is_reported() {
        let mut entity = person();
        let err = entity.set("payload", "{oops").unwrap_err();
        assert!(matches!(err, Error::InvalidJson { key, .. } if key == "payload"));
    }

    #[test]
    fn test_unknown_property() {
        let mut entity = person();
        assert!(matches!(entity.set("shoe_size", 42), Err(Error::UnknownProperty { .. })));
        assert!(entity.get("shoe_size").is_err());
    }

    #[test]
    fn test_dirty_tracking_uses_loose_comparison() {
        let mut entity = person();
        entity.initialize([("id", "3"), ("name", "Ann"), ("score", "1")]).unwrap();
        assert!(!entity.has_changed());

        entity.set("score", 1.0).unwrap();
        assert!(!entity.property_has_changed("score"));

        entity.set("name", "Bob").unwrap();
        entity.set("born", "2000-01-01").unwrap();
        let changed = entity.fields_changed();
        assert_eq!(changed.keys().collect::<Vec<_>>(), ["born", "name"]);
        assert_eq!(changed["name"], Value::from("Bob"));
    }

    #[test]
    fn test_declared_properties_are_not_tracked() {
        let mut entity = person();
        entity.set("nickname", "Annie").unwrap();
        assert!(!entity.has_changed());
        assert!(!entity.property_has_changed("nickname"));
    }

    #[test]
    fn test_primary_tuple_and_condition() {
        let mut entity = person();
        assert!(entity.primary_tuple().is_none());
        assert!(entity.primary_condition().is_none());

        entity.set("id", 7).unwrap();
        assert_eq!(entity.primary_tuple().unwrap(), vec![("id".to_string(), Value::Int(7))]);
        let sql = entity
            .primary_condition()
            .unwrap()
            .build(&modeldb_core::MysqlEscape, true);
        assert_eq!(sql, "1 = 1 AND m.`id` = '7'");
    }

    #[test]
    fn test_reset_keeps_skipped_keys_and_created() {
        let mut entity = person();
        entity
            .initialize([("id", "7"), ("name", "Ann"), ("created", "2024-01-02 03:04:05")])
            .unwrap();
        entity.reset(&["id"]).unwrap();

        assert_eq!(entity.get("id").unwrap(), Value::Int(7));
        assert!(entity.get("name").unwrap().is_null());
        assert!(!entity.get("created").unwrap().is_null());
        assert!(entity.property_has_changed("id"));
        assert!(!entity.property_has_changed("name"));

        entity.reset(&[]).unwrap();
        assert!(entity.get("created").unwrap().is_null());
        assert!(!entity.has_changed());
    }

    #[test]
    fn test_copy_drops_key_and_timestamps() {
        let mut entity = person();
        entity
            .initialize([("id", "7"), ("name", "Ann"), ("created", "2024-01-02 03:04:05")])
            .unwrap();
        let copy = entity.copy();

        assert!(copy.get("id").unwrap().is_null());
        assert!(copy.get("created").unwrap().is_null());
        assert_eq!(copy.get("name").unwrap(), Value::from("Ann"));
        assert!(copy.property_has_changed("name"));
        assert_eq!(copy.state(), EntityState::New);
    }

    #[test]
    fn test_property_strings_use_german_dates() {
        let mut entity = person();
        entity
            .initialize([("born", "1990-04-01"), ("created", "2024-01-02 03:04:05")])
            .unwrap();
        let strings: BTreeMap<_, _> = entity.property_strings().unwrap().into_iter().collect();
        assert_eq!(strings["born"], "01.04.1990");
        assert_eq!(strings["created"], "02.01.2024 03:04:05");
        assert_eq!(strings["active"], "");
    }

    #[test]
    fn test_md5_ignores_timestamps_and_listed_keys() {
        let mut a = person();
        a.initialize([("name", "Ann"), ("created", "2024-01-02 03:04:05")]).unwrap();
        let mut b = person();
        b.initialize([("name", "Ann"), ("nickname", "x")]).unwrap();

        assert_ne!(a.compute_md5_hash(&[]).unwrap(), b.compute_md5_hash(&[]).unwrap());
        assert_eq!(
            a.compute_md5_hash(&["nickname"]).unwrap(),
            b.compute_md5_hash(&["nickname"]).unwrap()
        );
        assert_eq!(a.compute_md5_hash(&[]).unwrap().len(), 32);
    }

    #[test]
    fn test_to_json() {
        let mut entity = person();
        entity.initialize([("id", "7"), ("name", "Ann"), ("active", "1")]).unwrap();
        let json = entity.to_json().unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["name"], "Ann");
        assert_eq!(json["active"], true);
        assert!(json["born"].is_null());
    }

    #[test]
    fn test_custom_accessors() {
        fn upper(entity: &Entity) -> Value {
            entity
                .value("name")
                .map_or(Value::Null, |v| Value::from(v.to_string().to_uppercase()))
        }
        fn trimmed(entity: &mut Entity, value: Value) -> Result<()> {
            entity.store("name", Value::from(value.to_string().trim().to_string()));
            Ok(())
        }
        let accessors = HashMap::from([(
            "name".to_string(),
            PropertyAccessor {
                get: Some(upper),
                set: Some(trimmed),
            },
        )]);
        let mut entity = Entity::new(class_with(accessors));

        entity.set("name", "  ann ").unwrap();
        assert_eq!(entity.value("name"), Some(&Value::from("ann")));
        assert_eq!(entity.get("name").unwrap(), Value::from("ANN"));
    }

    #[test]
    fn test_set_foreign_stores_id() {
        let mut team = person();
        team.initialize([("id", "4")]).unwrap();
        let mut entity = person();
        entity.set_foreign("score", &team).unwrap();
        assert_eq!(entity.get("score").unwrap(), Value::Float(4.0));
        assert!(entity.cached_foreign("score").is_some());

        entity.set("score", 5).unwrap();
        assert!(entity.cached_foreign("score").is_none());
    }
}
