//! Discovered structure of one mapped class's table.

use std::collections::BTreeMap;

use modeldb_core::PropertyType;
use serde::{Deserialize, Serialize};

/// One table column in database order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableField {
    pub name: String,
    /// Raw SQL type as reported by the server, e.g. `varchar(50)`.
    pub sql_type: String,
}

/// Target of a foreign-key column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForeignTarget {
    /// A mapped class whose table is the referenced table.
    Class(String),
    /// No mapped class found; only the referenced table is known.
    Table(String),
}

/// Schema metadata of one mapped class.
///
/// Empty metadata (no fields) is valid: it is what a class gets when its
/// table does not exist yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub table_name: String,
    pub fields: Vec<TableField>,
    pub indices: BTreeMap<String, Vec<String>>,
    pub field_defaults: BTreeMap<String, Option<String>>,
    pub mandatory_fields: Vec<String>,
    pub foreign_keys: BTreeMap<String, ForeignTarget>,
    pub reflected_properties: BTreeMap<String, PropertyType>,
    pub field_enum_values: BTreeMap<String, Vec<String>>,
    pub primary_key_columns: Vec<String>,
    pub unique_index_columns: BTreeMap<String, Vec<String>>,
    pub autoincrement_column: Option<String>,
}

impl SchemaMetadata {
    pub fn empty(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Self::default()
        }
    }

    pub fn is_table_field(&self, key: &str) -> bool {
        self.fields.iter().any(|f| f.name == key)
    }

    /// Column names in database order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn sql_type(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == key)
            .map(|f| f.sql_type.as_str())
    }

    pub fn property_type(&self, key: &str) -> Option<PropertyType> {
        self.reflected_properties.get(key).copied()
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.reflected_properties.contains_key(key)
    }

    pub fn is_mandatory(&self, key: &str) -> bool {
        self.mandatory_fields.iter().any(|f| f == key)
    }

    pub fn field_default(&self, key: &str) -> Option<&str> {
        self.field_defaults.get(key).and_then(|d| d.as_deref())
    }

    pub fn foreign_class(&self, key: &str) -> Option<&str> {
        match self.foreign_keys.get(key) {
            Some(ForeignTarget::Class(class)) => Some(class),
            _ => None,
        }
    }

    pub fn index_columns(&self, index: &str) -> Option<&[String]> {
        self.indices.get(index).map(Vec::as_slice)
    }

    pub fn is_primary_key(&self, key: &str) -> bool {
        self.primary_key_columns.iter().any(|c| c == key)
    }
}
