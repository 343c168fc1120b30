//! Declarative class descriptions.
//!
//! A [`ClassDescriptor`] names a mapped class, its parent class and the type
//! annotation of each property. It is written once per class and replaces
//! runtime reflection: discovery reads annotations from here when a SQL type
//! alone is ambiguous (foreign keys, `tinyint(1)` flags, JSON in `longtext`).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use modeldb_core::Value;
//! use modeldb_schema::ClassDescriptor;
//!
//! let base = Arc::new(ClassDescriptor::new("Document").column("author_id", "Author"));
//! let post = ClassDescriptor::new("BlogPost")
//!     .extends(base)
//!     .column("published", "bool")
//!     .property("preview", "string")
//!     .default("published", Value::Bool(false))
//!     .file_property("cover");
//!
//! assert_eq!(post.table_name(), "blog_post");
//! assert_eq!(post.annotation_for("author_id"), Some("Author"));
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use modeldb_core::{CREATED, ID, UPDATED, Value, table_name_for};

/// One declared property.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub key: String,
    /// Free-text type annotation, e.g. `int`, `bool`, `array`, `Author`.
    pub declared_type: String,
    /// Backed by a table column (as opposed to an in-memory only property).
    pub stored: bool,
    pub default: Value,
}

/// Static description of a mapped class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDescriptor {
    name: String,
    table_name: String,
    parent: Option<Arc<ClassDescriptor>>,
    properties: Vec<PropertyDecl>,
    file_properties: Vec<String>,
    read_only: bool,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            table_name: table_name_for(&name),
            name,
            parent: None,
            properties: Vec::new(),
            file_properties: Vec::new(),
            read_only: false,
        }
    }

    /// Override the derived table name.
    #[must_use]
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table_name = table.into();
        self
    }

    #[must_use]
    pub fn extends(mut self, parent: Arc<ClassDescriptor>) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Annotate a table column.
    #[must_use]
    pub fn column(self, key: impl Into<String>, declared_type: impl Into<String>) -> Self {
        self.declare(key.into(), declared_type.into(), true)
    }

    /// Declare a property that is not persisted.
    #[must_use]
    pub fn property(self, key: impl Into<String>, declared_type: impl Into<String>) -> Self {
        self.declare(key.into(), declared_type.into(), false)
    }

    /// Class-level default for `key`.
    #[must_use]
    pub fn default(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.properties.iter_mut().find(|p| p.key == key) {
            Some(decl) => decl.default = value,
            None => self.properties.push(PropertyDecl {
                key,
                declared_type: String::new(),
                stored: true,
                default: value,
            }),
        }
        self
    }

    /// Mark a column as holding the file name of an upload.
    #[must_use]
    pub fn file_property(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !self.properties.iter().any(|p| p.key == key) {
            self.properties.push(PropertyDecl {
                key: key.clone(),
                declared_type: "file".to_string(),
                stored: true,
                default: Value::Null,
            });
        }
        self.file_properties.push(key);
        self
    }

    /// Writes and deletes become no-ops (database views).
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn declare(mut self, key: String, declared_type: String, stored: bool) -> Self {
        match self.properties.iter_mut().find(|p| p.key == key) {
            Some(decl) => {
                decl.declared_type = declared_type;
                decl.stored = stored;
            }
            None => self.properties.push(PropertyDecl {
                key,
                declared_type,
                stored,
                default: Value::Null,
            }),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn parent(&self) -> Option<&Arc<ClassDescriptor>> {
        self.parent.as_ref()
    }

    /// This class followed by its ancestors, nearest first.
    pub fn lineage(&self) -> impl Iterator<Item = &ClassDescriptor> {
        std::iter::successors(Some(self), |class| class.parent.as_deref())
    }

    /// Properties declared on this class only.
    pub fn own_properties(&self) -> &[PropertyDecl] {
        &self.properties
    }

    /// Annotation declared on this class only.
    pub fn own_annotation(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|p| p.key == key && !p.declared_type.is_empty())
            .map(|p| p.declared_type.as_str())
    }

    /// Nearest annotation for `key` along the lineage. The conventional
    /// `id`, `created` and `updated` columns fall back to `int` and
    /// `LocalDateTime`.
    pub fn annotation_for(&self, key: &str) -> Option<&str> {
        self.lineage()
            .find_map(|class| class.own_annotation(key))
            .or(match key {
                ID => Some("int"),
                CREATED | UPDATED => Some("LocalDateTime"),
                _ => None,
            })
    }

    /// Every declared property across the lineage; a subclass declaration
    /// shadows its parent's.
    pub fn declared_properties(&self) -> Vec<&PropertyDecl> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for class in self.lineage() {
            for decl in &class.properties {
                if seen.insert(decl.key.as_str()) {
                    out.push(decl);
                }
            }
        }
        out
    }

    /// Nearest class-level default for `key`.
    pub fn default_for(&self, key: &str) -> Value {
        self.lineage()
            .find_map(|class| {
                class
                    .properties
                    .iter()
                    .find(|p| p.key == key && !p.default.is_null())
                    .map(|p| p.default.clone())
            })
            .unwrap_or_default()
    }

    /// File-backed properties across the lineage.
    pub fn file_property_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for class in self.lineage() {
            for key in &class.file_properties {
                if !keys.contains(&key.as_str()) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    pub fn is_read_only(&self) -> bool {
        self.lineage().any(|class| class.read_only)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lineage() -> ClassDescriptor {
        let base = Arc::new(
            ClassDescriptor::new("Document")
                .column("title", "string")
                .default("status", "draft")
                .file_property("attachment"),
        );
        ClassDescriptor::new("app::BlogPost")
            .extends(base)
            .column("title", "Headline")
            .property("preview", "string")
    }

    #[test]
    fn test_table_name_derivation() {
        assert_eq!(lineage().table_name(), "blog_post");
        assert_eq!(ClassDescriptor::new("Person").table("people").table_name(), "people");
    }

    #[test]
    fn test_nearest_annotation_wins() {
        let post = lineage();
        assert_eq!(post.annotation_for("title"), Some("Headline"));
        assert_eq!(post.annotation_for("preview"), Some("string"));
        assert_eq!(post.annotation_for("id"), Some("int"));
        assert_eq!(post.annotation_for("created"), Some("LocalDateTime"));
        assert_eq!(post.annotation_for("missing"), None);
    }

    #[test]
    fn test_declared_properties_shadowing() {
        let post = lineage();
        let keys: Vec<&str> = post.declared_properties().iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, vec!["title", "preview", "status", "attachment"]);
        let title = post.declared_properties()[0];
        assert_eq!(title.declared_type, "Headline");
    }

    #[test]
    fn test_inherited_defaults_and_files() {
        let post = lineage();
        assert_eq!(post.default_for("status"), Value::from("draft"));
        assert_eq!(post.default_for("title"), Value::Null);
        assert_eq!(post.file_property_keys(), vec!["attachment"]);
        assert!(!post.is_read_only());
    }

    #[test]
    fn test_read_only_is_inherited() {
        let view = Arc::new(ClassDescriptor::new("ReportView").read_only());
        let child = ClassDescriptor::new("DailyReport").extends(view);
        assert!(child.is_read_only());
    }
}
