//! Live schema discovery against a MySQL-compatible server.
//!
//! Discovery issues three statements per class: column metadata, index
//! metadata and foreign-key usage. Any failure (typically a table that has
//! not been migrated yet) is logged and leaves the affected part empty.

use std::collections::BTreeMap;

use modeldb_core::{
    CREATED, Connection, ID, PropertyType, Row, UPDATED, classify_annotation, classify_column,
    quote_identifier, types::parse_enum_values,
};

use crate::descriptor::ClassDescriptor;
use crate::metadata::{ForeignTarget, SchemaMetadata, TableField};

/// Name of the primary key index.
pub const PRIMARY_INDEX: &str = "PRIMARY";

/// One row of `SHOW FULL COLUMNS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub sql_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub extra: String,
}

impl ColumnInfo {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            name: row.get("Field")?.to_string(),
            sql_type: row.get("Type").unwrap_or_default().to_string(),
            nullable: row.get("Null").is_none_or(|n| !n.eq_ignore_ascii_case("NO")),
            default: row.get("Default").map(str::to_string),
            extra: row.get("Extra").unwrap_or_default().to_string(),
        })
    }

    pub fn is_autoincrement(&self) -> bool {
        self.extra.to_ascii_lowercase().contains("auto_increment")
    }
}

/// One row of `SHOW INDEX`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub name: String,
    pub column: String,
    pub unique: bool,
}

impl IndexInfo {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            name: row.get("Key_name")?.to_string(),
            column: row.get("Column_name")?.to_string(),
            unique: row.get("Non_unique") == Some("0"),
        })
    }
}

/// A column referencing the `id` column of another table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyInfo {
    pub column: String,
    pub referenced_table: String,
}

impl ForeignKeyInfo {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            column: row.get("COLUMN_NAME")?.to_string(),
            referenced_table: row.get("REFERENCED_TABLE_NAME")?.to_string(),
        })
    }
}

fn query_rows<C, T>(conn: &mut C, sql: &str, table: &str, parse: fn(&Row) -> Option<T>) -> Vec<T>
where
    C: Connection + ?Sized,
{
    tracing::debug!(table, sql = %sql, "schema query");
    match conn.execute(sql) {
        Ok(cursor) => cursor.filter_map(|row| parse(&row)).collect(),
        Err(err) => {
            tracing::warn!(table, error = %err, "schema query failed, continuing with empty result");
            Vec::new()
        }
    }
}

pub fn columns<C: Connection + ?Sized>(conn: &mut C, table: &str) -> Vec<ColumnInfo> {
    let sql = format!("SHOW FULL COLUMNS FROM {}", quote_identifier(table));
    query_rows(conn, &sql, table, ColumnInfo::from_row)
}

pub fn indexes<C: Connection + ?Sized>(conn: &mut C, table: &str) -> Vec<IndexInfo> {
    let sql = format!("SHOW INDEX FROM {}", quote_identifier(table));
    query_rows(conn, &sql, table, IndexInfo::from_row)
}

pub fn foreign_keys<C: Connection + ?Sized>(conn: &mut C, table: &str) -> Vec<ForeignKeyInfo> {
    let sql = format!(
        "SELECT COLUMN_NAME, REFERENCED_TABLE_NAME FROM information_schema.KEY_COLUMN_USAGE \
         WHERE REFERENCED_COLUMN_NAME = '{ID}' AND TABLE_NAME = '{}' AND TABLE_SCHEMA = DATABASE()",
        conn.escape(table)
    );
    query_rows(conn, &sql, table, ForeignKeyInfo::from_row)
}

/// Resolve a foreign-key column to a mapped class.
///
/// Walks the lineage; at each level the column's annotation names a
/// candidate class, accepted when `table_of` maps it to the referenced table.
fn resolve_foreign_class(
    class: &ClassDescriptor,
    fk: &ForeignKeyInfo,
    table_of: &dyn Fn(&str) -> Option<String>,
) -> Option<String> {
    class.lineage().find_map(|level| {
        let annotation = level.own_annotation(&fk.column)?;
        let candidate = annotation
            .split('|')
            .map(|part| part.trim().trim_start_matches('?'))
            .find(|part| !part.is_empty() && *part != "null")?;
        (table_of(candidate)? == fk.referenced_table).then(|| candidate.to_string())
    })
}

/// Discover the metadata of `class` from the live schema.
///
/// `table_of` maps registered class names to their table names.
#[tracing::instrument(level = "debug", skip(conn, class, table_of), fields(class = class.name()))]
pub fn discover<C: Connection + ?Sized>(
    conn: &mut C,
    class: &ClassDescriptor,
    table_of: &dyn Fn(&str) -> Option<String>,
) -> SchemaMetadata {
    let table = class.table_name();
    let mut meta = SchemaMetadata::empty(table);

    for column in columns(conn, table) {
        if column.is_autoincrement() && meta.autoincrement_column.is_none() {
            meta.autoincrement_column = Some(column.name.clone());
        }
        if !column.nullable
            && !column.is_autoincrement()
            && column.name != CREATED
            && column.name != UPDATED
        {
            meta.mandatory_fields.push(column.name.clone());
        }
        if column.sql_type.to_ascii_lowercase().starts_with("enum") {
            meta.field_enum_values
                .insert(column.name.clone(), parse_enum_values(&column.sql_type));
        }
        meta.field_defaults
            .insert(column.name.clone(), column.default.clone());
        meta.fields.push(TableField {
            name: column.name,
            sql_type: column.sql_type,
        });
    }

    if !meta.fields.is_empty() {
        for index in indexes(conn, table) {
            if index.name == PRIMARY_INDEX {
                meta.primary_key_columns.push(index.column.clone());
            } else if index.unique {
                meta.unique_index_columns
                    .entry(index.name.clone())
                    .or_default()
                    .push(index.column.clone());
            }
            meta.indices.entry(index.name).or_default().push(index.column);
        }
    }

    let mut foreign: BTreeMap<String, ForeignTarget> = BTreeMap::new();
    if !meta.fields.is_empty() {
        for fk in foreign_keys(conn, table) {
            let target = match resolve_foreign_class(class, &fk, table_of) {
                Some(target_class) => ForeignTarget::Class(target_class),
                None => ForeignTarget::Table(fk.referenced_table.clone()),
            };
            foreign.insert(fk.column, target);
        }
    }

    for decl in class.declared_properties() {
        if !decl.stored {
            meta.reflected_properties
                .insert(decl.key.clone(), classify_annotation(&decl.declared_type));
        }
    }
    for field in &meta.fields {
        let ty = match foreign.get(&field.name) {
            Some(ForeignTarget::Class(_)) => PropertyType::ForeignKey,
            Some(ForeignTarget::Table(_)) => PropertyType::Int,
            None => classify_column(
                &field.sql_type,
                class.annotation_for(&field.name).map(classify_annotation),
                meta.field_enum_values.get(&field.name).map(Vec::as_slice),
            ),
        };
        meta.reflected_properties.insert(field.name.clone(), ty);
    }
    meta.foreign_keys = foreign;

    tracing::info!(
        class = class.name(),
        table,
        columns = meta.fields.len(),
        primary_key = ?meta.primary_key_columns,
        "discovered schema"
    );
    meta
}
