//! Connection handle and multi-row operations.

use std::sync::Arc;

use modeldb_core::{
    Connection, Driver, Error, FileStore, LocalFileStore, ModelDbConfig, PropertyType, Result, Row,
    RowCursor, Value, quote_identifier,
};
use modeldb_query::{Condition, ConditionKey, ConditionValue, RECORD_COUNT_ALIAS, SelectQuery};

use crate::class::{ModelClass, ModelRegistry};
use crate::entity::{Entity, EntityState};

/// A connection bound to a [`ModelRegistry`].
///
/// Entities borrow it mutably for every operation that touches the
/// database; one `ModelDb` serves one thread.
pub struct ModelDb<C: Connection> {
    registry: Arc<ModelRegistry>,
    conn: C,
    files: Arc<dyn FileStore>,
}

impl<C: Connection> std::fmt::Debug for ModelDb<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDb")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl<C: Connection> ModelDb<C> {
    pub fn new(registry: Arc<ModelRegistry>, conn: C) -> Self {
        Self {
            registry,
            conn,
            files: Arc::new(ModelDbConfig::default().file_store()),
        }
    }

    /// Open a connection with `driver` using the configured DSN.
    pub fn connect<D>(driver: &D, registry: Arc<ModelRegistry>, config: &ModelDbConfig) -> Result<Self>
    where
        D: Driver<Connection = C>,
    {
        let dsn = config
            .dsn
            .as_deref()
            .ok_or_else(|| Error::Connection("no dsn configured".to_string()))?;
        let conn = driver.connect(dsn)?;
        tracing::info!("database connection established");
        Ok(Self {
            registry,
            conn,
            files: Arc::new(config.file_store()),
        })
    }

    #[must_use]
    pub fn with_file_store(mut self, files: Arc<dyn FileStore>) -> Self {
        self.files = files;
        self
    }

    #[must_use]
    pub fn with_local_files(self, files: LocalFileStore) -> Self {
        self.with_file_store(Arc::new(files))
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    pub fn files(&self) -> &Arc<dyn FileStore> {
        &self.files
    }

    pub fn into_connection(self) -> C {
        self.conn
    }

    /// Resolve a registered class, discovering its schema on first use.
    pub fn class(&mut self, name: &str) -> Result<Arc<ModelClass>> {
        self.registry.class(&mut self.conn, name)
    }

    /// Run one statement, turning driver failures into [`Error::Database`].
    pub fn execute(&mut self, sql: &str) -> Result<RowCursor> {
        tracing::debug!(sql, "execute");
        self.conn.execute(sql).map_err(|err| {
            tracing::debug!(code = %err.code, message = %err.message, "statement failed");
            Error::Database(err)
        })
    }

    pub fn affected_rows(&self) -> u64 {
        self.conn.affected_rows()
    }

    pub fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_id()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// A new entity with class defaults.
    pub fn create(&mut self, class: &str) -> Result<Entity> {
        Ok(Entity::new(self.class(class)?))
    }

    /// Load the row with `id`.
    ///
    /// If there is none, the entity keeps the defaults with `id` set, and
    /// reports no changes.
    pub fn load(&mut self, class: &str, id: impl Into<Value>) -> Result<Entity> {
        let mut entity = self.create(class)?;
        let found = entity.read(self, vec![(modeldb_core::ID.to_string(), id.into())], true)?;
        if !found {
            tracing::debug!(class, "no row for id, keeping defaults");
            entity.snapshot();
        }
        Ok(entity)
    }

    /// A new entity initialized from `values`, which count as unchanged.
    pub fn create_from<K, V>(&mut self, class: &str, values: impl IntoIterator<Item = (K, V)>) -> Result<Entity>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut entity = self.create(class)?;
        entity.initialize(values)?;
        Ok(entity)
    }

    // ========================================================================
    // Reading
    // ========================================================================

    /// The SQL `query` renders to for `class`.
    pub fn select_sql(&mut self, class: &str, query: &SelectQuery) -> Result<String> {
        let class = self.class(class)?;
        Ok(self.render(&class, query))
    }

    fn render(&self, class: &ModelClass, query: &SelectQuery) -> String {
        query.build(class.table(), |key| class.is_table_field(key), &self.conn)
    }

    fn fetch(&mut self, class: &ModelClass, query: &SelectQuery) -> Result<Vec<Row>> {
        let sql = self.render(class, query);
        Ok(self.execute(&sql)?.collect())
    }

    fn materialize(class: &Arc<ModelClass>, rows: Vec<Row>) -> Result<Vec<Entity>> {
        rows.iter()
            .map(|row| {
                let mut entity = Entity::new(Arc::clone(class));
                entity.initialize_from_row(row)?;
                entity.mark(EntityState::Persistent);
                Ok(entity)
            })
            .collect()
    }

    #[tracing::instrument(level = "debug", skip(self, query))]
    pub fn read_multiple(&mut self, class: &str, query: &SelectQuery) -> Result<Vec<Entity>> {
        let class = self.class(class)?;
        let rows = self.fetch(&class, query)?;
        tracing::debug!(rows = rows.len(), "read entities");
        Self::materialize(&class, rows)
    }

    /// First entity matching `query`.
    pub fn read_single(&mut self, class: &str, query: &SelectQuery) -> Result<Option<Entity>> {
        let query = query.clone().limit(1);
        Ok(self.read_multiple(class, &query)?.into_iter().next())
    }

    /// Load the first row matching `query` into `entity`.
    pub(crate) fn read_into(&mut self, entity: &mut Entity, query: &SelectQuery) -> Result<bool> {
        let class = Arc::clone(entity.class());
        let query = query.clone().limit(1);
        let Some(row) = self.fetch(&class, &query)?.into_iter().next() else {
            return Ok(false);
        };
        entity.initialize_from_row(&row)?;
        entity.mark(EntityState::Persistent);
        Ok(true)
    }

    /// Raw rows, for projections that do not map onto entities.
    pub fn read_fields(&mut self, class: &str, query: &SelectQuery) -> Result<Vec<Row>> {
        let class = self.class(class)?;
        self.fetch(&class, query)
    }

    /// Primary key tuples of all rows matching `query`.
    pub fn read_primary_tuples(&mut self, class: &str, query: &SelectQuery) -> Result<Vec<Vec<(String, Value)>>> {
        let class = self.class(class)?;
        let query = class
            .primary_key()
            .iter()
            .fold(query.clone(), |q, key| q.field(key.as_str()));
        let rows = self.fetch(&class, &query)?;

        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let mut tuple = Vec::with_capacity(class.primary_key().len());
            for key in class.primary_key() {
                let ty = class.property_type(key).unwrap_or(PropertyType::None);
                tuple.push((key.clone(), Value::from_sql(row.get(key)).convert(ty, key)?));
            }
            tuples.push(tuple);
        }
        Ok(tuples)
    }

    /// Number of rows matching `query`. Grouped counts are summed.
    pub fn record_count(&mut self, class: &str, query: &SelectQuery) -> Result<u64> {
        let query = if query.is_count() {
            query.clone()
        } else {
            query.clone().count()
        };
        let rows = self.read_fields(class, &query)?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get(RECORD_COUNT_ALIAS))
            .filter_map(|count| count.trim().parse::<u64>().ok())
            .sum())
    }

    /// Whether a row with all of `pairs` exists. A list value matches any of
    /// its items.
    pub fn exists<K, V>(&mut self, class: &str, pairs: impl IntoIterator<Item = (K, V)>) -> Result<bool>
    where
        K: Into<ConditionKey>,
        V: Into<ConditionValue>,
    {
        let query = SelectQuery::matching(Condition::from_pairs(pairs));
        Ok(self.record_count(class, &query)? > 0)
    }

    // ========================================================================
    // Bulk writes
    // ========================================================================

    /// Delete all rows matching `condition`, or every row.
    ///
    /// Classes with file properties delete entity by entity so stored files
    /// go too.
    pub fn delete_multiple(&mut self, class: &str, condition: Option<Condition>) -> Result<()> {
        let class = self.class(class)?;
        if class.is_read_only() {
            tracing::debug!(class = class.name(), "read-only class, delete skipped");
            return Ok(());
        }

        if !class.file_property_keys().is_empty() {
            let query = condition.map_or_else(SelectQuery::new, SelectQuery::matching);
            let rows = self.fetch(&class, &query)?;
            for mut entity in Self::materialize(&class, rows)? {
                entity.delete(self)?;
            }
        } else if let Some(condition) = condition {
            let sql = format!("DELETE FROM {} WHERE {}", class.table(), condition.build(&self.conn, false));
            self.execute(&sql)?;
        } else if let Err(err) = self.truncate_class(&class) {
            tracing::debug!(table = class.table(), error = %err, "truncate failed, deleting rows");
            let sql = format!("DELETE FROM {}", class.table());
            self.execute(&sql)?;
        }

        self.minimize_autoincrement_for(&class);
        Ok(())
    }

    /// Assign `values` on every row matching `condition`. Returns the number
    /// of affected rows.
    ///
    /// With `ignore_errors` the statement runs as `UPDATE IGNORE`. Classes
    /// with file properties are written entity by entity; a failing entity is
    /// skipped with `ignore_errors` and otherwise ends the run.
    pub fn update_multiple(
        &mut self,
        class: &str,
        values: &[(&str, Value)],
        condition: Option<Condition>,
        ignore_errors: bool,
    ) -> Result<u64> {
        let class = self.class(class)?;
        if class.is_read_only() || values.is_empty() {
            return Ok(0);
        }

        if !class.file_property_keys().is_empty() {
            let query = condition.map_or_else(SelectQuery::new, SelectQuery::matching);
            let rows = self.fetch(&class, &query)?;
            let mut count = 0;
            for mut entity in Self::materialize(&class, rows)? {
                let written = values
                    .iter()
                    .try_for_each(|(key, value)| entity.set(key, value.clone()))
                    .and_then(|()| entity.write(self));
                match written {
                    Ok(()) => count += 1,
                    Err(err) => {
                        tracing::warn!(class = class.name(), error = %err, "bulk update of entity failed");
                        if ignore_errors {
                            continue;
                        }
                        break;
                    }
                }
            }
            return Ok(count);
        }

        let mut assignments = Vec::with_capacity(values.len());
        for (key, value) in values {
            let ty = class.property_type(key).unwrap_or(PropertyType::None);
            let text = value.clone().convert(ty, key)?.to_sql_string(ty);
            assignments.push(crate::lifecycle::assignment(&self.conn, Some("m"), key, text.as_deref()));
        }
        let condition = condition.unwrap_or_else(Condition::match_all);
        let sql = format!(
            "UPDATE {}{} m SET {} WHERE {}",
            if ignore_errors { "IGNORE " } else { "" },
            class.table(),
            assignments.join(", "),
            condition.build(&self.conn, true)
        );
        self.execute(&sql)?;
        let affected = self.conn.affected_rows();
        tracing::debug!(table = class.table(), affected, "bulk update");

        self.minimize_autoincrement_for(&class);
        Ok(affected)
    }

    pub fn truncate(&mut self, class: &str) -> Result<()> {
        let class = self.class(class)?;
        self.truncate_class(&class)
    }

    fn truncate_class(&mut self, class: &ModelClass) -> Result<()> {
        let sql = format!("TRUNCATE TABLE {}", class.table());
        self.execute(&sql).map(drop)
    }

    /// Lower the autoincrement counter to one past the highest id in use.
    pub fn minimize_autoincrement(&mut self, class: &str) -> Result<()> {
        let class = self.class(class)?;
        self.minimize_autoincrement_for(&class);
        Ok(())
    }

    /// Failures are logged and otherwise ignored.
    pub(crate) fn minimize_autoincrement_for(&mut self, class: &ModelClass) {
        let Some(column) = class.meta().autoincrement_column.as_deref() else {
            return;
        };
        let table = class.table();
        let select = format!("SELECT MAX({}) AS max_id FROM {table}", quote_identifier(column));
        let max = match self.execute(&select) {
            Ok(mut rows) => rows
                .fetch_next_row()
                .and_then(|row| row.get("max_id").and_then(|v| v.trim().parse::<i64>().ok()))
                .unwrap_or(0),
            Err(err) => {
                tracing::warn!(table, error = %err, "could not read autoincrement maximum");
                return;
            }
        };
        let alter = format!("ALTER TABLE {table} AUTO_INCREMENT = {}", max + 1);
        if let Err(err) = self.execute(&alter) {
            tracing::warn!(table, error = %err, "could not reset autoincrement");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modeldb_core::testing::{MockConnection, Reply};
    use modeldb_schema::ClassDescriptor;

    /// `tag` has a natural primary key and no autoincrement column.
    fn tag_db() -> ModelDb<MockConnection> {
        let mut conn = MockConnection::new();
        conn.always(
            "SHOW FULL COLUMNS FROM `tag`",
            Reply::rows(vec![Row::from_pairs([
                ("Field", Some("label")),
                ("Type", Some("varchar(20)")),
                ("Null", Some("NO")),
                ("Default", None),
                ("Extra", Some("")),
            ])]),
        );
        conn.always(
            "SHOW INDEX FROM `tag`",
            Reply::rows(vec![Row::from_pairs([
                ("Key_name", Some("PRIMARY")),
                ("Column_name", Some("label")),
                ("Non_unique", Some("0")),
            ])]),
        );
        let registry = ModelRegistry::in_memory();
        registry.register(ClassDescriptor::new("Tag"));
        ModelDb::new(Arc::new(registry), conn)
    }

    #[test]
    fn test_minimize_without_autoincrement_is_silent() {
        let mut db = tag_db();
        db.minimize_autoincrement("Tag").unwrap();
        assert_eq!(db.connection().count_matching("MAX("), 0);
        assert_eq!(db.connection().count_matching("AUTO_INCREMENT"), 0);
    }

    #[test]
    fn test_natural_key_is_probed_then_inserted() {
        let mut db = tag_db();
        let mut tag = db.create("Tag").unwrap();
        tag.set("label", "rust").unwrap();
        db.connection_mut().once("INSERT INTO tag", Reply::affected(1, 0));
        tag.write_with(&mut db, true).unwrap();

        let conn = db.connection();
        assert_eq!(
            conn.count_matching("SELECT `label` FROM tag m WHERE 1 = 1 AND m.`label` = 'rust'"),
            1
        );
        assert_eq!(conn.matching("INSERT INTO tag"), vec!["INSERT INTO tag SET `label` = 'rust'"]);
        assert!(tag.is_persistent());
        assert!(!tag.has_changed());
    }

    #[test]
    fn test_truncate() {
        let mut db = tag_db();
        db.truncate("Tag").unwrap();
        assert_eq!(db.connection().count_matching("TRUNCATE TABLE tag"), 1);
    }
}
