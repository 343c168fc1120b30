//! Reading, writing and deleting single entities.

use std::sync::Arc;

use modeldb_core::{
    CREATED, Connection, Error, Escape, ID, LocalDateTime, Result, UPDATED, Value, WriteFailure,
    aliased_column, quote_identifier,
};
use modeldb_query::{Condition, ConditionValue, SelectQuery};

use crate::db::ModelDb;
use crate::entity::{Entity, EntityState};

const MANDATORY_MISSING: &str = "mandatory field missing";
const UNIQUE_VIOLATED: &str = "violates unique constraint";

/// `column = 'value'`, or `= NULL` for `None`.
pub(crate) fn assignment<E: Escape + ?Sized>(
    escaper: &E,
    alias: Option<&str>,
    key: &str,
    value: Option<&str>,
) -> String {
    let column = alias.map_or_else(|| quote_identifier(key), |alias| aliased_column(alias, key));
    match value {
        Some(value) => format!("{column} = '{}'", escaper.escape(value)),
        None => format!("{column} = NULL"),
    }
}

impl Entity {
    // ========================================================================
    // Read
    // ========================================================================

    /// Load the row identified by `tuple` (or the current primary key when
    /// empty). Returns whether a row was found.
    ///
    /// Unless `skip_reset` is set the entity is reset first. The tuple values
    /// are assigned afterwards in either case.
    #[tracing::instrument(level = "debug", skip_all, fields(class = %self.class().name()))]
    pub fn read<C: Connection>(
        &mut self,
        db: &mut ModelDb<C>,
        tuple: Vec<(String, Value)>,
        skip_reset: bool,
    ) -> Result<bool> {
        let tuple = if tuple.is_empty() {
            self.primary_tuple().ok_or_else(|| Error::MissingPrimaryKey {
                table: self.class().table().to_string(),
            })?
        } else {
            tuple
        };
        let condition = self.tuple_condition(&tuple);
        if !skip_reset {
            self.reset(&[])?;
        }
        let found = db.read_into(self, &SelectQuery::matching(condition))?;
        for (key, value) in tuple {
            self.internal_set(&key, value, true)?;
        }
        Ok(found)
    }

    /// Reload by the current primary key.
    pub fn reload<C: Connection>(&mut self, db: &mut ModelDb<C>) -> Result<bool> {
        self.read(db, Vec::new(), false)
    }

    pub fn read_by_id<C: Connection>(&mut self, db: &mut ModelDb<C>, id: impl Into<Value>) -> Result<bool> {
        self.read(db, vec![(ID.to_string(), id.into())], false)
    }

    /// Another stored entity whose columns equal this one's, ignoring
    /// primary key and timestamps.
    pub fn read_same<C: Connection>(&self, db: &mut ModelDb<C>) -> Result<Option<Entity>> {
        let class = Arc::clone(self.class());
        let mut condition = Condition::match_all();
        for key in class.table_keys() {
            if key == CREATED || key == UPDATED || class.meta().is_primary_key(key) {
                continue;
            }
            let text: ConditionValue = self.stored_sql_string(key).into();
            condition = condition.and(Condition::new(key, text));
        }
        db.read_single(class.name(), &SelectQuery::matching(condition))
    }

    /// Load the foreign entity referenced by `key`, caching it.
    ///
    /// `None` when `key` is not a foreign key to a registered class, is
    /// null, or points at a missing row.
    pub fn foreign<C: Connection>(&mut self, db: &mut ModelDb<C>, key: &str) -> Result<Option<&Entity>> {
        if self.cached_foreign(key).is_none() {
            let Some(target) = self.class().meta().foreign_class(key).map(str::to_string) else {
                return Ok(None);
            };
            let id = self.value(key).cloned().unwrap_or_default();
            if id.is_null() {
                return Ok(None);
            }
            let entity = db.load(&target, id)?;
            if !entity.is_persistent() {
                return Ok(None);
            }
            self.cache_foreign(key, entity);
        }
        Ok(self.cached_foreign(key))
    }

    // ========================================================================
    // Write
    // ========================================================================

    /// Insert or update the row, then re-read it after an insert.
    pub fn write<C: Connection>(&mut self, db: &mut ModelDb<C>) -> Result<()> {
        self.write_with(db, false)
    }

    /// Persist the entity.
    ///
    /// Mandatory columns are validated first; nothing is sent if one is
    /// missing. If a row with the current primary key exists, only changed
    /// columns are updated (nothing at all if none changed). Otherwise every
    /// non-null column is inserted and a generated id is adopted. A unique
    /// index violation is reported per column of the violated index.
    #[tracing::instrument(level = "debug", skip_all, fields(class = %self.class().name()))]
    pub fn write_with<C: Connection>(&mut self, db: &mut ModelDb<C>, skip_read_after_insert: bool) -> Result<()> {
        if self.class().is_read_only() {
            tracing::debug!("read-only class, write skipped");
            return Ok(());
        }
        self.validate_mandatory()?;

        let existing = match self.primary_condition() {
            Some(condition) => self.row_exists(db, &condition)?.then_some(condition),
            None => None,
        };
        let result = match existing {
            Some(condition) => self.update(db, &condition),
            None => self.insert(db, skip_read_after_insert),
        };
        result.map_err(|err| self.translate_write_error(db, err))
    }

    fn validate_mandatory(&self) -> Result<()> {
        let class = self.class();
        let meta = class.meta();
        let mut failure = WriteFailure::new(class.table());
        for key in &meta.mandatory_fields {
            let missing = self.value(key).is_none_or(Value::is_null);
            if missing && meta.field_default(key).is_none() {
                failure.push(key.as_str(), MANDATORY_MISSING);
            }
        }
        if failure.is_empty() {
            Ok(())
        } else {
            tracing::debug!(columns = ?failure.columns(), "mandatory fields missing");
            Err(Error::MandatoryFieldMissing(failure))
        }
    }

    fn row_exists<C: Connection>(&self, db: &mut ModelDb<C>, condition: &Condition) -> Result<bool> {
        let class = self.class();
        let columns: Vec<String> = class.primary_key().iter().map(|k| quote_identifier(k)).collect();
        let sql = format!(
            "SELECT {} FROM {} m WHERE {}",
            columns.join(", "),
            class.table(),
            condition.build(db.connection(), true)
        );
        Ok(db.execute(&sql)?.next().is_some())
    }

    fn update<C: Connection>(&mut self, db: &mut ModelDb<C>, condition: &Condition) -> Result<()> {
        let class = Arc::clone(self.class());
        let changed = self.fields_changed();
        let mut pairs: Vec<(String, Option<String>)> = changed
            .keys()
            .filter(|key| key.as_str() != CREATED && !class.meta().is_primary_key(key))
            .map(|key| (key.clone(), self.stored_sql_string(key)))
            .collect();
        if pairs.is_empty() {
            tracing::debug!("nothing changed, no update issued");
            return Ok(());
        }

        if class.is_table_field(UPDATED) {
            if !changed.contains_key(UPDATED) {
                self.store(UPDATED, Value::from(LocalDateTime::now()));
            }
            pairs.retain(|(key, _)| key != UPDATED);
            pairs.insert(0, (UPDATED.to_string(), self.stored_sql_string(UPDATED)));
        }

        let assignments: Vec<String> = pairs
            .iter()
            .map(|(key, value)| assignment(db.connection(), Some("m"), key, value.as_deref()))
            .collect();
        let sql = format!(
            "UPDATE {} m SET {} WHERE {}",
            class.table(),
            assignments.join(", "),
            condition.build(db.connection(), true)
        );
        db.execute(&sql)?;
        tracing::info!(table = class.table(), columns = pairs.len(), "entity updated");

        self.snapshot();
        self.mark(EntityState::Persistent);
        Ok(())
    }

    fn insert<C: Connection>(&mut self, db: &mut ModelDb<C>, skip_read: bool) -> Result<()> {
        let class = Arc::clone(self.class());
        if class.is_table_field(CREATED) {
            self.store(CREATED, Value::from(LocalDateTime::now()));
        }

        let assignments: Vec<String> = class
            .table_keys()
            .filter_map(|key| {
                self.stored_sql_string(key)
                    .map(|value| assignment(db.connection(), None, key, Some(value.as_str())))
            })
            .collect();
        let sql = if assignments.is_empty() {
            format!("INSERT INTO {} () VALUES()", class.table())
        } else {
            format!("INSERT INTO {} SET {}", class.table(), assignments.join(", "))
        };
        db.execute(&sql)?;

        if db.affected_rows() != 1 {
            tracing::debug!(affected = db.affected_rows(), "insert affected no single row");
            self.snapshot();
            return Ok(());
        }

        if class.is_table_field(UPDATED) {
            self.store(UPDATED, Value::Null);
        }
        let generated = db.last_insert_id();
        let id_unset = self
            .value(ID)
            .is_none_or(|id| id.is_null() || id.as_i64() == Some(0));
        if class.primary_key().iter().any(|k| k == ID) && id_unset && generated != 0 {
            self.store(ID, Value::Int(generated));
        }
        tracing::info!(table = class.table(), id = generated, "entity inserted");

        self.mark(EntityState::Persistent);
        if skip_read {
            self.snapshot();
        } else {
            let tuple = self.primary_tuple().unwrap_or_default();
            if !tuple.is_empty() {
                self.read(db, tuple, true)?;
            }
            self.snapshot();
        }
        Ok(())
    }

    /// Turn a unique violation into per-column errors. Other failures pass
    /// through unchanged.
    fn translate_write_error<C: Connection>(&self, db: &mut ModelDb<C>, err: Error) -> Error {
        let db_err = match err {
            Error::Database(db_err) if db_err.is_unique_violation() => db_err,
            other => return other,
        };

        let class = Arc::clone(self.class());
        db.minimize_autoincrement_for(&class);

        let columns = db_err
            .violated_index()
            .and_then(|index| class.meta().index_columns(&index).map(<[String]>::to_vec));
        let Some(columns) = columns else {
            return Error::Database(db_err);
        };
        let mut failure = WriteFailure::new(class.table());
        for column in columns {
            failure.push(column, UNIQUE_VIOLATED);
        }
        tracing::debug!(columns = ?failure.columns(), "unique index violated");
        Error::UniqueViolation(failure)
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Delete the row and stored files, then reset to defaults.
    #[tracing::instrument(level = "debug", skip_all, fields(class = %self.class().name()))]
    pub fn delete<C: Connection>(&mut self, db: &mut ModelDb<C>) -> Result<()> {
        let class = Arc::clone(self.class());
        if class.is_read_only() {
            tracing::debug!("read-only class, delete skipped");
            return Ok(());
        }

        for key in class.file_property_keys() {
            self.delete_upload(db, key)?;
        }

        if let Some(tuple) = self.primary_tuple() {
            let condition = self.tuple_condition(&tuple);
            let sql = format!(
                "DELETE FROM {} WHERE {}",
                class.table(),
                condition.build(db.connection(), false)
            );
            db.execute(&sql)?;
            tracing::info!(table = class.table(), "entity deleted");
        }

        self.reset(&[])
    }

    /// Remove the file stored in file property `key` and null the property.
    pub fn delete_upload<C: Connection>(&mut self, db: &mut ModelDb<C>, key: &str) -> Result<()> {
        let Some(file_name) = self.get_string(key)?.filter(|name| !name.is_empty()) else {
            return Ok(());
        };
        let directory = db.files().resolve_upload_directory(self.class().table())?;
        let path = directory.join(&file_name).absolute_path;
        if let Err(err) = db.files().delete(&path) {
            tracing::warn!(path = %path.display(), error = %err, "could not delete upload");
        }
        self.internal_set(key, Value::Null, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modeldb_core::MysqlEscape;

    #[test]
    fn test_assignment_forms() {
        assert_eq!(assignment(&MysqlEscape, Some("m"), "name", Some("O'Neil")), "m.`name` = 'O\\'Neil'");
        assert_eq!(assignment(&MysqlEscape, None, "name", Some("Ann")), "`name` = 'Ann'");
        assert_eq!(assignment(&MysqlEscape, None, "born", None), "`born` = NULL");
    }
}
