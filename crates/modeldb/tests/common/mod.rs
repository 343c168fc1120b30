#![allow(dead_code)]

use std::sync::Arc;

use modeldb::prelude::*;
use modeldb_core::Row;
use modeldb_core::testing::{MockConnection, Reply};

pub fn column(field: &str, sql_type: &str, null: &str, default: Option<&str>, extra: &str) -> Row {
    Row::from_pairs([
        ("Field", Some(field)),
        ("Type", Some(sql_type)),
        ("Null", Some(null)),
        ("Default", default),
        ("Extra", Some(extra)),
    ])
}

pub fn index(name: &str, column: &str, non_unique: &str) -> Row {
    Row::from_pairs([
        ("Key_name", Some(name)),
        ("Column_name", Some(column)),
        ("Non_unique", Some(non_unique)),
    ])
}

/// `person`: autoincrement id, mandatory unique name, nullable boolean flag
/// defaulting to 0, timestamps.
pub fn script_person_schema(conn: &mut MockConnection) {
    conn.always(
        "SHOW FULL COLUMNS FROM `person`",
        Reply::rows(vec![
            column("id", "int(11)", "NO", None, "auto_increment"),
            column("name", "varchar(50)", "NO", None, ""),
            column("active", "tinyint(1)", "YES", Some("0"), ""),
            column("team_id", "int(11)", "YES", None, ""),
            column("created", "datetime", "YES", None, ""),
            column("updated", "datetime", "YES", None, ""),
        ]),
    );
    conn.always(
        "SHOW INDEX FROM `person`",
        Reply::rows(vec![
            index("PRIMARY", "id", "0"),
            index("name_unique", "name", "0"),
            index("team_idx", "team_id", "1"),
        ]),
    );
    conn.always(
        "TABLE_NAME = 'person'",
        Reply::rows(vec![Row::from_pairs([
            ("COLUMN_NAME", Some("team_id")),
            ("REFERENCED_TABLE_NAME", Some("team")),
        ])]),
    );
}

pub fn script_team_schema(conn: &mut MockConnection) {
    conn.always(
        "SHOW FULL COLUMNS FROM `team`",
        Reply::rows(vec![
            column("id", "int(11)", "NO", None, "auto_increment"),
            column("title", "varchar(80)", "YES", None, ""),
        ]),
    );
    conn.always("SHOW INDEX FROM `team`", Reply::rows(vec![index("PRIMARY", "id", "0")]));
}

pub fn person_row(id: &str, name: &str, active: &str) -> Row {
    Row::from_pairs([
        ("id", Some(id)),
        ("name", Some(name)),
        ("active", Some(active)),
        ("team_id", None),
        ("created", Some("2024-05-06 07:08:09")),
        ("updated", None),
    ])
}

pub fn registry() -> Arc<ModelRegistry> {
    let registry = ModelRegistry::in_memory();
    registry.register(
        ClassDescriptor::new("Person")
            .column("active", "bool")
            .column("team_id", "Team"),
    );
    registry.register(ClassDescriptor::new("Team"));
    Arc::new(registry)
}

pub fn database() -> ModelDb<MockConnection> {
    let mut conn = MockConnection::new();
    script_person_schema(&mut conn);
    script_team_schema(&mut conn);
    ModelDb::new(registry(), conn)
}
