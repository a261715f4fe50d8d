#![allow(dead_code)]

use rusqlite::types::Value;
use rusqlite::Row;
use tempfile::TempDir;
use unistore_core::{Entity, Filter, SqlSession};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS foos (
    abbr TEXT PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS memberships (
    group_id INTEGER NOT NULL,
    user_id INTEGER NOT NULL,
    role TEXT,
    PRIMARY KEY (group_id, user_id)
);";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Foo {
    pub abbr: String,
    pub name: String,
}

impl Foo {
    pub fn new(abbr: &str, name: &str) -> Self {
        Self {
            abbr: abbr.to_string(),
            name: name.to_string(),
        }
    }
}

impl Entity for Foo {
    const TABLE: &'static str = "foos";
    const COLUMNS: &'static [&'static str] = &["abbr", "name"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            abbr: row.get("abbr")?,
            name: row.get("name")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.abbr.clone()),
            Value::Text(self.name.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub group_id: i64,
    pub user_id: i64,
    pub role: Option<String>,
}

impl Entity for Membership {
    const TABLE: &'static str = "memberships";
    const COLUMNS: &'static [&'static str] = &["group_id", "user_id", "role"];

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            group_id: row.get("group_id")?,
            user_id: row.get("user_id")?,
            role: row.get("role")?,
        })
    }

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.group_id),
            Value::Integer(self.user_id),
            self.role.clone().map_or(Value::Null, Value::Text),
        ]
    }
}

pub fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

pub fn by_abbr(abbr: &str) -> Filter<Value> {
    Filter::by("abbr", text(abbr))
}

pub fn by_name(name: &str) -> Filter<Value> {
    Filter::by("name", text(name))
}

/// File-backed database with the test schema applied.
pub struct TestDb {
    _dir: TempDir,
    pub url: String,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        // Three slashes, then the absolute temp path.
        let url = format!("sqlite:///{}", dir.path().join("unistore.db").display());

        let session = SqlSession::open(&url).unwrap();
        session.execute_batch(SCHEMA).unwrap();
        session.close().unwrap();

        Self { _dir: dir, url }
    }
}
