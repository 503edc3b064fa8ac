mod schema;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Batch, Connection, Statement, ToSql};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::DatabaseLocation;

pub use schema::MANAGED_TABLES;
use schema::INITIAL_SCHEMA;

/// A single result row: column name to JSON value, in column order.
pub type Row = Map<String, Value>;

/// Table name to column names, as returned by [`Database::schema`].
pub type SchemaInfo = BTreeMap<String, Vec<String>>;

/// Validation failures for record insertion.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DbError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown column '{column}' for table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Record data cannot be empty")]
    EmptyRecord,
}

/// Database wrapper providing connection management and schema initialization.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens an in-memory SQLite database.
    ///
    /// Automatically initializes the schema on connection open.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Opens a file-based SQLite database at the given path.
    ///
    /// Creates the database file if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Opens the database described by a parsed `DATABASE_URL`.
    pub fn connect(location: &DatabaseLocation) -> Result<Self> {
        match location {
            DatabaseLocation::Memory => Self::in_memory(),
            DatabaseLocation::File(path) => Self::open(path),
        }
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute("PRAGMA foreign_keys = ON", [])?;
        self.conn.execute_batch(INITIAL_SCHEMA)?;
        Ok(())
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs `SELECT 1` to prove the connection is usable.
    pub fn ping(&self) -> Result<()> {
        let one: i64 = self.conn.query_row("SELECT 1", [], |row| row.get(0))?;
        anyhow::ensure!(one == 1, "unexpected ping result: {one}");
        Ok(())
    }

    /// Executes arbitrary SQL and converts every row into a JSON object.
    ///
    /// Every statement in `sql` runs in order. The rows of the last statement
    /// with result columns are returned; statements without result columns
    /// are executed and contribute no rows.
    pub fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        let mut batch = Batch::new(&self.conn, sql);
        let mut out = Vec::new();
        while let Some(mut stmt) = batch.next()? {
            if stmt.column_count() == 0 {
                stmt.execute([])?;
                continue;
            }
            out = collect_rows(&mut stmt)?;
        }
        Ok(out)
    }

    /// Lists the managed tables present in the database with their columns.
    pub fn schema(&self) -> Result<SchemaInfo> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut info = SchemaInfo::new();
        for table in tables
            .into_iter()
            .filter(|t| MANAGED_TABLES.contains(&t.as_str()))
        {
            let columns = self.table_columns(&table)?;
            info.insert(table, columns);
        }
        Ok(info)
    }

    /// Returns the column names of `table` in declaration order.
    pub fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Inserts a single record into a managed table.
    ///
    /// Table and column names are checked against the live schema before they
    /// are placed in the statement; values are always bound as named parameters.
    pub fn insert_record(&mut self, table: &str, data: &Map<String, Value>) -> Result<i64> {
        if data.is_empty() {
            return Err(DbError::EmptyRecord.into());
        }
        if !MANAGED_TABLES.contains(&table) {
            return Err(DbError::UnknownTable(table.to_string()).into());
        }

        let known = self.table_columns(table)?;
        if known.is_empty() {
            return Err(DbError::UnknownTable(table.to_string()).into());
        }
        if let Some(column) = data.keys().find(|k| !known.contains(k)) {
            return Err(DbError::UnknownColumn {
                table: table.to_string(),
                column: column.clone(),
            }
            .into());
        }

        let columns: Vec<&str> = data.keys().map(String::as_str).collect();
        let placeholders: Vec<String> = columns.iter().map(|c| format!(":{c}")).collect();
        let sql = format!(
            "INSERT INTO {table} ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );

        let values: Vec<SqlValue> = data.values().map(json_to_value).collect();
        let params: Vec<(&str, &dyn ToSql)> = placeholders
            .iter()
            .map(String::as_str)
            .zip(values.iter().map(|v| v as &dyn ToSql))
            .collect();

        // Dropping the transaction without commit rolls it back
        let tx = self.conn.transaction()?;
        tx.execute(&sql, params.as_slice())?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }
}

fn collect_rows(stmt: &mut Statement<'_>) -> Result<Vec<Row>> {
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut obj = Map::with_capacity(columns.len());
        for (idx, name) in columns.iter().enumerate() {
            obj.insert(name.clone(), value_to_json(row.get_ref(idx)?));
        }
        out.push(obj);
    }
    Ok(out)
}

/// Converts a SQLite value into JSON.
fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

/// Converts a JSON value into a bindable SQLite value.
fn json_to_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
