use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, Params};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use thought_common::{Error, Result};
use tracing::debug;

const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Mediates every read and write against the SQLite file.
///
/// Each call opens its own connection, executes one statement and drops the
/// connection before returning, whether the statement succeeded or not.
/// The gateway itself only carries configuration, so it is cheap to clone
/// into blocking tasks.
#[derive(Debug, Clone)]
pub struct StorageGateway {
    db_path: PathBuf,
    busy_timeout: Duration,
}

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunResult {
    /// Rowid assigned by the most recent successful insert on the connection.
    pub inserted_id: i64,
    pub rows_changed: usize,
}

/// One result row, columns kept in the order the statement produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl StorageGateway {
    /// Create a gateway for `db_path`, creating the parent directory if needed.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        Ok(Self {
            db_path,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        })
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection> {
        debug!("opening connection to {}", self.db_path.display());
        let conn = Connection::open(&self.db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| Error::Database(format!("failed to set busy timeout: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(conn)
    }

    /// Run a read statement and return every row with its column names.
    pub fn query<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Row>> {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let names: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();

        let rows = stmt
            .query_map(params, |row| {
                let mut columns = Vec::with_capacity(names.len());
                for (idx, name) in names.iter().enumerate() {
                    columns.push((name.clone(), value_to_json(row.get_ref(idx)?)));
                }
                Ok(Row { columns })
            })
            .map_err(|e| Error::Database(format!("failed to execute query: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect rows: {e}")))
    }

    /// Run a read statement and map each row with `mapper`.
    pub fn query_map<T, P, F>(&self, sql: &str, params: P, mapper: F) -> Result<Vec<T>>
    where
        P: Params,
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.open()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map(params, mapper)
            .map_err(|e| Error::Database(format!("failed to execute query: {e}")))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(format!("failed to collect rows: {e}")))
    }

    /// Run a single write statement.
    pub fn run<P: Params>(&self, sql: &str, params: P) -> Result<RunResult> {
        let conn = self.open()?;
        let rows_changed = conn
            .execute(sql, params)
            .map_err(|e| Error::Database(format!("failed to execute statement: {e}")))?;

        Ok(RunResult {
            inserted_id: conn.last_insert_rowid(),
            rows_changed,
        })
    }

    /// Hand a freshly opened connection to `f` and drop it afterwards.
    ///
    /// Used where several statements must share one transaction.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.open()?;
        f(&mut conn)
    }
}

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
