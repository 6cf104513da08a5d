//! SQLite-backed data source

use super::{DataError, DataSource, QueryResult, MAX_ROWS};
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::{Number, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Thread-safe SQLite handle. Queries run on the blocking pool.
#[derive(Clone)]
pub struct SqliteDataSource {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDataSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a database that must already exist; never creates a file
    pub fn open_existing<P: AsRef<Path>>(path: P) -> Result<Self, DataError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, DataError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run setup statements (fixtures, migrations). Not exposed to processors.
    pub fn execute_batch(&self, sql: &str) -> Result<(), DataError> {
        let conn = lock(&self.conn)?;
        conn.execute_batch(sql)?;
        Ok(())
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>, DataError> {
    conn.lock()
        .map_err(|_| DataError::Unavailable("connection mutex poisoned".to_string()))
}

#[async_trait]
impl DataSource for SqliteDataSource {
    async fn describe_schema(&self) -> Result<String, DataError> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || read_schema(&conn))
            .await
            .map_err(|e| DataError::Unavailable(format!("schema task failed: {e}")))?
    }

    async fn query(&self, sql: &str) -> Result<QueryResult, DataError> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.trim().trim_end_matches(';').to_string();

        tokio::task::spawn_blocking(move || run_query(&conn, &sql))
            .await
            .map_err(|e| DataError::Unavailable(format!("query task failed: {e}")))?
    }
}

fn read_schema(conn: &Mutex<Connection>) -> Result<String, DataError> {
    let conn = lock(conn)?;
    let mut stmt = conn.prepare(
        "SELECT sql FROM sqlite_master
         WHERE type IN ('table', 'view') AND sql IS NOT NULL AND name NOT LIKE 'sqlite_%'
         ORDER BY name",
    )?;
    let ddl = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ddl
        .into_iter()
        .map(|s| format!("{};", s.trim()))
        .collect::<Vec<_>>()
        .join("\n"))
}

fn run_query(conn: &Mutex<Connection>, sql: &str) -> Result<QueryResult, DataError> {
    let conn = lock(conn)?;
    let mut stmt = conn.prepare(sql)?;
    if !stmt.readonly() {
        return Err(DataError::NotReadOnly(sql.to_string()));
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let width = columns.len();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        if rows.len() == MAX_ROWS {
            tracing::warn!(max = MAX_ROWS, "Query result truncated");
            break;
        }
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(to_json(row.get_ref(i)?));
        }
        rows.push(values);
    }

    tracing::debug!(columns = width, rows = rows.len(), "Query completed");
    Ok(QueryResult { columns, rows })
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}
