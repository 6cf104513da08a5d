//! Data sources queried by processors
//!
//! A [`DataContext`] is what the user currently has open: an identifier, a
//! queryable source and an optional spatial-bounds string.

mod sqlite;

pub use sqlite::SqliteDataSource;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Upper bound on materialised rows per query
pub const MAX_ROWS: usize = 1000;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Only read-only statements may be run: {0}")]
    NotReadOnly(String),
    #[error("Data source unavailable: {0}")]
    Unavailable(String),
}

/// Tabular query result
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// First cell of the first row, unless it is missing or null
    pub fn scalar(&self) -> Option<&Value> {
        self.rows
            .first()
            .and_then(|row| row.first())
            .filter(|v| !v.is_null())
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// Values of one column, top to bottom
    pub fn column(&self, index: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |row| row.get(index).unwrap_or(&Value::Null))
    }
}

/// Something SQL can be run against
#[async_trait]
pub trait DataSource: Send + Sync {
    /// DDL-style description of every table, embedded in the initial prompt
    async fn describe_schema(&self) -> Result<String, DataError>;

    /// Run a read-only query
    async fn query(&self, sql: &str) -> Result<QueryResult, DataError>;
}

/// The data the conversation is about
#[derive(Clone)]
pub struct DataContext {
    pub id: String,
    pub source: Arc<dyn DataSource>,
    /// Bounds of the current view, e.g. a WKT polygon
    pub bounds: Option<String>,
}

impl DataContext {
    pub fn new(id: impl Into<String>, source: Arc<dyn DataSource>) -> Self {
        Self {
            id: id.into(),
            source,
            bounds: None,
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: impl Into<String>) -> Self {
        self.bounds = Some(bounds.into());
        self
    }
}

impl fmt::Debug for DataContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataContext")
            .field("id", &self.id)
            .field("bounds", &self.bounds)
            .finish_non_exhaustive()
    }
}

/// Render a cell the way a person expects to read it
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
