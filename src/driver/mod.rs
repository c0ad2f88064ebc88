//! Driver abstraction over the embedded SQL engine.
//!
//! The store never talks to SQLite directly; it goes through a [`Driver`]
//! (the connection registry) and the [`Connection`] handles it hands out.

use async_trait::async_trait;
use std::fmt;

pub mod mock;
pub mod sqlite;

pub use mock::MockDriver;
pub use sqlite::SqliteDriver;

/// Parameters for creating a named connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub name: String,
    pub encrypted: bool,
    /// Encryption mode label, e.g. `"no-encryption"`.
    pub mode: String,
    /// Schema version written to the database on writable opens.
    pub version: i32,
    pub read_only: bool,
}

impl ConnectionOptions {
    /// Plain read-write connection at schema version 1.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            encrypted: false,
            mode: "no-encryption".to_string(),
            version: 1,
            read_only: false,
        }
    }
}

/// Connection registry.
#[async_trait]
pub trait Driver: Send + Sync + fmt::Debug {
    /// Returns false if the registry had to drop stale entries.
    async fn check_consistency(&self) -> Result<bool, DriverError>;

    async fn has_connection(&self, name: &str) -> Result<bool, DriverError>;

    async fn create_connection(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn Connection>, DriverError>;

    async fn retrieve_connection(
        &self,
        name: &str,
        read_only: bool,
    ) -> Result<Box<dyn Connection>, DriverError>;

    /// Remove the named connection from the registry.
    async fn close_connection(&self, name: &str) -> Result<(), DriverError>;
}

/// A single named database handle.
#[async_trait]
pub trait Connection: Send + fmt::Debug {
    async fn open(&mut self) -> Result<(), DriverError>;

    async fn close(&mut self) -> Result<(), DriverError>;

    fn is_open(&self) -> bool;

    /// Execute one statement without parameters (DDL, transaction control).
    async fn execute(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Execute a parameterized write.
    async fn run(&mut self, sql: &str, params: &[Value]) -> Result<Changes, DriverError>;

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError>;
}

/// Outcome of a write statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub rows_affected: u64,
    pub last_insert_id: i64,
}

/// Scalar value bound to or read from a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// One result row, columns in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.push(column, value.into());
        self
    }

    pub fn push(&mut self, column: &str, value: Value) {
        self.columns.push((column.to_string(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// # Errors
    /// Fails if the column is missing or not an INTEGER.
    pub fn integer(&self, column: &str) -> Result<i64, DriverError> {
        match self.get(column) {
            Some(Value::Integer(v)) => Ok(*v),
            other => Err(DriverError::decode(column, "INTEGER", other)),
        }
    }

    /// TEXT column; NULL reads as an empty string.
    pub fn text(&self, column: &str) -> Result<String, DriverError> {
        match self.get(column) {
            Some(Value::Text(v)) => Ok(v.clone()),
            Some(Value::Null) => Ok(String::new()),
            Some(Value::Integer(v)) => Ok(v.to_string()),
            Some(Value::Real(v)) => Ok(v.to_string()),
            None => Err(DriverError::decode(column, "TEXT", None)),
        }
    }

    /// TEXT column; `None` for NULL.
    pub fn optional_text(&self, column: &str) -> Result<Option<String>, DriverError> {
        match self.get(column) {
            Some(Value::Null) => Ok(None),
            Some(_) => self.text(column).map(Some),
            None => Err(DriverError::decode(column, "TEXT", None)),
        }
    }

    /// Numeric column as f64; `None` for NULL.
    pub fn real(&self, column: &str) -> Result<Option<f64>, DriverError> {
        match self.get(column) {
            Some(Value::Real(v)) => Ok(Some(*v)),
            Some(Value::Integer(v)) => Ok(Some(*v as f64)),
            Some(Value::Null) => Ok(None),
            Some(Value::Text(s)) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| DriverError::decode(column, "REAL", Some(&Value::Text(s.clone())))),
            None => Err(DriverError::decode(column, "REAL", None)),
        }
    }
}

/// Error type for driver operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// A UNIQUE constraint rejected the statement.
    UniqueViolation(String),
    /// Creating, retrieving or opening a connection failed.
    Connection(String),
    /// The connection is not open.
    NotOpen(String),
    /// Any other statement failure.
    Database(String),
    /// A column could not be read as the expected type.
    Decode(String),
    Unsupported(String),
}

impl DriverError {
    fn decode(column: &str, expected: &str, found: Option<&Value>) -> Self {
        match found {
            Some(v) => DriverError::Decode(format!(
                "column '{}': expected {}, found {:?}",
                column, expected, v
            )),
            None => DriverError::Decode(format!("column '{}' not found", column)),
        }
    }

    /// True for uniqueness failures, including drivers that only report them in text.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DriverError::UniqueViolation(_) => true,
            other => other.message().contains("UNIQUE constraint failed"),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            DriverError::UniqueViolation(m)
            | DriverError::Connection(m)
            | DriverError::NotOpen(m)
            | DriverError::Database(m)
            | DriverError::Decode(m)
            | DriverError::Unsupported(m) => m,
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::UniqueViolation(msg) => write!(f, "{}", msg),
            DriverError::Connection(msg) => write!(f, "Connection error: {}", msg),
            DriverError::NotOpen(name) => write!(f, "Connection '{}' is not open", name),
            DriverError::Database(msg) => write!(f, "{}", msg),
            DriverError::Decode(msg) => write!(f, "Decode error: {}", msg),
            DriverError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
        }
    }
}

impl std::error::Error for DriverError {}
