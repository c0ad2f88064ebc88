//! SQLite driver backed by sqlx.
//!
//! Each named connection maps to `<dir>/<name>.db`. The registry only records
//! which names were created; handles open and close their own sqlx
//! connection on demand.

use super::{Changes, Connection, ConnectionOptions, Driver, DriverError, Row, Value};
use async_trait::async_trait;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Row as _, TypeInfo, ValueRef};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Connection registry for SQLite database files in one directory.
#[derive(Debug)]
pub struct SqliteDriver {
    dir: PathBuf,
    busy_timeout_ms: u64,
    registry: Mutex<HashMap<String, ConnectionOptions>>,
}

impl SqliteDriver {
    /// Create a driver storing database files under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        SqliteDriver {
            dir: dir.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_busy_timeout_ms(mut self, busy_timeout_ms: u64) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    /// Path of the database file behind a connection name.
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.db", name))
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, ConnectionOptions>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn handle(&self, options: ConnectionOptions) -> Box<dyn Connection> {
        Box::new(SqliteHandle {
            path: self.database_path(&options.name),
            options,
            busy_timeout_ms: self.busy_timeout_ms,
            conn: None,
        })
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn check_consistency(&self) -> Result<bool, DriverError> {
        let mut registry = self.registry();
        let stale: Vec<String> = registry
            .keys()
            .filter(|name| !self.database_path(name).exists())
            .cloned()
            .collect();
        if stale.is_empty() {
            return Ok(true);
        }
        // Any stale entry invalidates the registry; callers recreate what they need.
        warn!(
            stale = ?stale,
            dropped = registry.len(),
            "Database file missing, resetting connection registry"
        );
        registry.clear();
        Ok(false)
    }

    async fn has_connection(&self, name: &str) -> Result<bool, DriverError> {
        Ok(self.registry().contains_key(name))
    }

    async fn create_connection(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn Connection>, DriverError> {
        if options.encrypted {
            return Err(DriverError::Unsupported(format!(
                "encrypted connections (mode '{}')",
                options.mode
            )));
        }
        if self.registry().contains_key(&options.name) {
            return Err(DriverError::Connection(format!(
                "connection '{}' already exists",
                options.name
            )));
        }

        let path = self.database_path(&options.name);
        if !options.read_only {
            ensure_database_file(&path)
                .await
                .map_err(|e| DriverError::Connection(format!("{}: {}", path.display(), e)))?;
        }

        self.registry()
            .insert(options.name.clone(), options.clone());
        info!(connection = %options.name, path = %path.display(), "Created connection");
        Ok(self.handle(options.clone()))
    }

    async fn retrieve_connection(
        &self,
        name: &str,
        read_only: bool,
    ) -> Result<Box<dyn Connection>, DriverError> {
        let options = self
            .registry()
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::Connection(format!("no connection named '{}'", name)))?;
        if options.read_only != read_only {
            return Err(DriverError::Connection(format!(
                "connection '{}' was created with read_only={}",
                name, options.read_only
            )));
        }
        debug!(connection = %name, "Retrieved existing connection");
        Ok(self.handle(options))
    }

    async fn close_connection(&self, name: &str) -> Result<(), DriverError> {
        self.registry().remove(name);
        Ok(())
    }
}

/// Create the parent directory and an empty database file if missing.
async fn ensure_database_file(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    Ok(())
}

/// One named SQLite database handle.
pub struct SqliteHandle {
    path: PathBuf,
    options: ConnectionOptions,
    busy_timeout_ms: u64,
    conn: Option<SqliteConnection>,
}

impl fmt::Debug for SqliteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteHandle")
            .field("name", &self.options.name)
            .field("path", &self.path)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl SqliteHandle {
    fn conn_mut(&mut self) -> Result<&mut SqliteConnection, DriverError> {
        let name = &self.options.name;
        self.conn
            .as_mut()
            .ok_or_else(|| DriverError::NotOpen(name.clone()))
    }
}

#[async_trait]
impl Connection for SqliteHandle {
    async fn open(&mut self) -> Result<(), DriverError> {
        if self.conn.is_some() {
            return Ok(());
        }

        let mut conn = SqliteConnectOptions::new()
            .filename(&self.path)
            .create_if_missing(!self.options.read_only)
            .read_only(self.options.read_only)
            .connect()
            .await
            .map_err(|e| DriverError::Connection(format!("{}: {}", self.path.display(), e)))?;

        configure_pragmas_conn(&mut conn, &self.options, self.busy_timeout_ms)
            .await
            .map_err(map_sqlx_error)?;

        self.conn = Some(conn);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if let Some(conn) = self.conn.take() {
            sqlx::Connection::close(conn)
                .await
                .map_err(|e| DriverError::Connection(e.to_string()))?;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    async fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        let conn = self.conn_mut()?;
        sqlx::query(sql)
            .execute(conn)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn run(&mut self, sql: &str, params: &[Value]) -> Result<Changes, DriverError> {
        let conn = self.conn_mut()?;
        let result = bind_params(sql, params)
            .execute(conn)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Changes {
            rows_affected: result.rows_affected(),
            last_insert_id: result.last_insert_rowid(),
        })
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DriverError> {
        let conn = self.conn_mut()?;
        let rows = bind_params(sql, params)
            .fetch_all(conn)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter()
            .map(convert_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| DriverError::Decode(e.to_string()))
    }
}

fn bind_params<'q>(sql: &'q str, params: &'q [Value]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = sqlx::query(sql);
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Integer(v) => query.bind(*v),
            Value::Real(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.as_str()),
        };
    }
    query
}

fn convert_row(row: &SqliteRow) -> Result<Row, sqlx::Error> {
    let mut out = Row::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::Integer(row.try_get_unchecked::<i64, _>(idx)?),
                "REAL" => Value::Real(row.try_get_unchecked::<f64, _>(idx)?),
                _ => Value::Text(row.try_get_unchecked::<String, _>(idx)?),
            }
        };
        out.push(column.name(), value);
    }
    Ok(out)
}

fn map_sqlx_error(err: sqlx::Error) -> DriverError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            DriverError::UniqueViolation(db_err.message().to_string())
        }
        sqlx::Error::Database(db_err) => DriverError::Database(db_err.message().to_string()),
        _ => DriverError::Database(err.to_string()),
    }
}

/// Configure SQLite pragmas for a freshly opened connection.
async fn configure_pragmas_conn(
    conn: &mut SqliteConnection,
    options: &ConnectionOptions,
    busy_timeout_ms: u64,
) -> Result<(), sqlx::Error> {
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&mut *conn)
        .await?;
    sqlx::query(&format!("PRAGMA busy_timeout = {}", busy_timeout_ms))
        .execute(&mut *conn)
        .await?;

    if options.read_only {
        return Ok(());
    }

    // journal_mode returns the actual mode set; must use fetch to get result
    let row = sqlx::query("PRAGMA journal_mode = WAL")
        .fetch_one(&mut *conn)
        .await?;
    let journal_mode: String = row.get(0);
    debug!(connection = %options.name, journal_mode = %journal_mode, "SQLite journal_mode set");

    let row = sqlx::query("PRAGMA user_version")
        .fetch_one(&mut *conn)
        .await?;
    let current: i32 = row.get(0);
    if current < options.version {
        sqlx::query(&format!("PRAGMA user_version = {}", options.version))
            .execute(&mut *conn)
            .await?;
        info!(
            connection = %options.name,
            from = current,
            to = options.version,
            "Recorded schema version"
        );
    }

    Ok(())
}
