//! Connection lifecycle and the guarded execution path.
//!
//! The manager owns exactly one connection handle. Every operation takes
//! `&mut self`, so two guarded calls can never hold the connection open at
//! the same time through one manager.

use super::schema::{self, SchemaConfig};
use crate::driver::{Connection, ConnectionOptions, Driver, DriverError};
use crate::error::StoreError;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Future returned by an action run on the open connection.
pub type Action<'c, T> = BoxFuture<'c, Result<T, StoreError>>;

/// Caller-supplied teardown that runs after the connection is closed.
pub type Cleanup<'a> = BoxFuture<'a, anyhow::Result<()>>;

/// Owns the named connection and brackets every use of it with open/close.
pub struct ConnectionManager {
    driver: Arc<dyn Driver>,
    name: String,
    schema: SchemaConfig,
    connection: Option<Box<dyn Connection>>,
    ready: bool,
}

impl ConnectionManager {
    pub fn new(driver: Arc<dyn Driver>, name: impl Into<String>, schema: SchemaConfig) -> Self {
        ConnectionManager {
            driver,
            name: name.into(),
            schema,
            connection: None,
            ready: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> SchemaConfig {
        self.schema
    }

    /// True once a connection is held and the schema exists.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Acquire the connection and create the schema.
    ///
    /// Repeated calls never create a second connection. If a previous call got
    /// a connection but failed to create the schema, the held connection is
    /// reused and only the schema step runs again.
    ///
    /// # Errors
    /// Returns `StoreError::Connection` if the connection cannot be created or
    /// retrieved, or the schema error; `is_ready` stays false in both cases.
    pub async fn initialize(&mut self) -> Result<(), StoreError> {
        if self.ready {
            debug!(connection = %self.name, "Already initialized");
            return Ok(());
        }

        if self.connection.is_none() {
            let connection = self.acquire().await?;
            self.connection = Some(connection);
        } else {
            info!(connection = %self.name, "Reusing held connection to retry schema creation");
        }

        schema::initialize_schema(self).await?;
        self.ready = true;
        info!(connection = %self.name, "Connection manager ready");
        Ok(())
    }

    async fn acquire(&self) -> Result<Box<dyn Connection>, StoreError> {
        let consistent = self
            .driver
            .check_consistency()
            .await
            .map_err(connection_error)?;
        let exists = self
            .driver
            .has_connection(&self.name)
            .await
            .map_err(connection_error)?;

        if consistent && exists {
            debug!(connection = %self.name, "Retrieving existing connection");
            self.driver
                .retrieve_connection(&self.name, false)
                .await
                .map_err(connection_error)
        } else {
            debug!(connection = %self.name, consistent, exists, "Creating connection");
            self.driver
                .create_connection(&ConnectionOptions::plain(self.name.as_str()))
                .await
                .map_err(connection_error)
        }
    }

    /// Run `action` with the connection open, then close it.
    ///
    /// # Errors
    /// Returns the action's error, or `StoreError::Connection` if the
    /// connection could not be opened. Close failures are only logged.
    pub async fn with_connection<T, F>(&mut self, action: F) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(&'c mut dyn Connection) -> Action<'c, T>,
    {
        self.with_connection_and_cleanup(action, None).await
    }

    /// Like [`with_connection`](Self::with_connection), running `cleanup`
    /// after the connection is closed whether or not the action succeeded.
    ///
    /// A failing cleanup is logged and never replaces the action's result.
    pub async fn with_connection_and_cleanup<T, F>(
        &mut self,
        action: F,
        cleanup: Option<Cleanup<'_>>,
    ) -> Result<T, StoreError>
    where
        F: for<'c> FnOnce(&'c mut dyn Connection) -> Action<'c, T>,
    {
        let name = self.name.as_str();
        let result = match self.connection.as_mut() {
            None => Err(StoreError::NotReady),
            Some(conn) => {
                let result = match conn.open().await {
                    Ok(()) => action(&mut **conn).await,
                    Err(err) => Err(connection_error(err)),
                };
                if conn.is_open() {
                    if let Err(err) = conn.close().await {
                        warn!(connection = %name, error = %err, "Failed to close connection");
                    }
                }
                result
            }
        };

        if let Some(cleanup) = cleanup {
            if let Err(err) = cleanup.await {
                warn!(connection = %name, error = %err, "Cleanup after database action failed");
            }
        }

        if let Err(err) = &result {
            warn!(connection = %name, error = %err, "Database action failed");
        }
        result
    }

    /// Close the connection if open, release it and forget it in the driver.
    ///
    /// # Errors
    /// Returns `StoreError::Connection` if the driver cannot deregister it.
    pub async fn close_and_dispose(&mut self) -> Result<(), StoreError> {
        self.ready = false;
        if let Some(mut conn) = self.connection.take() {
            if conn.is_open() {
                if let Err(err) = conn.close().await {
                    warn!(connection = %self.name, error = %err, "Failed to close connection");
                }
            }
            self.driver
                .close_connection(&self.name)
                .await
                .map_err(connection_error)?;
            info!(connection = %self.name, "Connection disposed");
        }
        Ok(())
    }
}

fn connection_error(err: DriverError) -> StoreError {
    StoreError::Connection(err.message().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, Value};

    fn manager(driver: &MockDriver) -> ConnectionManager {
        ConnectionManager::new(Arc::new(driver.clone()), "inventory", SchemaConfig::default())
    }

    #[tokio::test]
    async fn test_initialize_creates_connection_once() {
        let driver = MockDriver::new();
        let mut manager = manager(&driver);

        manager.initialize().await.unwrap();
        manager.initialize().await.unwrap();

        assert!(manager.is_ready());
        let created = driver.created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0], ConnectionOptions::plain("inventory"));
        assert!(driver.retrieved().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_retrieves_existing_connection() {
        let driver = MockDriver::new().with_existing_connection("inventory");
        let mut manager = manager(&driver);

        manager.initialize().await.unwrap();

        assert!(driver.created().is_empty());
        assert_eq!(driver.retrieved(), vec!["inventory"]);
    }

    #[tokio::test]
    async fn test_initialize_creates_when_inconsistent() {
        let driver = MockDriver::new()
            .with_existing_connection("inventory")
            .inconsistent();
        let mut manager = manager(&driver);

        manager.initialize().await.unwrap();

        assert_eq!(driver.created().len(), 1);
        assert!(driver.retrieved().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_is_connection_error() {
        let driver = MockDriver::new().fail_create(DriverError::Connection("disk".to_string()));
        let mut manager = manager(&driver);

        let err = manager.initialize().await.unwrap_err();
        assert_eq!(err, StoreError::Connection("disk".to_string()));
        assert!(!manager.is_ready());
    }

    #[tokio::test]
    async fn test_schema_failure_keeps_manager_not_ready_then_retries() {
        let driver = MockDriver::new().fail_on(
            "CREATE TABLE IF NOT EXISTS expired_items",
            DriverError::Database("disk I/O error".to_string()),
        );
        let mut manager = manager(&driver);

        let err = manager.initialize().await.unwrap_err();
        assert_eq!(err, StoreError::Operation("disk I/O error".to_string()));
        assert!(!manager.is_ready());
        assert_eq!(driver.close_count(), 1);

        // Second attempt reuses the held connection.
        let _ = manager.initialize().await;
        assert_eq!(driver.created().len(), 1);
    }

    #[tokio::test]
    async fn test_with_connection_before_initialize() {
        let driver = MockDriver::new();
        let mut manager = manager(&driver);
        let result = manager
            .with_connection(|conn| Box::pin(async move { Ok::<_, StoreError>(conn.is_open()) }))
            .await;
        assert_eq!(result, Err(StoreError::NotReady));
    }

    #[tokio::test]
    async fn test_with_connection_brackets_open_close() {
        let driver = MockDriver::new();
        let mut manager = manager(&driver);
        manager.initialize().await.unwrap();
        let opens = driver.open_count();

        let was_open = manager
            .with_connection(|conn| Box::pin(async move { Ok::<_, StoreError>(conn.is_open()) }))
            .await
            .unwrap();

        assert!(was_open);
        assert_eq!(driver.open_count(), opens + 1);
        assert_eq!(driver.close_count(), driver.open_count());
    }

    #[tokio::test]
    async fn test_unique_violation_becomes_duplicate_name() {
        let driver = MockDriver::new().fail_on(
            "INSERT INTO medicines",
            DriverError::UniqueViolation("UNIQUE constraint failed: medicines.name".to_string()),
        );
        let mut manager = manager(&driver);
        manager.initialize().await.unwrap();

        let err = manager
            .with_connection(|conn| {
                Box::pin(async move {
                    conn.run("INSERT INTO medicines (name) VALUES (?)", &[Value::from("A")])
                        .await?;
                    Ok::<(), StoreError>(())
                })
            })
            .await
            .unwrap_err();

        assert!(err.is_duplicate_name());
    }

    #[tokio::test]
    async fn test_close_failure_does_not_mask_error() {
        let driver = MockDriver::new()
            .fail_on("SELECT", DriverError::Database("no such column: x".to_string()))
            .fail_close(DriverError::Connection("close failed".to_string()));
        let mut manager = manager(&driver);
        manager.initialize().await.unwrap();

        let err = manager
            .with_connection(|conn| {
                Box::pin(async move {
                    conn.query("SELECT x FROM medicines", &[]).await?;
                    Ok::<(), StoreError>(())
                })
            })
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::Operation("no such column: x".to_string()));
    }

    #[tokio::test]
    async fn test_close_failure_does_not_fail_success() {
        let driver = MockDriver::new().fail_close(DriverError::Connection("busy".to_string()));
        let mut manager = manager(&driver);
        manager.initialize().await.unwrap();

        let value = manager
            .with_connection(|_conn| Box::pin(async move { Ok::<_, StoreError>(42) }))
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_cleanup_runs_and_failure_is_swallowed() {
        let driver = MockDriver::new();
        let mut manager = manager(&driver);
        manager.initialize().await.unwrap();

        let mut ran = false;
        let result = manager
            .with_connection_and_cleanup(
                |_conn| Box::pin(async move { Ok::<_, StoreError>("done") }),
                Some(Box::pin(async {
                    ran = true;
                    Err::<(), _>(anyhow::anyhow!("cleanup exploded"))
                })),
            )
            .await;

        assert_eq!(result, Ok("done"));
        assert!(ran);
    }

    #[tokio::test]
    async fn test_cleanup_runs_after_failed_action() {
        let driver = MockDriver::new();
        let mut manager = manager(&driver);
        manager.initialize().await.unwrap();

        let mut ran = false;
        let result: Result<(), StoreError> = manager
            .with_connection_and_cleanup(
                |_conn| Box::pin(async move { Err::<(), _>(StoreError::Operation("boom".to_string())) }),
                Some(Box::pin(async {
                    ran = true;
                    Ok::<(), anyhow::Error>(())
                })),
            )
            .await;

        assert_eq!(result, Err(StoreError::Operation("boom".to_string())));
        assert!(ran);
    }

    #[tokio::test]
    async fn test_open_failure_is_connection_error() {
        let failing = MockDriver::new().fail_open(DriverError::Connection("locked".to_string()));
        let mut other = ConnectionManager::new(Arc::new(failing), "x", SchemaConfig::default());
        let err = other.initialize().await.unwrap_err();
        assert_eq!(err, StoreError::Connection("locked".to_string()));
        assert!(!other.is_ready());
    }

    #[tokio::test]
    async fn test_close_and_dispose() {
        let driver = MockDriver::new();
        let mut manager = manager(&driver);
        manager.initialize().await.unwrap();

        manager.close_and_dispose().await.unwrap();
        assert!(!manager.is_ready());
        assert!(!driver.has_connection("inventory").await.unwrap());
        assert_eq!(
            manager
                .with_connection(|_conn| Box::pin(async move { Ok::<(), StoreError>(()) }))
                .await,
            Err(StoreError::NotReady)
        );
    }
}
