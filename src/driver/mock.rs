//! Mock driver for testing connection handling without a database.
//!
//! Statements are recorded, matched against scripted failures and canned
//! rows by substring, and otherwise succeed with no effect.

use super::{Changes, Connection, ConnectionOptions, Driver, DriverError, Row, Value};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MockState {
    consistent: bool,
    existing: Vec<String>,
    create_error: Option<DriverError>,
    open_error: Option<DriverError>,
    close_error: Option<DriverError>,
    statement_errors: Vec<(String, DriverError)>,
    canned_rows: Vec<(String, Vec<Row>)>,
    statements: Vec<String>,
    created: Vec<ConnectionOptions>,
    retrieved: Vec<String>,
    opens: usize,
    closes: usize,
}

/// Mock driver that records activity and returns scripted results.
#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    /// Create a consistent mock driver with no registered connections.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                consistent: true,
                ..MockState::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a connection name as already existing.
    pub fn with_existing_connection(self, name: &str) -> Self {
        self.state().existing.push(name.to_string());
        self
    }

    /// Make `check_consistency` report false.
    pub fn inconsistent(self) -> Self {
        self.state().consistent = false;
        self
    }

    pub fn fail_create(self, error: DriverError) -> Self {
        self.state().create_error = Some(error);
        self
    }

    pub fn fail_open(self, error: DriverError) -> Self {
        self.state().open_error = Some(error);
        self
    }

    pub fn fail_close(self, error: DriverError) -> Self {
        self.state().close_error = Some(error);
        self
    }

    /// Fail every statement containing `pattern`.
    pub fn fail_on(self, pattern: &str, error: DriverError) -> Self {
        self.state()
            .statement_errors
            .push((pattern.to_string(), error));
        self
    }

    /// Return `rows` from queries containing `pattern`.
    pub fn with_rows(self, pattern: &str, rows: Vec<Row>) -> Self {
        self.state().canned_rows.push((pattern.to_string(), rows));
        self
    }

    /// All statements executed so far, in order.
    pub fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    pub fn created(&self) -> Vec<ConnectionOptions> {
        self.state().created.clone()
    }

    pub fn retrieved(&self) -> Vec<String> {
        self.state().retrieved.clone()
    }

    pub fn open_count(&self) -> usize {
        self.state().opens
    }

    pub fn close_count(&self) -> usize {
        self.state().closes
    }

    fn handle(&self, name: &str) -> Box<dyn Connection> {
        Box::new(MockConnection {
            name: name.to_string(),
            open: false,
            state: self.state.clone(),
        })
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for MockDriver {
    async fn check_consistency(&self) -> Result<bool, DriverError> {
        Ok(self.state().consistent)
    }

    async fn has_connection(&self, name: &str) -> Result<bool, DriverError> {
        Ok(self.state().existing.iter().any(|n| n == name))
    }

    async fn create_connection(
        &self,
        options: &ConnectionOptions,
    ) -> Result<Box<dyn Connection>, DriverError> {
        {
            let mut state = self.state();
            if let Some(err) = state.create_error.clone() {
                return Err(err);
            }
            state.created.push(options.clone());
            state.existing.push(options.name.clone());
        }
        Ok(self.handle(&options.name))
    }

    async fn retrieve_connection(
        &self,
        name: &str,
        _read_only: bool,
    ) -> Result<Box<dyn Connection>, DriverError> {
        {
            let mut state = self.state();
            if !state.existing.iter().any(|n| n == name) {
                return Err(DriverError::Connection(format!(
                    "no connection named '{}'",
                    name
                )));
            }
            state.retrieved.push(name.to_string());
        }
        Ok(self.handle(name))
    }

    async fn close_connection(&self, name: &str) -> Result<(), DriverError> {
        self.state().existing.retain(|n| n != name);
        Ok(())
    }
}

#[derive(Debug)]
struct MockConnection {
    name: String,
    open: bool,
    state: Arc<Mutex<MockState>>,
}

impl MockConnection {
    fn record(&self, sql: &str) -> Result<MutexGuard<'_, MockState>, DriverError> {
        if !self.open {
            return Err(DriverError::NotOpen(self.name.clone()));
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.statements.push(sql.to_string());
        if let Some((_, err)) = state
            .statement_errors
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
        {
            return Err(err.clone());
        }
        Ok(state)
    }
}

#[async_trait]
impl Connection for MockConnection {
    async fn open(&mut self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(err) = state.open_error.clone() {
            return Err(err);
        }
        state.opens += 1;
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.closes += 1;
        if let Some(err) = state.close_error.clone() {
            return Err(err);
        }
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.record(sql).map(|_| ())
    }

    async fn run(&mut self, sql: &str, _params: &[Value]) -> Result<Changes, DriverError> {
        self.record(sql).map(|_| Changes {
            rows_affected: 1,
            last_insert_id: 1,
        })
    }

    async fn query(&mut self, sql: &str, _params: &[Value]) -> Result<Vec<Row>, DriverError> {
        let state = self.record(sql)?;
        Ok(state
            .canned_rows
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}
