use crate::domain::DomainError;
use crate::driver::DriverError;
use thiserror::Error;

/// Message shown when an active item name is taken.
pub const DUPLICATE_NAME_MESSAGE: &str =
    "An item with this name already exists. Please use a different name.";

/// Errors surfaced to callers of the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The active table already has a row with this name.
    #[error("{} ({constraint})", DUPLICATE_NAME_MESSAGE)]
    DuplicateName { constraint: String },
    /// Creating, retrieving or opening the connection failed.
    #[error("Connection error: {0}")]
    Connection(String),
    /// A statement failed; carries the driver's message unchanged.
    #[error("{0}")]
    Operation(String),
    #[error("store is not initialized")]
    NotReady,
    #[error("table '{0}' is not enabled in this configuration")]
    TableDisabled(&'static str),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error(transparent)]
    Invalid(#[from] DomainError),
}

impl StoreError {
    /// Classify a driver failure raised inside the guarded execution path.
    pub fn from_driver(err: DriverError) -> Self {
        match err {
            err if err.is_unique_violation() => match unique_target(err.message()) {
                Some(target) if target.ends_with(".name") => StoreError::DuplicateName {
                    constraint: target.to_string(),
                },
                _ => StoreError::Operation(err.to_string()),
            },
            DriverError::Connection(msg) | DriverError::NotOpen(msg) => {
                StoreError::Connection(msg)
            }
            DriverError::Decode(msg) => StoreError::InvalidRecord(msg),
            other => StoreError::Operation(other.to_string()),
        }
    }

    /// Text to show the user.
    pub fn user_message(&self) -> String {
        match self {
            StoreError::DuplicateName { .. } => DUPLICATE_NAME_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }

    pub fn is_duplicate_name(&self) -> bool {
        matches!(self, StoreError::DuplicateName { .. })
    }
}

impl From<DriverError> for StoreError {
    fn from(err: DriverError) -> Self {
        StoreError::from_driver(err)
    }
}

/// `table.column` named by a SQLite uniqueness message.
fn unique_target(message: &str) -> Option<&str> {
    message
        .split("UNIQUE constraint failed:")
        .nth(1)
        .map(|rest| rest.trim())
        .and_then(|rest| rest.split([',', ' ']).next())
        .filter(|target| !target.is_empty())
}
