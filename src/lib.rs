pub mod config;
pub mod db;
pub mod domain;
pub mod driver;
pub mod engine;
pub mod error;

pub use config::Config;
pub use db::{ConnectionManager, Repository, SchemaConfig};
pub use domain::{
    ArchivedItem, Decimal, DomainError, ExpiryDate, GeneralItem, GeneralItemFields, Item,
    ItemFields, StoredExpiry,
};
pub use driver::{Connection, Driver, DriverError, MockDriver, SqliteDriver};
pub use engine::{LoadCycle, MigrationStats};
pub use error::StoreError;
