//! Database module for the inventory store.
//!
//! This module provides:
//! - Connection lifecycle and the guarded execution path
//! - Idempotent table creation
//! - Repository layer for record access

pub mod manager;
pub mod repo;
pub(crate) mod rows;
pub mod schema;
pub(crate) mod transaction;

pub use manager::{Action, Cleanup, ConnectionManager};
pub use repo::Repository;
pub use schema::{initialize_schema, SchemaConfig};
