//! Lifecycle logic that runs on an open connection.

pub mod expiry;

pub use expiry::{partition, LoadCycle, MigrationStats, Partition};
