//! Domain types for the local inventory.
//!
//! This module provides:
//! - Exact in-memory prices via the Decimal wrapper
//! - Fixed-width expiry dates whose string order equals calendar order
//! - Active, archived and general item records

pub mod date;
pub mod decimal;
pub mod general;
pub mod item;

pub use date::{ExpiryDate, StoredExpiry};
pub use decimal::Decimal;
pub use general::{GeneralItem, GeneralItemFields};
pub use item::{ArchivedItem, Item, ItemFields};

use thiserror::Error;

/// Validation failures at the data-model boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("invalid expiry date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid price '{0}'")]
    InvalidPrice(String),
    #[error("name must not be empty")]
    EmptyName,
}
