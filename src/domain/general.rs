//! Non-perishable stock kept in `general_items`. No expiry, no migration.

use super::{Decimal, DomainError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralItem {
    pub id: i64,
    pub name: String,
    pub quantity: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralItemFields {
    pub name: String,
    pub quantity: String,
    pub price: Decimal,
}

impl GeneralItemFields {
    /// # Errors
    /// Returns a `DomainError` for a blank name, or a price that is negative or
    /// would change when stored as REAL.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::EmptyName);
        }
        if self.price.is_negative() || !self.price.fits_real() {
            return Err(DomainError::InvalidPrice(self.price.to_string()));
        }
        Ok(())
    }
}
