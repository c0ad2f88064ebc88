//! Active and archived inventory records.

use super::{Decimal, DomainError, ExpiryDate, StoredExpiry};
use serde::{Deserialize, Serialize};

/// A row of the active (`medicines`) table.
///
/// Text columns read NULL as an empty string. `expiry_date` keeps the stored
/// text, so rows written by older clients are listed and migrated exactly
/// as the purge statement sees them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Assigned by the store on insert.
    pub id: i64,
    /// Unique within the active table.
    pub name: String,
    pub category: String,
    /// Free-form quantity ("10 strips", "2 bottles").
    pub quantity: String,
    pub expiry_date: StoredExpiry,
    pub batch_no: String,
    pub price: Decimal,
}

impl Item {
    pub fn is_expired_on(&self, today: ExpiryDate) -> bool {
        self.expiry_date.is_before(today)
    }
}

/// Everything about an item except its id; used for insert and full-row update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFields {
    pub name: String,
    pub category: String,
    pub quantity: String,
    pub expiry_date: ExpiryDate,
    pub batch_no: String,
    pub price: Decimal,
}

impl ItemFields {
    /// Build fields from raw form input, validating the date and price.
    ///
    /// # Errors
    /// Returns a `DomainError` if the name is blank, the date is not
    /// `YYYY-MM-DD`, or the price is not a non-negative decimal that a REAL
    /// column stores exactly.
    pub fn parse(
        name: &str,
        category: &str,
        quantity: &str,
        expiry_date: &str,
        batch_no: &str,
        price: &str,
    ) -> Result<Self, DomainError> {
        let price = Decimal::from_str_canonical(price)
            .map_err(|_| DomainError::InvalidPrice(price.to_string()))?;
        let fields = ItemFields {
            name: name.trim().to_string(),
            category: category.trim().to_string(),
            quantity: quantity.trim().to_string(),
            expiry_date: ExpiryDate::parse(expiry_date)?,
            batch_no: batch_no.trim().to_string(),
            price,
        };
        fields.validate()?;
        Ok(fields)
    }

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

/// A row of the archive (`expired_items`) table.
///
/// Carries the id of the active row it was copied from. Names are not unique
/// here: several expired batches of the same medicine may coexist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedItem {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub quantity: String,
    pub expiry_date: StoredExpiry,
    pub batch_no: String,
    pub price: Decimal,
}

impl From<Item> for ArchivedItem {
    fn from(item: Item) -> Self {
        ArchivedItem {
            id: item.id,
            name: item.name,
            category: item.category,
            quantity: item.quantity,
            expiry_date: item.expiry_date,
            batch_no: item.batch_no,
            price: item.price,
        }
    }
}

impl PartialEq<Item> for ArchivedItem {
    fn eq(&self, other: &Item) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.category == other.category
            && self.quantity == other.quantity
            && self.expiry_date == other.expiry_date
            && self.batch_no == other.batch_no
            && self.price == other.price
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fields() {
        let fields =
            ItemFields::parse(" Paracetamol ", "tablet", "10", "2099-01-01", "B1", "4.50").unwrap();
        assert_eq!(fields.name, "Paracetamol");
        assert_eq!(fields.expiry_date.to_canonical_string(), "2099-01-01");
        assert_eq!(fields.price.to_canonical_string(), "4.5");
    }

    #[test]
    fn test_parse_fields_rejects_bad_input() {
        assert!(matches!(
            ItemFields::parse("  ", "t", "1", "2099-01-01", "B", "1"),
            Err(DomainError::EmptyName)
        ));
        assert!(matches!(
            ItemFields::parse("A", "t", "1", "01/01/2099", "B", "1"),
            Err(DomainError::InvalidDate(_))
        ));
        assert!(matches!(
            ItemFields::parse("A", "t", "1", "2099-01-01", "B", "cheap"),
            Err(DomainError::InvalidPrice(_))
        ));
        assert!(matches!(
            ItemFields::parse("A", "t", "1", "2099-01-01", "B", "-2"),
            Err(DomainError::InvalidPrice(_))
        ));
        assert!(matches!(
            ItemFields::parse("A", "t", "1", "2099-01-01", "B", "1234567890.123456789"),
            Err(DomainError::InvalidPrice(_))
        ));
    }

    #[test]
    fn test_archived_item_preserves_fields() {
        let item = Item {
            id: 7,
            name: "Ibuprofen".to_string(),
            category: "tablet".to_string(),
            quantity: "20".to_string(),
            expiry_date: StoredExpiry::new(Some("2023-01-01T10:00:00".to_string())),
            batch_no: "X9".to_string(),
            price: Decimal::from_str_canonical("3.2").unwrap(),
        };
        let archived = ArchivedItem::from(item.clone());
        assert_eq!(archived, item);
        assert_eq!(archived.id, 7);
    }
}
