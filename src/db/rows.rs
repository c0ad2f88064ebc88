//! Conversions between driver rows and domain records.
//!
//! Decoding is lenient: stored rows come from older clients too, and one odd
//! value must not hide the rest of the table. Only a missing id fails.

use crate::domain::{
    ArchivedItem, Decimal, GeneralItem, GeneralItemFields, Item, ItemFields, StoredExpiry,
};
use crate::driver::{Row, Value};
use crate::error::StoreError;
use tracing::warn;

/// Column list shared by the active and archive tables.
pub(crate) const ITEM_COLUMNS: &str = "id, name, type, quantity, expiry_date, batch_no, price";

pub(crate) const GENERAL_COLUMNS: &str = "id, name, quantity, price";

pub(crate) fn item_from_row(row: &Row) -> Result<Item, StoreError> {
    let id = row.integer("id")?;
    let expiry_date = StoredExpiry::new(row.optional_text("expiry_date")?);
    if expiry_date.raw().is_some() && expiry_date.date().is_none() {
        warn!(id, expiry_date = ?expiry_date.raw(), "Stored expiry date is not YYYY-MM-DD");
    }

    Ok(Item {
        id,
        name: row.text("name")?,
        category: row.text("type")?,
        quantity: row.text("quantity")?,
        expiry_date,
        batch_no: row.text("batch_no")?,
        price: price_from_row(row, id),
    })
}

pub(crate) fn archived_from_row(row: &Row) -> Result<ArchivedItem, StoreError> {
    item_from_row(row).map(ArchivedItem::from)
}

pub(crate) fn general_from_row(row: &Row) -> Result<GeneralItem, StoreError> {
    let id = row.integer("id")?;
    Ok(GeneralItem {
        id,
        name: row.text("name")?,
        quantity: row.text("quantity")?,
        price: price_from_row(row, id),
    })
}

fn price_from_row(row: &Row, id: i64) -> Decimal {
    match row.real("price") {
        Ok(Some(value)) => Decimal::from_f64(value).unwrap_or_else(|| {
            warn!(id, price = value, "Failed to convert stored price, using default");
            Decimal::default()
        }),
        Ok(None) => {
            warn!(id, "Stored price is NULL, using default");
            Decimal::default()
        }
        Err(err) => {
            warn!(id, error = %err, "Stored price is not numeric, using default");
            Decimal::default()
        }
    }
}

/// Bind order: name, type, quantity, expiry_date, batch_no, price.
pub(crate) fn item_values(fields: &ItemFields) -> Vec<Value> {
    vec![
        Value::Text(fields.name.clone()),
        Value::Text(fields.category.clone()),
        Value::Text(fields.quantity.clone()),
        Value::Text(fields.expiry_date.to_canonical_string()),
        Value::Text(fields.batch_no.clone()),
        Value::Real(fields.price.to_f64()),
    ]
}

/// Bind order: name, quantity, price.
pub(crate) fn general_values(fields: &GeneralItemFields) -> Vec<Value> {
    vec![
        Value::Text(fields.name.clone()),
        Value::Text(fields.quantity.clone()),
        Value::Real(fields.price.to_f64()),
    ]
}
