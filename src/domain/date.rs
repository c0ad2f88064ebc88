//! Expiry dates in the fixed-width `YYYY-MM-DD` form.
//!
//! The purge statement compares `expiry_date` as TEXT, so every value written
//! by this crate uses the same width. `ExpiryDate` is the only way a date
//! enters the store, which keeps SQL string order and calendar order identical.
//!
//! Rows written by older clients may hold NULL or another shape. Those are
//! read back as [`StoredExpiry`], which keeps the stored text untouched and
//! applies the purge statement's own comparison.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::DomainError;

const FORMAT: &str = "%Y-%m-%d";

/// Calendar date an item stops being sellable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExpiryDate(NaiveDate);

impl ExpiryDate {
    pub fn new(date: NaiveDate) -> Self {
        ExpiryDate(date)
    }

    /// Today's date in UTC, computed once per load cycle.
    pub fn today() -> Self {
        ExpiryDate(Utc::now().date_naive())
    }

    /// Parse a strictly canonical `YYYY-MM-DD` string.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidDate` for anything else, including
    /// unpadded months/days such as `2024-6-1`.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        let s = s.trim();
        let bytes = s.as_bytes();
        let fixed_width = bytes.len() == 10
            && bytes[4] == b'-'
            && bytes[7] == b'-'
            && bytes
                .iter()
                .enumerate()
                .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
        if !fixed_width {
            return Err(DomainError::InvalidDate(s.to_string()));
        }
        NaiveDate::parse_from_str(s, FORMAT)
            .map(ExpiryDate)
            .map_err(|_| DomainError::InvalidDate(s.to_string()))
    }

    /// Parse a value read back from storage.
    ///
    /// Accepts an ISO-8601 date-time (`2024-06-01T00:00:00Z`) and keeps only
    /// the date part; otherwise identical to [`ExpiryDate::parse`].
    pub fn parse_stored(s: &str) -> Result<Self, DomainError> {
        let s = s.trim();
        match s.split_once('T') {
            Some((date, _)) => Self::parse(date),
            None => Self::parse(s),
        }
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// The canonical TEXT form stored in the database.
    pub fn to_canonical_string(&self) -> String {
        self.0.format(FORMAT).to_string()
    }

    /// True when an item with this expiry must leave the active table on `today`.
    pub fn is_expired_on(&self, today: ExpiryDate) -> bool {
        *self < today
    }
}

/// An `expiry_date` column value exactly as stored; `None` for NULL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredExpiry(Option<String>);

impl StoredExpiry {
    pub fn new(raw: Option<String>) -> Self {
        StoredExpiry(raw)
    }

    pub fn raw(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// The calendar date, if the stored text is canonical or an ISO date-time.
    pub fn date(&self) -> Option<ExpiryDate> {
        self.raw().and_then(|s| ExpiryDate::parse_stored(s).ok())
    }

    /// Same test as `expiry_date < ?` in SQLite: byte-wise TEXT comparison,
    /// and NULL is never expired.
    pub fn is_before(&self, today: ExpiryDate) -> bool {
        match self.raw() {
            Some(raw) => raw < today.to_canonical_string().as_str(),
            None => false,
        }
    }
}

impl From<ExpiryDate> for StoredExpiry {
    fn from(date: ExpiryDate) -> Self {
        StoredExpiry(Some(date.to_canonical_string()))
    }
}

impl PartialEq<ExpiryDate> for StoredExpiry {
    fn eq(&self, other: &ExpiryDate) -> bool {
        self.raw() == Some(other.to_canonical_string().as_str())
    }
}

impl fmt::Display for ExpiryDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl FromStr for ExpiryDate {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ExpiryDate {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ExpiryDate> for String {
    fn from(value: ExpiryDate) -> Self {
        value.to_canonical_string()
    }
}
