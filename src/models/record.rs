//! Price-list records and identifiers.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of columns every CSV row must carry.
pub const FIELD_COUNT: usize = 5;

/// Client-supplied record identifier.
///
/// Identifiers are unique in the store; re-ingesting an existing id leaves the
/// stored row untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Creates a new record ID.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw integer value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A priced item from an uploaded price list.
///
/// The CSV header is `id,name,category,price,create_date`; the JSON form uses
/// `created_at` for the date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Unique identifier.
    pub id: RecordId,
    /// Item name.
    pub name: String,
    /// Category the item belongs to.
    pub category: String,
    /// Non-negative price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Date the price was recorded.
    pub created_at: NaiveDate,
}

impl Record {
    /// Creates a new record.
    #[must_use]
    pub fn new(
        id: impl Into<RecordId>,
        name: impl Into<String>,
        category: impl Into<String>,
        price: Decimal,
        created_at: NaiveDate,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            price,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_record_json_shape() {
        let record = Record::new(
            1,
            "Widget",
            "Tools",
            Decimal::from_str("9.99").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["name"], "Widget");
        assert_eq!(json["category"], "Tools");
        assert_eq!(json["price"], 9.99);
        assert_eq!(json["created_at"], "2024-01-15");
    }

    #[test]
    fn test_record_id_ordering() {
        assert!(RecordId::new(1) < RecordId::new(2));
        assert_eq!(RecordId::from(7).get(), 7);
        assert_eq!(RecordId::new(42).to_string(), "42");
    }
}
