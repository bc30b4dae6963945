//! Aggregate statistics over stored records.

use super::Record;
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Aggregate statistics returned after an ingestion.
///
/// Never persisted. Backends compute it inside the ingesting transaction so it
/// describes the store as of that commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IngestionSummary {
    /// Number of records.
    pub total_items: u64,
    /// Number of distinct categories.
    pub total_categories: u64,
    /// Sum of all prices.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_price: Decimal,
}

impl IngestionSummary {
    /// Returns the zero summary.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            total_items: 0,
            total_categories: 0,
            total_price: Decimal::ZERO,
        }
    }

    /// Computes the summary of a set of records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the price total does not fit a
    /// [`Decimal`].
    pub fn from_records<'a, I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut categories = HashSet::new();
        let mut summary = Self::empty();
        for record in records {
            summary.total_items += 1;
            summary.total_price = summary
                .total_price
                .checked_add(record.price)
                .ok_or_else(|| Error::OperationFailed {
                    operation: "sum_prices".to_string(),
                    cause: format!(
                        "price total overflows after {} records",
                        summary.total_items
                    ),
                })?;
            categories.insert(record.category.as_str());
        }
        summary.total_categories = categories.len() as u64;
        Ok(summary)
    }

    /// Returns true if no records are counted.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total_items == 0
    }
}
