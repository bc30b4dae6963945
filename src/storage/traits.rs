//! Persistence capability.

use crate::Result;
use crate::models::{IngestionSummary, Record};
use async_trait::async_trait;

/// Trait for price-list persistence backends.
///
/// Backends are the authoritative source of truth for records. A batch is
/// committed atomically: after [`insert_records`](Self::insert_records)
/// returns an error, no record of that batch is visible.
///
/// # Implementor Notes
///
/// - Records whose id already exists are skipped, the stored row wins.
/// - Within one batch the first occurrence of an id wins.
/// - The returned summary covers the whole store including this batch, as
///   observed inside the transaction before commit.
/// - Dropping the future before it resolves must roll the batch back.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Inserts `records` in one transaction and returns whole-store statistics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`](crate::Error::OperationFailed) when the
    /// transaction cannot begin, a statement fails, or the commit fails. The
    /// batch is rolled back in every case.
    async fn insert_records(&self, records: &[Record]) -> Result<IngestionSummary>;

    /// Returns every stored record ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn fetch_all(&self) -> Result<Vec<Record>>;

    /// Checks connectivity.
    async fn ping(&self) -> bool;

    /// Releases backend resources. Returns `false` if the store was already closed.
    async fn close(&self) -> bool;

    /// Short backend name used in logs.
    fn backend_name(&self) -> &'static str;
}
