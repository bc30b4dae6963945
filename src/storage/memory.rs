//! In-memory price store for tests and development.
//!
//! Provides a fast, non-persistent implementation of [`PriceStore`]. A batch
//! is staged on a copy of the table and swapped in only when every record
//! went through, which gives the same all-or-nothing behavior as a database
//! transaction.

use crate::models::{IngestionSummary, Record, RecordId};
use crate::storage::traits::PriceStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// In-memory price store.
///
/// Uses `RwLock` for thread-safe access with reader-writer semantics.
/// Data is not persisted between runs.
///
/// # Example
///
/// ```rust,ignore
/// use priceanalyzer::storage::{InMemoryPriceStore, PriceStore};
///
/// let store = InMemoryPriceStore::new();
/// let summary = store.insert_records(&records).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryPriceStore {
    records: RwLock<BTreeMap<RecordId, Record>>,
    closed: AtomicBool,
    fail_at: Option<usize>,
    latency: Option<Duration>,
}

fn lock_error(operation: &str) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: "lock poisoned".to_string(),
    }
}

impl InMemoryPriceStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every batch fail when it reaches the record at `index`.
    ///
    /// Records before `index` are staged first, so the failure lands mid-batch.
    #[must_use]
    pub const fn failing_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    /// Delays every call by `latency` before it touches the table.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::OperationFailed {
                operation: operation.to_string(),
                cause: "store is closed".to_string(),
            });
        }
        Ok(())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl PriceStore for InMemoryPriceStore {
    async fn insert_records(&self, records: &[Record]) -> Result<IngestionSummary> {
        self.simulate_latency().await;
        self.ensure_open("memory_insert_records")?;

        let mut table = self
            .records
            .write()
            .map_err(|_| lock_error("memory_insert_records"))?;

        let mut staged = table.clone();
        let mut inserted = 0_usize;
        for (index, record) in records.iter().enumerate() {
            if self.fail_at == Some(index) {
                tracing::warn!(index, id = %record.id, "Injected failure, rolling back batch");
                return Err(Error::OperationFailed {
                    operation: "memory_insert_record".to_string(),
                    cause: format!("injected failure at record {index}"),
                });
            }
            if let Entry::Vacant(slot) = staged.entry(record.id) {
                slot.insert(record.clone());
                inserted += 1;
            }
        }

        let summary = IngestionSummary::from_records(staged.values())?;
        *table = staged;

        tracing::debug!(
            batch = records.len(),
            inserted,
            total_items = summary.total_items,
            "Committed batch"
        );
        Ok(summary)
    }

    async fn fetch_all(&self) -> Result<Vec<Record>> {
        self.simulate_latency().await;
        self.ensure_open("memory_fetch_all")?;

        let table = self
            .records
            .read()
            .map_err(|_| lock_error("memory_fetch_all"))?;
        Ok(table.values().cloned().collect())
    }

    async fn ping(&self) -> bool {
        self.simulate_latency().await;
        !self.closed.load(Ordering::Acquire)
    }

    async fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
