//! Ingestion and aggregation.
//!
//! [`IngestionService`] owns the write path (decode, then persist one batch
//! atomically) and the read path (fetch everything). A process-wide
//! reader/writer lock serializes batches against each other and against
//! reads, so a summary always describes exactly one committed state.

use crate::io;
use crate::models::{IngestionSummary, Record};
use crate::storage::PriceStore;
use crate::{Error, Result};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::instrument;

/// Default deadline for a store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default deadline for the connectivity check.
pub const DEFAULT_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// Service for ingesting and reading price lists.
///
/// # Example
///
/// ```rust,ignore
/// let service = IngestionService::builder()
///     .store(Arc::new(InMemoryPriceStore::new()))
///     .store_timeout(Duration::from_secs(5))
///     .build()?;
/// let summary = service.process(csv_bytes.as_slice()).await?;
/// ```
pub struct IngestionService {
    store: Arc<dyn PriceStore>,
    lock: RwLock<()>,
    store_timeout: Duration,
    ping_timeout: Duration,
}

impl fmt::Debug for IngestionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionService")
            .field("backend", &self.store.backend_name())
            .field("store_timeout", &self.store_timeout)
            .field("ping_timeout", &self.ping_timeout)
            .finish_non_exhaustive()
    }
}

impl IngestionService {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> IngestionServiceBuilder {
        IngestionServiceBuilder::default()
    }

    /// Name of the underlying backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Decodes a CSV stream and ingests it as one batch.
    ///
    /// Decoding runs before the lock is taken, so a bad upload never blocks
    /// other requests.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any row is bad (nothing is persisted),
    /// or a persistence error if the batch could not be committed.
    #[instrument(skip(self, reader), fields(operation = "process"))]
    pub async fn process<R: Read + Send>(&self, reader: R) -> Result<IngestionSummary> {
        let records = io::decode(reader)?;
        self.ingest(&records).await
    }

    /// Persists `records` in one transaction.
    ///
    /// Returns whole-store statistics as of the commit. An empty batch returns
    /// the zero summary without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OperationFailed`] if the store rejects the batch and
    /// [`Error::Timeout`] if it does not answer within the store timeout. In
    /// both cases no record of the batch is visible afterwards.
    #[instrument(skip(self, records), fields(batch = records.len(), backend = self.store.backend_name()))]
    pub async fn ingest(&self, records: &[Record]) -> Result<IngestionSummary> {
        if records.is_empty() {
            tracing::debug!("Empty batch, store not touched");
            return Ok(IngestionSummary::empty());
        }

        let _guard = self.lock.write().await;
        let summary = self
            .with_deadline("insert_records", self.store.insert_records(records))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Ingestion failed"))?;

        tracing::info!(
            total_items = summary.total_items,
            total_categories = summary.total_categories,
            total_price = %summary.total_price,
            "Batch ingested"
        );
        Ok(summary)
    }

    /// Returns every stored record ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read in time.
    #[instrument(skip(self), fields(backend = self.store.backend_name()))]
    pub async fn fetch_all(&self) -> Result<Vec<Record>> {
        let _guard = self.lock.read().await;
        let records = self
            .with_deadline("fetch_all", self.store.fetch_all())
            .await?;
        tracing::debug!(records = records.len(), "Fetched all records");
        Ok(records)
    }

    /// Returns true when the store answers within the ping timeout.
    pub async fn ping(&self) -> bool {
        let healthy = tokio::time::timeout(self.ping_timeout, self.store.ping())
            .await
            .unwrap_or(false);
        if !healthy {
            tracing::warn!(backend = self.store.backend_name(), "Store ping failed");
        }
        healthy
    }

    /// Closes the store. Returns `false` if it was already closed.
    pub async fn close(&self) -> bool {
        let _guard = self.lock.write().await;
        self.store.close().await
    }

    async fn with_deadline<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        tokio::time::timeout(self.store_timeout, call)
            .await
            .map_err(|_| Error::Timeout {
                operation: operation.to_string(),
                timeout: self.store_timeout,
            })?
    }
}

/// Builder for [`IngestionService`].
#[derive(Default)]
pub struct IngestionServiceBuilder {
    store: Option<Arc<dyn PriceStore>>,
    store_timeout: Option<Duration>,
    ping_timeout: Option<Duration>,
}

impl IngestionServiceBuilder {
    /// Sets the persistence backend. Required.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn PriceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the deadline for each store call.
    #[must_use]
    pub const fn store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = Some(timeout);
        self
    }

    /// Sets the deadline for the connectivity check.
    #[must_use]
    pub const fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = Some(timeout);
        self
    }

    /// Builds the service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no store was set or a timeout is zero.
    pub fn build(self) -> Result<IngestionService> {
        let store = self
            .store
            .ok_or_else(|| Error::Configuration("ingestion service requires a store".to_string()))?;
        let store_timeout = self.store_timeout.unwrap_or(DEFAULT_STORE_TIMEOUT);
        let ping_timeout = self.ping_timeout.unwrap_or(DEFAULT_PING_TIMEOUT);

        if store_timeout.is_zero() || ping_timeout.is_zero() {
            return Err(Error::Configuration(
                "store and ping timeouts must be non-zero".to_string(),
            ));
        }

        Ok(IngestionService {
            store,
            lock: RwLock::new(()),
            store_timeout,
            ping_timeout,
        })
    }
}
