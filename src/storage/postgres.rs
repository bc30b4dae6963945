//! PostgreSQL price store.
//!
//! Records live in a single table (default `prices`):
//!
//! | Column | Type | Notes |
//! |--------|------|-------|
//! | `id` | `BIGINT` | primary key, client supplied |
//! | `name` | `TEXT` | |
//! | `category` | `TEXT` | indexed |
//! | `price` | `NUMERIC` | `CHECK (price >= 0)` |
//! | `create_date` | `DATE` | |
//!
//! Every batch runs in one transaction. Inserts are issued concurrently on the
//! transaction's connection, which tokio-postgres pipelines into a single
//! round trip.

use crate::models::{IngestionSummary, Record, RecordId};
use crate::storage::migrations::{Migration, MigrationRunner, latest_version};
use crate::storage::traits::PriceStore;
use crate::storage::validate_table_name;
use crate::{Error, Result};
use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio_postgres::{NoTls, Transaction};

/// Embedded migrations compiled into the binary.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial prices table",
        sql: r"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                price NUMERIC NOT NULL CHECK (price >= 0),
                create_date DATE NOT NULL
            )
        ",
    },
    Migration {
        version: 2,
        description: "Category index",
        sql: r"
            CREATE INDEX IF NOT EXISTS idx_{table}_category ON {table} (category)
        ",
    },
];

/// Wait, create and recycle timeout for pooled connections.
const POOL_TIMEOUT: Duration = Duration::from_secs(5);

fn pool_error(e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: "postgres_get_client".to_string(),
        cause: e.to_string(),
    }
}

fn query_error(operation: &str, e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

/// SQL statements for one table.
#[derive(Debug, Clone)]
struct Statements {
    insert: String,
    stats: String,
    select_all: String,
}

impl Statements {
    fn for_table(table: &str) -> Self {
        Self {
            insert: format!(
                "INSERT INTO {table} (id, name, category, price, create_date) \
                 VALUES ($1, $2, $3, $4, $5) ON CONFLICT (id) DO NOTHING"
            ),
            stats: format!(
                "SELECT COUNT(*), COUNT(DISTINCT category), COALESCE(SUM(price), 0) FROM {table}"
            ),
            select_all: format!(
                "SELECT id, name, category, price, create_date FROM {table} ORDER BY id"
            ),
        }
    }
}

/// PostgreSQL-backed [`PriceStore`].
pub struct PostgresPriceStore {
    pool: Pool,
    table_name: String,
    statements: Statements,
}

impl PostgresPriceStore {
    /// Connects to `dsn`, builds the pool and applies pending migrations.
    ///
    /// # Arguments
    ///
    /// * `dsn` - PostgreSQL connection URL or key/value string
    /// * `table_name` - Table holding the records
    /// * `pool_max_size` - Maximum pooled connections
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unparsable DSN or table name and
    /// [`Error::OperationFailed`] if the database cannot be reached or migrated.
    pub async fn connect(
        dsn: &SecretString,
        table_name: impl Into<String>,
        pool_max_size: usize,
    ) -> Result<Self> {
        let table_name = table_name.into();
        validate_table_name(&table_name)?;

        let pool = Self::build_pool(dsn, pool_max_size)?;
        let version = MigrationRunner::new(pool.clone(), &table_name)
            .run(MIGRATIONS)
            .await?;
        if version > latest_version(MIGRATIONS) {
            tracing::warn!(
                table = %table_name,
                schema_version = version,
                known_version = latest_version(MIGRATIONS),
                "Database schema is newer than this build"
            );
        }

        tracing::info!(
            table = %table_name,
            schema_version = version,
            pool_max_size,
            "PostgreSQL price store ready"
        );

        Ok(Self {
            pool,
            statements: Statements::for_table(&table_name),
            table_name,
        })
    }

    /// Builds the connection pool. Connections are opened lazily.
    fn build_pool(dsn: &SecretString, pool_max_size: usize) -> Result<Pool> {
        let pg_config = dsn
            .expose_secret()
            .parse::<tokio_postgres::Config>()
            // The parse error never echoes the DSN, so it is safe to surface.
            .map_err(|e| Error::Configuration(format!("invalid database DSN: {e}")))?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        Pool::builder(manager)
            .max_size(pool_max_size.max(1))
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(POOL_TIMEOUT))
            .create_timeout(Some(POOL_TIMEOUT))
            .recycle_timeout(Some(POOL_TIMEOUT))
            .build()
            .map_err(|e| query_error("postgres_create_pool", e))
    }

    /// Returns the table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Inserts the batch and reads whole-table statistics, both inside `tx`.
    async fn write_batch(
        &self,
        tx: &Transaction<'_>,
        records: &[Record],
    ) -> Result<(u64, IngestionSummary)> {
        let insert = tx
            .prepare(&self.statements.insert)
            .await
            .map_err(|e| query_error("postgres_prepare_insert", e))?;

        let pending = records.iter().map(|record| {
            let id = record.id.get();
            let insert = &insert;
            async move {
                tx.execute(
                    insert,
                    &[
                        &id,
                        &record.name,
                        &record.category,
                        &record.price,
                        &record.created_at,
                    ],
                )
                .await
            }
        });
        let inserted: u64 = try_join_all(pending)
            .await
            .map_err(|e| query_error("postgres_insert_record", e))?
            .into_iter()
            .sum();

        let row = tx
            .query_one(self.statements.stats.as_str(), &[])
            .await
            .map_err(|e| query_error("postgres_aggregate", e))?;
        let total_items: i64 = row
            .try_get(0)
            .map_err(|e| query_error("postgres_aggregate", e))?;
        let total_categories: i64 = row
            .try_get(1)
            .map_err(|e| query_error("postgres_aggregate", e))?;
        // A NUMERIC sum can exceed what Decimal holds.
        let total_price: Decimal = row
            .try_get(2)
            .map_err(|e| query_error("postgres_aggregate", e))?;

        let summary = IngestionSummary {
            total_items: u64::try_from(total_items).unwrap_or_default(),
            total_categories: u64::try_from(total_categories).unwrap_or_default(),
            total_price,
        };
        Ok((inserted, summary))
    }

    fn row_to_record(row: &tokio_postgres::Row) -> Result<Record> {
        let column_error = |e: tokio_postgres::Error| query_error("postgres_decode_row", e);
        let id: i64 = row.try_get("id").map_err(column_error)?;
        Ok(Record {
            id: RecordId::new(id),
            name: row.try_get("name").map_err(column_error)?,
            category: row.try_get("category").map_err(column_error)?,
            price: row.try_get("price").map_err(column_error)?,
            created_at: row.try_get("create_date").map_err(column_error)?,
        })
    }
}

#[async_trait]
impl PriceStore for PostgresPriceStore {
    async fn insert_records(&self, records: &[Record]) -> Result<IngestionSummary> {
        let mut client = self.pool.get().await.map_err(pool_error)?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| query_error("postgres_begin", e))?;

        match self.write_batch(&tx, records).await {
            Ok((inserted, summary)) => {
                tx.commit()
                    .await
                    .map_err(|e| query_error("postgres_commit", e))?;
                tracing::debug!(
                    table = %self.table_name,
                    batch = records.len(),
                    inserted,
                    total_items = summary.total_items,
                    "Committed batch"
                );
                Ok(summary)
            },
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "Explicit rollback failed");
                }
                tracing::error!(table = %self.table_name, error = %e, "Batch rolled back");
                Err(e)
            },
        }
    }

    async fn fetch_all(&self) -> Result<Vec<Record>> {
        let client = self.pool.get().await.map_err(pool_error)?;
        let rows = client
            .query(self.statements.select_all.as_str(), &[])
            .await
            .map_err(|e| query_error("postgres_fetch_all", e))?;
        rows.iter().map(Self::row_to_record).collect()
    }

    async fn ping(&self) -> bool {
        let Ok(client) = self.pool.get().await else {
            return false;
        };
        client.simple_query("SELECT 1").await.is_ok()
    }

    async fn close(&self) -> bool {
        if self.pool.is_closed() {
            return false;
        }
        self.pool.close();
        tracing::info!(table = %self.table_name, "PostgreSQL pool closed");
        true
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
