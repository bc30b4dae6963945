//! # priceanalyzer
//!
//! Archive-transparent ingestion of price lists.
//!
//! Clients upload a CSV price list, either bare or wrapped in a ZIP or TAR
//! container. The service unwraps it, decodes every row into a typed
//! [`Record`], persists the whole batch in one transaction and answers with
//! an [`IngestionSummary`]. The read path serves the stored records back as
//! JSON, optionally re-wrapped in an archive.
//!
//! ## Pipeline
//!
//! ```text
//! bytes ─► transport (unwrap) ─► io::csv ─► services::ingest ─► storage
//!                                                     │
//! bytes ◄─ transport (wrap)  ◄──── JSON ◄────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use priceanalyzer::services::IngestionService;
//! use priceanalyzer::storage::InMemoryPriceStore;
//! use std::sync::Arc;
//!
//! let service = IngestionService::builder()
//!     .store(Arc::new(InMemoryPriceStore::new()))
//!     .build()?;
//! let summary = service
//!     .process("id,name,category,price,create_date\n1,Widget,Tools,9.99,2024-01-15\n".as_bytes())
//!     .await?;
//! assert_eq!(summary.total_items, 1);
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod archive;
pub mod config;
pub mod io;
pub mod models;
pub mod observability;
pub mod server;
pub mod services;
pub mod storage;
pub mod transport;

pub use archive::{ArchiveKind, ArchiveReader, ArchiveWriter};
pub use config::ServerConfig;
pub use models::{IngestionSummary, Record};
pub use services::IngestionService;
pub use storage::PriceStore;

/// Error type for priceanalyzer operations.
///
/// # Error Variant Triggers
///
/// | Variant | Category | Raised When |
/// |---------|----------|-------------|
/// | `UnsupportedFormat` | transport | Archive kind other than `zip`/`tar` |
/// | `MemberNotFound` | transport | Container holds no `.csv` member |
/// | `CorruptArchive` | transport | Container or member cannot be read |
/// | `MemberTooLarge` | transport | CSV member inflates past the member limit |
/// | `BadRequestFormat` | transport | Upload is not a multipart envelope |
/// | `MalformedRow` | validation | Row does not have exactly five fields |
/// | `InvalidField` | validation | Field fails to parse |
/// | `InvalidCsv` | validation | CSV text itself is unreadable |
/// | `OperationFailed` | persistence | Database begin/exec/commit fails |
/// | `Timeout` | persistence | Store call exceeds its deadline |
/// | `Configuration` | configuration | Invalid settings at start-up |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Archive kind is not one of the supported containers.
    #[error("unsupported archive format: {0}")]
    UnsupportedFormat(String),

    /// The container has no member whose name ends in `.csv`.
    #[error("no .csv member found in {kind} archive")]
    MemberNotFound {
        /// Container kind that was searched.
        kind: ArchiveKind,
    },

    /// The container could not be parsed or a member could not be read.
    #[error("corrupt {kind} archive: {cause}")]
    CorruptArchive {
        /// Container kind being read.
        kind: ArchiveKind,
        /// The underlying cause.
        cause: String,
    },

    /// The CSV member decompresses to more than the allowed size.
    #[error("csv member in {kind} archive exceeds {limit} bytes")]
    MemberTooLarge {
        /// Container kind being read.
        kind: ArchiveKind,
        /// The limit that was exceeded.
        limit: u64,
    },

    /// The request envelope is not what the upload endpoint expects.
    #[error("bad request format: {0}")]
    BadRequestFormat(String),

    /// A data row has the wrong number of fields.
    #[error("malformed row {row}: expected 5 fields, found {observed}")]
    MalformedRow {
        /// 1-based line number of the row within the CSV text.
        row: u64,
        /// Number of fields actually present.
        observed: usize,
    },

    /// A field could not be parsed into its typed value.
    #[error("row {row}: invalid {field} {value:?}: {cause}")]
    InvalidField {
        /// 1-based line number of the row within the CSV text.
        row: u64,
        /// Column name of the offending field.
        field: &'static str,
        /// Raw field text.
        value: String,
        /// Why parsing failed.
        cause: String,
    },

    /// The CSV text could not be read at all.
    #[error("unreadable csv near row {row}: {cause}")]
    InvalidCsv {
        /// 1-based line number where reading stopped.
        row: u64,
        /// The underlying cause.
        cause: String,
    },

    /// A persistence operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A persistence operation exceeded its deadline.
    #[error("operation '{operation}' timed out after {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The deadline that was exceeded.
        timeout: std::time::Duration,
    },

    /// Invalid configuration; only raised while the service is being built.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Broad class of an [`Error`], used for status mapping and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Archive or envelope problems; the client sent something unusable.
    Transport,
    /// The CSV content failed validation.
    Validation,
    /// The store failed; the batch was rolled back.
    Persistence,
    /// The service was misconfigured.
    Configuration,
}

impl ErrorCategory {
    /// Returns the category as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Validation => "validation",
            Self::Persistence => "persistence",
            Self::Configuration => "configuration",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Returns the category this error belongs to.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnsupportedFormat(_)
            | Self::MemberNotFound { .. }
            | Self::CorruptArchive { .. }
            | Self::MemberTooLarge { .. }
            | Self::BadRequestFormat(_) => ErrorCategory::Transport,
            Self::MalformedRow { .. } | Self::InvalidField { .. } | Self::InvalidCsv { .. } => {
                ErrorCategory::Validation
            },
            Self::OperationFailed { .. } | Self::Timeout { .. } => ErrorCategory::Persistence,
            Self::Configuration(_) => ErrorCategory::Configuration,
        }
    }

    /// Returns true when the caller sent bad input (as opposed to a server fault).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transport | ErrorCategory::Validation
        )
    }
}

/// Result type alias for priceanalyzer operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MalformedRow {
            row: 3,
            observed: 4,
        };
        assert_eq!(err.to_string(), "malformed row 3: expected 5 fields, found 4");

        let err = Error::MemberNotFound {
            kind: ArchiveKind::Tar,
        };
        assert_eq!(err.to_string(), "no .csv member found in tar archive");

        let err = Error::OperationFailed {
            operation: "commit".to_string(),
            cause: "connection reset".to_string(),
        };
        assert_eq!(err.to_string(), "operation 'commit' failed: connection reset");
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            Error::UnsupportedFormat("rar".into()).category(),
            ErrorCategory::Transport
        );
        assert_eq!(
            Error::BadRequestFormat("not multipart".into()).category(),
            ErrorCategory::Transport
        );
        assert_eq!(
            Error::InvalidCsv {
                row: 1,
                cause: "bad utf-8".into()
            }
            .category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            Error::Timeout {
                operation: "insert".into(),
                timeout: std::time::Duration::from_secs(1)
            }
            .category(),
            ErrorCategory::Persistence
        );
        assert_eq!(
            Error::Configuration("missing store".into()).category(),
            ErrorCategory::Configuration
        );
    }

    #[test]
    fn test_client_error_split() {
        assert!(Error::MemberNotFound {
            kind: ArchiveKind::Zip
        }
        .is_client_error());
        assert!(!Error::OperationFailed {
            operation: "begin".into(),
            cause: "down".into()
        }
        .is_client_error());
    }
}
