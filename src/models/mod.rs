//! Data models for priceanalyzer.
//!
//! [`Record`] is one decoded price-list row; [`IngestionSummary`] is the
//! aggregate returned after a batch is committed.

mod record;
mod summary;

pub use record::{FIELD_COUNT, Record, RecordId};
pub use summary::IngestionSummary;
