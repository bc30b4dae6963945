//! Price-list decoding.
//!
//! [`CsvRecordSource`] turns a CSV byte stream into typed [`Record`]s one row
//! at a time; [`decode`] drives it to completion and rejects the whole input
//! on the first bad row.
//!
//! [`Record`]: crate::models::Record

pub mod csv;

pub use self::csv::{CSV_HEADER, CsvRecordSource, decode};
