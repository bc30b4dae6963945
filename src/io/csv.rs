//! CSV decoder for price lists.
//!
//! Expected layout, one header row followed by data rows:
//!
//! ```text
//! id,name,category,price,create_date
//! 1,Widget,Tools,9.99,2024-01-15
//! ```
//!
//! The header is skipped without validation. Every data row must have exactly
//! [`FIELD_COUNT`] fields; `id` is a 64-bit integer, `price` a non-negative
//! decimal and `create_date` a `YYYY-MM-DD` date.

use crate::models::{FIELD_COUNT, Record, RecordId};
use crate::{Error, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::io::Read;
use std::str::FromStr;

/// Canonical header row.
pub const CSV_HEADER: [&str; FIELD_COUNT] = ["id", "name", "category", "price", "create_date"];

/// Date layout of the `create_date` column.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Streaming source of decoded records.
///
/// Yields `Ok(record)` per data row and stops after the first error.
pub struct CsvRecordSource<R: Read> {
    reader: ::csv::Reader<R>,
    record: ::csv::StringRecord,
    failed: bool,
}

impl<R: Read> CsvRecordSource<R> {
    /// Creates a source over `reader`. The first row is treated as the header.
    pub fn new(reader: R) -> Self {
        let reader = ::csv::ReaderBuilder::new()
            .has_headers(true)
            // Arity is checked per row so the error can name the row.
            .flexible(true)
            .trim(::csv::Trim::None)
            .from_reader(reader);

        Self {
            reader,
            record: ::csv::StringRecord::new(),
            failed: false,
        }
    }

    /// Reads and decodes the next row.
    ///
    /// Returns `Ok(None)` once the input is exhausted.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unreadable CSV, a wrong field count, or
    /// a field that does not parse.
    pub fn next_record(&mut self) -> Result<Option<Record>> {
        if self.failed {
            return Ok(None);
        }
        let result = self.read_row();
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn read_row(&mut self) -> Result<Option<Record>> {
        let has_record = self.reader.read_record(&mut self.record).map_err(|e| {
            let row = e
                .position()
                .map_or_else(|| self.reader.position().line(), ::csv::Position::line);
            Error::InvalidCsv {
                row,
                cause: e.to_string(),
            }
        })?;
        if !has_record {
            return Ok(None);
        }

        let row = self
            .record
            .position()
            .map_or_else(|| self.reader.position().line(), ::csv::Position::line);
        parse_record(&self.record, row).map(Some)
    }
}

impl<R: Read> Iterator for CsvRecordSource<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Decodes a complete CSV stream.
///
/// All-or-nothing: the first bad row fails the whole decode and no records
/// are returned.
///
/// # Errors
///
/// Returns [`Error::MalformedRow`], [`Error::InvalidField`] or
/// [`Error::InvalidCsv`] for the first offending row.
pub fn decode<R: Read>(reader: R) -> Result<Vec<Record>> {
    let records = CsvRecordSource::new(reader).collect::<Result<Vec<_>>>()?;
    tracing::debug!(records = records.len(), "Decoded price list");
    Ok(records)
}

fn parse_record(record: &::csv::StringRecord, row: u64) -> Result<Record> {
    if record.len() != FIELD_COUNT {
        return Err(Error::MalformedRow {
            row,
            observed: record.len(),
        });
    }

    let field = |index: usize| record.get(index).unwrap_or_default();

    Ok(Record {
        id: parse_id(field(0), row)?,
        name: field(1).to_string(),
        category: field(2).to_string(),
        price: parse_price(field(3), row)?,
        created_at: parse_date(field(4), row)?,
    })
}

fn invalid(row: u64, field: &'static str, value: &str, cause: impl ToString) -> Error {
    Error::InvalidField {
        row,
        field,
        value: value.to_string(),
        cause: cause.to_string(),
    }
}

fn parse_id(value: &str, row: u64) -> Result<RecordId> {
    value
        .parse::<i64>()
        .map(RecordId::new)
        .map_err(|e| invalid(row, CSV_HEADER[0], value, e))
}

/// Splits a plain decimal literal (`-?digits[.digits]`) into its fraction
/// digits. Anything else, including signs other than `-`, `_` separators and
/// exponents, is `None`.
fn fraction_digits(value: &str) -> Option<&str> {
    let unsigned = value.strip_prefix('-').unwrap_or(value);
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    let well_formed = !whole.is_empty()
        && all_digits(whole)
        && all_digits(fraction)
        && !(fraction.is_empty() && unsigned.ends_with('.'));
    well_formed.then_some(fraction)
}

fn parse_price(value: &str, row: u64) -> Result<Decimal> {
    let Some(fraction) = fraction_digits(value) else {
        return Err(invalid(row, CSV_HEADER[3], value, "expected a plain decimal number"));
    };
    let price = Decimal::from_str(value).map_err(|e| invalid(row, CSV_HEADER[3], value, e))?;
    // Decimal rounds fractions it cannot hold; a rounded price is rejected.
    if price.scale() as usize != fraction.len() {
        return Err(invalid(
            row,
            CSV_HEADER[3],
            value,
            "more fractional digits than a price can hold",
        ));
    }
    if price.is_sign_negative() && !price.is_zero() {
        return Err(invalid(row, CSV_HEADER[3], value, "price must not be negative"));
    }
    Ok(price)
}

fn parse_date(value: &str, row: u64) -> Result<NaiveDate> {
    // chrono accepts unpadded fields; the column is strictly zero-padded.
    let shaped = value.len() == 10
        && value
            .bytes()
            .enumerate()
            .all(|(i, b)| if i == 4 || i == 7 { b == b'-' } else { b.is_ascii_digit() });
    if !shaped {
        return Err(invalid(row, CSV_HEADER[4], value, "expected YYYY-MM-DD"));
    }
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| invalid(row, CSV_HEADER[4], value, e))
}
