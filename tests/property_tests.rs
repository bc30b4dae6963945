//! Property-based tests for the ingestion pipeline.
//!
//! Uses proptest to verify invariants across random inputs:
//! - Wrapping then unwrapping a payload yields the same bytes
//! - Well-formed price lists decode row for row
//! - The first bad row is reported with its line number
//! - Summaries are independent of batch order and re-ingestion

// Property tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::NaiveDate;
use priceanalyzer::archive::{self, ArchiveKind};
use priceanalyzer::io::decode;
use priceanalyzer::models::{IngestionSummary, Record};
use priceanalyzer::storage::{InMemoryPriceStore, PriceStore};
use priceanalyzer::Error;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::io::Read;
use std::str::FromStr;

const HEADER: &str = "id,name,category,price,create_date";

/// One well-formed data row in its textual and typed forms.
#[derive(Debug, Clone)]
struct Row {
    id: i64,
    name: String,
    category: String,
    price: String,
    date: NaiveDate,
}

impl Row {
    fn line(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.id,
            self.name,
            self.category,
            self.price,
            self.date.format("%Y-%m-%d")
        )
    }

    fn record(&self) -> Record {
        Record::new(
            self.id,
            self.name.clone(),
            self.category.clone(),
            Decimal::from_str(&self.price).unwrap(),
            self.date,
        )
    }
}

fn kind_strategy() -> impl Strategy<Value = ArchiveKind> {
    prop_oneof![Just(ArchiveKind::Zip), Just(ArchiveKind::Tar)]
}

fn row_strategy() -> impl Strategy<Value = Row> {
    (
        any::<i64>(),
        "[A-Za-z][A-Za-z0-9 ]{0,20}",
        prop_oneof![Just("Tools"), Just("Garden"), Just("Kitchen"), Just("Toys")],
        (0u32..1_000_000, 0u32..100),
        (1990i32..2040, 1u32..=12, 1u32..=28),
    )
        .prop_map(|(id, name, category, (units, cents), (y, m, d))| Row {
            id,
            name,
            category: category.to_string(),
            price: format!("{units}.{cents:02}"),
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
        })
}

fn price_list(rows: &[Row]) -> String {
    let mut text = format!("{HEADER}\n");
    for row in rows {
        text.push_str(&row.line());
        text.push('\n');
    }
    text
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
        .block_on(future)
}

// ============================================================================
// Archive codec
// ============================================================================

proptest! {
    /// Property: the unwrapped member is byte-identical to what was wrapped.
    #[test]
    fn prop_wrap_unwrap_preserves_payload(
        payload in proptest::collection::vec(any::<u8>(), 0..4096),
        kind in kind_strategy(),
        stem in "[a-z][a-z0-9_]{0,15}",
    ) {
        let member = format!("{stem}.csv");
        let container = archive::wrap(&payload, kind, &member).unwrap();

        let mut reader = archive::unwrap(container.as_slice(), kind).unwrap();
        prop_assert_eq!(reader.member_name(), member.as_str());
        prop_assert_eq!(reader.size(), payload.len() as u64);

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        prop_assert_eq!(out, payload);
    }

    /// Property: a container whose only member is not CSV never yields one.
    #[test]
    fn prop_non_csv_member_not_found(
        stem in "[a-z]{1,10}",
        ext in prop_oneof![Just("txt"), Just("json"), Just("csv.bak")],
        kind in kind_strategy(),
    ) {
        let container = archive::wrap(b"1,2,3", kind, &format!("{stem}.{ext}")).unwrap();
        let result = archive::unwrap(container.as_slice(), kind);
        let is_member_not_found = matches!(result, Err(Error::MemberNotFound { .. }));
        prop_assert!(is_member_not_found);
    }
}

// ============================================================================
// CSV decoding
// ============================================================================

proptest! {
    /// Property: every well-formed row decodes to the record it describes.
    #[test]
    fn prop_decode_well_formed_rows(rows in proptest::collection::vec(row_strategy(), 0..50)) {
        let decoded = decode(price_list(&rows).as_bytes()).unwrap();
        let expected: Vec<Record> = rows.iter().map(Row::record).collect();
        prop_assert_eq!(decoded, expected);
    }

    /// Property: decoding through an archive matches decoding the bare text.
    #[test]
    fn prop_decode_through_archive(
        rows in proptest::collection::vec(row_strategy(), 1..20),
        kind in kind_strategy(),
    ) {
        let text = price_list(&rows);
        let container = archive::wrap(text.as_bytes(), kind, "prices.csv").unwrap();
        let reader = archive::unwrap(container.as_slice(), kind).unwrap();

        prop_assert_eq!(decode(reader).unwrap(), decode(text.as_bytes()).unwrap());
    }

    /// Property: a short row fails the decode and names its line.
    #[test]
    fn prop_short_row_reports_line(
        rows in proptest::collection::vec(row_strategy(), 1..20),
        bad_index in any::<prop::sample::Index>(),
        keep in 1usize..5,
    ) {
        let bad = bad_index.index(rows.len());
        let mut text = format!("{HEADER}\n");
        for (i, row) in rows.iter().enumerate() {
            let line = row.line();
            if i == bad {
                let truncated: Vec<&str> = line.split(',').take(keep).collect();
                text.push_str(&truncated.join(","));
            } else {
                text.push_str(&line);
            }
            text.push('\n');
        }

        let err = decode(text.as_bytes()).unwrap_err();
        let expected_row = bad as u64 + 2;
        prop_assert!(
            matches!(err, Error::MalformedRow { row, observed } if row == expected_row && observed == keep),
            "unexpected error: {}", err
        );
    }

    /// Property: negative prices are rejected wherever they appear.
    #[test]
    fn prop_negative_price_rejected(
        mut row in row_strategy(),
        units in 1u32..10_000,
    ) {
        row.price = format!("-{units}.00");
        let err = decode(price_list(&[row]).as_bytes()).unwrap_err();
        prop_assert!(
            matches!(err, Error::InvalidField { row: 2, field: "price", .. }),
            "unexpected error: {}", err
        );
    }
}

// ============================================================================
// Summaries
// ============================================================================

proptest! {
    /// Property: the summary does not depend on record order.
    #[test]
    fn prop_summary_order_independent(rows in proptest::collection::vec(row_strategy(), 0..40)) {
        let records: Vec<Record> = rows.iter().map(Row::record).collect();
        let mut reversed = records.clone();
        reversed.reverse();

        prop_assert_eq!(
            IngestionSummary::from_records(&records).unwrap(),
            IngestionSummary::from_records(&reversed).unwrap()
        );
    }

    /// Property: ingesting the same batch twice leaves the summary unchanged.
    #[test]
    fn prop_reingestion_is_idempotent(rows in proptest::collection::vec(row_strategy(), 1..30)) {
        let records: Vec<Record> = rows.iter().map(Row::record).collect();

        let (first, second, stored) = block_on(async {
            let store = InMemoryPriceStore::new();
            let first = store.insert_records(&records).await.unwrap();
            let second = store.insert_records(&records).await.unwrap();
            (first, second, store.fetch_all().await.unwrap())
        });

        prop_assert_eq!(first, second);
        prop_assert_eq!(first.total_items, stored.len() as u64);
        prop_assert_eq!(first, IngestionSummary::from_records(&stored).unwrap());
    }
}
