//! Storage layer.
//!
//! | Backend | Feature | Use |
//! |---------|---------|-----|
//! | [`PostgresPriceStore`] | `postgres` (default) | production |
//! | [`InMemoryPriceStore`] | always | tests, `--store memory` |
//!
//! Both implement [`PriceStore`]; the service only sees the trait object.

// Allow significant_drop_tightening - pooled connections are held for the
// whole transaction.
#![allow(clippy::significant_drop_tightening)]

use crate::{Error, Result};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod migrations;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod traits;

pub use memory::InMemoryPriceStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresPriceStore;
pub use traits::PriceStore;

/// Default table name.
pub const DEFAULT_TABLE: &str = "prices";

/// Default maximum connections in the database pool.
pub const DEFAULT_POOL_MAX_SIZE: usize = 16;

/// Checks that `name` is a plain lowercase SQL identifier.
///
/// The table name is interpolated into statements, so nothing else is allowed.
///
/// # Errors
///
/// Returns [`Error::Configuration`] for anything but `[a-z_][a-z0-9_]*`
/// up to 48 characters.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if valid_start && valid_rest && name.len() <= 48 {
        Ok(())
    } else {
        Err(Error::Configuration(format!(
            "invalid table name {name:?}: expected [a-z_][a-z0-9_]*"
        )))
    }
}
