//! Business logic services.
//!
//! Services orchestrate the decoder and the storage backend and provide the
//! high-level operations the HTTP layer calls.

mod ingest;

pub use ingest::{
    DEFAULT_PING_TIMEOUT, DEFAULT_STORE_TIMEOUT, IngestionService, IngestionServiceBuilder,
};
