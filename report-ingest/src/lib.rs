//! Chunked ingestion and idempotent upsert of tabular business reports

pub mod config;
pub mod ingest;
pub mod source;
pub mod store;

pub use config::IngestConfig;
pub use ingest::{IngestError, IngestOutcome, IngestionEngine, SchemaRegistry, UploadRouter};
pub use store::SqliteStore;
