//! Storage capability used by the ingestion engine
//!
//! The engine only needs two things from storage: run a unit of work inside
//! one transaction, and execute parameterized statements within it. Both are
//! expressed as traits so the engine never depends on a specific database.

pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::ingest::types::{ReportSchema, Value};

pub use sqlite::SqliteStore;

/// One multi-row conflict-resolving insert
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertBatch {
    pub table: String,
    /// Column list; every row binds its values in this order
    pub columns: Vec<String>,
    /// Conflict target (the identifying fields)
    pub conflict: Vec<String>,
    /// Columns overwritten on conflict
    pub update: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// A relational store that can host report tables
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Create the table for a schema if it does not exist
    async fn ensure_table(&self, schema: &ReportSchema) -> Result<()>;

    /// Start a transaction
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Upper bound on bound parameters per statement
    fn max_parameters(&self) -> usize {
        usize::MAX
    }
}

/// Unit of work; dropping it without `commit` rolls it back
#[async_trait]
pub trait StoreTransaction: Send {
    /// Execute one upsert, returning affected rows
    async fn upsert(&mut self, batch: &UpsertBatch) -> Result<u64>;

    /// Delete rows whose columns equal the given values
    async fn delete_period(&mut self, table: &str, period: &[(String, Value)]) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
