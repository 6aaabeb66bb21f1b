//! SQLite-backed report store

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};

use super::{ReportStore, StoreTransaction, UpsertBatch};
use crate::ingest::types::{ReportSchema, Value, WriteMode};

/// SQLite's default cap on host parameters per statement
pub const SQLITE_MAX_PARAMETERS: usize = 32766;

/// Report store on an `sqlx` SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a database URL, creating the file if needed
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {}", database_url))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database: {}", database_url))?;

        log::info!("Connected to {}", database_url);
        Ok(Self { pool })
    }

    /// Private in-memory database on a single long-lived connection
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .context("Invalid in-memory database URL")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .context("Failed to open in-memory database")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Number of rows in a table
    pub async fn count_rows(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote(table));
        sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("Failed to count rows in {}", table))
    }
}

/// Double-quote an identifier
fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn quote_list(identifiers: &[String]) -> String {
    identifiers.iter().map(|i| quote(i)).collect::<Vec<_>>().join(", ")
}

/// `CREATE TABLE` statement for a schema
///
/// A surrogate `id`, every storage column and a database-defaulted
/// `file_uploaded_at`. Upsert tables also get a unique constraint over exactly
/// the identifying fields; replace-period tables hold every uploaded row.
pub fn create_table_sql(schema: &ReportSchema) -> String {
    let mut lines = vec!["    \"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    for column in schema.storage_columns() {
        lines.push(format!("    {} {}", quote(&column), schema.sql_type_of(&column)));
    }
    lines.push("    \"file_uploaded_at\" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP".to_string());
    if schema.write_mode == WriteMode::Upsert {
        lines.push(format!("    UNIQUE ({})", quote_list(&schema.identifying)));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        quote(&schema.table),
        lines.join(",\n")
    )
}

/// Trailing conflict clause for an upsert
pub fn conflict_clause(conflict: &[String], update: &[String]) -> String {
    if update.is_empty() {
        return format!(" ON CONFLICT ({}) DO NOTHING", quote_list(conflict));
    }
    let assignments = update
        .iter()
        .map(|c| format!("{} = excluded.{}", quote(c), quote(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(" ON CONFLICT ({}) DO UPDATE SET {}", quote_list(conflict), assignments)
}

#[async_trait]
impl ReportStore for SqliteStore {
    async fn ensure_table(&self, schema: &ReportSchema) -> Result<()> {
        sqlx::query(&create_table_sql(schema))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to create table {}", schema.table))?;
        log::debug!("Ensured table {} for '{}'", schema.table, schema.report_type);
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await.context("Failed to begin transaction")?;
        Ok(Box::new(SqliteTransaction { tx }))
    }

    fn max_parameters(&self) -> usize {
        SQLITE_MAX_PARAMETERS
    }
}

struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl StoreTransaction for SqliteTransaction {
    async fn upsert(&mut self, batch: &UpsertBatch) -> Result<u64> {
        if batch.rows.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            quote(&batch.table),
            quote_list(&batch.columns)
        ));
        qb.push_values(batch.rows.iter(), |mut b, row| {
            for value in row {
                match value {
                    Value::Null => {
                        b.push_bind(None::<String>);
                    }
                    Value::Text(s) => {
                        b.push_bind(s.clone());
                    }
                    Value::Number(n) => {
                        b.push_bind(*n);
                    }
                    Value::Date(d) => {
                        b.push_bind(*d);
                    }
                }
            }
        });
        if !batch.conflict.is_empty() {
            qb.push(conflict_clause(&batch.conflict, &batch.update));
        }

        let result = qb
            .build()
            .execute(&mut *self.tx)
            .await
            .with_context(|| format!("Failed to upsert {} rows into {}", batch.rows.len(), batch.table))?;

        Ok(result.rows_affected())
    }

    async fn delete_period(&mut self, table: &str, period: &[(String, Value)]) -> Result<u64> {
        let mut qb: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new(format!("DELETE FROM {}", quote(table)));
        for (i, (column, value)) in period.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            qb.push(quote(column));
            qb.push(" = ");
            match value {
                Value::Null => {
                    qb.push_bind(None::<String>);
                }
                Value::Text(s) => {
                    qb.push_bind(s.clone());
                }
                Value::Number(n) => {
                    qb.push_bind(*n);
                }
                Value::Date(d) => {
                    qb.push_bind(*d);
                }
            }
        }

        let result = qb
            .build()
            .execute(&mut *self.tx)
            .await
            .with_context(|| format!("Failed to delete period rows from {}", table))?;

        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.context("Failed to commit transaction")
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await.context("Failed to roll back transaction")
    }
}
