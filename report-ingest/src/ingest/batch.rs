//! Batched, transactional upsert of a complete record set
//!
//! Every batch of one ingestion runs inside a single transaction. A failing
//! batch rolls the whole ingestion back, leaving stored state unchanged.

use std::collections::HashMap;

use super::normalize::period_values;
use super::types::{IngestError, NormalizedRecord, Period, ReportSchema, WriteMode};
use crate::store::{ReportStore, StoreTransaction, UpsertBatch};

/// Default rows per upsert statement
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Statements prepared for one ingestion
#[derive(Debug, Clone, PartialEq)]
pub struct WritePlan {
    pub batches: Vec<UpsertBatch>,
    /// Distinct identifying-key tuples
    pub records: usize,
    /// Records superseded by a later record with the same key
    pub duplicates: usize,
}

/// What one flush wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub records: usize,
    pub duplicates: usize,
    pub batches: usize,
    pub rows_affected: u64,
    /// Rows removed by a replace-period write
    pub deleted: u64,
}

/// Partitions records into batches and writes them atomically
#[derive(Debug, Clone)]
pub struct UpsertBatcher {
    batch_size: usize,
}

impl Default for UpsertBatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl UpsertBatcher {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Rows per statement, capped so a batch never exceeds the store's
    /// parameter limit
    pub fn effective_batch_size(&self, columns: usize, max_parameters: usize) -> usize {
        if columns == 0 {
            return self.batch_size;
        }
        self.batch_size.min(max_parameters / columns).max(1)
    }

    /// Collapse records sharing an identifying key
    ///
    /// The first record of a key survives in its position; each later record
    /// with that key overwrites only the mutable columns, mirroring what the
    /// store's conflict update would do.
    pub fn dedupe(schema: &ReportSchema, records: Vec<NormalizedRecord>) -> (Vec<NormalizedRecord>, usize) {
        let mut positions: HashMap<Vec<String>, usize> = HashMap::with_capacity(records.len());
        let mut unique: Vec<NormalizedRecord> = Vec::with_capacity(records.len());
        let mut duplicates = 0;

        for record in records {
            let identity = record.identity(&schema.identifying);
            match positions.get(&identity) {
                Some(&index) => {
                    let survivor = &mut unique[index];
                    for column in &schema.mutable {
                        survivor.insert(column.clone(), record.value_or_null(column));
                    }
                    duplicates += 1;
                }
                None => {
                    positions.insert(identity, unique.len());
                    unique.push(record);
                }
            }
        }

        (unique, duplicates)
    }

    /// Build the write statements for a record set
    ///
    /// A replace-period write clears the period first, so every record is
    /// inserted as-is with no key collapsing and no conflict clause.
    pub fn plan(
        &self,
        schema: &ReportSchema,
        records: Vec<NormalizedRecord>,
        max_parameters: usize,
    ) -> WritePlan {
        let (records, duplicates, conflict, update) = match schema.write_mode {
            WriteMode::Upsert => {
                let (records, duplicates) = Self::dedupe(schema, records);
                (records, duplicates, schema.identifying.clone(), schema.mutable.clone())
            }
            WriteMode::ReplacePeriod => (records, 0, Vec::new(), Vec::new()),
        };
        let columns = schema.storage_columns();
        let size = self.effective_batch_size(columns.len(), max_parameters);

        let batches = records
            .chunks(size)
            .map(|chunk| UpsertBatch {
                table: schema.table.clone(),
                columns: columns.clone(),
                conflict: conflict.clone(),
                update: update.clone(),
                rows: chunk
                    .iter()
                    .map(|record| columns.iter().map(|c| record.value_or_null(c)).collect())
                    .collect(),
            })
            .collect();

        WritePlan {
            batches,
            records: records.len(),
            duplicates,
        }
    }

    /// Write a complete record set in one transaction
    pub async fn execute(
        &self,
        store: &dyn ReportStore,
        schema: &ReportSchema,
        period: &Period,
        records: Vec<NormalizedRecord>,
    ) -> Result<WriteSummary, IngestError> {
        if records.is_empty() {
            log::debug!("Nothing to write for '{}'", schema.report_type);
            return Ok(WriteSummary::default());
        }

        let period_filter = match schema.write_mode {
            WriteMode::ReplacePeriod => Some(period_values(&schema.period, period).ok_or_else(|| {
                IngestError::validation(format!(
                    "Period {} does not fit report type '{}'",
                    period, schema.report_type
                ))
            })?),
            WriteMode::Upsert => None,
        };

        let plan = self.plan(schema, records, store.max_parameters());
        let mut summary = WriteSummary {
            records: plan.records,
            duplicates: plan.duplicates,
            batches: plan.batches.len(),
            ..Default::default()
        };
        if plan.duplicates > 0 {
            log::debug!(
                "{} records in '{}' superseded by later rows with the same key",
                plan.duplicates,
                schema.report_type
            );
        }

        let mut tx = store.begin().await.map_err(IngestError::storage)?;

        if let Some(filter) = &period_filter {
            match tx.delete_period(&schema.table, filter).await {
                Ok(deleted) => {
                    log::debug!("Replaced period {}: removed {} rows from {}", period, deleted, schema.table);
                    summary.deleted = deleted;
                }
                Err(e) => return Err(abort(tx, schema, e).await),
            }
        }

        let total = plan.batches.len();
        for (index, batch) in plan.batches.iter().enumerate() {
            match tx.upsert(batch).await {
                Ok(affected) => {
                    summary.rows_affected += affected;
                    log::debug!(
                        "Batch {}/{} for {}: {} rows, {} affected",
                        index + 1,
                        total,
                        schema.table,
                        batch.rows.len(),
                        affected
                    );
                }
                Err(e) => {
                    let e = e.context(format!("Batch {}/{} failed", index + 1, total));
                    return Err(abort(tx, schema, e).await);
                }
            }
        }

        if let Err(e) = tx.commit().await {
            log::error!("Commit failed for '{}': {:#}", schema.report_type, e);
            return Err(IngestError::storage(e));
        }

        Ok(summary)
    }
}

async fn abort(tx: Box<dyn StoreTransaction>, schema: &ReportSchema, err: anyhow::Error) -> IngestError {
    log::error!("Rolling back '{}' ingestion: {:#}", schema.report_type, err);
    if let Err(rollback_err) = tx.rollback().await {
        log::warn!("Rollback failed for '{}': {:#}", schema.report_type, rollback_err);
    }
    IngestError::storage(err)
}
