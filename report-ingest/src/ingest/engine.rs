//! Ingestion orchestrator
//!
//! Wires header discovery, row normalization, chunk buffering and the
//! batched upsert into one `ingest` call per upload or chunk.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use super::batch::{UpsertBatcher, WriteSummary};
use super::header::HeaderResolver;
use super::normalize::{RowNormalizer, period_values};
use super::registry::SchemaRegistry;
use super::session::{ChunkAssembler, ChunkStep};
use super::types::{ChunkInfo, IngestError, NormalizedRecord, RawRow, ReportSchema, UploadContext};
use crate::store::ReportStore;

/// Result of one `ingest` call
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// A non-final chunk was buffered; nothing was written
    Buffered {
        chunk_index: usize,
        total_chunks: usize,
        buffered: usize,
    },
    /// The upload is complete and committed
    Committed(IngestSummary),
}

impl IngestOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, IngestOutcome::Committed(_))
    }

    pub fn summary(&self) -> Option<&IngestSummary> {
        match self {
            IngestOutcome::Committed(summary) => Some(summary),
            IngestOutcome::Buffered { .. } => None,
        }
    }
}

/// Counters for one committed upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub report_type: String,
    pub schema_version: u32,
    pub file_name: String,
    pub chunks: usize,
    /// Raw rows delivered, header and metadata rows excluded
    pub rows_received: usize,
    pub rows_dropped: usize,
    /// Rows after a footer row
    pub rows_ignored: usize,
    /// Distinct records written
    pub records: usize,
    pub duplicates: usize,
    pub batches: usize,
    pub rows_affected: u64,
    /// Rows removed by a replace-period write
    pub deleted: u64,
}

/// Counters gathered before the write
struct Collected {
    id: Uuid,
    chunks: usize,
    rows_received: usize,
    rows_dropped: usize,
    rows_ignored: usize,
    records: Vec<NormalizedRecord>,
}

/// Generic ingestion engine over a schema registry and a report store
pub struct IngestionEngine {
    registry: Arc<SchemaRegistry>,
    store: Arc<dyn ReportStore>,
    assembler: Arc<ChunkAssembler>,
    batcher: UpsertBatcher,
}

impl IngestionEngine {
    pub fn new(registry: Arc<SchemaRegistry>, store: Arc<dyn ReportStore>) -> Self {
        Self {
            registry,
            store,
            assembler: Arc::new(ChunkAssembler::default()),
            batcher: UpsertBatcher::default(),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batcher = UpsertBatcher::new(batch_size);
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.assembler = Arc::new(ChunkAssembler::new(idle_timeout));
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn assembler(&self) -> &Arc<ChunkAssembler> {
        &self.assembler
    }

    /// Create tables for every registered schema version
    pub async fn prepare(&self) -> anyhow::Result<()> {
        for schema in self.registry.all_versions() {
            self.store.ensure_table(&schema).await?;
        }
        log::info!("Prepared tables for {} report types", self.registry.len());
        Ok(())
    }

    /// Ingest rows for a report type tag (latest schema version)
    pub async fn ingest(
        &self,
        report_type: &str,
        rows: &[RawRow],
        ctx: &UploadContext,
        chunk: Option<ChunkInfo>,
    ) -> Result<IngestOutcome, IngestError> {
        let schema = match self.registry.get(report_type) {
            Ok(schema) => schema,
            Err(e) => {
                if chunk.is_some() {
                    self.assembler.discard(&ctx.file_name);
                }
                return Err(e);
            }
        };
        self.ingest_with_schema(&schema, rows, ctx, chunk).await
    }

    /// Ingest rows against an explicit schema
    pub async fn ingest_with_schema(
        &self,
        schema: &ReportSchema,
        rows: &[RawRow],
        ctx: &UploadContext,
        chunk: Option<ChunkInfo>,
    ) -> Result<IngestOutcome, IngestError> {
        match chunk {
            None => self.ingest_whole(schema, rows, ctx).await,
            Some(chunk) => {
                let result = self.ingest_chunk(schema, rows, ctx, chunk).await;
                if result.is_err() {
                    self.assembler.discard(&ctx.file_name);
                }
                result
            }
        }
    }

    async fn ingest_whole(
        &self,
        schema: &ReportSchema,
        rows: &[RawRow],
        ctx: &UploadContext,
    ) -> Result<IngestOutcome, IngestError> {
        let id = Uuid::new_v4();
        log::info!(
            "Ingestion {}: '{}' from '{}' ({} rows, period {})",
            id,
            schema.report_type,
            ctx.file_name,
            rows.len(),
            ctx.period
        );

        check_input(schema, rows, ctx)?;
        let header = HeaderResolver::new(schema).resolve(rows)?;
        let data = &rows[header.data_offset.min(rows.len())..];
        let block = RowNormalizer::new(schema, &header, ctx)?.normalize_block(data);

        let collected = Collected {
            id,
            chunks: 1,
            rows_received: data.len(),
            rows_dropped: block.dropped(),
            rows_ignored: data.len() - block.rows_seen,
            records: block.records,
        };
        self.commit(schema, ctx, collected).await
    }

    async fn ingest_chunk(
        &self,
        schema: &ReportSchema,
        rows: &[RawRow],
        ctx: &UploadContext,
        chunk: ChunkInfo,
    ) -> Result<IngestOutcome, IngestError> {
        if chunk.index == 0 {
            check_input(schema, rows, ctx)?;
        }

        match self.assembler.accept(schema, ctx, chunk, rows)? {
            ChunkStep::Buffered {
                chunk_index,
                total_chunks,
                buffered,
            } => Ok(IngestOutcome::Buffered {
                chunk_index,
                total_chunks,
                buffered,
            }),
            ChunkStep::Complete(session) => {
                let collected = Collected {
                    id: session.id,
                    chunks: session.received_chunks,
                    rows_received: session.rows_received,
                    rows_dropped: session.rows_dropped,
                    rows_ignored: session.rows_ignored,
                    records: session.records,
                };
                self.commit(schema, ctx, collected).await
            }
        }
    }

    async fn commit(
        &self,
        schema: &ReportSchema,
        ctx: &UploadContext,
        collected: Collected,
    ) -> Result<IngestOutcome, IngestError> {
        if collected.rows_dropped > 0 {
            log::warn!(
                "Ingestion {}: dropped {} of {} rows from '{}' (blank, missing key or bad date)",
                collected.id,
                collected.rows_dropped,
                collected.rows_received,
                ctx.file_name
            );
        }
        if collected.rows_ignored > 0 {
            log::info!(
                "Ingestion {}: ignored {} rows after the footer of '{}'",
                collected.id,
                collected.rows_ignored,
                ctx.file_name
            );
        }

        if collected.records.is_empty() && schema.reject_if_empty {
            return Err(IngestError::validation("No valid data rows found"));
        }

        let written: WriteSummary = self
            .batcher
            .execute(self.store.as_ref(), schema, &ctx.period, collected.records)
            .await?;

        log::info!(
            "Ingestion {}: committed {} records to {} in {} batches",
            collected.id,
            written.records,
            schema.table,
            written.batches
        );

        Ok(IngestOutcome::Committed(IngestSummary {
            report_type: schema.report_type.clone(),
            schema_version: schema.version,
            file_name: ctx.file_name.clone(),
            chunks: collected.chunks,
            rows_received: collected.rows_received,
            rows_dropped: collected.rows_dropped,
            rows_ignored: collected.rows_ignored,
            records: written.records,
            duplicates: written.duplicates,
            batches: written.batches,
            rows_affected: written.rows_affected,
            deleted: written.deleted,
        }))
    }
}

/// Reject empty input and a period of the wrong shape before any row work
fn check_input(schema: &ReportSchema, rows: &[RawRow], ctx: &UploadContext) -> Result<(), IngestError> {
    if rows.is_empty() {
        return Err(IngestError::validation("No data provided"));
    }
    if period_values(&schema.period, &ctx.period).is_none() {
        let expected = if schema.period.is_single() {
            "reportDate"
        } else {
            "startDate and endDate"
        };
        return Err(IngestError::validation(format!(
            "Missing {} for {}",
            expected, schema.report_type
        )));
    }
    Ok(())
}
