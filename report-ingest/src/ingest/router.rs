//! Upload dispatch by report type tag

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::engine::{IngestOutcome, IngestionEngine};
use super::types::{ChunkInfo, IngestError, Period, PeriodColumns, RawRow, ReportSchema, UploadContext};

/// JSON upload request as sent by the spreadsheet front-end
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub file_type: String,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub data: Vec<RawRow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_last_chunk: Option<bool>,
}

impl UploadPayload {
    /// Chunk position, when the payload is part of a chunked upload
    pub fn chunk_info(&self) -> Result<Option<ChunkInfo>, IngestError> {
        match (self.chunk_index, self.total_chunks, self.is_last_chunk) {
            (None, None, None) => Ok(None),
            (Some(index), Some(total), Some(is_last)) => Ok(Some(ChunkInfo::new(index, total, is_last))),
            _ => Err(IngestError::validation(
                "chunkIndex, totalChunks and isLastChunk must be sent together",
            )),
        }
    }

    /// Reporting period in the shape the schema expects
    pub fn period_for(&self, schema: &ReportSchema) -> Result<Period, IngestError> {
        fn present(v: &Option<String>) -> Option<&str> {
            v.as_deref().map(str::trim).filter(|s| !s.is_empty())
        }

        match &schema.period {
            PeriodColumns::Single { .. } => match present(&self.report_date) {
                Some(date) => Period::day(date),
                None => Err(IngestError::validation(format!(
                    "Missing reportDate for {}",
                    schema.report_type
                ))),
            },
            PeriodColumns::Range { .. } => match (present(&self.start_date), present(&self.end_date)) {
                (Some(start), Some(end)) => Period::range(start, end),
                _ => Err(IngestError::validation(format!(
                    "Missing startDate or endDate for {}",
                    schema.report_type
                ))),
            },
        }
    }
}

/// Routes upload payloads to the engine by type tag
pub struct UploadRouter {
    engine: Arc<IngestionEngine>,
}

impl UploadRouter {
    pub fn new(engine: Arc<IngestionEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<IngestionEngine> {
        &self.engine
    }

    /// Validate a payload and ingest it on behalf of `uploaded_by`
    pub async fn handle(&self, payload: &UploadPayload, uploaded_by: &str) -> Result<IngestOutcome, IngestError> {
        let chunked = payload.chunk_index.is_some()
            || payload.total_chunks.is_some()
            || payload.is_last_chunk.is_some();

        let prepared = self.prepare(payload, uploaded_by);
        let (schema, ctx, chunk) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                if chunked && self.engine.assembler().discard(&payload.file_name) {
                    log::warn!("Discarded upload session for '{}': {}", payload.file_name, e);
                }
                return Err(e);
            }
        };

        self.engine
            .ingest_with_schema(&schema, &payload.data, &ctx, chunk)
            .await
    }

    fn prepare(
        &self,
        payload: &UploadPayload,
        uploaded_by: &str,
    ) -> Result<(Arc<ReportSchema>, UploadContext, Option<ChunkInfo>), IngestError> {
        let schema = self.engine.registry().get(&payload.file_type).map_err(|e| {
            log::warn!("Upload rejected: unsupported fileType '{}'", payload.file_type);
            e
        })?;

        if payload.file_name.trim().is_empty() || payload.data.is_empty() {
            return Err(IngestError::validation("Invalid upload payload"));
        }

        let chunk = payload.chunk_info()?;
        let period = payload.period_for(&schema)?;
        let ctx = UploadContext::new(payload.file_name.clone(), period, uploaded_by);
        Ok((schema, ctx, chunk))
    }
}
