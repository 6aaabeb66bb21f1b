//! Schema-driven ingestion of tabular reports
//!
//! Rows arrive whole or in chunks, get matched against a report schema's
//! header, are normalized into typed records and are written with one
//! batched, conflict-resolving upsert per upload.

pub mod batch;
pub mod engine;
pub mod header;
pub mod normalize;
pub mod registry;
pub mod router;
pub mod session;
pub mod types;

pub use batch::{UpsertBatcher, WritePlan, WriteSummary};
pub use engine::{IngestOutcome, IngestSummary, IngestionEngine};
pub use header::{HeaderMapping, HeaderResolver};
pub use normalize::{NormalizedBlock, RowNormalizer, RowOutcome};
pub use registry::SchemaRegistry;
pub use router::{UploadPayload, UploadRouter};
pub use session::{ChunkAssembler, ChunkStep, UploadSession};
pub use types::{
    ChunkInfo, ErrorKind, IngestError, NormalizedRecord, Period, RawRow, RawValue, ReportSchema,
    RowIssue, UploadContext, Value,
};
