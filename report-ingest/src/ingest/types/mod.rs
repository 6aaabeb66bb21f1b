//! Core ingestion types

pub mod error;
pub mod raw;
pub mod record;
pub mod schema;
pub mod value;

pub use error::{ErrorKind, IngestError, RowIssue};
pub use raw::{RawRow, RawValue, collapse_whitespace};
pub use record::{ChunkInfo, NormalizedRecord, Period, UploadContext};
pub use schema::{
    CaseFold, Coercion, ColumnSpec, FooterRule, HeaderMatch, HeaderSource, LabelStyle,
    PeriodColumns, RESERVED_COLUMNS, ReportSchema, ReportSchemaBuilder, Whitespace, WriteMode,
    is_identifier,
};
pub use value::Value;
