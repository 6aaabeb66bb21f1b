//! Ingestion error types

use thiserror::Error;

/// Failure of one ingestion call
#[derive(Debug, Error)]
pub enum IngestError {
    /// Header row missing, or header set violates the schema's match policy
    #[error("schema error for report '{report}': {message}")]
    Schema { report: String, message: String },

    /// Malformed period, empty input, missing payload fields
    #[error("validation error: {0}")]
    Validation(String),

    /// The type tag does not name a registered report schema
    #[error("unsupported report type: {0}")]
    UnknownReportType(String),

    /// Chunk delivery violated the sequential upload protocol
    #[error("upload session error for '{file_name}': {message}")]
    Session { file_name: String, message: String },

    /// Transaction or batch statement failure; the whole ingestion was rolled back
    #[error("storage failure: {message}")]
    Storage { message: String },
}

/// Coarse classification for callers and operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller can fix the file or request and retry
    Input,
    /// Infrastructure failure, not caused by the input
    System,
}

impl IngestError {
    pub fn schema(report: impl Into<String>, message: impl Into<String>) -> Self {
        IngestError::Schema {
            report: report.into(),
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        IngestError::Validation(message.into())
    }

    pub fn session(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        IngestError::Session {
            file_name: file_name.into(),
            message: message.into(),
        }
    }

    /// Wrap an infrastructure error, keeping its full context chain in the message
    pub fn storage(err: anyhow::Error) -> Self {
        IngestError::Storage {
            message: format!("{:#}", err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Storage { .. } => ErrorKind::System,
            IngestError::Schema { .. }
            | IngestError::Validation(_)
            | IngestError::UnknownReportType(_)
            | IngestError::Session { .. } => ErrorKind::Input,
        }
    }

    /// Check if the error is input-fixable (as opposed to a system failure)
    pub fn is_input_error(&self) -> bool {
        self.kind() == ErrorKind::Input
    }
}

/// Recoverable problem with a single row; the row is dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowIssue {
    /// Every non-blank cell was empty
    BlankRow,
    /// An identifying field resolved empty
    MissingIdentifier { field: String },
    /// A strict ISO date column held something else
    InvalidDate { column: String, value: String },
}

impl std::fmt::Display for RowIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RowIssue::BlankRow => write!(f, "blank row"),
            RowIssue::MissingIdentifier { field } => {
                write!(f, "missing identifying field '{}'", field)
            }
            RowIssue::InvalidDate { column, value } => {
                write!(f, "invalid date '{}' in column '{}' (expected YYYY-MM-DD)", value, column)
            }
        }
    }
}
