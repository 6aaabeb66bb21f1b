//! JSON upload files

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::ingest::router::UploadPayload;
use crate::ingest::types::RawRow;

/// Contents of a JSON upload file
#[derive(Debug, Clone)]
pub enum JsonSource {
    /// A bare array of row objects
    Rows(Vec<RawRow>),
    /// A complete upload request, period and type included
    Payload(Box<UploadPayload>),
}

impl JsonSource {
    pub fn into_rows(self) -> Vec<RawRow> {
        match self {
            JsonSource::Rows(rows) => rows,
            JsonSource::Payload(payload) => payload.data,
        }
    }

    pub fn payload(&self) -> Option<&UploadPayload> {
        match self {
            JsonSource::Payload(payload) => Some(payload.as_ref()),
            JsonSource::Rows(_) => None,
        }
    }
}

/// Parse a JSON upload from a string
pub fn parse_json(source: &str) -> Result<JsonSource> {
    let value: serde_json::Value = serde_json::from_str(source).context("Failed to parse JSON")?;
    match value {
        serde_json::Value::Array(_) => {
            let rows: Vec<RawRow> =
                serde_json::from_value(value).context("Expected an array of row objects")?;
            Ok(JsonSource::Rows(rows))
        }
        serde_json::Value::Object(_) => {
            let payload: UploadPayload =
                serde_json::from_value(value).context("Failed to parse upload payload")?;
            Ok(JsonSource::Payload(Box::new(payload)))
        }
        _ => bail!("Expected a JSON array of rows or an upload payload object"),
    }
}

/// Read a JSON upload file
pub fn read_json(path: &Path) -> Result<JsonSource> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {}", path.display()))?;
    parse_json(&source).with_context(|| format!("Invalid JSON upload: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::RawValue;

    #[test]
    fn test_parse_row_array() {
        let source = parse_json(r#"[{"Shift": "1st", "Late": 2}, {"Shift": null}]"#).unwrap();
        assert!(source.payload().is_none());
        let rows = source.into_rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Late"), Some(&RawValue::Number(2.0)));
        assert_eq!(rows[1].get("Shift"), Some(&RawValue::Empty));
    }

    #[test]
    fn test_parse_payload() {
        let source = parse_json(
            r#"{"fileType": "horizon", "fileName": "h.xlsx", "reportDate": "2024-01-15",
                "data": [{"Shift": "1st"}]}"#,
        )
        .unwrap();
        let payload = source.payload().unwrap();
        assert_eq!(payload.file_type, "horizon");
        assert_eq!(payload.report_date.as_deref(), Some("2024-01-15"));
        assert_eq!(source.into_rows().len(), 1);
    }

    #[test]
    fn test_rejects_scalars() {
        assert!(parse_json("42").is_err());
        assert!(parse_json("[1, 2]").is_err());
    }

    #[test]
    fn test_read_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(&path, r#"[{"Employee": "A"}]"#).unwrap();
        assert_eq!(read_json(&path).unwrap().into_rows().len(), 1);
    }
}
