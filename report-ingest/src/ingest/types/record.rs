//! Normalized records and the context injected into them

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{IngestError, Value};
use crate::ingest::normalize::coerce::parse_strict_iso;

/// Reporting period of one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Period {
    /// Daily reports carry one report date
    Day { date: NaiveDate },
    /// Weekly reports carry a start/end pair
    Range { start: NaiveDate, end: NaiveDate },
}

impl Period {
    /// Parse a single `YYYY-MM-DD` report date
    pub fn day(date: &str) -> Result<Self, IngestError> {
        let date = parse_period_date(date, "reportDate")?;
        Ok(Period::Day { date })
    }

    /// Parse a `YYYY-MM-DD` start/end pair
    pub fn range(start: &str, end: &str) -> Result<Self, IngestError> {
        let start = parse_period_date(start, "startDate")?;
        let end = parse_period_date(end, "endDate")?;
        if start > end {
            return Err(IngestError::validation(format!(
                "startDate {} is after endDate {}",
                start, end
            )));
        }
        Ok(Period::Range { start, end })
    }

    /// Check if this is a single-date period
    pub fn is_day(&self) -> bool {
        matches!(self, Period::Day { .. })
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Period::Day { date } => write!(f, "{}", date),
            Period::Range { start, end } => write!(f, "{}..{}", start, end),
        }
    }
}

fn parse_period_date(raw: &str, field: &str) -> Result<NaiveDate, IngestError> {
    parse_strict_iso(raw.trim()).ok_or_else(|| {
        IngestError::validation(format!(
            "Invalid {} format: \"{}\". Expected format: YYYY-MM-DD.",
            field, raw
        ))
    })
}

/// Context shared by every record of one upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadContext {
    /// File name; also the chunk-session key
    pub file_name: String,
    /// Reporting period injected into period columns
    pub period: Period,
    /// Already-resolved uploader identity
    pub uploaded_by: String,
}

impl UploadContext {
    pub fn new(file_name: impl Into<String>, period: Period, uploaded_by: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            period,
            uploaded_by: uploaded_by.into(),
        }
    }
}

/// Position of one delivery within a chunked upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkInfo {
    pub index: usize,
    pub total: usize,
    pub is_last: bool,
}

impl ChunkInfo {
    pub fn new(index: usize, total: usize, is_last: bool) -> Self {
        Self {
            index,
            total,
            is_last,
        }
    }
}

/// One typed row keyed by storage column name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord {
    values: BTreeMap<String, Value>,
}

impl NormalizedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Value for a column, `Null` when absent
    pub fn value_or_null(&self, column: &str) -> Value {
        self.values.get(column).cloned().unwrap_or(Value::Null)
    }

    /// Textual identity over the given key columns
    pub fn identity(&self, key_columns: &[String]) -> Vec<String> {
        key_columns
            .iter()
            .map(|c| self.values.get(c).map(Value::key_fragment).unwrap_or_default())
            .collect()
    }

    /// First key column that is missing or empty
    pub fn first_empty<'a>(&self, key_columns: &'a [String]) -> Option<&'a str> {
        key_columns
            .iter()
            .find(|c| self.values.get(c.as_str()).is_none_or(Value::is_empty))
            .map(|c| c.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_day() {
        let period = Period::day("2024-01-15").unwrap();
        assert_eq!(
            period,
            Period::Day {
                date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
            }
        );
        assert!(period.is_day());
    }

    #[test]
    fn test_period_rejects_malformed_dates() {
        assert!(matches!(Period::day("01/15/2024"), Err(IngestError::Validation(_))));
        assert!(matches!(Period::day("2024-02-30"), Err(IngestError::Validation(_))));
        assert!(matches!(Period::day(""), Err(IngestError::Validation(_))));
    }

    #[test]
    fn test_period_range_order() {
        assert!(Period::range("2024-01-01", "2024-01-07").is_ok());
        assert!(Period::range("2024-01-07", "2024-01-07").is_ok());
        assert!(matches!(
            Period::range("2024-01-08", "2024-01-07"),
            Err(IngestError::Validation(_))
        ));
    }

    #[test]
    fn test_record_identity_and_first_empty() {
        let mut record = NormalizedRecord::new();
        record.insert("employee", Value::from("A"));
        record.insert("uploaded_date", Value::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()));
        record.insert("shift", Value::Text(String::new()));

        let keys = vec!["uploaded_date".to_string(), "employee".to_string()];
        assert_eq!(record.identity(&keys), vec!["2024-01-15", "A"]);
        assert_eq!(record.first_empty(&keys), None);

        let keys = vec!["employee".to_string(), "shift".to_string(), "missing".to_string()];
        assert_eq!(record.first_empty(&keys), Some("shift"));
    }

    #[test]
    fn test_chunk_info_deserialize() {
        let chunk: ChunkInfo =
            serde_json::from_str(r#"{"index": 2, "total": 3, "isLast": true}"#).unwrap();
        assert_eq!(chunk, ChunkInfo::new(2, 3, true));
    }
}
