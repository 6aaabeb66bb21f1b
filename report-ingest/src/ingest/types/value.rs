//! Typed cell values produced by row normalization

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A normalized value, ready to be bound into a storage statement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// Null/empty value
    #[default]
    Null,
    /// Trimmed text
    Text(String),
    /// Numeric value (hours, pay, counts)
    Number(f64),
    /// Calendar date without time zone
    Date(NaiveDate),
}

impl Value {
    /// Check if this value counts as empty for key admission
    ///
    /// Null and blank text are empty. Numbers and dates never are.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            Value::Number(_) | Value::Date(_) => false,
        }
    }

    /// Stable textual form used when comparing identifying-key tuples
    pub fn key_fragment(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Text(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
        }
    }
}

/// Render a number without a trailing `.0` when it is whole
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "(null)"),
            Value::Text(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_empty() {
        assert!(Value::Null.is_empty());
        assert!(Value::Text("   ".to_string()).is_empty());
        assert!(!Value::Text("A".to_string()).is_empty());
        assert!(!Value::Number(0.0).is_empty());
    }

    #[test]
    fn test_key_fragment_whole_numbers() {
        assert_eq!(Value::Number(12.0).key_fragment(), "12");
        assert_eq!(Value::Number(12.5).key_fragment(), "12.5");
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(Value::Date(date).key_fragment(), "2024-01-15");
    }

    #[test]
    fn test_default_is_null() {
        assert_eq!(Value::default(), Value::Null);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "(null)");
        assert_eq!(Value::from("x").to_string(), "x");
    }
}
