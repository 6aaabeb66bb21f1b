//! Untyped rows as delivered by the transport layer

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};

use super::value::format_number;

/// A single untyped cell
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Missing or null cell
    Empty,
    /// Text cell (untrimmed, as received)
    Text(String),
    /// Numeric cell (spreadsheet dates arrive as serial numbers)
    Number(f64),
    /// Boolean cell
    Bool(bool),
}

impl RawValue {
    /// Check if the cell is empty or whitespace-only
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Text(s) => s.trim().is_empty(),
            RawValue::Number(_) | RawValue::Bool(_) => false,
        }
    }

    /// Stringify the cell, collapsing internal whitespace and trimming
    pub fn to_text(&self) -> String {
        match self {
            RawValue::Empty => String::new(),
            RawValue::Text(s) => collapse_whitespace(s),
            RawValue::Number(n) => format_number(*n),
            RawValue::Bool(b) => b.to_string(),
        }
    }

    /// Build from a JSON scalar
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => RawValue::Empty,
            serde_json::Value::Bool(b) => RawValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_f64() {
                Some(f) => RawValue::Number(f),
                None => RawValue::Text(n.to_string()),
            },
            serde_json::Value::String(s) => RawValue::Text(s.clone()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                RawValue::Text(json.to_string())
            }
        }
    }

    /// Convert back to JSON
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RawValue::Empty => serde_json::Value::Null,
            RawValue::Text(s) => serde_json::Value::String(s.clone()),
            RawValue::Number(n) => serde_json::json!(*n),
            RawValue::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<i64> for RawValue {
    fn from(n: i64) -> Self {
        RawValue::Number(n as f64)
    }
}

impl From<i32> for RawValue {
    fn from(n: i32) -> Self {
        RawValue::Number(n as f64)
    }
}

/// Ordered mapping of column key to untyped cell
///
/// Keys are either column labels (keyed layout) or positional keys such as
/// spreadsheet column letters (positional layout). Insertion order is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: Vec<(String, RawValue)>,
}

impl RawRow {
    /// Create an empty row
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from key/value pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<RawValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut row = RawRow::new();
        for (key, value) in pairs {
            row.push(key, value);
        }
        row
    }

    /// Append a cell; a repeated key replaces the earlier value in place
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<RawValue>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.cells.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.cells.push((key, value));
        }
    }

    /// Look up a cell by key
    pub fn get(&self, key: &str) -> Option<&RawValue> {
        self.cells.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(k, _)| k.as_str())
    }

    /// Iterate over (key, value) in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawValue)> {
        self.cells.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the row has no cells
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Check if every cell is blank
    pub fn is_blank(&self) -> bool {
        self.cells.iter().all(|(_, v)| v.is_blank())
    }

    /// Build from a JSON object, keeping key order
    pub fn from_json_object(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut row = RawRow::new();
        for (key, value) in map {
            row.push(key.clone(), RawValue::from_json(value));
        }
        row
    }
}

impl<'de> Deserialize<'de> for RawRow {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
        Ok(RawRow::from_json_object(&map))
    }
}

impl Serialize for RawRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (key, value) in &self.cells {
            map.serialize_entry(key, &value.to_json())?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_text_collapses_whitespace() {
        let value = RawValue::from("  Shift   (G4) ");
        assert_eq!(value.to_text(), "Shift (G4)");
        assert_eq!(RawValue::Number(10.0).to_text(), "10");
        assert_eq!(RawValue::Number(10.25).to_text(), "10.25");
    }

    #[test]
    fn test_deserialize_keeps_key_order() {
        let row: RawRow =
            serde_json::from_str(r#"{"Zeta": 1, "Alpha": "x", "Mid": null}"#).unwrap();
        let keys: Vec<_> = row.keys().collect();
        assert_eq!(keys, vec!["Zeta", "Alpha", "Mid"]);
        assert_eq!(row.get("Zeta"), Some(&RawValue::Number(1.0)));
        assert_eq!(row.get("Mid"), Some(&RawValue::Empty));
    }

    #[test]
    fn test_blank_row() {
        let row = RawRow::from_pairs([("A", RawValue::Empty), ("B", RawValue::from("  "))]);
        assert!(row.is_blank());

        let row = RawRow::from_pairs([("A", RawValue::Empty), ("B", RawValue::from(0))]);
        assert!(!row.is_blank());
    }

    #[test]
    fn test_push_replaces_duplicate_key() {
        let mut row = RawRow::new();
        row.push("A", "one");
        row.push("B", "two");
        row.push("A", "three");
        assert_eq!(row.len(), 2);
        assert_eq!(row.get("A"), Some(&RawValue::from("three")));
    }
}
