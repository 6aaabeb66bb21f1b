//! Header row discovery and validation
//!
//! Exports often carry a few metadata rows (report title, run date) before
//! the real header. The resolver scans forward and accepts the first row
//! whose normalized label set satisfies the schema's match policy.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use super::types::{
    CaseFold, HeaderMatch, HeaderSource, IngestError, LabelStyle, RawRow, ReportSchema, Whitespace,
    collapse_whitespace,
};

static ANNOTATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]").expect("valid annotation pattern"));

/// Normalize one header label according to a schema's label style
pub fn normalize_label(label: &str, style: &LabelStyle) -> String {
    let stripped;
    let mut label = label;
    if style.strip_annotations {
        stripped = ANNOTATION.replace_all(label, " ").into_owned();
        label = &stripped;
    }

    let spaced = match style.whitespace {
        Whitespace::Collapse => collapse_whitespace(label),
        Whitespace::Remove => label.chars().filter(|c| !c.is_whitespace()).collect(),
    };

    match style.case {
        CaseFold::Preserve => spaced,
        CaseFold::Upper => spaced.to_uppercase(),
        CaseFold::Lower => spaced.to_lowercase(),
    }
}

/// Resolved header: which raw key feeds which schema column
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMapping {
    /// Raw key -> normalized label, in raw key order (blank labels omitted)
    pub labels: Vec<(String, String)>,
    /// Index of the header row within the resolved input
    pub header_index: usize,
    /// Index of the first data row
    pub data_offset: usize,
    column_keys: HashMap<String, String>,
}

impl HeaderMapping {
    /// Raw key holding a schema column, if the header carried it
    pub fn key_for(&self, column: &str) -> Option<&str> {
        self.column_keys.get(column).map(|s| s.as_str())
    }

    /// Raw key of the first labelled cell; footer detection looks here
    pub fn first_key(&self) -> Option<&str> {
        self.labels.first().map(|(k, _)| k.as_str())
    }

    /// Number of schema columns the header carries
    pub fn mapped_columns(&self) -> usize {
        self.column_keys.len()
    }
}

/// Locates the header row for one schema
pub struct HeaderResolver<'a> {
    schema: &'a ReportSchema,
    aliases: HashMap<String, String>,
    required: Vec<String>,
}

impl<'a> HeaderResolver<'a> {
    pub fn new(schema: &'a ReportSchema) -> Self {
        let style = &schema.label_style;
        let aliases = schema
            .aliases
            .iter()
            .map(|(alias, canonical)| (normalize_label(alias, style), normalize_label(canonical, style)))
            .collect();

        let mut resolver = Self {
            schema,
            aliases,
            required: Vec::new(),
        };
        resolver.required = schema
            .required_labels()
            .into_iter()
            .map(|label| resolver.canonical(label))
            .collect();
        resolver
    }

    /// Normalize a label and resolve it through the alias table
    pub fn canonical(&self, label: &str) -> String {
        let normalized = normalize_label(label, &self.schema.label_style);
        match self.aliases.get(&normalized) {
            Some(canonical) => canonical.clone(),
            None => normalized,
        }
    }

    /// Candidate labels a row would contribute as a header
    fn candidate_labels(&self, row: &RawRow) -> Vec<(String, String)> {
        let labels = match self.schema.header_source {
            HeaderSource::Keys => row
                .keys()
                .map(|key| (key.to_string(), self.canonical(key)))
                .collect::<Vec<_>>(),
            HeaderSource::Values => row
                .iter()
                .map(|(key, value)| (key.to_string(), self.canonical(&value.to_text())))
                .collect(),
        };
        labels.into_iter().filter(|(_, label)| !label.is_empty()).collect()
    }

    fn missing(&self, received: &HashSet<&str>) -> Vec<String> {
        self.required
            .iter()
            .filter(|label| !received.contains(label.as_str()))
            .cloned()
            .collect()
    }

    /// Required labels appear in the received sequence in order
    fn in_order(&self, labels: &[(String, String)]) -> bool {
        let mut expected = self.required.iter().peekable();
        for (_, label) in labels {
            if expected.peek().is_some_and(|e| *e == label) {
                expected.next();
            }
        }
        expected.peek().is_none()
    }

    /// Find the header row and build the key mapping
    pub fn resolve(&self, rows: &[RawRow]) -> Result<HeaderMapping, IngestError> {
        let report = &self.schema.report_type;
        let mut best_missing: Option<Vec<String>> = None;

        for (index, row) in rows.iter().enumerate() {
            let labels = self.candidate_labels(row);
            if labels.is_empty() {
                continue;
            }
            let received: HashSet<&str> = labels.iter().map(|(_, l)| l.as_str()).collect();
            let missing = self.missing(&received);

            if !missing.is_empty() {
                if best_missing.as_ref().is_none_or(|best| missing.len() < best.len()) {
                    best_missing = Some(missing);
                }
                continue;
            }

            if self.schema.header_match == HeaderMatch::Exact {
                let expected: HashSet<&str> = self.required.iter().map(|s| s.as_str()).collect();
                let mut unexpected: Vec<&str> = Vec::new();
                for (_, label) in &labels {
                    if !expected.contains(label.as_str()) && !unexpected.contains(&label.as_str()) {
                        unexpected.push(label);
                    }
                }
                if !unexpected.is_empty() {
                    return Err(IngestError::schema(
                        report,
                        format!("Unexpected columns: {}", unexpected.join(", ")),
                    ));
                }
            }

            if self.schema.ordered_headers && !self.in_order(&labels) {
                return Err(IngestError::schema(
                    report,
                    format!(
                        "Header columns are out of order. Expected: {}",
                        self.required.join(", ")
                    ),
                ));
            }

            log::debug!("Header row for '{}' found at index {}", report, index);
            return Ok(self.build_mapping(index, labels));
        }

        match best_missing {
            Some(missing) => Err(IngestError::schema(
                report,
                format!("Missing required columns: {}", missing.join(", ")),
            )),
            None => Err(IngestError::schema(report, "Valid header row not found")),
        }
    }

    fn build_mapping(&self, header_index: usize, labels: Vec<(String, String)>) -> HeaderMapping {
        let mut column_keys = HashMap::new();
        for column in &self.schema.columns {
            let wanted = self.canonical(&column.label);
            if let Some((key, _)) = labels.iter().find(|(_, label)| *label == wanted) {
                column_keys.insert(column.name.clone(), key.clone());
            }
        }

        let data_offset = match self.schema.header_source {
            HeaderSource::Keys if self.schema.header_row_is_data => header_index,
            HeaderSource::Keys | HeaderSource::Values => header_index + 1,
        };

        HeaderMapping {
            labels,
            header_index,
            data_offset,
            column_keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::types::{Coercion, RawValue};

    fn keyed_schema() -> ReportSchema {
        ReportSchema::builder("labor", "daily_reports")
            .text("employee", "Employee")
            .column("date", "Date", Coercion::DateFlexible)
            .number("reg_hrs", "Reg. Hrs")
            .label_style(LabelStyle::new(CaseFold::Preserve, Whitespace::Collapse))
            .identifying(&["uploaded_date", "employee"])
            .build()
    }

    fn positional_schema() -> ReportSchema {
        ReportSchema::builder("diversedaily", "diverse_daily_reports")
            .text("employee_name", "EMPLOYEE NAME")
            .text("employee_payroll_id", "EMPLOYEE PAYROLL ID")
            .number("reg", "REG")
            .expected_headers(&["EMPLOYEE NAME", "EMPLOYEE PAYROLL ID"])
            .header_source(HeaderSource::Values)
            .identifying(&["uploaded_date", "employee_payroll_id"])
            .build()
    }

    #[test]
    fn test_normalize_label_styles() {
        let upper = LabelStyle::default();
        assert_eq!(normalize_label("  Employee   name ", &upper), "EMPLOYEE NAME");

        let lower_tight = LabelStyle::new(CaseFold::Lower, Whitespace::Remove);
        assert_eq!(normalize_label("Department  (G3)", &lower_tight), "department(g3)");

        let stripped = LabelStyle::default().with_annotations_stripped();
        assert_eq!(normalize_label("Pay Code [Timecard]", &stripped), "PAY CODE");
    }

    #[test]
    fn test_keyed_header_first_row() {
        let schema = keyed_schema();
        let rows = vec![RawRow::from_pairs([
            ("Employee", RawValue::from("A")),
            ("Date", RawValue::from("2024-01-15")),
            ("Reg.  Hrs", RawValue::from(10)),
            ("Extra", RawValue::from("x")),
        ])];

        let mapping = HeaderResolver::new(&schema).resolve(&rows).unwrap();
        assert_eq!(mapping.header_index, 0);
        assert_eq!(mapping.data_offset, 0);
        assert_eq!(mapping.key_for("reg_hrs"), Some("Reg.  Hrs"));
        assert_eq!(mapping.first_key(), Some("Employee"));
        assert_eq!(mapping.mapped_columns(), 3);
    }

    #[test]
    fn test_positional_header_after_metadata() {
        let schema = positional_schema();
        let rows = vec![
            RawRow::from_pairs([("A", "Weekly Staffing Report"), ("B", "")]),
            RawRow::from_pairs([("A", "Run date: 2024-01-15"), ("B", "")]),
            RawRow::from_pairs([("A", "employee name"), ("B", "Employee Payroll ID"), ("C", "REG")]),
            RawRow::from_pairs([("A", "Smith, A"), ("B", "1001"), ("C", "8")]),
        ];

        let mapping = HeaderResolver::new(&schema).resolve(&rows).unwrap();
        assert_eq!(mapping.header_index, 2);
        assert_eq!(mapping.data_offset, 3);
        assert_eq!(mapping.key_for("employee_payroll_id"), Some("B"));
        assert_eq!(mapping.key_for("reg"), Some("C"));
    }

    #[test]
    fn test_missing_header_reports_best_candidate() {
        let schema = positional_schema();
        let rows = vec![
            RawRow::from_pairs([("A", "Title")]),
            RawRow::from_pairs([("A", "EMPLOYEE NAME"), ("B", "Payroll")]),
        ];

        let err = HeaderResolver::new(&schema).resolve(&rows).unwrap_err();
        match err {
            IngestError::Schema { message, .. } => {
                assert_eq!(message, "Missing required columns: EMPLOYEE PAYROLL ID");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = HeaderResolver::new(&schema).resolve(&[]).unwrap_err();
        assert!(matches!(err, IngestError::Schema { .. }));
    }

    #[test]
    fn test_exact_rejects_unexpected_columns() {
        let mut schema = keyed_schema();
        schema.header_match = HeaderMatch::Exact;
        let rows = vec![RawRow::from_pairs([
            ("Employee", "A"),
            ("Date", "2024-01-15"),
            ("Reg. Hrs", "10"),
            ("Bonus", "5"),
        ])];

        let err = HeaderResolver::new(&schema).resolve(&rows).unwrap_err();
        assert!(err.to_string().contains("Unexpected columns: Bonus"));
    }

    #[test]
    fn test_case_sensitive_schema() {
        let schema = keyed_schema();
        let rows = vec![RawRow::from_pairs([("EMPLOYEE", "A"), ("DATE", "x"), ("REG. HRS", "1")])];
        assert!(HeaderResolver::new(&schema).resolve(&rows).is_err());
    }

    #[test]
    fn test_aliases() {
        let schema = ReportSchema::builder("t", "t")
            .text("employee", "EMPLOYEE")
            .alias("Associate", "Employee")
            .identifying(&["employee"])
            .build();
        let rows = vec![RawRow::from_pairs([("associate", "A")])];

        let mapping = HeaderResolver::new(&schema).resolve(&rows).unwrap();
        assert_eq!(mapping.key_for("employee"), Some("associate"));
    }

    #[test]
    fn test_ordered_headers() {
        let schema = ReportSchema::builder("t", "t")
            .text("a", "A")
            .text("b", "B")
            .exact_headers()
            .ordered_headers()
            .identifying(&["a"])
            .build();

        let ok = vec![RawRow::from_pairs([("A", "1"), ("B", "2")])];
        assert!(HeaderResolver::new(&schema).resolve(&ok).is_ok());

        let swapped = vec![RawRow::from_pairs([("B", "2"), ("A", "1")])];
        let err = HeaderResolver::new(&schema).resolve(&swapped).unwrap_err();
        assert!(err.to_string().contains("out of order"));
    }

    #[test]
    fn test_header_row_excluded_from_data() {
        let schema = ReportSchema::builder("employee_weekly", "employee_weekly")
            .text("pay_code", "Pay Code")
            .label_style(LabelStyle::default().with_annotations_stripped())
            .header_row_is_data(false)
            .identifying(&["pay_code"])
            .build();
        let rows = vec![RawRow::from_pairs([("Pay Code [Timecard]", "REG")])];

        let mapping = HeaderResolver::new(&schema).resolve(&rows).unwrap();
        assert_eq!(mapping.data_offset, 1);
        assert_eq!(mapping.key_for("pay_code"), Some("Pay Code [Timecard]"));
    }
}
