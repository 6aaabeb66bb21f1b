//! Declarative report schema descriptors
//!
//! One `ReportSchema` per report type (and per revision of that type). The
//! engine is generic over these descriptors; adding a report type is a data
//! change, either in the built-in catalogue or in a TOML schema file.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

/// Coercion rule applied to one column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Coercion {
    /// Trimmed text, whitespace collapsed
    #[default]
    String,
    /// Number with currency symbols and separators stripped; anything else is 0
    NumericOrZero,
    /// Exactly `YYYY-MM-DD`; anything else drops the row
    DateStrictIso,
    /// `M/D/Y` or ISO; unparseable becomes null
    DateFlexible,
    /// Spreadsheet serial day number; text falls back to `DateFlexible`
    DateSpreadsheetSerial,
}

impl Coercion {
    /// SQL storage type for the column
    pub fn sql_type(&self) -> &'static str {
        match self {
            Coercion::String => "TEXT",
            Coercion::NumericOrZero => "REAL",
            Coercion::DateStrictIso | Coercion::DateFlexible | Coercion::DateSpreadsheetSerial => {
                "DATE"
            }
        }
    }
}

/// How the discovered header set is compared with the expected one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeaderMatch {
    /// Received set must equal the expected set
    Exact,
    /// Expected labels must be present; extra columns are ignored
    #[default]
    Superset,
}

/// Where header labels live in the raw input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderSource {
    /// Labels are the row keys (keyed layout)
    #[default]
    Keys,
    /// Labels are the cell values of one row (positional layout)
    Values,
}

/// Case policy for label comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseFold {
    /// Case-sensitive comparison
    Preserve,
    #[default]
    Upper,
    Lower,
}

/// Whitespace policy for label comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Whitespace {
    /// Collapse internal runs to one space and trim
    #[default]
    Collapse,
    /// Remove all whitespace
    Remove,
}

/// Label normalization policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelStyle {
    pub case: CaseFold,
    pub whitespace: Whitespace,
    /// Remove bracketed annotations such as `[Timecard]`
    pub strip_annotations: bool,
}

impl LabelStyle {
    pub fn new(case: CaseFold, whitespace: Whitespace) -> Self {
        Self {
            case,
            whitespace,
            strip_annotations: false,
        }
    }

    pub fn with_annotations_stripped(mut self) -> Self {
        self.strip_annotations = true;
        self
    }
}

/// One data column: where it comes from and how it is typed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Storage column name
    pub name: String,
    /// Header label as it appears in the report
    pub label: String,
    #[serde(default)]
    pub coercion: Coercion,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, label: impl Into<String>, coercion: Coercion) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            coercion,
        }
    }
}

/// Storage columns that receive the upload's period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PeriodColumns {
    Single { column: String },
    Range { start: String, end: String },
}

impl PeriodColumns {
    pub fn names(&self) -> Vec<&str> {
        match self {
            PeriodColumns::Single { column } => vec![column.as_str()],
            PeriodColumns::Range { start, end } => vec![start.as_str(), end.as_str()],
        }
    }

    pub fn is_single(&self) -> bool {
        matches!(self, PeriodColumns::Single { .. })
    }
}

impl Default for PeriodColumns {
    fn default() -> Self {
        PeriodColumns::Single {
            column: "uploaded_date".to_string(),
        }
    }
}

/// How a flushed record set is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Conflict-resolving upsert on the identifying fields
    #[default]
    Upsert,
    /// Delete the period's rows, then upsert, in the same transaction
    ReplacePeriod,
}

/// Summary row detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FooterRule {
    /// Substring of the first cell that marks a summary row
    pub marker: String,
    /// Whether an empty first cell also ends the data block
    pub stop_on_empty: bool,
}

impl Default for FooterRule {
    fn default() -> Self {
        Self {
            marker: "TOTAL".to_string(),
            stop_on_empty: true,
        }
    }
}

fn default_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Immutable descriptor of one report type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSchema {
    /// Type tag used by the transport layer
    pub report_type: String,
    /// Revision; each revision is an independent schema
    #[serde(default = "default_version")]
    pub version: u32,
    /// Target table
    pub table: String,
    /// Data columns in storage order
    pub columns: Vec<ColumnSpec>,
    /// Labels the header row must carry (defaults to every column label)
    #[serde(default)]
    pub expected_headers: Vec<String>,
    #[serde(default)]
    pub header_match: HeaderMatch,
    /// Whether the header must list the expected labels in order
    #[serde(default)]
    pub ordered_headers: bool,
    #[serde(default)]
    pub header_source: HeaderSource,
    /// Keyed layout only: whether the row whose keys matched is itself data
    #[serde(default = "default_true")]
    pub header_row_is_data: bool,
    #[serde(default)]
    pub label_style: LabelStyle,
    /// Alternate label -> canonical label
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub period: PeriodColumns,
    /// Date column whose value, when present, replaces the single period
    /// column of that row
    #[serde(default)]
    pub period_override: Option<String>,
    /// Column receiving the uploader identity, if the table has one
    #[serde(default)]
    pub uploader_column: Option<String>,
    /// Composite natural key; the conflict target for upserts and the
    /// fields every admitted row must carry
    pub identifying: Vec<String>,
    /// Columns overwritten on conflict
    #[serde(default)]
    pub mutable: Vec<String>,
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default)]
    pub footer: Option<FooterRule>,
    /// Whether an upload with no admissible rows is an error
    #[serde(default)]
    pub reject_if_empty: bool,
}

impl ReportSchema {
    /// Start a schema for `report_type` stored in `table`
    pub fn builder(report_type: impl Into<String>, table: impl Into<String>) -> ReportSchemaBuilder {
        ReportSchemaBuilder::new(report_type, table)
    }

    /// Every storage column written by an upsert, in statement order
    ///
    /// Period columns first, then data columns, then the uploader column.
    pub fn storage_columns(&self) -> Vec<String> {
        let mut out: Vec<String> = self.period.names().into_iter().map(String::from).collect();
        out.extend(self.columns.iter().map(|c| c.name.clone()));
        if let Some(uploader) = &self.uploader_column {
            out.push(uploader.clone());
        }
        out
    }

    /// Labels the header row must carry
    pub fn required_labels(&self) -> Vec<&str> {
        if self.expected_headers.is_empty() {
            self.columns.iter().map(|c| c.label.as_str()).collect()
        } else {
            self.expected_headers.iter().map(|s| s.as_str()).collect()
        }
    }

    /// Find a data column by storage name
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// SQL type of a storage column
    pub fn sql_type_of(&self, name: &str) -> &'static str {
        if self.period.names().contains(&name) {
            return "DATE";
        }
        self.column(name).map(|c| c.coercion.sql_type()).unwrap_or("TEXT")
    }

    /// Check internal consistency
    ///
    /// Names are interpolated into SQL, so they must be plain identifiers.
    pub fn validate(&self) -> Result<(), String> {
        if self.report_type.trim().is_empty() {
            return Err("report_type cannot be empty".to_string());
        }
        if !is_identifier(&self.table) {
            return Err(format!("table name '{}' is not a valid identifier", self.table));
        }
        if self.columns.is_empty() {
            return Err(format!("schema '{}' declares no columns", self.report_type));
        }

        let storage = self.storage_columns();
        let mut seen = HashSet::new();
        for name in &storage {
            if !is_identifier(name) {
                return Err(format!("column name '{}' is not a valid identifier", name));
            }
            if RESERVED_COLUMNS.contains(&name.as_str()) {
                return Err(format!("column name '{}' is reserved", name));
            }
            if !seen.insert(name.as_str()) {
                return Err(format!("column '{}' is declared more than once", name));
            }
        }

        if self.identifying.is_empty() {
            return Err(format!("schema '{}' has no identifying fields", self.report_type));
        }
        for field in &self.identifying {
            if !seen.contains(field.as_str()) {
                return Err(format!("identifying field '{}' is not a storage column", field));
            }
        }
        for field in &self.mutable {
            if !seen.contains(field.as_str()) {
                return Err(format!("mutable field '{}' is not a storage column", field));
            }
            if self.identifying.contains(field) {
                return Err(format!("field '{}' cannot be both identifying and mutable", field));
            }
        }

        if let Some(name) = &self.period_override {
            if !self.period.is_single() {
                return Err(format!("period override '{}' needs a single period column", name));
            }
            if self.write_mode == WriteMode::ReplacePeriod {
                return Err(format!("period override '{}' cannot be used with replace_period", name));
            }
            match self.column(name).map(|c| c.coercion) {
                Some(Coercion::DateStrictIso | Coercion::DateFlexible | Coercion::DateSpreadsheetSerial) => {}
                Some(_) => return Err(format!("period override '{}' is not a date column", name)),
                None => return Err(format!("period override '{}' is not a data column", name)),
            }
        }

        let labels: HashSet<&str> = self.columns.iter().map(|c| c.label.as_str()).collect();
        if self.header_match == HeaderMatch::Exact {
            for label in self.required_labels() {
                if !labels.contains(label) {
                    return Err(format!(
                        "expected header '{}' has no column under exact matching",
                        label
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Columns every report table carries, never written by ingestion
pub const RESERVED_COLUMNS: &[&str] = &["id", "file_uploaded_at"];

/// Plain SQL identifier: ASCII letter or underscore, then alphanumerics/underscores
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Builder for `ReportSchema`
#[derive(Debug, Clone)]
pub struct ReportSchemaBuilder {
    schema: ReportSchema,
    mutable_all: bool,
}

impl ReportSchemaBuilder {
    pub fn new(report_type: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: ReportSchema {
                report_type: report_type.into(),
                version: 1,
                table: table.into(),
                columns: Vec::new(),
                expected_headers: Vec::new(),
                header_match: HeaderMatch::Superset,
                ordered_headers: false,
                header_source: HeaderSource::Keys,
                header_row_is_data: true,
                label_style: LabelStyle::default(),
                aliases: BTreeMap::new(),
                period: PeriodColumns::default(),
                period_override: None,
                uploader_column: None,
                identifying: Vec::new(),
                mutable: Vec::new(),
                write_mode: WriteMode::Upsert,
                footer: None,
                reject_if_empty: false,
            },
            mutable_all: false,
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.schema.version = version;
        self
    }

    pub fn column(mut self, name: &str, label: &str, coercion: Coercion) -> Self {
        self.schema.columns.push(ColumnSpec::new(name, label, coercion));
        self
    }

    /// Text column
    pub fn text(self, name: &str, label: &str) -> Self {
        self.column(name, label, Coercion::String)
    }

    /// Numeric-or-zero column
    pub fn number(self, name: &str, label: &str) -> Self {
        self.column(name, label, Coercion::NumericOrZero)
    }

    pub fn expected_headers(mut self, labels: &[&str]) -> Self {
        self.schema.expected_headers = labels.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn exact_headers(mut self) -> Self {
        self.schema.header_match = HeaderMatch::Exact;
        self
    }

    pub fn ordered_headers(mut self) -> Self {
        self.schema.ordered_headers = true;
        self
    }

    pub fn header_source(mut self, source: HeaderSource) -> Self {
        self.schema.header_source = source;
        self
    }

    pub fn header_row_is_data(mut self, is_data: bool) -> Self {
        self.schema.header_row_is_data = is_data;
        self
    }

    pub fn label_style(mut self, style: LabelStyle) -> Self {
        self.schema.label_style = style;
        self
    }

    pub fn alias(mut self, alias: &str, canonical: &str) -> Self {
        self.schema.aliases.insert(alias.to_string(), canonical.to_string());
        self
    }

    pub fn single_period(mut self, column: &str) -> Self {
        self.schema.period = PeriodColumns::Single {
            column: column.to_string(),
        };
        self
    }

    pub fn range_period(mut self, start: &str, end: &str) -> Self {
        self.schema.period = PeriodColumns::Range {
            start: start.to_string(),
            end: end.to_string(),
        };
        self
    }

    pub fn period_override(mut self, column: &str) -> Self {
        self.schema.period_override = Some(column.to_string());
        self
    }

    pub fn uploader_column(mut self, column: &str) -> Self {
        self.schema.uploader_column = Some(column.to_string());
        self
    }

    pub fn identifying(mut self, fields: &[&str]) -> Self {
        self.schema.identifying = fields.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn mutable(mut self, fields: &[&str]) -> Self {
        self.schema.mutable = fields.iter().map(|s| s.to_string()).collect();
        self.mutable_all = false;
        self
    }

    /// Every storage column outside the identifying set is mutable
    pub fn mutable_all(mut self) -> Self {
        self.mutable_all = true;
        self
    }

    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.schema.write_mode = mode;
        self
    }

    pub fn footer(mut self, rule: FooterRule) -> Self {
        self.schema.footer = Some(rule);
        self
    }

    pub fn reject_if_empty(mut self) -> Self {
        self.schema.reject_if_empty = true;
        self
    }

    pub fn build(mut self) -> ReportSchema {
        if self.mutable_all {
            let identifying = self.schema.identifying.clone();
            self.schema.mutable = self
                .schema
                .storage_columns()
                .into_iter()
                .filter(|c| !identifying.contains(c))
                .collect();
        }
        self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ReportSchema {
        ReportSchema::builder("labor", "daily_reports")
            .text("employee", "Employee")
            .column("date", "Date", Coercion::DateFlexible)
            .number("reg_hrs", "Reg. Hrs")
            .single_period("uploaded_date")
            .uploader_column("uploaded_by")
            .identifying(&["uploaded_date", "employee"])
            .mutable_all()
            .build()
    }

    #[test]
    fn test_storage_columns_order() {
        let schema = sample();
        assert_eq!(
            schema.storage_columns(),
            vec!["uploaded_date", "employee", "date", "reg_hrs", "uploaded_by"]
        );
    }

    #[test]
    fn test_mutable_all_excludes_identifying() {
        let schema = sample();
        assert_eq!(schema.mutable, vec!["date", "reg_hrs", "uploaded_by"]);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_identifiers() {
        let mut schema = sample();
        schema.table = "daily reports; DROP".to_string();
        assert!(schema.validate().is_err());

        let mut schema = sample();
        schema.identifying = vec!["nope".to_string()];
        assert!(schema.validate().is_err());

        let mut schema = sample();
        schema.mutable.push("employee".to_string());
        assert!(schema.validate().is_err());

        let mut schema = sample();
        schema.columns.push(ColumnSpec::new("id", "Id", Coercion::String));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_validate_period_override() {
        let mut schema = sample();
        schema.period_override = Some("date".to_string());
        assert!(schema.validate().is_ok());

        schema.period_override = Some("reg_hrs".to_string());
        assert!(schema.validate().unwrap_err().contains("not a date column"));

        schema.period_override = Some("date".to_string());
        schema.write_mode = WriteMode::ReplacePeriod;
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_sql_types() {
        let schema = sample();
        assert_eq!(schema.sql_type_of("uploaded_date"), "DATE");
        assert_eq!(schema.sql_type_of("reg_hrs"), "REAL");
        assert_eq!(schema.sql_type_of("employee"), "TEXT");
        assert_eq!(schema.sql_type_of("uploaded_by"), "TEXT");
    }

    #[test]
    fn test_required_labels_default_to_columns() {
        let schema = sample();
        assert_eq!(schema.required_labels(), vec!["Employee", "Date", "Reg. Hrs"]);
    }

    #[test]
    fn test_deserialize_from_toml() {
        let toml_src = r#"
            report_type = "shifts"
            table = "shift_reports"
            identifying = ["uploaded_date", "shift"]
            mutable = ["hours"]
            header_match = "EXACT"

            [[columns]]
            name = "shift"
            label = "Shift"

            [[columns]]
            name = "hours"
            label = "Hours"
            coercion = "NUMERIC_OR_ZERO"

            [label_style]
            case = "preserve"
        "#;
        let schema: ReportSchema = toml::from_str(toml_src).unwrap();
        assert_eq!(schema.version, 1);
        assert_eq!(schema.header_match, HeaderMatch::Exact);
        assert_eq!(schema.columns[1].coercion, Coercion::NumericOrZero);
        assert_eq!(schema.label_style.case, CaseFold::Preserve);
        assert_eq!(schema.label_style.whitespace, Whitespace::Collapse);
        assert!(schema.header_row_is_data);
        assert_eq!(
            schema.period,
            PeriodColumns::Single {
                column: "uploaded_date".to_string()
            }
        );
        assert!(schema.validate().is_ok());
    }
}
