//! Row normalization
//!
//! Turns raw rows past the header into typed records. Rows are dropped, not
//! rejected, when they are blank or lack an identifying value. A footer row
//! ends the data block: it and everything after it is ignored.

pub mod coerce;

use super::header::HeaderMapping;
use super::types::{
    IngestError, NormalizedRecord, Period, PeriodColumns, RawRow, RawValue, ReportSchema, RowIssue,
    UploadContext, Value,
};

/// Values injected into the period columns, or `None` when the period shape
/// does not fit the schema
pub fn period_values(columns: &PeriodColumns, period: &Period) -> Option<Vec<(String, Value)>> {
    match (columns, period) {
        (PeriodColumns::Single { column }, Period::Day { date }) => {
            Some(vec![(column.clone(), Value::Date(*date))])
        }
        (PeriodColumns::Range { start, end }, Period::Range { start: from, end: to }) => Some(vec![
            (start.clone(), Value::Date(*from)),
            (end.clone(), Value::Date(*to)),
        ]),
        _ => None,
    }
}

/// Result of normalizing one raw row
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Record(NormalizedRecord),
    Dropped(RowIssue),
    /// Summary row; stop consuming this input
    Footer,
}

/// Records and counters produced from one run of rows
#[derive(Debug, Clone, Default)]
pub struct NormalizedBlock {
    pub records: Vec<NormalizedRecord>,
    /// Rows examined, up to and including a footer row
    pub rows_seen: usize,
    /// Row position within the block, and why it was dropped
    pub issues: Vec<(usize, RowIssue)>,
    pub footer_reached: bool,
}

impl NormalizedBlock {
    pub fn dropped(&self) -> usize {
        self.issues.len()
    }
}

/// Normalizes rows for one schema, header mapping and upload context
pub struct RowNormalizer<'a> {
    schema: &'a ReportSchema,
    mapping: &'a HeaderMapping,
    injected: Vec<(String, Value)>,
}

impl<'a> RowNormalizer<'a> {
    pub fn new(
        schema: &'a ReportSchema,
        mapping: &'a HeaderMapping,
        ctx: &UploadContext,
    ) -> Result<Self, IngestError> {
        let mut injected = period_values(&schema.period, &ctx.period).ok_or_else(|| {
            IngestError::validation(format!(
                "Report type '{}' expects {} but received period {}",
                schema.report_type,
                describe_period(&schema.period),
                ctx.period
            ))
        })?;
        if let Some(column) = &schema.uploader_column {
            injected.push((column.clone(), Value::Text(ctx.uploaded_by.clone())));
        }

        Ok(Self {
            schema,
            mapping,
            injected,
        })
    }

    fn is_footer(&self, row: &RawRow) -> bool {
        let Some(rule) = &self.schema.footer else {
            return false;
        };
        let text = self
            .mapping
            .first_key()
            .and_then(|key| row.get(key))
            .map(RawValue::to_text)
            .unwrap_or_default();
        if text.is_empty() {
            return rule.stop_on_empty;
        }
        !rule.marker.is_empty() && text.contains(&rule.marker)
    }

    /// A row carrying its own date moves to that day
    fn apply_period_override(&self, record: &mut NormalizedRecord) {
        let (Some(source), PeriodColumns::Single { column }) =
            (&self.schema.period_override, &self.schema.period)
        else {
            return;
        };
        if let Some(Value::Date(date)) = record.get(source) {
            let date = *date;
            record.insert(column.clone(), Value::Date(date));
        }
    }

    /// Normalize one raw row
    pub fn normalize_row(&self, row: &RawRow) -> RowOutcome {
        if row.is_blank() {
            return RowOutcome::Dropped(RowIssue::BlankRow);
        }
        if self.is_footer(row) {
            return RowOutcome::Footer;
        }

        let mut record = NormalizedRecord::new();
        for column in &self.schema.columns {
            let raw = self.mapping.key_for(&column.name).and_then(|key| row.get(key));
            match coerce::coerce(&column.name, column.coercion, raw) {
                Ok(value) => record.insert(column.name.clone(), value),
                Err(issue) => return RowOutcome::Dropped(issue),
            }
        }
        for (column, value) in &self.injected {
            record.insert(column.clone(), value.clone());
        }
        self.apply_period_override(&mut record);

        if let Some(field) = record.first_empty(&self.schema.identifying) {
            return RowOutcome::Dropped(RowIssue::MissingIdentifier {
                field: field.to_string(),
            });
        }

        RowOutcome::Record(record)
    }

    /// Normalize a run of data rows, stopping at the first footer row
    pub fn normalize_block(&self, rows: &[RawRow]) -> NormalizedBlock {
        let mut block = NormalizedBlock::default();

        for (index, row) in rows.iter().enumerate() {
            block.rows_seen += 1;
            match self.normalize_row(row) {
                RowOutcome::Record(record) => block.records.push(record),
                RowOutcome::Dropped(issue) => {
                    log::debug!(
                        "Dropping row {} of '{}': {}",
                        index,
                        self.schema.report_type,
                        issue
                    );
                    block.issues.push((index, issue));
                }
                RowOutcome::Footer => {
                    log::debug!(
                        "Footer row at {} ends '{}' data block",
                        index,
                        self.schema.report_type
                    );
                    block.footer_reached = true;
                    break;
                }
            }
        }

        block
    }
}

fn describe_period(columns: &PeriodColumns) -> &'static str {
    match columns {
        PeriodColumns::Single { .. } => "a reportDate",
        PeriodColumns::Range { .. } => "a startDate/endDate range",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::header::HeaderResolver;
    use crate::ingest::types::{CaseFold, Coercion, FooterRule, LabelStyle, Whitespace};
    use chrono::NaiveDate;

    fn schema(footer: Option<FooterRule>) -> ReportSchema {
        let mut builder = ReportSchema::builder("labor", "daily_reports")
            .text("employee", "Employee")
            .column("date", "Date", Coercion::DateFlexible)
            .number("reg_hrs", "Reg. Hrs")
            .column("paid_on", "Paid On", Coercion::DateStrictIso)
            .label_style(LabelStyle::new(CaseFold::Preserve, Whitespace::Collapse))
            .expected_headers(&["Employee", "Date", "Reg. Hrs"])
            .single_period("uploaded_date")
            .uploader_column("uploaded_by")
            .identifying(&["uploaded_date", "employee"])
            .mutable_all();
        if let Some(rule) = footer {
            builder = builder.footer(rule);
        }
        builder.build()
    }

    fn ctx() -> UploadContext {
        UploadContext::new("labor.xlsx", Period::day("2024-01-15").unwrap(), "ops@example.com")
    }

    fn row(employee: &str, hours: f64) -> RawRow {
        RawRow::from_pairs([
            ("Employee", RawValue::from(employee)),
            ("Date", RawValue::from("1/15/2024")),
            ("Reg. Hrs", RawValue::from(hours)),
        ])
    }

    fn normalize(schema: &ReportSchema, rows: &[RawRow]) -> NormalizedBlock {
        let mapping = HeaderResolver::new(schema).resolve(rows).unwrap();
        let ctx = ctx();
        let normalizer = RowNormalizer::new(schema, &mapping, &ctx).unwrap();
        normalizer.normalize_block(&rows[mapping.data_offset..])
    }

    #[test]
    fn test_record_carries_injected_context() {
        let schema = schema(None);
        let block = normalize(&schema, &[row("A", 10.0)]);

        assert_eq!(block.records.len(), 1);
        let record = &block.records[0];
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(record.get("uploaded_date"), Some(&Value::Date(day)));
        assert_eq!(record.get("date"), Some(&Value::Date(day)));
        assert_eq!(record.get("reg_hrs"), Some(&Value::Number(10.0)));
        assert_eq!(record.get("uploaded_by"), Some(&Value::from("ops@example.com")));
        assert_eq!(record.get("paid_on"), Some(&Value::Null));
    }

    #[test]
    fn test_missing_identifier_dropped_rest_continue() {
        let schema = schema(None);
        let rows = vec![row("A", 1.0), row("  ", 2.0), row("B", 3.0)];
        let block = normalize(&schema, &rows);

        assert_eq!(block.records.len(), 2);
        assert_eq!(
            block.issues,
            vec![(
                1,
                RowIssue::MissingIdentifier {
                    field: "employee".to_string()
                }
            )]
        );
    }

    #[test]
    fn test_footer_total_halts_block() {
        let schema = schema(Some(FooterRule {
            marker: "TOTAL".to_string(),
            stop_on_empty: false,
        }));
        let rows = vec![row("A", 1.0), row("TOTAL", 9.0), row("B", 3.0)];
        let block = normalize(&schema, &rows);

        assert_eq!(block.records.len(), 1);
        assert!(block.footer_reached);
        assert_eq!(block.rows_seen, 2);
    }

    #[test]
    fn test_footer_on_empty_first_cell() {
        let schema = schema(Some(FooterRule::default()));
        let mut gap = row("", 0.0);
        gap.push("Reg. Hrs", RawValue::from(40));
        let rows = vec![row("A", 1.0), gap, row("B", 3.0)];
        let block = normalize(&schema, &rows);

        assert_eq!(block.records.len(), 1);
        assert!(block.footer_reached);
    }

    #[test]
    fn test_blank_rows_are_skipped_not_terminal() {
        let schema = schema(Some(FooterRule::default()));
        let blank = RawRow::from_pairs([("Employee", RawValue::Empty), ("Reg. Hrs", RawValue::from(" "))]);
        let rows = vec![row("A", 1.0), blank, row("B", 3.0)];
        let block = normalize(&schema, &rows);

        assert_eq!(block.records.len(), 2);
        assert_eq!(block.issues, vec![(1, RowIssue::BlankRow)]);
    }

    #[test]
    fn test_invalid_strict_date_drops_row() {
        let schema = schema(None);
        let mut bad = row("A", 1.0);
        bad.push("Paid On", "15/01/2024");
        let block = normalize(&schema, &[bad, row("B", 2.0)]);

        assert_eq!(block.records.len(), 1);
        assert!(matches!(block.issues[0].1, RowIssue::InvalidDate { .. }));
    }

    #[test]
    fn test_row_date_overrides_report_date() {
        let mut schema = schema(None);
        schema.period_override = Some("date".to_string());
        let mut undated = row("B", 2.0);
        undated.push("Date", RawValue::Empty);
        let block = normalize(&schema, &[row("A", 1.0), undated]);

        let mut other_day = row("C", 3.0);
        other_day.push("Date", "1/16/2024");
        let later = normalize(&schema, &[other_day]);

        let day = |d| Value::Date(NaiveDate::from_ymd_opt(2024, 1, d).unwrap());
        assert_eq!(block.records[0].get("uploaded_date"), Some(&day(15)));
        assert_eq!(block.records[1].get("uploaded_date"), Some(&day(15)));
        assert_eq!(later.records[0].get("uploaded_date"), Some(&day(16)));
    }

    #[test]
    fn test_period_shape_mismatch() {
        let schema = schema(None);
        let mapping = HeaderResolver::new(&schema).resolve(&[row("A", 1.0)]).unwrap();
        let ctx = UploadContext::new(
            "x.xlsx",
            Period::range("2024-01-01", "2024-01-07").unwrap(),
            "u",
        );
        assert!(matches!(
            RowNormalizer::new(&schema, &mapping, &ctx),
            Err(IngestError::Validation(_))
        ));
    }
}
