//! Per-column coercion rules
//!
//! Numeric coercion never fails. Strict ISO dates are the only rule that can
//! reject a cell; the flexible and serial date rules degrade to null.

use chrono::{Days, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ingest::types::{Coercion, RawValue, RowIssue, Value};

static STRICT_ISO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid ISO date pattern"));

static MONTH_DAY_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{2}|\d{4})$").expect("valid M/D/Y pattern")
});

static ISO_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ].*)?$").expect("valid ISO prefix pattern")
});

static EMPTY_CELL: RawValue = RawValue::Empty;

/// Epoch of the spreadsheet serial-day encoding
fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).unwrap_or_default()
}

/// Apply a column's coercion rule to one raw cell
///
/// Only `DateStrictIso` can fail, and only for a non-empty cell.
pub fn coerce(column: &str, coercion: Coercion, raw: Option<&RawValue>) -> Result<Value, RowIssue> {
    let raw = raw.unwrap_or(&EMPTY_CELL);
    match coercion {
        Coercion::String => Ok(coerce_string(raw)),
        Coercion::NumericOrZero => Ok(Value::Number(coerce_number(raw))),
        Coercion::DateStrictIso => coerce_strict_date(column, raw),
        Coercion::DateFlexible => Ok(date_or_null(parse_flexible_raw(raw))),
        Coercion::DateSpreadsheetSerial => Ok(date_or_null(coerce_serial(raw))),
    }
}

fn date_or_null(date: Option<NaiveDate>) -> Value {
    date.map(Value::Date).unwrap_or(Value::Null)
}

/// Trimmed, whitespace-collapsed text; blank becomes null
pub fn coerce_string(raw: &RawValue) -> Value {
    if raw.is_blank() {
        Value::Null
    } else {
        Value::Text(raw.to_text())
    }
}

/// Parse a number, stripping currency symbols and thousands separators
///
/// `(12.50)` is read as negative. Anything unparseable is 0.
pub fn coerce_number(raw: &RawValue) -> f64 {
    match raw {
        RawValue::Number(n) if n.is_finite() => *n,
        RawValue::Number(_) | RawValue::Empty | RawValue::Bool(_) => 0.0,
        RawValue::Text(s) => parse_number_text(s).unwrap_or(0.0),
    }
}

fn parse_number_text(s: &str) -> Option<f64> {
    let mut cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',') && !c.is_whitespace())
        .collect();

    let mut negative = false;
    if cleaned.starts_with('(') && cleaned.ends_with(')') && cleaned.len() > 2 {
        negative = true;
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
    }

    let n: f64 = cleaned.parse().ok()?;
    if !n.is_finite() {
        return None;
    }
    Some(if negative { -n } else { n })
}

fn coerce_strict_date(column: &str, raw: &RawValue) -> Result<Value, RowIssue> {
    if raw.is_blank() {
        return Ok(Value::Null);
    }
    let text = raw.to_text();
    parse_strict_iso(&text)
        .map(Value::Date)
        .ok_or_else(|| RowIssue::InvalidDate {
            column: column.to_string(),
            value: text,
        })
}

/// Exactly `YYYY-MM-DD` naming a real calendar date
pub fn parse_strict_iso(s: &str) -> Option<NaiveDate> {
    if !STRICT_ISO.is_match(s) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

fn parse_flexible_raw(raw: &RawValue) -> Option<NaiveDate> {
    match raw {
        RawValue::Text(s) => parse_flexible(s),
        RawValue::Number(n) => parse_flexible(&n.to_string()),
        RawValue::Empty | RawValue::Bool(_) => None,
    }
}

/// Parse `M/D/Y` or ISO dates; the first rule that parses wins
///
/// Also accepts ISO date-times and `YYYY/MM/DD`. When the text carries a time
/// after a space, only the leading date token is considered.
pub fn parse_flexible(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(caps) = MONTH_DAY_YEAR.captures(s) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year = expand_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = ISO_PREFIX.captures(s) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y/%m/%d") {
        return Some(date);
    }

    match s.split_once(' ') {
        Some((head, _)) if !head.is_empty() => parse_flexible(head),
        _ => None,
    }
}

/// Two-digit years pivot at 69: `00..=68` is 20xx, `69..=99` is 19xx
fn expand_year(raw: &str) -> Option<i32> {
    let year: i32 = raw.parse().ok()?;
    if raw.len() == 2 {
        Some(if year <= 68 { 2000 + year } else { 1900 + year })
    } else {
        Some(year)
    }
}

fn coerce_serial(raw: &RawValue) -> Option<NaiveDate> {
    match raw {
        RawValue::Number(n) => serial_to_date(*n),
        RawValue::Text(s) => {
            let trimmed = s.trim();
            match trimmed.parse::<f64>() {
                Ok(n) => serial_to_date(n),
                Err(_) => parse_flexible(trimmed),
            }
        }
        RawValue::Empty | RawValue::Bool(_) => None,
    }
}

/// Convert a spreadsheet serial day number to a calendar date
///
/// Serials count days from 1899-12-30, so 1 is 1899-12-31. Serial 60 is the
/// phantom 1900-02-29 of the spreadsheet leap-year bug and maps to 1900-03-01.
/// The fractional time-of-day part is discarded.
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let days = serial.floor() as u64;
    if days == 60 {
        return NaiveDate::from_ymd_opt(1900, 3, 1);
    }
    serial_epoch().checked_add_days(Days::new(days))
}
