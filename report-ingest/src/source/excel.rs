//! XLSX reader

use std::path::Path;

use anyhow::{Context, Result};
use calamine::{Data, Reader, Xlsx, open_workbook};

use super::{RowLayout, key_rows};
use crate::ingest::types::{RawRow, RawValue};

/// Read the first sheet of an Excel workbook
///
/// Date cells stay numeric (spreadsheet serial) so that date coercion sees
/// the same value the front-end would send.
pub fn read_xlsx(path: &Path, layout: RowLayout) -> Result<Vec<RawRow>> {
    let mut workbook: Xlsx<_> = open_workbook(path)
        .with_context(|| format!("Failed to open Excel file: {}", path.display()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .with_context(|| format!("Workbook has no sheets: {}", path.display()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .with_context(|| format!("Failed to read sheet: {}", sheet_name))?;

    // The range starts at the first used cell; pad so column letters match the sheet
    let leading = range.start().map(|(_, col)| col as usize).unwrap_or(0);

    let grid = range.rows().map(|row| {
        let mut cells = vec![RawValue::Empty; leading];
        cells.extend(row.iter().map(cell_to_raw));
        cells
    });

    let rows = key_rows(grid, layout);
    log::debug!("Sheet '{}' of {}: {} rows", sheet_name, path.display(), rows.len());
    Ok(rows)
}

/// Convert an Excel cell to a raw value
fn cell_to_raw(cell: &Data) -> RawValue {
    match cell {
        Data::Empty => RawValue::Empty,
        Data::String(s) if s.is_empty() => RawValue::Empty,
        Data::String(s) => RawValue::Text(s.clone()),
        Data::Int(i) => RawValue::Number(*i as f64),
        Data::Float(f) => RawValue::Number(*f),
        Data::Bool(b) => RawValue::Bool(*b),
        Data::DateTime(dt) => RawValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) => RawValue::Text(s.clone()),
        Data::DurationIso(s) => RawValue::Text(s.clone()),
        Data::Error(_) => RawValue::Empty,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_to_raw() {
        assert_eq!(cell_to_raw(&Data::Empty), RawValue::Empty);
        assert_eq!(cell_to_raw(&Data::String(String::new())), RawValue::Empty);
        assert_eq!(cell_to_raw(&Data::String("Shift".into())), RawValue::from("Shift"));
        assert_eq!(cell_to_raw(&Data::Int(3)), RawValue::Number(3.0));
        assert_eq!(cell_to_raw(&Data::Float(7.5)), RawValue::Number(7.5));
        assert_eq!(cell_to_raw(&Data::Bool(true)), RawValue::Bool(true));
        assert_eq!(
            cell_to_raw(&Data::DateTimeIso("2024-01-15".into())),
            RawValue::from("2024-01-15")
        );
    }

    #[test]
    fn test_missing_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_xlsx(&dir.path().join("missing.xlsx"), RowLayout::Keyed).unwrap_err();
        assert!(err.to_string().contains("Failed to open Excel file"));
    }
}
