//! File readers producing `RawRow`s
//!
//! Uploads normally arrive as JSON rows from the spreadsheet front-end. The
//! CLI reads the same rows straight from `.csv`, `.xlsx` and `.json` files.

pub mod csv;
pub mod excel;
pub mod json;

use std::path::Path;

use anyhow::{Result, bail};

use crate::ingest::types::{HeaderSource, RawRow, RawValue};

/// How rows of a tabular file are keyed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowLayout {
    /// First row holds the keys of every following row
    #[default]
    Keyed,
    /// Every row is keyed by column letter (`A`, `B`, .. `AA`)
    Positional,
}

impl RowLayout {
    /// Layout that feeds a schema's header source
    pub fn for_header_source(source: HeaderSource) -> Self {
        match source {
            HeaderSource::Keys => RowLayout::Keyed,
            HeaderSource::Values => RowLayout::Positional,
        }
    }
}

/// Spreadsheet column letter for a zero-based index
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

/// Read rows from a file, dispatching on its extension
pub fn read_rows(path: &Path, layout: RowLayout) -> Result<Vec<RawRow>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let rows = match extension.as_str() {
        "csv" => csv::read_csv(path, layout)?,
        "xlsx" | "xlsm" => excel::read_xlsx(path, layout)?,
        "json" => json::read_json(path)?.into_rows(),
        _ => bail!("Unsupported file type: {}", path.display()),
    };

    log::debug!("Read {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Key rows by header labels or by column letter
///
/// Blank header labels fall back to the column letter.
pub(crate) fn key_rows<I>(grid: I, layout: RowLayout) -> Vec<RawRow>
where
    I: IntoIterator<Item = Vec<RawValue>>,
{
    let mut grid = grid.into_iter();
    let keys: Option<Vec<String>> = match layout {
        RowLayout::Positional => None,
        RowLayout::Keyed => match grid.next() {
            Some(header) => Some(
                header
                    .iter()
                    .enumerate()
                    .map(|(i, cell)| {
                        let label = cell.to_text();
                        if label.is_empty() { column_letter(i) } else { label }
                    })
                    .collect(),
            ),
            None => return Vec::new(),
        },
    };

    grid.map(|cells| {
        let mut row = RawRow::new();
        for (i, cell) in cells.into_iter().enumerate() {
            let key = match &keys {
                Some(keys) => keys.get(i).cloned().unwrap_or_else(|| column_letter(i)),
                None => column_letter(i),
            };
            row.push(key, cell);
        }
        row
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_letter() {
        assert_eq!(column_letter(0), "A");
        assert_eq!(column_letter(25), "Z");
        assert_eq!(column_letter(26), "AA");
        assert_eq!(column_letter(27), "AB");
        assert_eq!(column_letter(701), "ZZ");
        assert_eq!(column_letter(702), "AAA");
    }

    #[test]
    fn test_key_rows_keyed() {
        let grid = vec![
            vec![RawValue::from("Employee"), RawValue::Empty],
            vec![RawValue::from("A"), RawValue::Number(8.0)],
        ];
        let rows = key_rows(grid, RowLayout::Keyed);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Employee"), Some(&RawValue::from("A")));
        assert_eq!(rows[0].get("B"), Some(&RawValue::Number(8.0)));
    }

    #[test]
    fn test_key_rows_positional() {
        let grid = vec![
            vec![RawValue::from("Report"), RawValue::Empty],
            vec![RawValue::from("EMPLOYEE NAME"), RawValue::from("REG")],
        ];
        let rows = key_rows(grid, RowLayout::Positional);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].keys().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = read_rows(Path::new("report.pdf"), RowLayout::Keyed).unwrap_err();
        assert!(err.to_string().contains("Unsupported file type"));
    }
}
