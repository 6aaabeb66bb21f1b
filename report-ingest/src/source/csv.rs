//! CSV reader

use std::path::Path;

use anyhow::{Context, Result};

use super::{RowLayout, key_rows};
use crate::ingest::types::{RawRow, RawValue};

/// Read every record of a CSV file
///
/// Cells are kept as text; coercion happens per schema column.
pub fn read_csv(path: &Path, layout: RowLayout) -> Result<Vec<RawRow>> {
    let mut reader = ::csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(::csv::Trim::None)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

    let mut grid = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Failed to read CSV record {} of {}", line + 1, path.display()))?;
        grid.push(record.iter().map(cell_to_raw).collect::<Vec<_>>());
    }

    Ok(key_rows(grid, layout))
}

fn cell_to_raw(cell: &str) -> RawValue {
    if cell.is_empty() {
        RawValue::Empty
    } else {
        RawValue::Text(cell.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_keyed_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Employee,Reg. Hrs,").unwrap();
        writeln!(file, "A,8,x").unwrap();
        writeln!(file, "B,,").unwrap();

        let rows = read_csv(file.path(), RowLayout::Keyed).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Reg. Hrs"), Some(&RawValue::from("8")));
        assert_eq!(rows[0].get("C"), Some(&RawValue::from("x")));
        assert_eq!(rows[1].get("Reg. Hrs"), Some(&RawValue::Empty));
    }

    #[test]
    fn test_read_positional_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Diverse Staffing").unwrap();
        writeln!(file, "EMPLOYEE NAME,EMPLOYEE PAYROLL ID").unwrap();
        writeln!(file, "\"Smith, Ann\",1001").unwrap();

        let rows = read_csv(file.path(), RowLayout::Positional).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[2].get("A"), Some(&RawValue::from("Smith, Ann")));
        assert_eq!(rows[2].get("B"), Some(&RawValue::from("1001")));
    }
}
