// src/services/input.rs

//! Identifier list loading.

use std::path::Path;

use calamine::{Reader, Xlsx, open_workbook};

use crate::error::{AppError, Result};

/// Load the ordered identifier list from a `.txt`, `.csv` or `.xlsx` file.
///
/// Text files hold one identifier per line. A line shaped like
/// `"Inspection Nr: 1234567"` yields the text after the last `": "`.
/// CSV files and the first worksheet of a workbook are read by header,
/// taking the `id_column` column.
pub fn load_identifiers(path: impl AsRef<Path>, id_column: &str) -> Result<Vec<String>> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let identifiers = match extension.as_deref() {
        Some("txt") => parse_lines(&std::fs::read_to_string(path)?),
        Some("csv") => read_column(path, id_column)?,
        Some("xlsx") => read_sheet_column(path, id_column)?,
        other => {
            return Err(AppError::validation(format!(
                "Unsupported input file {} (extension {:?}); expected .txt, .csv or .xlsx",
                path.display(),
                other.unwrap_or("")
            )));
        }
    };

    log::info!("Loaded {} identifiers from {}", identifiers.len(), path.display());
    Ok(identifiers)
}

fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(|line| line.rsplit_once(": ").map_or(line, |(_, id)| id).trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_column(path: &Path, id_column: &str) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let position = reader
        .headers()?
        .iter()
        .position(|header| header == id_column)
        .ok_or_else(|| missing_column(path, id_column))?;

    let mut identifiers = Vec::new();
    for row in reader.records() {
        let row = row?;
        if let Some(id) = row.get(position).filter(|id| !id.is_empty()) {
            identifiers.push(id.to_string());
        }
    }
    Ok(identifiers)
}

fn read_sheet_column(path: &Path, id_column: &str) -> Result<Vec<String>> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::validation(format!("No worksheet in {}", path.display())))??;

    let mut rows = range.rows();
    let position = rows
        .next()
        .and_then(|header| {
            header
                .iter()
                .position(|cell| cell.to_string().trim() == id_column)
        })
        .ok_or_else(|| missing_column(path, id_column))?;

    // Numeric cells render without a fractional part, so 1234567.0 reads as "1234567".
    Ok(rows
        .filter_map(|row| row.get(position))
        .map(|cell| cell.to_string().trim().to_string())
        .filter(|id| !id.is_empty())
        .collect())
}

fn missing_column(path: &Path, id_column: &str) -> AppError {
    AppError::validation(format!(
        "Column '{}' not found in {}",
        id_column,
        path.display()
    ))
}
