//! CSV batch artifacts.
//!
//! Each exported batch becomes `{prefix}({start}~{end}).csv` in the output
//! directory. The file name alone identifies the batch, so the set of
//! existing artifacts is the set of exported ranges.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;

use crate::error::{AppError, Result};
use crate::models::{BatchRange, ExportArtifact, FieldRecord};
use crate::storage::{ResultExporter, write_atomic};

/// Result of concatenating every artifact into one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSummary {
    pub path: PathBuf,
    pub artifacts: usize,
    pub records: usize,
    pub columns: usize,
}

/// Writes one CSV file per batch.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    output_dir: PathBuf,
    prefix: String,
    name_pattern: Regex,
}

impl CsvExporter {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        let pattern = format!(r"^{}\((\d+)~(\d+)\)\.csv$", regex::escape(&prefix));
        let name_pattern = Regex::new(&pattern)
            .map_err(|e| AppError::config(format!("Invalid artifact prefix '{prefix}': {e}")))?;

        Ok(Self {
            output_dir: output_dir.into(),
            prefix,
            name_pattern,
        })
    }

    /// File name of the artifact for `range`.
    pub fn artifact_name(&self, range: BatchRange) -> String {
        format!("{}({}~{}).csv", self.prefix, range.start, range.end)
    }

    pub fn artifact_path(&self, range: BatchRange) -> PathBuf {
        self.output_dir.join(self.artifact_name(range))
    }

    /// Batch range encoded in an artifact file name.
    pub fn parse_artifact_name(&self, name: &str) -> Option<BatchRange> {
        let caps = self.name_pattern.captures(name)?;
        let start = caps.get(1)?.as_str().parse().ok()?;
        let end = caps.get(2)?.as_str().parse().ok()?;
        (start < end).then(|| BatchRange::new(start, end))
    }

    /// Read the records of an existing artifact.
    pub async fn load_artifact(&self, range: BatchRange) -> Result<Vec<FieldRecord>> {
        let bytes = tokio::fs::read(self.artifact_path(range)).await?;
        let mut reader = csv::ReaderBuilder::new().from_reader(bytes.as_slice());
        let headers = reader.headers()?.clone();

        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let mut record = FieldRecord::new();
            for (name, value) in headers.iter().zip(row.iter()) {
                record.insert(name, value);
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Concatenate every artifact, in range order, into one CSV file whose
    /// columns are the union of all artifact columns.
    pub async fn merge_into(&self, output: &Path) -> Result<MergeSummary> {
        let ranges = self.exported_ranges().await?;

        let mut records = Vec::new();
        for range in &ranges {
            let batch = self.load_artifact(*range).await?;
            log::info!("Merging {} records from {}", batch.len(), self.artifact_name(*range));
            records.extend(batch);
        }

        let columns = union_columns(&records);
        let bytes = render_csv(&columns, &records)?;
        write_atomic(output, "csv.tmp", &bytes).await?;

        Ok(MergeSummary {
            path: output.to_path_buf(),
            artifacts: ranges.len(),
            records: records.len(),
            columns: columns.len(),
        })
    }
}

#[async_trait]
impl ResultExporter for CsvExporter {
    async fn export(&self, records: &[FieldRecord], range: BatchRange) -> Result<ExportArtifact> {
        if records.is_empty() {
            return Err(AppError::export(range, "no records to export"));
        }

        let columns = union_columns(records);
        let bytes = render_csv(&columns, records).map_err(|e| AppError::export(range, e))?;

        let path = self.artifact_path(range);
        write_atomic(&path, "csv.tmp", &bytes)
            .await
            .map_err(|e| AppError::export(range, format!("{}: {}", path.display(), e)))?;

        log::info!(
            "Exported {} records ({} columns) to {}",
            records.len(),
            columns.len(),
            path.display()
        );

        Ok(ExportArtifact {
            range,
            path,
            record_count: records.len(),
            column_count: columns.len(),
        })
    }

    async fn exported_ranges(&self) -> Result<Vec<BatchRange>> {
        let mut entries = match tokio::fs::read_dir(&self.output_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut ranges = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(range) = entry
                .file_name()
                .to_str()
                .and_then(|name| self.parse_artifact_name(name))
            {
                ranges.push(range);
            }
        }

        ranges.sort();
        ranges.dedup();
        Ok(ranges)
    }
}

/// Union of field names across records, in first-seen order.
fn union_columns(records: &[FieldRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for name in records.iter().flat_map(|record| record.names()) {
        if seen.insert(name) {
            columns.push(name.to_string());
        }
    }
    columns
}

fn render_csv(columns: &[String], records: &[FieldRecord]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(columns)?;
    for record in records {
        writer.write_record(columns.iter().map(|column| record.get(column).unwrap_or("")))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::validation(format!("CSV buffer flush failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(fields: &[(&str, &str)]) -> FieldRecord {
        let mut record = FieldRecord::new();
        for (name, value) in fields {
            record.insert(*name, *value);
        }
        record
    }

    fn exporter(dir: &TempDir) -> CsvExporter {
        CsvExporter::new(dir.path(), "Inspection_Detail").unwrap()
    }

    #[test]
    fn test_artifact_name_round_trip() {
        let tmp = TempDir::new().unwrap();
        let exporter = exporter(&tmp);
        let range = BatchRange::new(1000, 2000);

        assert_eq!(exporter.artifact_name(range), "Inspection_Detail(1000~2000).csv");
        assert_eq!(
            exporter.parse_artifact_name("Inspection_Detail(1000~2000).csv"),
            Some(range)
        );
    }

    #[test]
    fn test_unrelated_names_ignored() {
        let tmp = TempDir::new().unwrap();
        let exporter = exporter(&tmp);

        assert_eq!(exporter.parse_artifact_name("Inspection_Detail(5~2).csv"), None);
        assert_eq!(exporter.parse_artifact_name("Inspection_Detail(0~2).csv.tmp"), None);
        assert_eq!(exporter.parse_artifact_name("Other(0~2).csv"), None);
        assert_eq!(exporter.parse_artifact_name("Inspection_Detail_merged.csv"), None);
    }

    #[tokio::test]
    async fn test_export_unions_columns_in_first_seen_order() {
        let tmp = TempDir::new().unwrap();
        let exporter = exporter(&tmp);
        let records = vec![
            record(&[("Inspection Nr", "1"), ("SIC", "1623")]),
            record(&[("Inspection Nr", "2"), ("Related Activity Type 1", "Accident")]),
        ];

        let artifact = exporter.export(&records, BatchRange::new(0, 2)).await.unwrap();
        assert_eq!(artifact.record_count, 2);
        assert_eq!(artifact.column_count, 3);

        let content = std::fs::read_to_string(&artifact.path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "Inspection Nr,SIC,Related Activity Type 1");
        assert_eq!(lines[1], "1,1623,");
        assert_eq!(lines[2], "2,,Accident");
    }

    #[tokio::test]
    async fn test_export_empty_batch_rejected() {
        let tmp = TempDir::new().unwrap();
        let result = exporter(&tmp).export(&[], BatchRange::new(0, 2)).await;
        assert!(matches!(result, Err(AppError::Export { .. })));
    }

    #[tokio::test]
    async fn test_export_failure_is_export_error() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("blocked");
        std::fs::write(&blocker, b"file, not a directory").unwrap();
        let exporter = CsvExporter::new(&blocker, "Inspection_Detail").unwrap();

        let result = exporter
            .export(&[record(&[("Inspection Nr", "1")])], BatchRange::new(0, 1))
            .await;
        assert!(matches!(result, Err(AppError::Export { .. })));
    }

    #[tokio::test]
    async fn test_exported_ranges_sorted() {
        let tmp = TempDir::new().unwrap();
        let exporter = exporter(&tmp);
        let batch = vec![record(&[("Inspection Nr", "1")])];

        exporter.export(&batch, BatchRange::new(2, 3)).await.unwrap();
        exporter.export(&batch, BatchRange::new(0, 2)).await.unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();

        assert_eq!(
            exporter.exported_ranges().await.unwrap(),
            vec![BatchRange::new(0, 2), BatchRange::new(2, 3)]
        );
        assert!(exporter.is_exported(BatchRange::new(2, 3)).await.unwrap());
        assert!(!exporter.is_exported(BatchRange::new(3, 4)).await.unwrap());
    }

    #[tokio::test]
    async fn test_exported_ranges_missing_dir() {
        let tmp = TempDir::new().unwrap();
        let exporter = CsvExporter::new(tmp.path().join("absent"), "Inspection_Detail").unwrap();
        assert!(exporter.exported_ranges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_unifies_columns() {
        let tmp = TempDir::new().unwrap();
        let exporter = exporter(&tmp);

        exporter
            .export(
                &[record(&[("Inspection Nr", "3"), ("Scope", "Partial")])],
                BatchRange::new(2, 3),
            )
            .await
            .unwrap();
        exporter
            .export(
                &[
                    record(&[("Inspection Nr", "1"), ("SIC", "1623")]),
                    record(&[("Inspection Nr", "2")]),
                ],
                BatchRange::new(0, 2),
            )
            .await
            .unwrap();

        let output = tmp.path().join("merged/all.csv");
        let summary = exporter.merge_into(&output).await.unwrap();
        assert_eq!(summary.artifacts, 2);
        assert_eq!(summary.records, 3);
        assert_eq!(summary.columns, 3);

        let content = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines[0], "Inspection Nr,SIC,Scope");
        assert_eq!(lines[1], "1,1623,");
        assert_eq!(lines[3], "3,,Partial");
    }
}
