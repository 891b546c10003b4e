use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::errors::RankError;
use crate::storage::DatasetStore;

/// Accepted names for the key column, in lookup order.
pub const KEY_COLUMNS: [&str; 2] = ["Keyword", "Keywords"];

/// An in-memory CSV dataset: an ordered header and rows aligned to it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Build a dataset, padding short rows with empty cells.
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = header.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                if row.len() < width {
                    row.resize(width, String::new());
                }
                row
            })
            .collect();
        Self { header, rows }
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, RankError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);

        let mut header: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        // Spreadsheet exports often start with a UTF-8 byte order mark.
        if let Some(first) = header.first_mut() {
            if let Some(stripped) = first.strip_prefix('\u{feff}') {
                *first = stripped.to_string();
            }
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self::new(header, rows))
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, RankError> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| RankError::Persistence(format!("Failed to flush CSV writer: {}", e)))
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx).map(String::as_str)
    }

    /// Resolve the key column: `Keyword` wins over `Keywords` when both exist.
    pub fn key_column(&self) -> Result<&'static str, RankError> {
        KEY_COLUMNS
            .iter()
            .copied()
            .find(|name| self.column_index(name).is_some())
            .ok_or_else(|| {
                RankError::Validation(
                    "CSV must contain either a 'Keyword' or 'Keywords' column.".to_string(),
                )
            })
    }

    /// Check that a job can run over this dataset: it needs a key column and
    /// at least one row. Returns the key column.
    pub fn job_key_column(&self) -> Result<&'static str, RankError> {
        let column = self.key_column()?;
        if self.is_empty() {
            return Err(RankError::Validation("CSV file is empty.".to_string()));
        }
        Ok(column)
    }

    /// Key values in row order, truncated to `limit` entries when given.
    pub fn keys(&self, key_column: &str, limit: Option<usize>) -> Vec<String> {
        let Some(idx) = self.column_index(key_column) else {
            return Vec::new();
        };
        let take = limit.unwrap_or(self.rows.len());
        self.rows
            .iter()
            .take(take)
            .map(|row| row.get(idx).cloned().unwrap_or_default())
            .collect()
    }

    /// Append any of `required` missing from the header, keeping existing
    /// column order. Returns how many columns were added.
    pub fn ensure_columns(&mut self, required: &[&str]) -> usize {
        let mut added = 0;
        for column in required {
            if self.column_index(column).is_none() {
                self.header.push(column.to_string());
                added += 1;
            }
        }
        if added > 0 {
            let width = self.header.len();
            for row in &mut self.rows {
                if row.len() < width {
                    row.resize(width, String::new());
                }
            }
        }
        added
    }

    /// Set `fields` on every row whose `key_column` equals `key`. Fields
    /// naming a column absent from the header are skipped. Returns the
    /// number of rows updated.
    pub fn update_rows_by_key(
        &mut self,
        key_column: &str,
        key: &str,
        fields: &[(&str, String)],
    ) -> usize {
        let Some(key_idx) = self.column_index(key_column) else {
            return 0;
        };
        let targets: Vec<(usize, &String)> = fields
            .iter()
            .filter_map(|(name, value)| self.column_index(name).map(|idx| (idx, value)))
            .collect();

        let mut updated = 0;
        for row in &mut self.rows {
            if row.get(key_idx).map(String::as_str) != Some(key) {
                continue;
            }
            for (idx, value) in &targets {
                if *idx >= row.len() {
                    row.resize(*idx + 1, String::new());
                }
                row[*idx] = (*value).clone();
            }
            updated += 1;
        }
        updated
    }
}

/// CSV files on the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct CsvDatasetStore;

impl CsvDatasetStore {
    pub fn new() -> Self {
        Self
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name: OsString = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| OsString::from("dataset"));
    name.push(".tmp");
    path.with_file_name(name)
}

#[async_trait]
impl DatasetStore for CsvDatasetStore {
    async fn load(&self, path: &Path) -> Result<Dataset, RankError> {
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            RankError::Persistence(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Dataset::parse(&bytes)
    }

    /// Writes to a sibling `.tmp` file first, then renames over the target.
    async fn save(&self, path: &Path, dataset: &Dataset) -> Result<(), RankError> {
        let bytes = dataset.to_csv_bytes()?;
        let tmp = tmp_path(path);

        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            RankError::Persistence(format!("Failed to write {}: {}", tmp.display(), e))
        })?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| {
            RankError::Persistence(format!("Failed to replace {}: {}", path.display(), e))
        })?;

        tracing::debug!("Saved {} rows to {}", dataset.len(), path.display());
        Ok(())
    }

    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>, RankError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(RankError::NotFound(
                format!("No dataset at {}", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }
}
