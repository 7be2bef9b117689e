//! Dataset loader for delimited text files.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument};

use super::DatasetLoader;
use crate::core::safety::ExecutionLimits;
use crate::domain::DatasetRef;
use crate::script::{DataFrame, Value};

/// Loads CSV files into data frames with per-column type inference
pub struct CsvDatasetLoader {
    limits: ExecutionLimits,
    delimiter: u8,
}

impl Default for CsvDatasetLoader {
    fn default() -> Self {
        Self::new(ExecutionLimits::default())
    }
}

impl CsvDatasetLoader {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Parse CSV bytes into a frame
    pub fn parse(&self, bytes: &[u8]) -> Result<DataFrame> {
        let mut reader = ::csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .flexible(true)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        let headers = normalize_headers(headers);

        let mut records = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.with_context(|| format!("Failed to parse CSV record {}", line + 1))?;
            records.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }

        Ok(DataFrame::from_records(headers, &records)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.limits.validate_dataset_path(path)?;
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read dataset: {}", path.display()))
    }
}

#[async_trait]
impl DatasetLoader for CsvDatasetLoader {
    #[instrument(skip(self), fields(variable = %dataset.variable_name))]
    async fn load(&self, dataset: &DatasetRef) -> Result<Value> {
        let bytes = self.read(dataset.path()).await?;
        let frame = self
            .parse(&bytes)
            .with_context(|| format!("Failed to load dataset: {}", dataset.path().display()))?;
        debug!(rows = frame.rows(), columns = frame.width(), "Dataset loaded");
        Ok(Value::Frame(frame))
    }
}

/// Strip a UTF-8 BOM, name blank headers and make duplicates unique
fn normalize_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    headers
        .into_iter()
        .enumerate()
        .map(|(position, header)| {
            let header = header.trim_start_matches('\u{feff}').to_string();
            let base = if header.is_empty() {
                format!("Unnamed: {}", position)
            } else {
                header
            };
            let mut name = base.clone();
            let mut suffix = 1;
            while !seen.insert(name.clone()) {
                name = format!("{}.{}", base, suffix);
                suffix += 1;
            }
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Column;
    use tempfile::TempDir;

    #[test]
    fn test_parse_infers_column_types() {
        let loader = CsvDatasetLoader::default();
        let frame = loader
            .parse(b"region,sales,price,active\nnorth,10,1.5,true\nsouth,,2.0,false\n")
            .unwrap();

        assert_eq!(frame.rows(), 2);
        assert_eq!(frame.names(), ["region", "sales", "price", "active"]);
        assert!(matches!(frame.column_ref("region"), Some(Column::Text(_))));
        assert_eq!(
            frame.column_ref("sales"),
            Some(&Column::Float(vec![Some(10.0), None]))
        );
        assert!(matches!(frame.column_ref("active"), Some(Column::Bool(_))));
    }

    #[test]
    fn test_headers_are_normalized() {
        assert_eq!(
            normalize_headers(vec!["\u{feff}id".into(), "".into(), "id".into(), "id".into()]),
            vec!["id", "Unnamed: 1", "id.1", "id.2"]
        );
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sales.csv");
        std::fs::write(&path, "x,y\n1,2\n3,4\n").unwrap();

        let loader = CsvDatasetLoader::default();
        let value = loader.load(&DatasetRef::new("df", &path)).await.unwrap();
        let Value::Frame(frame) = value else {
            panic!("expected a frame");
        };
        assert_eq!(frame.column_ref("y"), Some(&Column::Int(vec![Some(2), Some(4)])));
    }

    #[tokio::test]
    async fn test_denylisted_path_is_refused() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("secrets.csv");
        std::fs::write(&path, "token\nabc\n").unwrap();

        let err = CsvDatasetLoader::default()
            .load(&DatasetRef::new("df", &path))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("denylist"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let err = CsvDatasetLoader::default()
            .load(&DatasetRef::new("df", "/nonexistent/data.csv"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read dataset"));
    }
}
