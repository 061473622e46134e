use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::{
    error::{PipelineError, data_integrity, lookup_failed},
    records::CsvRow,
};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("dataset directory {path} cannot be read: {source}")]
    Directory { path: PathBuf, source: io::Error },
    #[error("table {table} cannot be parsed: {source}")]
    Csv { table: String, source: csv::Error },
}

impl From<DatasetError> for PipelineError {
    fn from(err: DatasetError) -> Self {
        match err {
            DatasetError::Directory { .. } => lookup_failed(err.to_string()),
            DatasetError::Csv { .. } => data_integrity(err.to_string()),
        }
    }
}

/// One CSV table, rows kept in source order.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    headers: Vec<String>,
    rows: Vec<CsvRow>,
}

impl Table {
    pub fn from_reader<R: io::Read>(
        name: impl Into<String>,
        reader: R,
    ) -> Result<Self, DatasetError> {
        let name = name.into();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(|source| DatasetError::Csv {
                table: name.clone(),
                source,
            })?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|source| DatasetError::Csv {
                table: name.clone(),
                source,
            })?;
            let line = record
                .position()
                .map(|position| position.line() as usize)
                .unwrap_or_default();
            rows.push(CsvRow::new(
                name.clone(),
                line,
                &headers,
                record.iter().map(str::to_string),
            ));
        }

        Ok(Self {
            name,
            headers,
            rows,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[CsvRow] {
        &self.rows
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.headers.iter().any(|header| header == column)
    }
}

/// All tables of an export directory keyed by file stem.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    tables: BTreeMap<String, Table>,
}

impl Dataset {
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|source| DatasetError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| DatasetError::Directory {
                    path: dir.to_path_buf(),
                    source,
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == "csv") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut dataset = Self::default();
        for path in paths {
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let file = std::fs::File::open(&path).map_err(|source| DatasetError::Directory {
                path: path.clone(),
                source,
            })?;
            let table = Table::from_reader(stem, io::BufReader::new(file))?;
            tracing::debug!(
                target: "dataset",
                table = table.name(),
                rows = table.rows().len(),
                "table_loaded"
            );
            dataset.insert(table);
        }

        tracing::info!(
            target: "dataset",
            dir = %dir.display(),
            tables = dataset.tables.len(),
            "dataset_loaded"
        );
        Ok(dataset)
    }

    pub fn from_tables(tables: impl IntoIterator<Item = Table>) -> Self {
        let mut dataset = Self::default();
        for table in tables {
            dataset.insert(table);
        }
        dataset
    }

    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn require_table(&self, name: &str) -> Result<&Table, PipelineError> {
        self.table(name)
            .ok_or_else(|| lookup_failed(format!("dataset has no '{}' table", name)))
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}
