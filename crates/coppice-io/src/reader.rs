//! CSV table reader with full input validation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use coppice_tree::{Column, ColumnKind, ColumnSchema, Table, TableSchema};
use tracing::{debug, info, instrument};

use crate::IoError;

/// Forced kind for a CSV column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Treat every cell as a level name.
    Categorical,
    /// Parse every cell as a finite float.
    Numeric,
}

/// A table read against a saved schema, ready for prediction.
#[derive(Debug)]
pub struct PredictionInput {
    /// Covariates in schema order behind the response column.
    pub table: Table,
    /// Whether the file carried the response column. When it did not, the
    /// table's response is a placeholder and must not be scored.
    pub has_response: bool,
}

/// Reads a typed [`Table`] from a CSV file.
///
/// Expected CSV format:
/// - Header row required, one name per column, names unique
/// - One row per observation, all rows with the same number of columns
/// - No empty cells
///
/// Columns whose cells all parse as finite floats are numeric; anything else
/// is categorical with levels in first-seen order. [`with_kind`](Self::with_kind)
/// overrides the inference per column.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::MissingColumn`] | Response or selected covariate not in header |
/// | [`IoError::DuplicateColumn`] | Repeated header name or selection |
/// | [`IoError::MissingValue`] | Empty cell in a used column |
/// | [`IoError::NonNumericValue`] | Numeric cell is NaN, Inf, or unparseable |
/// | [`IoError::UnknownLevel`] | Level absent from the saved schema |
/// | [`IoError::InvalidTable`] | Columns rejected by [`Table::new`] |
pub struct TableReader {
    path: PathBuf,
    covariates: Option<Vec<String>>,
    kinds: HashMap<String, ColumnType>,
}

/// Header plus raw records of a CSV file.
struct RawCsv {
    header: Vec<String>,
    records: Vec<csv::StringRecord>,
}

impl TableReader {
    /// Create a new reader for the given CSV file path.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            covariates: None,
            kinds: HashMap::new(),
        }
    }

    /// Restrict the covariates to these columns, in this order. By default
    /// every non-response column is a covariate.
    #[must_use]
    pub fn with_covariates(mut self, covariates: Vec<String>) -> Self {
        self.covariates = Some(covariates);
        self
    }

    /// Force the kind of one column instead of inferring it.
    #[must_use]
    pub fn with_kind(mut self, column: impl Into<String>, kind: ColumnType) -> Self {
        self.kinds.insert(column.into(), kind);
        self
    }

    /// Read the file as a training table with `response` as column 0.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read(&self, response: &str) -> Result<Table, IoError> {
        let raw = self.read_raw()?;

        let response_index = self.position(&raw.header, response)?;
        let covariate_indices = match &self.covariates {
            Some(names) => {
                let mut seen = HashSet::new();
                let mut indices = Vec::with_capacity(names.len());
                for name in names {
                    if name == response || !seen.insert(name.as_str()) {
                        return Err(IoError::DuplicateColumn {
                            path: self.path.clone(),
                            column: name.clone(),
                        });
                    }
                    indices.push(self.position(&raw.header, name)?);
                }
                indices
            }
            None => (0..raw.header.len()).filter(|&i| i != response_index).collect(),
        };

        let mut columns = Vec::with_capacity(covariate_indices.len() + 1);
        columns.push(self.infer_column(&raw, response_index)?);
        for index in covariate_indices {
            columns.push(self.infer_column(&raw, index)?);
        }

        let table = Table::new(columns).map_err(|e| IoError::InvalidTable {
            path: self.path.clone(),
            source: e,
        })?;

        info!(
            n_rows = table.n_rows(),
            n_covariates = table.covariates().len(),
            task = %table.task(),
            "table loaded"
        );

        Ok(table)
    }

    /// Read the file against the schema a model was trained on.
    ///
    /// Covariates are taken by name in schema order and categorical cells
    /// are re-encoded against the saved levels, so the result always passes
    /// the model's schema check. Extra columns are ignored.
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn read_with_schema(&self, schema: &TableSchema) -> Result<PredictionInput, IoError> {
        let raw = self.read_raw()?;
        let n_rows = raw.records.len();

        let response = schema.response();
        let has_response = raw.header.iter().any(|h| *h == response.name);
        let response_column = if has_response {
            let index = self.position(&raw.header, &response.name)?;
            self.encode_column(&raw, index, response)?
        } else {
            debug!(column = %response.name, "response absent, using placeholder");
            match &response.kind {
                ColumnKind::Categorical { levels } => Column::Categorical {
                    name: response.name.clone(),
                    levels: levels.clone(),
                    codes: vec![0; n_rows],
                },
                ColumnKind::Numeric => Column::numeric(response.name.clone(), vec![0.0; n_rows]),
            }
        };

        let mut columns = vec![response_column];
        for covariate in schema.covariates() {
            let index = self.position(&raw.header, &covariate.name)?;
            columns.push(self.encode_column(&raw, index, covariate)?);
        }

        let table = Table::new(columns).map_err(|e| IoError::InvalidTable {
            path: self.path.clone(),
            source: e,
        })?;

        info!(n_rows, has_response, "prediction table loaded");

        Ok(PredictionInput { table, has_response })
    }

    fn read_raw(&self) -> Result<RawCsv, IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) lets the InconsistentRowLength check below fire
        // instead of a low-level CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header: Vec<String> = rdr
            .headers()
            .map_err(|e| self.csv_error(e))?
            .iter()
            .map(String::from)
            .collect();
        debug!(expected_cols = header.len(), "read CSV header");

        let mut seen = HashSet::new();
        if let Some(dup) = header.iter().find(|h| !seen.insert(h.as_str())) {
            return Err(IoError::DuplicateColumn {
                path: self.path.clone(),
                column: dup.clone(),
            });
        }

        let mut records = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.csv_error(e))?;
            if record.len() != header.len() {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: header.len(),
                    got: record.len(),
                });
            }
            records.push(record);
        }

        if records.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        Ok(RawCsv { header, records })
    }

    fn csv_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }

    fn position(&self, header: &[String], name: &str) -> Result<usize, IoError> {
        header.iter().position(|h| h == name).ok_or_else(|| IoError::MissingColumn {
            path: self.path.clone(),
            column: name.to_string(),
        })
    }

    /// Non-empty cells of column `index`.
    fn cells<'r>(&self, raw: &'r RawCsv, index: usize) -> Result<Vec<&'r str>, IoError> {
        raw.records
            .iter()
            .enumerate()
            .map(|(row_index, record)| match record.get(index) {
                Some(cell) if !cell.is_empty() => Ok(cell),
                _ => Err(IoError::MissingValue {
                    path: self.path.clone(),
                    row_index,
                    column: raw.header[index].clone(),
                }),
            })
            .collect()
    }

    fn parse_numeric(&self, cells: &[&str], column: &str) -> Result<Vec<f64>, IoError> {
        cells
            .iter()
            .enumerate()
            .map(|(row_index, raw)| match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => Ok(value),
                _ => Err(IoError::NonNumericValue {
                    path: self.path.clone(),
                    row_index,
                    column: column.to_string(),
                    raw: (*raw).to_string(),
                }),
            })
            .collect()
    }

    fn infer_column(&self, raw: &RawCsv, index: usize) -> Result<Column, IoError> {
        let name = &raw.header[index];
        let cells = self.cells(raw, index)?;
        let kind = self.kinds.get(name).copied().unwrap_or_else(|| {
            if cells.iter().all(|c| c.parse::<f64>().is_ok_and(f64::is_finite)) {
                ColumnType::Numeric
            } else {
                ColumnType::Categorical
            }
        });
        debug!(column = %name, ?kind, "column kind resolved");

        match kind {
            ColumnType::Numeric => Ok(Column::numeric(name.clone(), self.parse_numeric(&cells, name)?)),
            ColumnType::Categorical => Ok(Column::categorical_from_strs(name.clone(), &cells)),
        }
    }

    fn encode_column(&self, raw: &RawCsv, index: usize, schema: &ColumnSchema) -> Result<Column, IoError> {
        let cells = self.cells(raw, index)?;
        match &schema.kind {
            ColumnKind::Numeric => Ok(Column::numeric(
                schema.name.clone(),
                self.parse_numeric(&cells, &schema.name)?,
            )),
            ColumnKind::Categorical { levels } => {
                let lookup: HashMap<&str, usize> = levels.iter().enumerate().map(|(i, l)| (l.as_str(), i)).collect();
                let codes = cells
                    .iter()
                    .enumerate()
                    .map(|(row_index, cell)| {
                        lookup.get(cell).copied().ok_or_else(|| IoError::UnknownLevel {
                            path: self.path.clone(),
                            row_index,
                            column: schema.name.clone(),
                            level: (*cell).to_string(),
                        })
                    })
                    .collect::<Result<Vec<usize>, IoError>>()?;
                Ok(Column::Categorical {
                    name: schema.name.clone(),
                    levels: levels.clone(),
                    codes,
                })
            }
        }
    }
}
