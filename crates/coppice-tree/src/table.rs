//! Typed tables: categorical-with-levels and numeric columns, response first.

use std::collections::HashSet;
use std::fmt;

use crate::error::TreeError;

/// Learning task implied by the response column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Task {
    /// Categorical response.
    Classification,
    /// Numeric response.
    Regression,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::Classification => f.write_str("classification"),
            Task::Regression => f.write_str("regression"),
        }
    }
}

/// One named column of a [`Table`].
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Values drawn from a fixed, ordered set of levels; `codes[row]` indexes `levels`.
    Categorical {
        /// Column name.
        name: String,
        /// Ordered level names.
        levels: Vec<String>,
        /// Per-row level codes.
        codes: Vec<usize>,
    },
    /// Finite floating-point values.
    Numeric {
        /// Column name.
        name: String,
        /// Per-row values.
        values: Vec<f64>,
    },
}

impl Column {
    /// Build a categorical column from raw string values, with levels in first-seen order.
    #[must_use]
    pub fn categorical_from_strs<S: AsRef<str>>(name: impl Into<String>, raw: &[S]) -> Self {
        let mut levels: Vec<String> = Vec::new();
        let codes = raw
            .iter()
            .map(|v| {
                let v = v.as_ref();
                match levels.iter().position(|l| l == v) {
                    Some(code) => code,
                    None => {
                        levels.push(v.to_string());
                        levels.len() - 1
                    }
                }
            })
            .collect();
        Column::Categorical {
            name: name.into(),
            levels,
            codes,
        }
    }

    /// Build a numeric column.
    #[must_use]
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Column::Numeric {
            name: name.into(),
            values,
        }
    }

    /// Return the column name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Column::Categorical { name, .. } | Column::Numeric { name, .. } => name,
        }
    }

    /// Return the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Column::Categorical { codes, .. } => codes.len(),
            Column::Numeric { values, .. } => values.len(),
        }
    }

    /// Return `true` if the column has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the declared levels of a categorical column, `None` for numeric.
    #[must_use]
    pub fn levels(&self) -> Option<&[String]> {
        match self {
            Column::Categorical { levels, .. } => Some(levels),
            Column::Numeric { .. } => None,
        }
    }

    /// Return the schema entry describing this column.
    #[must_use]
    pub fn schema(&self) -> ColumnSchema {
        let kind = match self {
            Column::Categorical { levels, .. } => ColumnKind::Categorical {
                levels: levels.clone(),
            },
            Column::Numeric { .. } => ColumnKind::Numeric,
        };
        ColumnSchema {
            name: self.name().to_string(),
            kind,
        }
    }

    fn take_rows(&self, rows: &[usize]) -> Column {
        match self {
            Column::Categorical {
                name,
                levels,
                codes,
            } => Column::Categorical {
                name: name.clone(),
                levels: levels.clone(),
                codes: rows.iter().map(|&r| codes[r]).collect(),
            },
            Column::Numeric { name, values } => Column::Numeric {
                name: name.clone(),
                values: rows.iter().map(|&r| values[r]).collect(),
            },
        }
    }

    fn validate(&self, expected_len: usize) -> Result<(), TreeError> {
        if self.len() != expected_len {
            return Err(TreeError::ColumnLengthMismatch {
                column: self.name().to_string(),
                expected: expected_len,
                got: self.len(),
            });
        }
        match self {
            Column::Categorical {
                name,
                levels,
                codes,
            } => {
                if levels.is_empty() {
                    return Err(TreeError::InvalidLevels {
                        column: name.clone(),
                        reason: "no levels declared".to_string(),
                    });
                }
                let mut seen = HashSet::with_capacity(levels.len());
                for level in levels {
                    if !seen.insert(level.as_str()) {
                        return Err(TreeError::InvalidLevels {
                            column: name.clone(),
                            reason: format!("level '{level}' declared twice"),
                        });
                    }
                }
                if let Some((row, &code)) = codes.iter().enumerate().find(|&(_, &c)| c >= levels.len()) {
                    return Err(TreeError::LevelCodeOutOfRange {
                        column: name.clone(),
                        row,
                        code,
                        n_levels: levels.len(),
                    });
                }
            }
            Column::Numeric { name, values } => {
                if let Some(row) = values.iter().position(|v| !v.is_finite()) {
                    return Err(TreeError::NonFiniteValue {
                        column: name.clone(),
                        row,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Kind of a column in a [`TableSchema`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ColumnKind {
    /// Categorical with the given ordered levels.
    Categorical {
        /// Ordered level names.
        levels: Vec<String>,
    },
    /// Numeric.
    Numeric,
}

/// Name and kind of one column.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Column kind.
    pub kind: ColumnKind,
}

/// Schema of a whole table, response first.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TableSchema {
    /// Per-column schema entries; index 0 is the response.
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Return the response column's schema.
    #[must_use]
    pub fn response(&self) -> &ColumnSchema {
        &self.columns[0]
    }

    /// Return the covariate schema entries.
    #[must_use]
    pub fn covariates(&self) -> &[ColumnSchema] {
        &self.columns[1..]
    }

    /// Return the task implied by the response column.
    #[must_use]
    pub fn task(&self) -> Task {
        match self.response().kind {
            ColumnKind::Categorical { .. } => Task::Classification,
            ColumnKind::Numeric => Task::Regression,
        }
    }

    /// Check that `table`'s covariates match this schema exactly.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::SchemaMismatch`] naming the first difference.
    pub fn check_covariates(&self, table: &Table) -> Result<(), TreeError> {
        let expected = self.covariates();
        let got = table.covariates();
        if expected.len() != got.len() {
            return Err(TreeError::SchemaMismatch {
                reason: format!("expected {} covariates, got {}", expected.len(), got.len()),
            });
        }
        for (want, column) in expected.iter().zip(got) {
            let have = column.schema();
            if want.name != have.name {
                return Err(TreeError::SchemaMismatch {
                    reason: format!("expected covariate '{}', got '{}'", want.name, have.name),
                });
            }
            if want.kind != have.kind {
                return Err(TreeError::SchemaMismatch {
                    reason: format!("covariate '{}' changed kind or levels", want.name),
                });
            }
        }
        Ok(())
    }
}

/// An ordered sequence of equally long columns; column 0 is the response.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// Build and validate a table.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`TreeError::NoColumns`] | `columns` is empty |
    /// | [`TreeError::ColumnLengthMismatch`] | columns differ in row count |
    /// | [`TreeError::InvalidLevels`] | a categorical column has no or duplicate levels |
    /// | [`TreeError::LevelCodeOutOfRange`] | a code does not index its levels |
    /// | [`TreeError::NonFiniteValue`] | a numeric value is NaN or infinite |
    pub fn new(columns: Vec<Column>) -> Result<Self, TreeError> {
        let first = columns.first().ok_or(TreeError::NoColumns)?;
        let n_rows = first.len();
        for column in &columns {
            column.validate(n_rows)?;
        }
        Ok(Self { columns, n_rows })
    }

    /// Return the number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Return the response column.
    #[must_use]
    pub fn response(&self) -> &Column {
        &self.columns[0]
    }

    /// Return the covariate columns.
    #[must_use]
    pub fn covariates(&self) -> &[Column] {
        &self.columns[1..]
    }

    /// Return all columns, response first.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Return the task implied by the response column.
    #[must_use]
    pub fn task(&self) -> Task {
        match self.response() {
            Column::Categorical { .. } => Task::Classification,
            Column::Numeric { .. } => Task::Regression,
        }
    }

    /// Return the table's schema.
    #[must_use]
    pub fn schema(&self) -> TableSchema {
        TableSchema {
            columns: self.columns.iter().map(Column::schema).collect(),
        }
    }

    /// Materialize the given rows (in order, duplicates allowed) as a new table.
    #[must_use]
    pub fn take_rows(&self, rows: &[usize]) -> Table {
        Table {
            columns: self.columns.iter().map(|c| c.take_rows(rows)).collect(),
            n_rows: rows.len(),
        }
    }

    /// Check the table is usable for training: at least one row and one covariate.
    pub(crate) fn check_trainable(&self) -> Result<(), TreeError> {
        if self.n_rows == 0 {
            return Err(TreeError::EmptyTable);
        }
        if self.covariates().is_empty() {
            return Err(TreeError::NoCovariates);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Table {
        Table::new(vec![
            Column::categorical_from_strs("y", &["a", "b", "a"]),
            Column::numeric("x", vec![1.0, 2.0, 3.0]),
            Column::categorical_from_strs("c", &["p", "q", "q"]),
        ])
        .unwrap()
    }

    #[test]
    fn levels_in_first_seen_order() {
        let col = Column::categorical_from_strs("c", &["z", "x", "z", "y"]);
        assert_eq!(col.levels().unwrap(), &["z", "x", "y"]);
        match col {
            Column::Categorical { codes, .. } => assert_eq!(codes, vec![0, 1, 0, 2]),
            Column::Numeric { .. } => panic!("expected categorical"),
        }
    }

    #[test]
    fn response_and_covariates_split() {
        let table = sample_table();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.response().name(), "y");
        assert_eq!(table.covariates().len(), 2);
        assert_eq!(table.task(), Task::Classification);
    }

    #[test]
    fn take_rows_allows_duplicates() {
        let table = sample_table();
        let sub = table.take_rows(&[2, 2, 0]);
        assert_eq!(sub.n_rows(), 3);
        match &sub.covariates()[0] {
            Column::Numeric { values, .. } => assert_eq!(values, &vec![3.0, 3.0, 1.0]),
            Column::Categorical { .. } => panic!("expected numeric"),
        }
    }

    #[test]
    fn length_mismatch_rejected() {
        let err = Table::new(vec![
            Column::numeric("y", vec![1.0, 2.0]),
            Column::numeric("x", vec![1.0]),
        ])
        .unwrap_err();
        assert!(matches!(err, TreeError::ColumnLengthMismatch { expected: 2, got: 1, .. }));
    }

    #[test]
    fn non_finite_rejected() {
        let err = Table::new(vec![
            Column::numeric("y", vec![1.0, 2.0]),
            Column::numeric("x", vec![1.0, f64::NAN]),
        ])
        .unwrap_err();
        assert!(matches!(err, TreeError::NonFiniteValue { row: 1, .. }));
    }

    #[test]
    fn code_out_of_range_rejected() {
        let err = Table::new(vec![Column::Categorical {
            name: "y".into(),
            levels: vec!["a".into()],
            codes: vec![0, 1],
        }])
        .unwrap_err();
        assert!(matches!(err, TreeError::LevelCodeOutOfRange { code: 1, .. }));
    }

    #[test]
    fn duplicate_levels_rejected() {
        let err = Table::new(vec![Column::Categorical {
            name: "y".into(),
            levels: vec!["a".into(), "a".into()],
            codes: vec![0],
        }])
        .unwrap_err();
        assert!(matches!(err, TreeError::InvalidLevels { .. }));
    }

    #[test]
    fn schema_check_detects_level_change() {
        let table = sample_table();
        let schema = table.schema();
        let other = Table::new(vec![
            Column::categorical_from_strs("y", &["a"]),
            Column::numeric("x", vec![1.0]),
            Column::categorical_from_strs("c", &["q"]),
        ])
        .unwrap();
        assert!(matches!(
            schema.check_covariates(&other),
            Err(TreeError::SchemaMismatch { .. })
        ));
        assert!(schema.check_covariates(&table).is_ok());
    }
}
