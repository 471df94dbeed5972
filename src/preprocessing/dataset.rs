//! In-memory numeric table

use crate::error::{PipelineError, Result};
use ndarray::{Array2, ArrayView1, Axis};
use polars::prelude::*;

/// A table of named numeric columns with no missing cells
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    columns: Vec<String>,
    values: Array2<f64>,
}

impl Dataset {
    /// Build a dataset from column names and a row-major value matrix
    pub fn new(columns: Vec<String>, values: Array2<f64>) -> Result<Self> {
        if columns.len() != values.ncols() {
            return Err(PipelineError::ShapeError {
                expected: format!("{} columns", columns.len()),
                actual: format!("{} columns", values.ncols()),
            });
        }
        if let Some(pos) = values.iter().position(|v| v.is_nan()) {
            let col = &columns[pos % columns.len()];
            return Err(PipelineError::DataError(format!(
                "column '{}' still contains missing values",
                col
            )));
        }
        Ok(Self { columns, values })
    }

    /// Build a dataset from named columns of equal length
    pub fn from_columns(columns: Vec<(&str, Vec<f64>)>) -> Result<Self> {
        let n_rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        if let Some((name, v)) = columns.iter().find(|(_, v)| v.len() != n_rows) {
            return Err(PipelineError::ShapeError {
                expected: format!("{} rows", n_rows),
                actual: format!("{} rows in column '{}'", v.len(), name),
            });
        }

        let names = columns.iter().map(|(n, _)| n.to_string()).collect();
        let values = Array2::from_shape_fn((n_rows, columns.len()), |(i, j)| columns[j].1[i]);
        Self::new(names, values)
    }

    /// Convert a fully imputed polars frame; every column is cast to f64
    pub fn from_dataframe(df: &DataFrame) -> Result<Self> {
        let n_rows = df.height();
        let mut names = Vec::with_capacity(df.width());
        let mut data: Vec<Vec<f64>> = Vec::with_capacity(df.width());

        for column in df.get_columns() {
            let series = column.as_materialized_series();
            let name = series.name().to_string();
            let casted = series.cast(&DataType::Float64)?;
            let ca = casted.f64()?;

            let col: Vec<f64> = ca
                .into_iter()
                .map(|v| {
                    v.ok_or_else(|| {
                        PipelineError::DataError(format!(
                            "column '{}' still contains missing values",
                            name
                        ))
                    })
                })
                .collect::<Result<_>>()?;

            names.push(name);
            data.push(col);
        }

        let values = Array2::from_shape_fn((n_rows, names.len()), |(i, j)| data[j][i]);
        Self::new(names, values)
    }

    /// Column names in file order
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    /// Number of columns
    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    /// Full value matrix
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Index of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// View of a single column
    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| PipelineError::FeatureNotFound(name.to_string()))?;
        Ok(self.values.column(idx))
    }

    /// Count of missing cells, always zero for a constructed dataset
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    /// Split off the target column, returning (feature names, features, target)
    pub fn features_and_target(&self, target: &str) -> Result<(Vec<String>, Array2<f64>, Vec<f64>)> {
        let target_idx = self
            .column_index(target)
            .ok_or_else(|| PipelineError::FeatureNotFound(target.to_string()))?;

        let feature_idx: Vec<usize> = (0..self.n_cols()).filter(|&j| j != target_idx).collect();
        let names = feature_idx.iter().map(|&j| self.columns[j].clone()).collect();
        let x = self.values.select(Axis(1), &feature_idx);
        let y = self.values.column(target_idx).to_vec();

        Ok((names, x, y))
    }
}
