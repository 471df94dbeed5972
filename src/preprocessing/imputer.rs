//! Median imputation of missing numeric values

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Fills missing cells with the median of each column's observed values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedianImputer {
    fill_values: BTreeMap<String, f64>,
    is_fitted: bool,
}

/// Check if dtype is numeric
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Median of a slice; mean of the two middle values for even lengths
pub(crate) fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

impl MedianImputer {
    /// Create an unfitted imputer
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the median of every column.
    ///
    /// Fails on a non-numeric column, and on a column with no observed values.
    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        self.fill_values.clear();

        for column in df.get_columns() {
            let series = column.as_materialized_series();
            let name = series.name().to_string();

            // An empty CSV column is inferred as text, so check for no data first
            if series.len() > 0 && series.null_count() == series.len() {
                return Err(PipelineError::ImputationError(format!(
                    "column '{}' has no observed values to take a median from",
                    name
                )));
            }

            if !is_numeric_dtype(series.dtype()) {
                let detail = if series.null_count() > 0 {
                    format!(
                        "column '{}' has dtype {} and {} missing values; median imputation needs numeric data",
                        name,
                        series.dtype(),
                        series.null_count()
                    )
                } else {
                    format!("column '{}' has non-numeric dtype {}", name, series.dtype())
                };
                return Err(PipelineError::DataError(detail));
            }

            let casted = series.cast(&DataType::Float64)?;
            let observed: Vec<f64> = casted
                .f64()?
                .into_iter()
                .flatten()
                .filter(|v| !v.is_nan())
                .collect();
            let fill = median(&observed).ok_or_else(|| {
                PipelineError::ImputationError(format!(
                    "column '{}' has no observed values to take a median from",
                    name
                ))
            })?;

            self.fill_values.insert(name, fill);
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Replace missing cells (null or NaN) with the fitted medians
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        if !self.is_fitted {
            return Err(PipelineError::ModelNotFitted);
        }

        let mut result = df.clone();

        for (name, fill) in &self.fill_values {
            let column = df
                .column(name)
                .map_err(|_| PipelineError::FeatureNotFound(name.clone()))?;
            let series = column.as_materialized_series();
            let casted = series.cast(&DataType::Float64)?;
            let values = casted.f64()?;
            if !values.into_iter().any(|v| v.map_or(true, f64::is_nan)) {
                continue;
            }

            let filled: Float64Chunked = values
                .into_iter()
                .map(|opt| Some(opt.filter(|v| !v.is_nan()).unwrap_or(*fill)))
                .collect();

            result.with_column(filled.with_name(series.name().clone()).into_series())?;
        }

        Ok(result)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<DataFrame> {
        self.fit(df)?;
        self.transform(df)
    }

    /// Fitted median per column
    pub fn fill_values(&self) -> &BTreeMap<String, f64> {
        &self.fill_values
    }
}
