//! CSV loading and cleaning

use super::dataset::Dataset;
use super::imputer::MedianImputer;
use crate::error::{PipelineError, Result};
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::info;

/// Cell spellings read as missing, on top of empty cells
pub const MISSING_MARKERS: [&str; 6] = ["NA", "N/A", "NaN", "nan", "null", "NULL"];

/// Turn float NaN cells into nulls so they count as missing
fn nan_to_null(df: &DataFrame) -> Result<DataFrame> {
    let mut result = df.clone();
    for column in df.get_columns() {
        let series = column.as_materialized_series();
        if !matches!(series.dtype(), DataType::Float32 | DataType::Float64) {
            continue;
        }
        let casted = series.cast(&DataType::Float64)?;
        let values = casted.f64()?;
        if !values.into_iter().any(|v| v.is_some_and(f64::is_nan)) {
            continue;
        }
        let cleaned: Float64Chunked = values
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect();
        result.with_column(cleaned.with_name(series.name().clone()).into_series())?;
    }
    Ok(result)
}

/// Missing-value counts per column, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissingReport {
    pub counts: Vec<(String, usize)>,
}

impl MissingReport {
    fn from_frame(df: &DataFrame) -> Self {
        let counts = df
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), c.null_count()))
            .collect();
        Self { counts }
    }

    /// Total missing cells across all columns
    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, n)| n).sum()
    }

    /// Missing count for one column
    pub fn get(&self, column: &str) -> Option<usize> {
        self.counts.iter().find(|(c, _)| c == column).map(|(_, n)| *n)
    }

    fn log(&self, stage: &str) {
        for (column, missing) in &self.counts {
            info!(stage, column = %column, missing, "Missing values");
        }
        info!(stage, total = self.total(), "Missing values total");
    }
}

/// Loads a CSV dataset and imputes missing numeric values
pub struct DataPipeline {
    file_path: PathBuf,
    before: Option<MissingReport>,
    after: Option<MissingReport>,
}

impl DataPipeline {
    /// Create a pipeline for the given CSV path
    pub fn new(file_path: impl AsRef<Path>) -> Self {
        Self {
            file_path: file_path.as_ref().to_path_buf(),
            before: None,
            after: None,
        }
    }

    /// Read the raw CSV with a header row; schema is inferred from every row.
    ///
    /// Empty cells, [`MISSING_MARKERS`] and float NaN all come back as nulls.
    pub fn read_csv(&self) -> Result<DataFrame> {
        let file = File::open(&self.file_path).map_err(|e| {
            PipelineError::DataError(format!("{}: {}", self.file_path.display(), e))
        })?;

        let markers = MISSING_MARKERS.iter().map(|m| (*m).into()).collect();
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(None)
            .with_parse_options(
                CsvParseOptions::default()
                    .with_null_values(Some(NullValues::AllColumns(markers))),
            )
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| PipelineError::DataError(e.to_string()))?;

        nan_to_null(&df)
    }

    /// Load the CSV, report missing values, replace them with column medians
    pub fn load_and_clean(&mut self) -> Result<Dataset> {
        let raw = self.read_csv()?;
        info!(
            path = %self.file_path.display(),
            rows = raw.height(),
            columns = raw.width(),
            "Loaded dataset"
        );

        let before = MissingReport::from_frame(&raw);
        before.log("before");

        let cleaned = MedianImputer::new().fit_transform(&raw)?;

        let after = MissingReport::from_frame(&cleaned);
        after.log("after");

        self.before = Some(before);
        self.after = Some(after);

        Dataset::from_dataframe(&cleaned)
    }

    /// Missing-value counts from the last load, before imputation
    pub fn missing_before(&self) -> Option<&MissingReport> {
        self.before.as_ref()
    }

    /// Missing-value counts from the last load, after imputation
    pub fn missing_after(&self) -> Option<&MissingReport> {
        self.after.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut tmp = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        tmp.write_all(contents.as_bytes()).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn test_load_and_clean_fills_medians() {
        let tmp = write_csv(
            "ph,Hardness,Solids,Potability\n7.0,200,10000,0\n,180,9800,1\n6.5,,10200,0",
        );

        let mut pipeline = DataPipeline::new(tmp.path());
        let ds = pipeline.load_and_clean().unwrap();

        assert_eq!(ds.missing_count(), 0);
        assert!(ds.column_index("ph").is_some());
        assert!(ds.column_index("Potability").is_some());

        let ph = ds.column("ph").unwrap();
        assert!((ph[1] - 6.75).abs() < 1e-12);
        let hardness = ds.column("Hardness").unwrap();
        assert!((hardness[2] - 190.0).abs() < 1e-12);

        assert_eq!(pipeline.missing_before().unwrap().total(), 2);
        assert_eq!(pipeline.missing_before().unwrap().get("ph"), Some(1));
        assert_eq!(pipeline.missing_after().unwrap().total(), 0);
    }

    #[test]
    fn test_observed_cells_unchanged() {
        let tmp = write_csv("a,b\n1.5,10\n,20\n3.5,\n4.0,40");

        let ds = DataPipeline::new(tmp.path()).load_and_clean().unwrap();
        let a = ds.column("a").unwrap();
        let b = ds.column("b").unwrap();

        assert_eq!(a[0], 1.5);
        assert_eq!(a[2], 3.5);
        assert_eq!(a[3], 4.0);
        assert_eq!(b[0], 10.0);
        assert_eq!(b[1], 20.0);
        assert_eq!(b[3], 40.0);
    }

    #[test]
    fn test_nan_cells_are_missing() {
        let tmp = write_csv("ph,Hardness,Potability\n7.0,200,0\nNaN,180,1\n6.5,160,0");

        let mut pipeline = DataPipeline::new(tmp.path());
        let ds = pipeline.load_and_clean().unwrap();

        assert_eq!(pipeline.missing_before().unwrap().get("ph"), Some(1));
        assert_eq!(pipeline.missing_after().unwrap().total(), 0);
        assert!((ds.column("ph").unwrap()[1] - 6.75).abs() < 1e-12);
    }

    #[test]
    fn test_na_markers_are_missing() {
        let tmp = write_csv("ph,Hardness,Potability\n7.0,NA,0\nNA,180,1\n6.5,N/A,0\n8.0,null,1");

        let mut pipeline = DataPipeline::new(tmp.path());
        let ds = pipeline.load_and_clean().unwrap();

        assert_eq!(pipeline.missing_before().unwrap().get("ph"), Some(1));
        assert_eq!(pipeline.missing_before().unwrap().get("Hardness"), Some(3));
        assert_eq!(ds.missing_count(), 0);
        assert_eq!(ds.column("ph").unwrap()[1], 7.0);
        assert_eq!(ds.column("Hardness").unwrap()[0], 180.0);
    }

    #[test]
    fn test_missing_file() {
        let result = DataPipeline::new("/nonexistent/water.csv").load_and_clean();
        assert!(matches!(result, Err(PipelineError::DataError(_))));
    }

    #[test]
    fn test_text_column_with_gaps_fails() {
        let tmp = write_csv("ph,source\n7.0,well\n6.5,\n");
        let err = DataPipeline::new(tmp.path()).load_and_clean().unwrap_err();
        assert!(err.to_string().contains("source"));
    }
}
