//! Model signature and the serialized model directory

use super::artifacts::ScratchFiles;
use crate::error::Result;
use crate::training::RandomForest;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Artifact directory holding the serialized model
pub const MODEL_ARTIFACT_PATH: &str = "random_forest";

/// One named input column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub dtype: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: String,
    pub shape: Vec<i64>,
}

/// Unnamed output tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "tensor-spec")]
    pub tensor_spec: TensorSpec,
}

/// Input and output schema of a trained classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSignature {
    pub inputs: Vec<ColumnSpec>,
    pub outputs: Vec<OutputSpec>,
}

impl ModelSignature {
    /// Every feature is a `double` column; the prediction is a 1-d `long` tensor
    pub fn for_classifier(feature_names: &[String]) -> Self {
        Self {
            inputs: feature_names
                .iter()
                .map(|name| ColumnSpec {
                    name: name.clone(),
                    dtype: "double".to_string(),
                })
                .collect(),
            outputs: vec![OutputSpec {
                kind: "tensor".to_string(),
                tensor_spec: TensorSpec {
                    dtype: "int64".to_string(),
                    shape: vec![-1],
                },
            }],
        }
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Example row in split orientation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputExample {
    pub columns: Vec<String>,
    pub data: Vec<Vec<f64>>,
}

impl InputExample {
    /// First row of `x`, or no rows when `x` is empty
    pub fn first_row(feature_names: &[String], x: &Array2<f64>) -> Self {
        let data = x
            .rows()
            .into_iter()
            .take(1)
            .map(|row| row.to_vec())
            .collect();
        Self {
            columns: feature_names.to_vec(),
            data,
        }
    }
}

/// Write `model.json`, `signature.json` and `input_example.json` under
/// the model directory of `scratch`
pub fn write_model_dir(
    scratch: &mut ScratchFiles,
    model: &RandomForest,
    signature: &ModelSignature,
    example: &InputExample,
) -> Result<Vec<PathBuf>> {
    let files = [
        ("model.json", serde_json::to_string(model)?),
        ("signature.json", serde_json::to_string_pretty(signature)?),
        ("input_example.json", serde_json::to_string_pretty(example)?),
    ];

    files
        .iter()
        .map(|(name, json)| scratch.write(&format!("{}/{}", MODEL_ARTIFACT_PATH, name), json))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_signature_json_shape() {
        let names = vec!["ph".to_string(), "Hardness".to_string()];
        let signature = ModelSignature::for_classifier(&names);
        let json = serde_json::to_value(&signature).unwrap();

        assert_eq!(json["inputs"][0]["name"], "ph");
        assert_eq!(json["inputs"][1]["type"], "double");
        assert_eq!(json["outputs"][0]["type"], "tensor");
        assert_eq!(json["outputs"][0]["tensor-spec"]["dtype"], "int64");
        assert_eq!(signature.input_names(), vec!["ph", "Hardness"]);
    }

    #[test]
    fn test_input_example_first_row() {
        let names = vec!["a".to_string(), "b".to_string()];
        let example = InputExample::first_row(&names, &array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(example.data, vec![vec![1.0, 2.0]]);

        let empty = InputExample::first_row(&names, &Array2::zeros((0, 2)));
        assert!(empty.data.is_empty());
    }

    #[test]
    fn test_model_dir_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut scratch = ScratchFiles::new(dir.path()).unwrap();

        let x = array![[0.0, 0.0], [0.1, 0.2], [1.0, 1.0], [0.9, 1.1]];
        let y = array![0, 0, 1, 1];
        let mut model = RandomForest::new(3).with_random_state(7);
        model.fit(&x, &y).unwrap();

        let names = vec!["a".to_string(), "b".to_string()];
        let files = write_model_dir(
            &mut scratch,
            &model,
            &ModelSignature::for_classifier(&names),
            &InputExample::first_row(&names, &x),
        )
        .unwrap();

        assert_eq!(files.len(), 3);
        let restored: RandomForest =
            serde_json::from_str(&std::fs::read_to_string(&files[0]).unwrap()).unwrap();
        assert_eq!(restored.predict(&x).unwrap(), model.predict(&x).unwrap());
    }
}
