//! Iris species classifier
//!
//! Small nearest-centroid model over the four classic iris measurements.
//! Shipped as the default hosted model so a fresh deployment has something
//! to serve.

use anyhow::Context;
use serde::Deserialize;
use serde_json::{json, Value};

use super::model_trait::MlModel;

/// Per-species feature means (sepal length, sepal width, petal length, petal width) in cm.
const CENTROIDS: [(&str, [f64; 4]); 3] = [
    ("setosa", [5.006, 3.428, 1.462, 0.246]),
    ("versicolor", [5.936, 2.770, 4.260, 1.326]),
    ("virginica", [6.588, 2.974, 5.552, 2.026]),
];

#[derive(Debug, Deserialize)]
struct IrisInput {
    sepal_length: f64,
    sepal_width: f64,
    petal_length: f64,
    petal_width: f64,
}

impl IrisInput {
    fn features(&self) -> [f64; 4] {
        [self.sepal_length, self.sepal_width, self.petal_length, self.petal_width]
    }
}

pub struct IrisModel;

impl IrisModel {
    pub fn new() -> Self {
        Self
    }

    fn classify(features: [f64; 4]) -> &'static str {
        let mut best = CENTROIDS[0].0;
        let mut best_distance = f64::INFINITY;
        for (species, centroid) in CENTROIDS.iter() {
            let distance: f64 = centroid
                .iter()
                .zip(features.iter())
                .map(|(c, x)| (c - x) * (c - x))
                .sum();
            if distance < best_distance {
                best_distance = distance;
                best = *species;
            }
        }
        best
    }
}

impl Default for IrisModel {
    fn default() -> Self {
        Self::new()
    }
}

impl MlModel for IrisModel {
    fn qualified_name(&self) -> &str {
        "iris_model"
    }

    fn display_name(&self) -> &str {
        "Iris Model"
    }

    fn description(&self) -> &str {
        "A model that predicts the species of a flower based on its measurements."
    }

    fn major_version(&self) -> u32 {
        0
    }

    fn minor_version(&self) -> u32 {
        1
    }

    fn input_schema(&self) -> Option<Value> {
        let measurement = json!({"type": "number", "minimum": 0});
        Some(json!({
            "type": "object",
            "properties": {
                "sepal_length": measurement,
                "sepal_width": measurement,
                "petal_length": measurement,
                "petal_width": measurement,
            },
            "required": ["sepal_length", "sepal_width", "petal_length", "petal_width"],
        }))
    }

    fn output_schema(&self) -> Option<Value> {
        Some(json!({
            "type": "object",
            "properties": {
                "species": {"type": "string", "enum": ["setosa", "versicolor", "virginica"]},
            },
            "required": ["species"],
        }))
    }

    fn predict(&self, data: Value) -> anyhow::Result<Value> {
        let input: IrisInput = serde_json::from_value(data).context("invalid iris measurements")?;
        let features = input.features();
        if features.iter().any(|x| !x.is_finite() || *x < 0.0) {
            anyhow::bail!("iris measurements must be finite and non-negative");
        }
        Ok(json!({ "species": Self::classify(features) }))
    }
}
