//! Per-model prediction endpoint.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::error::NotFoundError;
use crate::models::predict_operation_name;
use crate::registry::{LoadedModel, ModelRegistry};

/// Single-argument callable bound to exactly one registered model.
#[derive(Debug, Clone)]
pub struct Endpoint {
    model: Arc<LoadedModel>,
    doc: String,
}

impl Endpoint {
    pub fn qualified_name(&self) -> &str {
        self.model.qualified_name()
    }

    /// Operation name this endpoint is served under.
    pub fn operation_name(&self) -> String {
        predict_operation_name(self.model.qualified_name())
    }

    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// Forward `data` to the model's `predict` and return its result as is.
    pub fn call(&self, data: Value) -> anyhow::Result<Value> {
        self.model.predict(data)
    }
}

/// Bind an endpoint to `qualified_name`, failing now if the model is absent.
pub fn make_endpoint(registry: &ModelRegistry, qualified_name: &str) -> Result<Endpoint, NotFoundError> {
    let model = registry
        .get_model(qualified_name)
        .ok_or_else(|| NotFoundError::new(qualified_name))?;

    info!("Initializing endpoint for model: {}", model.qualified_name());

    let doc = format!("Predict with the {}.", model.display_name());
    Ok(Endpoint { model, doc })
}
