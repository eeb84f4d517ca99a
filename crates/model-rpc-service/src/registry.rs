//! Model Registry
//!
//! Materializes models from configuration descriptors through a
//! [`ModelCatalog`], checks each against the capability contract and indexes
//! them by their self-declared qualified name.
//!
//! Loading is all-or-nothing and happens once. After a successful `load` the
//! registry is read-only and can be shared across request handlers without
//! locking.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info};

use crate::error::LoadError;
use crate::models::{MlModel, ModelCatalog, ModelDescriptor, ModelMetadata};

/// One registered model together with its metadata snapshot.
pub struct LoadedModel {
    metadata: ModelMetadata,
    model: Box<dyn MlModel>,
}

impl LoadedModel {
    fn new(model: Box<dyn MlModel>) -> Self {
        let metadata = ModelMetadata::from_model(model.as_ref());
        Self { metadata, model }
    }

    pub fn qualified_name(&self) -> &str {
        &self.metadata.qualified_name
    }

    pub fn display_name(&self) -> &str {
        &self.metadata.display_name
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn predict(&self, data: Value) -> anyhow::Result<Value> {
        self.model.predict(data)
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    /// Entries in load order.
    models: Vec<Arc<LoadedModel>>,
    /// Qualified name -> position in `models`.
    index: HashMap<String, usize>,
    loaded: bool,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and load a registry in one step.
    pub fn from_descriptors(
        catalog: &ModelCatalog,
        descriptors: &[ModelDescriptor],
    ) -> Result<Self, LoadError> {
        let mut registry = Self::new();
        registry.load(catalog, descriptors)?;
        Ok(registry)
    }

    /// Instantiate and register every descriptor.
    ///
    /// On any failure nothing is committed and the registry stays empty.
    pub fn load(
        &mut self,
        catalog: &ModelCatalog,
        descriptors: &[ModelDescriptor],
    ) -> Result<(), LoadError> {
        if self.loaded {
            return Err(LoadError::AlreadyLoaded);
        }

        info!("Loading {} model(s) into registry", descriptors.len());

        let (models, index) = Self::stage(catalog, descriptors).map_err(|e| {
            error!("Model registry load failed: {}", e);
            e
        })?;

        for model in &models {
            let metadata = model.metadata();
            info!(
                "Registered model {} ({} v{}.{})",
                metadata.qualified_name,
                metadata.display_name,
                metadata.major_version,
                metadata.minor_version
            );
        }

        self.models = models;
        self.index = index;
        self.loaded = true;
        Ok(())
    }

    fn stage(
        catalog: &ModelCatalog,
        descriptors: &[ModelDescriptor],
    ) -> Result<(Vec<Arc<LoadedModel>>, HashMap<String, usize>), LoadError> {
        let mut models = Vec::with_capacity(descriptors.len());
        let mut index = HashMap::with_capacity(descriptors.len());

        for descriptor in descriptors {
            let factory = catalog.resolve(descriptor).ok_or_else(|| LoadError::Resolution {
                load_target: descriptor.load_target.clone(),
                implementation_name: descriptor.implementation_name.clone(),
                reason: "no implementation registered under this name".to_string(),
            })?;

            let model = factory().map_err(|e| LoadError::Resolution {
                load_target: descriptor.load_target.clone(),
                implementation_name: descriptor.implementation_name.clone(),
                reason: format!("{:#}", e),
            })?;

            check_contract(descriptor, model.as_ref())?;

            let loaded = LoadedModel::new(model);
            let qualified_name = loaded.qualified_name().to_string();
            if index.contains_key(&qualified_name) {
                return Err(LoadError::DuplicateQualifiedName { qualified_name });
            }
            index.insert(qualified_name, models.len());
            models.push(Arc::new(loaded));
        }

        Ok((models, index))
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Look up a model. Absence is reported as `None`, never as an error.
    pub fn get_model(&self, qualified_name: &str) -> Option<Arc<LoadedModel>> {
        self.index
            .get(qualified_name)
            .map(|&i| Arc::clone(&self.models[i]))
    }

    /// Metadata for every model, in load order.
    pub fn get_models(&self) -> Vec<ModelMetadata> {
        self.models.iter().map(|m| m.metadata().clone()).collect()
    }

    pub fn get_model_metadata(&self, qualified_name: &str) -> Option<ModelMetadata> {
        self.index
            .get(qualified_name)
            .map(|&i| self.models[i].metadata().clone())
    }

    pub fn qualified_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.qualified_name()).collect()
    }
}

fn check_contract(descriptor: &ModelDescriptor, model: &dyn MlModel) -> Result<(), LoadError> {
    let violation = |reason: String| LoadError::ContractViolation {
        load_target: descriptor.load_target.clone(),
        implementation_name: descriptor.implementation_name.clone(),
        reason,
    };

    let qualified_name = model.qualified_name();
    if qualified_name.is_empty() {
        return Err(violation("qualified_name is empty".to_string()));
    }
    if !qualified_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(violation(format!(
            "qualified_name '{}' may only contain ASCII letters, digits and '_'",
            qualified_name
        )));
    }
    for (field, schema) in [
        ("input_schema", model.input_schema()),
        ("output_schema", model.output_schema()),
    ] {
        if let Some(schema) = schema {
            if !matches!(schema, Value::Object(_) | Value::Bool(_)) {
                return Err(violation(format!("{} must be a JSON object or boolean", field)));
            }
        }
    }
    Ok(())
}
