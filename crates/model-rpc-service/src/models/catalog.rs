//! Model Catalog
//!
//! Registration table of model implementations this binary knows how to build.
//! Configuration picks entries from here by `(load_target, implementation_name)`
//! instead of resolving arbitrary strings to code.

use std::collections::HashMap;
use std::sync::Arc;

use super::iris_model::IrisModel;
use super::model_trait::{MlModel, ModelDescriptor};

/// Zero-argument constructor for one model implementation.
pub type ModelFactory = Arc<dyn Fn() -> anyhow::Result<Box<dyn MlModel>> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ModelCatalog {
    factories: HashMap<(String, String), ModelFactory>,
}

impl ModelCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every implementation compiled into this crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register("iris_model.iris_predict", "IrisModel", || Ok(Box::new(IrisModel::new())));
        catalog
    }

    /// Register a factory, replacing any previous one for the same pair.
    pub fn register<F>(&mut self, load_target: &str, implementation_name: &str, factory: F)
    where
        F: Fn() -> anyhow::Result<Box<dyn MlModel>> + Send + Sync + 'static,
    {
        self.factories.insert(
            (load_target.to_string(), implementation_name.to_string()),
            Arc::new(factory),
        );
    }

    /// Register a type that can be built with `Default`.
    pub fn register_default<M>(&mut self, load_target: &str, implementation_name: &str)
    where
        M: MlModel + Default + 'static,
    {
        self.register(load_target, implementation_name, || Ok(Box::new(M::default())));
    }

    pub fn resolve(&self, descriptor: &ModelDescriptor) -> Option<&ModelFactory> {
        self.factories.get(&(
            descriptor.load_target.clone(),
            descriptor.implementation_name.clone(),
        ))
    }

    pub fn contains(&self, descriptor: &ModelDescriptor) -> bool {
        self.resolve(descriptor).is_some()
    }

    /// Registered descriptors, sorted for stable diagnostics.
    pub fn descriptors(&self) -> Vec<ModelDescriptor> {
        let mut out: Vec<ModelDescriptor> = self
            .factories
            .keys()
            .map(|(target, name)| ModelDescriptor::new(target.as_str(), name.as_str()))
            .collect();
        out.sort_by(|a, b| {
            (a.load_target.as_str(), a.implementation_name.as_str())
                .cmp(&(b.load_target.as_str(), b.implementation_name.as_str()))
        });
        out
    }
}

impl std::fmt::Debug for ModelCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCatalog")
            .field("descriptors", &self.descriptors())
            .finish()
    }
}
