//! Hosted models
//!
//! The capability contract (`MlModel`), the catalog that maps configuration
//! descriptors to constructors, and the models compiled into this crate.
pub mod model_trait;
pub mod catalog;
pub mod iris_model;
pub use model_trait::{MlModel, ModelDescriptor, ModelMetadata, predict_operation_name};
pub use catalog::{ModelCatalog, ModelFactory};
pub use iris_model::IrisModel;
