//! Service composition
//!
//! Turns a loaded [`ModelRegistry`] into the frozen [`OperationTable`] the
//! transport dispatches against: one `<qualified_name>_predict` operation per
//! model plus the fixed `get_models` and `get_model_metadata` operations.
//!
//! [`ServiceLifecycle`] drives `Unstarted -> Loading -> Ready | LoadFailed`.
//! Only `Ready` hands out a table.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info};

use crate::endpoint::{make_endpoint, Endpoint};
use crate::error::{CallError, CompositionError, NotFoundError, StartupError};
use crate::models::{ModelCatalog, ModelDescriptor};
use crate::registry::ModelRegistry;

pub const GET_MODELS: &str = "get_models";
pub const GET_MODEL_METADATA: &str = "get_model_metadata";

/// Handler stored under one operation name.
#[derive(Debug, Clone)]
pub enum Operation {
    GetModels,
    GetModelMetadata,
    Predict(Endpoint),
}

/// Frozen mapping from operation name to handler.
#[derive(Debug)]
pub struct OperationTable {
    registry: Arc<ModelRegistry>,
    operations: BTreeMap<String, Operation>,
}

impl OperationTable {
    pub fn contains(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    /// Operation names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.operations.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Dispatch one call by operation name.
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, CallError> {
        let operation = self
            .operations
            .get(name)
            .ok_or_else(|| CallError::UnknownOperation(name.to_string()))?;

        debug!("Dispatching {} with {} argument(s)", name, args.len());

        match operation {
            Operation::GetModels => {
                expect_arity(name, &args, 0)?;
                to_value(name, self.registry.get_models())
            }
            Operation::GetModelMetadata => {
                let [qualified_name] = take_args::<1>(name, args)?;
                let qualified_name = match qualified_name {
                    Value::String(s) => s,
                    other => {
                        return Err(CallError::InvalidArguments {
                            operation: name.to_string(),
                            reason: format!("qualified_name must be a string, got {}", other),
                        })
                    }
                };
                match self.registry.get_model_metadata(&qualified_name) {
                    Some(metadata) => to_value(name, metadata),
                    None => Err(CallError::NotFound {
                        operation: name.to_string(),
                        source: NotFoundError::new(qualified_name),
                    }),
                }
            }
            Operation::Predict(endpoint) => {
                let [data] = take_args::<1>(name, args)?;
                endpoint.call(data).map_err(|e| CallError::Prediction {
                    operation: name.to_string(),
                    source: e.into(),
                })
            }
        }
    }
}

fn expect_arity(name: &str, args: &[Value], expected: usize) -> Result<(), CallError> {
    if args.len() != expected {
        return Err(CallError::InvalidArguments {
            operation: name.to_string(),
            reason: format!("expected {} argument(s), got {}", expected, args.len()),
        });
    }
    Ok(())
}

fn take_args<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], CallError> {
    expect_arity(name, &args, N)?;
    args.try_into().map_err(|_| CallError::InvalidArguments {
        operation: name.to_string(),
        reason: format!("expected {} argument(s)", N),
    })
}

fn to_value<T: serde::Serialize>(name: &str, value: T) -> Result<Value, CallError> {
    serde_json::to_value(value).map_err(|e| CallError::Internal {
        operation: name.to_string(),
        reason: e.to_string(),
    })
}

/// Build the operation table for every model in `registry`.
pub fn compose(registry: Arc<ModelRegistry>) -> Result<OperationTable, CompositionError> {
    let mut operations = BTreeMap::new();

    for metadata in registry.get_models() {
        let endpoint = make_endpoint(&registry, &metadata.qualified_name).map_err(|e| {
            error!("Registry lost track of {}: {}", metadata.qualified_name, e);
            e
        })?;
        let operation_name = endpoint.operation_name();
        info!("Exposing operation {}", operation_name);
        debug!("{}: {}", operation_name, endpoint.doc());
        operations.insert(operation_name, Operation::Predict(endpoint));
    }

    operations.insert(GET_MODELS.to_string(), Operation::GetModels);
    operations.insert(GET_MODEL_METADATA.to_string(), Operation::GetModelMetadata);

    info!("Composed {} operation(s)", operations.len());
    Ok(OperationTable { registry, operations })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Unstarted,
    Loading,
    Ready,
    LoadFailed,
}

/// Startup state machine for the service.
#[derive(Debug)]
pub struct ServiceLifecycle {
    state: ServiceState,
}

impl ServiceLifecycle {
    pub fn new() -> Self {
        Self {
            state: ServiceState::Unstarted,
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Load the configured models and compose the operation table.
    ///
    /// Any failure moves to `LoadFailed`, which is terminal.
    pub fn start(
        &mut self,
        catalog: &ModelCatalog,
        descriptors: &[ModelDescriptor],
    ) -> Result<Arc<OperationTable>, StartupError> {
        match self.state {
            ServiceState::Unstarted => {}
            ServiceState::LoadFailed => return Err(StartupError::LoadFailed),
            ServiceState::Loading | ServiceState::Ready => return Err(StartupError::AlreadyStarted),
        }

        self.state = ServiceState::Loading;
        match Self::build(catalog, descriptors) {
            Ok(table) => {
                self.state = ServiceState::Ready;
                info!("Service ready with operations: {:?}", table.names());
                Ok(Arc::new(table))
            }
            Err(e) => {
                self.state = ServiceState::LoadFailed;
                error!("Service failed to start: {}", e);
                Err(e)
            }
        }
    }

    fn build(catalog: &ModelCatalog, descriptors: &[ModelDescriptor]) -> Result<OperationTable, StartupError> {
        let registry = ModelRegistry::from_descriptors(catalog, descriptors)?;
        Ok(compose(Arc::new(registry))?)
    }
}

impl Default for ServiceLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
