use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Capability contract every hosted model implements.
///
/// The descriptive accessors are read once at load time and snapshotted into
/// [`ModelMetadata`]; they should return constant values.
///
/// `predict` may be entered concurrently from several RPC calls. A model that
/// keeps mutable state must synchronize it internally.
pub trait MlModel: Send + Sync {
    /// Stable identifier, used as the registry key and the operation prefix.
    fn qualified_name(&self) -> &str;

    fn display_name(&self) -> &str;

    fn description(&self) -> &str;

    fn major_version(&self) -> u32;

    fn minor_version(&self) -> u32;

    /// JSON schema of the accepted input, if the model declares one.
    fn input_schema(&self) -> Option<Value> {
        None
    }

    /// JSON schema of the produced output, if the model declares one.
    fn output_schema(&self) -> Option<Value> {
        None
    }

    fn predict(&self, data: Value) -> anyhow::Result<Value>;
}

/// Descriptive projection of a model, without the live instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub qualified_name: String,
    pub display_name: String,
    pub description: String,
    pub major_version: u32,
    pub minor_version: u32,
    pub input_schema: Option<Value>,
    pub output_schema: Option<Value>,
}

impl ModelMetadata {
    pub fn from_model(model: &dyn MlModel) -> Self {
        Self {
            qualified_name: model.qualified_name().to_string(),
            display_name: model.display_name().to_string(),
            description: model.description().to_string(),
            major_version: model.major_version(),
            minor_version: model.minor_version(),
            input_schema: model.input_schema(),
            output_schema: model.output_schema(),
        }
    }

    /// RPC operation name under which this model's predictions are served.
    pub fn operation_name(&self) -> String {
        predict_operation_name(&self.qualified_name)
    }
}

pub fn predict_operation_name(qualified_name: &str) -> String {
    format!("{}_predict", qualified_name)
}

/// Where to obtain one model implementation.
///
/// The descriptor only locates the implementation; the model declares its own
/// identity through [`MlModel::qualified_name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(alias = "module_name", alias = "module")]
    pub load_target: String,
    #[serde(alias = "class_name", alias = "class")]
    pub implementation_name: String,
}

impl ModelDescriptor {
    pub fn new(load_target: impl Into<String>, implementation_name: impl Into<String>) -> Self {
        Self {
            load_target: load_target.into(),
            implementation_name: implementation_name.into(),
        }
    }
}

impl std::fmt::Display for ModelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.load_target, self.implementation_name)
    }
}
