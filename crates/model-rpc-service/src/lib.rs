// model-rpc-service/src/lib.rs

pub mod config;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod models;
pub mod registry;
pub mod rpc_client;
pub mod rpc_server;
pub mod service;
pub mod telemetry;

// Public API exports
pub use config::{Config, Profile};
pub use endpoint::{make_endpoint, Endpoint};
pub use error::{CallError, CompositionError, LoadError, NotFoundError, StartupError};
pub use models::{MlModel, ModelCatalog, ModelDescriptor, ModelMetadata};
pub use registry::{LoadedModel, ModelRegistry};
pub use rpc_client::{RemoteError, RpcClient};
pub use rpc_server::{run_rpc_server, run_rpc_server_with_catalog, HttpTransport, RpcTransport};
pub use service::{compose, Operation, OperationTable, ServiceLifecycle, ServiceState};
