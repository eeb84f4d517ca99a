//! Error taxonomy for loading, composing and calling hosted models.
//!
//! Startup errors (`LoadError`, `CompositionError`, `StartupError`) abort the
//! process before the transport binds. `CallError` is per request and only
//! ever reaches the caller of that request.

use std::error::Error as StdError;

use thiserror::Error;

/// Failure while materializing models from configuration.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The descriptor names no known implementation, or its factory failed.
    #[error("could not resolve model '{implementation_name}' from '{load_target}': {reason}")]
    Resolution {
        load_target: String,
        implementation_name: String,
        reason: String,
    },

    /// The instance does not satisfy the capability contract.
    #[error("model '{implementation_name}' from '{load_target}' violates the capability contract: {reason}")]
    ContractViolation {
        load_target: String,
        implementation_name: String,
        reason: String,
    },

    /// Two configured models declare the same identity.
    #[error("qualified name '{qualified_name}' is declared by more than one configured model")]
    DuplicateQualifiedName { qualified_name: String },

    #[error("model registry is already loaded")]
    AlreadyLoaded,
}

/// A qualified name with no registered model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("'{qualified_name}' not found in ModelRegistry instance.")]
pub struct NotFoundError {
    pub qualified_name: String,
}

impl NotFoundError {
    pub fn new(qualified_name: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
        }
    }
}

/// Failure while turning a loaded registry into an operation table.
#[derive(Debug, Error)]
pub enum CompositionError {
    /// A model the registry reported as loaded could not be found again.
    #[error("internal inconsistency while composing operations: {0}")]
    Inconsistent(#[from] NotFoundError),
}

/// Failure of a single RPC call against the operation table.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("invalid arguments for '{operation}': {reason}")]
    InvalidArguments { operation: String, reason: String },

    #[error("{source}")]
    NotFound {
        operation: String,
        #[source]
        source: NotFoundError,
    },

    /// Raised by a model's own `predict`, tagged with the operation name.
    #[error("'{operation}' failed: {}", cause_chain(.source.as_ref()))]
    Prediction {
        operation: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },

    /// The service itself failed while handling the call.
    #[error("'{operation}' failed internally: {reason}")]
    Internal { operation: String, reason: String },
}

/// Render an error and all of its causes as `outer: inner: root`.
fn cause_chain(err: &(dyn StdError + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        rendered.push_str(": ");
        rendered.push_str(&inner.to_string());
        cause = inner.source();
    }
    rendered
}

impl CallError {
    /// Stable kind label used on the wire and in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CallError::UnknownOperation(_) => "UnknownOperation",
            CallError::InvalidArguments { .. } => "InvalidArguments",
            CallError::NotFound { .. } => "NotFound",
            CallError::Prediction { .. } => "PredictionError",
            CallError::Internal { .. } => "InternalError",
        }
    }

    /// Name of the operation that produced the error.
    pub fn operation(&self) -> &str {
        match self {
            CallError::UnknownOperation(operation)
            | CallError::InvalidArguments { operation, .. }
            | CallError::NotFound { operation, .. }
            | CallError::Prediction { operation, .. }
            | CallError::Internal { operation, .. } => operation,
        }
    }
}

/// Reasons the service never reached the `Ready` state.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to load models: {0}")]
    Load(#[from] LoadError),

    #[error("failed to compose operations: {0}")]
    Composition(#[from] CompositionError),

    #[error("service already started")]
    AlreadyStarted,

    #[error("service failed to load earlier and cannot be restarted")]
    LoadFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_model() {
        let err = NotFoundError::new("asdf");
        assert_eq!(err.to_string(), "'asdf' not found in ModelRegistry instance.");
    }

    #[test]
    fn call_error_kinds_are_stable() {
        let not_found = CallError::NotFound {
            operation: "get_model_metadata".into(),
            source: NotFoundError::new("x"),
        };
        assert_eq!(not_found.kind(), "NotFound");
        assert_eq!(not_found.operation(), "get_model_metadata");

        let prediction = CallError::Prediction {
            operation: "iris_model_predict".into(),
            source: anyhow::anyhow!("boom").into(),
        };
        assert_eq!(prediction.kind(), "PredictionError");
        assert_eq!(prediction.to_string(), "'iris_model_predict' failed: boom");

        assert_eq!(CallError::UnknownOperation("nope".into()).kind(), "UnknownOperation");

        let internal = CallError::Internal {
            operation: "get_models".into(),
            reason: "serialization failed".into(),
        };
        assert_eq!(internal.kind(), "InternalError");
        assert_eq!(internal.operation(), "get_models");
    }

    #[test]
    fn prediction_message_keeps_every_cause() {
        let cause = anyhow::anyhow!("missing field `sepal_length`").context("invalid iris measurements");
        let err = CallError::Prediction {
            operation: "iris_model_predict".into(),
            source: cause.into(),
        };
        assert_eq!(
            err.to_string(),
            "'iris_model_predict' failed: invalid iris measurements: missing field `sepal_length`"
        );
    }
}
