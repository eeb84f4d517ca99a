//! Client for the model RPC service.
//!
//! Opens a connection to a running service and invokes one operation at a
//! time. Used by the CLI subcommands and by integration tests.

use std::fmt;

use anyhow::{anyhow, bail, Context};
use serde_json::{json, Value};

use crate::models::{predict_operation_name, ModelMetadata};
use crate::rpc_server::{RpcErrorBody, RpcRequest, RpcResponse};
use crate::service::{GET_MODELS, GET_MODEL_METADATA};

/// Error reported by the remote service for one call.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub kind: String,
    pub message: String,
    pub operation: String,
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        self.kind == "NotFound"
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.kind, self.operation, self.message)
    }
}

impl std::error::Error for RemoteError {}

impl From<RpcErrorBody> for RemoteError {
    fn from(body: RpcErrorBody) -> Self {
        Self {
            kind: body.kind,
            message: body.message,
            operation: body.operation,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// Accepts `tcp://host:port`, `host:port` or a full `http://` base URL.
    pub fn connect(endpoint: &str) -> anyhow::Result<Self> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        let base = match endpoint.split_once("://") {
            Some(("tcp", rest)) => format!("http://{}", rest),
            Some(("http", _)) | Some(("https", _)) => endpoint.to_string(),
            Some((scheme, _)) => bail!("unsupported endpoint scheme '{}'", scheme),
            None => format!("http://{}", endpoint),
        };

        Ok(Self {
            http: reqwest::Client::new(),
            url: format!("{}/rpc", base),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Invoke `method` with `args`. Remote failures surface as [`RemoteError`].
    pub async fn call(&self, method: &str, args: Vec<Value>) -> anyhow::Result<Value> {
        let request = RpcRequest {
            id: Some(json!(uuid::Uuid::new_v4().to_string())),
            method: method.to_string(),
            args,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("failed to reach {}", self.url))?;

        let status = response.status();
        let body: RpcResponse = response
            .json()
            .await
            .with_context(|| format!("malformed response from {} (HTTP {})", self.url, status))?;

        match (body.result, body.error) {
            (_, Some(error)) => Err(RemoteError::from(error).into()),
            (Some(result), None) => Ok(result),
            (None, None) => Err(anyhow!("response for '{}' carried neither result nor error", method)),
        }
    }

    pub async fn get_models(&self) -> anyhow::Result<Vec<ModelMetadata>> {
        let value = self.call(GET_MODELS, vec![]).await?;
        serde_json::from_value(value).context("unexpected get_models payload")
    }

    pub async fn get_model_metadata(&self, qualified_name: &str) -> anyhow::Result<ModelMetadata> {
        let value = self.call(GET_MODEL_METADATA, vec![json!(qualified_name)]).await?;
        serde_json::from_value(value).context("unexpected get_model_metadata payload")
    }

    pub async fn predict(&self, qualified_name: &str, data: Value) -> anyhow::Result<Value> {
        self.call(&predict_operation_name(qualified_name), vec![data]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[test]
    fn test_connect_normalizes_endpoints() {
        assert_eq!(RpcClient::connect("tcp://127.0.0.1:4242").unwrap().url(), "http://127.0.0.1:4242/rpc");
        assert_eq!(RpcClient::connect("localhost:4242").unwrap().url(), "http://localhost:4242/rpc");
        assert_eq!(RpcClient::connect("http://host:1/").unwrap().url(), "http://host:1/rpc");
        assert!(RpcClient::connect("ipc:///tmp/sock").is_err());
    }

    #[tokio::test]
    async fn test_predict_posts_operation_and_returns_result() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rpc")
            .match_body(Matcher::PartialJson(json!({
                "method": "iris_model_predict",
                "args": [{"sepal_length": 1.1}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": "x", "result": {"species": "setosa"}}"#)
            .create_async()
            .await;

        let client = RpcClient::connect(&server.url()).unwrap();
        let result = client.predict("iris_model", json!({"sepal_length": 1.1})).await.unwrap();

        assert_eq!(result, json!({"species": "setosa"}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_remote_not_found_is_typed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rpc")
            .with_status(404)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "x",
                    "error": {
                        "kind": "NotFound",
                        "message": "'asdf' not found in ModelRegistry instance.",
                        "operation": "get_model_metadata"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = RpcClient::connect(&server.url()).unwrap();
        let err = client.get_model_metadata("asdf").await.unwrap_err();
        let remote = err.downcast_ref::<RemoteError>().unwrap();
        assert!(remote.is_not_found());
        assert!(remote.message.contains("asdf"));
    }

    #[tokio::test]
    async fn test_get_models_decodes_metadata() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/rpc")
            .match_body(Matcher::PartialJson(json!({"method": "get_models", "args": []})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"result": [{
                    "qualified_name": "iris_model",
                    "display_name": "Iris Model",
                    "description": "d",
                    "major_version": 0,
                    "minor_version": 1,
                    "input_schema": null,
                    "output_schema": null
                }]})
                .to_string(),
            )
            .create_async()
            .await;

        let client = RpcClient::connect(&server.url()).unwrap();
        let models = client.get_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].qualified_name, "iris_model");
        assert_eq!(models[0].minor_version, 1);
    }
}
