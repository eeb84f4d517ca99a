//! RPC transport and server startup
//!
//! Binds the frozen operation table to an HTTP listener. Every call is a
//! `POST /rpc` carrying `{"id", "method", "args"}`; the handler looks the
//! method up in the table and runs it on the blocking pool, since model
//! `predict` calls are synchronous. The table is shared read-only across all
//! in-flight calls.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::{
    config::Config,
    error::CallError,
    metrics,
    models::ModelCatalog,
    service::{OperationTable, ServiceLifecycle},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    pub kind: String,
    pub message: String,
    pub operation: String,
}

impl From<&CallError> for RpcErrorBody {
    fn from(err: &CallError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            operation: err.operation().to_string(),
        }
    }
}

fn status_for(err: &CallError) -> StatusCode {
    match err {
        CallError::UnknownOperation(_) | CallError::NotFound { .. } => StatusCode::NOT_FOUND,
        CallError::InvalidArguments { .. } => StatusCode::BAD_REQUEST,
        CallError::Prediction { .. } | CallError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_reply(id: Option<Value>, err: &CallError) -> (StatusCode, Json<RpcResponse>) {
    let body = RpcErrorBody::from(err);
    (status_for(err), Json(RpcResponse { id, result: None, error: Some(body) }))
}

/// Decode a call envelope. Failures keep whatever `id` and `method` could be read.
fn decode_request(body: &[u8]) -> Result<RpcRequest, (Option<Value>, CallError)> {
    let raw: Value = serde_json::from_slice(body).map_err(|e| {
        let err = CallError::InvalidArguments {
            operation: String::new(),
            reason: format!("request body is not valid JSON: {}", e),
        };
        (None, err)
    })?;

    let id = raw.get("id").cloned();
    let operation = raw.get("method").and_then(Value::as_str).unwrap_or_default().to_string();
    serde_json::from_value(raw).map_err(|e| {
        let err = CallError::InvalidArguments {
            operation,
            reason: format!("malformed request: {}", e),
        };
        (id, err)
    })
}

/// Something that can serve a frozen operation table until shutdown.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn serve(&self, table: Arc<OperationTable>) -> anyhow::Result<()>;
}

/// JSON-over-HTTP transport, stopped by Ctrl-C or SIGTERM.
pub struct HttpTransport {
    addr: SocketAddr,
}

impl HttpTransport {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn serve(&self, table: Arc<OperationTable>) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("failed to bind {}", self.addr))?;
        serve_listener(listener, table, shutdown_signal()).await
    }
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// The listener is dropped before returning, which releases the address.
pub async fn serve_listener<F>(listener: TcpListener, table: Arc<OperationTable>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Serving {} operation(s) on {}", table.len(), listener.local_addr()?);

    axum::serve(listener, build_router(table))
        .with_graceful_shutdown(shutdown)
        .await
        .context("RPC server terminated with an error")?;

    info!("RPC server stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, stopping RPC server");
}

pub fn build_router(table: Arc<OperationTable>) -> Router {
    Router::new()
        .route("/rpc", post(dispatch))
        .route("/healthz", get(|| async { "OK" }))
        .route("/metrics", get(metrics::get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(table)
}

async fn dispatch(State(table): State<Arc<OperationTable>>, body: Bytes) -> (StatusCode, Json<RpcResponse>) {
    let RpcRequest { id, method, args } = match decode_request(&body) {
        Ok(req) => req,
        Err((id, err)) => {
            warn!("Rejected request: {}", err);
            metrics::inc_call("<unknown>", err.kind());
            return error_reply(id, &err);
        }
    };
    let call_id = Uuid::new_v4();
    let span = tracing::info_span!("rpc_call", %call_id, method = %method);

    async move {
        let metric_label = if table.contains(&method) { method.clone() } else { "<unknown>".to_string() };
        let started = Instant::now();

        let outcome = {
            let table = Arc::clone(&table);
            let method = method.clone();
            tokio::task::spawn_blocking(move || table.call(&method, args)).await
        };

        metrics::observe_call_duration(&metric_label, started.elapsed().as_secs_f64());

        let result = outcome.unwrap_or_else(|join_error| {
            Err(CallError::Internal {
                operation: method.clone(),
                reason: format!("call aborted: {}", join_error),
            })
        });

        match result {
            Ok(result) => {
                debug!("Call succeeded in {:?}", started.elapsed());
                metrics::inc_call(&metric_label, "ok");
                (StatusCode::OK, Json(RpcResponse { id, result: Some(result), error: None }))
            }
            Err(err) => {
                warn!("Call failed: {}", err);
                metrics::inc_call(&metric_label, err.kind());
                error_reply(id, &err)
            }
        }
    }
    .instrument(span)
    .await
}

/// Start the service with the models compiled into this crate.
pub async fn run_rpc_server(cfg: Config) -> anyhow::Result<()> {
    run_rpc_server_with_catalog(cfg, ModelCatalog::builtin()).await
}

/// Start the service, resolving configured models through `catalog`.
pub async fn run_rpc_server_with_catalog(cfg: Config, catalog: ModelCatalog) -> anyhow::Result<()> {
    crate::telemetry::init_tracing();
    metrics::init_metrics()?;
    cfg.print_config();

    let addr = cfg.socket_addr()?;

    let mut lifecycle = ServiceLifecycle::new();
    let table = lifecycle.start(&catalog, &cfg.models)?;
    metrics::set_models_loaded(table.registry().len());

    HttpTransport::new(addr).serve(table).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{tests::{mock_catalog, mock_descriptors}, ModelRegistry};
    use crate::service::compose;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::json;
    use tower::ServiceExt;

    fn router(names: &[&str]) -> Router {
        let registry = ModelRegistry::from_descriptors(&mock_catalog(names), &mock_descriptors(names)).unwrap();
        build_router(Arc::new(compose(Arc::new(registry)).unwrap()))
    }

    async fn post_rpc(router: Router, body: Value) -> (StatusCode, RpcResponse) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/rpc")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_predict_round_trip() {
        let (status, response) = post_rpc(
            router(&["iris_model"]),
            json!({"id": 7, "method": "iris_model_predict", "args": [{"sepal_length": 1.1}]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.id, Some(json!(7)));
        assert_eq!(response.result.unwrap()["prediction"], 123);
        assert!(response.error.is_none());
    }

    #[tokio::test]
    async fn test_get_models_without_args() {
        let (status, response) = post_rpc(router(&["a_model", "b_model"]), json!({"method": "get_models"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.result.unwrap().as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_metadata_not_found_maps_to_404() {
        let (status, response) = post_rpc(
            router(&["qualified_name"]),
            json!({"method": "get_model_metadata", "args": ["asdf"]}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error = response.error.unwrap();
        assert_eq!(error.kind, "NotFound");
        assert_eq!(error.operation, "get_model_metadata");
        assert!(error.message.contains("asdf"));
        assert!(response.result.is_none());
    }

    #[tokio::test]
    async fn test_unknown_method_and_bad_args() {
        let (status, response) = post_rpc(router(&[]), json!({"method": "missing_predict", "args": [1]})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(response.error.unwrap().kind, "UnknownOperation");

        let (status, response) = post_rpc(router(&["m"]), json!({"method": "m_predict", "args": [1, 2]})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error.unwrap().kind, "InvalidArguments");
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error_envelope() {
        let (status, response) = post_rpc(router(&[]), json!({"id": 3, "method": "get_models", "args": "x"})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.id, Some(json!(3)));
        let error = response.error.unwrap();
        assert_eq!(error.kind, "InvalidArguments");
        assert_eq!(error.operation, "get_models");

        let (status, response) = post_rpc(router(&[]), json!({"args": []})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response.error.unwrap().kind, "InvalidArguments");
    }

    #[tokio::test]
    async fn test_non_json_body_gets_error_envelope() {
        let response = router(&[])
            .oneshot(Request::builder().method("POST").uri("/rpc").body(Body::from("not json")).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let response: RpcResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(response.error.unwrap().kind, "InvalidArguments");
    }

    struct ExplodingModel;

    impl crate::models::MlModel for ExplodingModel {
        fn qualified_name(&self) -> &str {
            "exploding_model"
        }
        fn display_name(&self) -> &str {
            "Exploding Model"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn major_version(&self) -> u32 {
            0
        }
        fn minor_version(&self) -> u32 {
            1
        }
        fn predict(&self, _data: Value) -> anyhow::Result<Value> {
            Err(anyhow::anyhow!("weights corrupted").context("exploding model could not predict"))
        }
    }

    #[tokio::test]
    async fn test_prediction_error_maps_to_500_and_service_keeps_serving() {
        let mut catalog = mock_catalog(&["qualified_name"]);
        catalog.register("tests.mock", "Exploding", || Ok(Box::new(ExplodingModel)));
        let mut descriptors = mock_descriptors(&["qualified_name"]);
        descriptors.push(crate::models::ModelDescriptor::new("tests.mock", "Exploding"));
        let registry = ModelRegistry::from_descriptors(&catalog, &descriptors).unwrap();
        let router = build_router(Arc::new(compose(Arc::new(registry)).unwrap()));

        let (status, response) = post_rpc(
            router.clone(),
            json!({"method": "exploding_model_predict", "args": [{"x": 1}]}),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error = response.error.unwrap();
        assert_eq!(error.kind, "PredictionError");
        assert_eq!(error.operation, "exploding_model_predict");
        assert_eq!(
            error.message,
            "'exploding_model_predict' failed: exploding model could not predict: weights corrupted"
        );

        let (status, response) = post_rpc(
            router.clone(),
            json!({"method": "qualified_name_predict", "args": [1]}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.result.unwrap()["prediction"], 123);

        let (status, _) = post_rpc(router, json!({"method": "get_models"})).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = router(&[])
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_graceful_shutdown_releases_listener() {
        let names = ["qualified_name"];
        let registry = ModelRegistry::from_descriptors(&mock_catalog(&names), &mock_descriptors(&names)).unwrap();
        let table = Arc::new(compose(Arc::new(registry)).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve_listener(listener, table, async move {
            let _ = rx.await;
        }));

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();

        // The address can be bound again once the server has stopped.
        TcpListener::bind(addr).await.unwrap();
    }
}
