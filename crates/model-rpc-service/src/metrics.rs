// model-rpc-service/src/metrics.rs

use anyhow::Result;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder};
use std::sync::OnceLock;

lazy_static! {
    static ref REGISTRY: Registry = Registry::new();
}
static RPC_CALLS: OnceLock<IntCounterVec> = OnceLock::new();
static RPC_CALL_DURATION: OnceLock<HistogramVec> = OnceLock::new();
static MODELS_LOADED: OnceLock<IntGauge> = OnceLock::new();

/// Create and register the service metrics. Safe to call more than once.
pub fn init_metrics() -> Result<()> {
    if RPC_CALLS.get().is_none() {
        let calls = IntCounterVec::new(
            prometheus::opts!("rpc_calls_total", "Total RPC calls per operation"),
            &["operation", "status"],
        )?;
        if RPC_CALLS.set(calls.clone()).is_ok() {
            REGISTRY.register(Box::new(calls)).ok();
        }
    }

    if RPC_CALL_DURATION.get().is_none() {
        let duration = HistogramVec::new(
            HistogramOpts::new("rpc_call_duration_seconds", "Time spent executing an RPC call"),
            &["operation"],
        )?;
        if RPC_CALL_DURATION.set(duration.clone()).is_ok() {
            REGISTRY.register(Box::new(duration)).ok();
        }
    }

    if MODELS_LOADED.get().is_none() {
        let loaded = IntGauge::new("models_loaded", "Number of models hosted by this service")?;
        if MODELS_LOADED.set(loaded.clone()).is_ok() {
            REGISTRY.register(Box::new(loaded)).ok();
        }
    }

    Ok(())
}

pub fn inc_call(operation: &str, status: &str) {
    if let Some(counter) = RPC_CALLS.get() {
        counter.with_label_values(&[operation, status]).inc();
    }
}

pub fn observe_call_duration(operation: &str, seconds: f64) {
    if let Some(histogram) = RPC_CALL_DURATION.get() {
        histogram.with_label_values(&[operation]).observe(seconds);
    }
}

pub fn set_models_loaded(count: usize) {
    if let Some(gauge) = MODELS_LOADED.get() {
        gauge.set(count as i64);
    }
}

pub fn render() -> Result<Vec<u8>> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

pub async fn get_metrics() -> impl IntoResponse {
    match render() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; version=0.0.4")],
            e.to_string().into_bytes(),
        ),
    }
}
