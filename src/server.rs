//! Web server module for sensorium.
//!
//! Serves the Prometheus exposition endpoint plus liveness and sensor status.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::poller::SensorRegistry;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sensors: Arc<SensorRegistry>,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    sensors: usize,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/sensors", get(sensors_handler))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(Arc::new(state))
}

/// Prometheus text exposition of every registered sensor.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let encoder = TextEncoder::new();
    let families = state.sensors.metrics().gather();
    let mut buffer = Vec::new();

    match encoder.encode(&families, &mut buffer) {
        Ok(()) => (
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Metrics encoding failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}

/// Liveness probe.
async fn healthz_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        sensors: state.sensors.sensor_count().await,
    })
}

/// Latest poll status of every sensor.
async fn sensors_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.sensors.statuses().await).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    fn create_test_state() -> AppState {
        AppState {
            sensors: Arc::new(SensorRegistry::new(prometheus::Registry::new())),
        }
    }

    #[tokio::test]
    async fn test_healthz_endpoint() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sensors"], 0);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_empty_registry() {
        let app = create_router(create_test_state());

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }
}
