//! HTTP diagnosis server.
//!
//! Accepts an anomaly window plus a failure-pattern library and answers with
//! ranked root-cause hypotheses. The pipeline is CPU-bound, so each request
//! runs on tokio's blocking pool.

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;

use rootcause_core::{
    CancelFlag, CircuitBreaker, DiagnosisError, DiagnosisRequest, DiagnosisResult, ServiceConfig,
    diagnose_configured,
};

/// Shared server state. The breaker spans requests, so once the configured
/// backend keeps failing whole requests start on the simulator.
struct AppState {
    config: ServiceConfig,
    breaker: CircuitBreaker,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    backend: BackendInfo,
}

#[derive(Serialize)]
struct BackendInfo {
    #[serde(rename = "type")]
    backend_type: String,
    name: Option<String>,
    available: bool,
    breaker: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    detail: String,
}

/// Pipeline error rendered as a JSON body with a matching status.
struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, error: &str, detail: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                error: error.to_string(),
                detail: detail.into(),
            },
        }
    }
}

impl From<DiagnosisError> for ApiError {
    fn from(e: DiagnosisError) -> Self {
        let (status, kind) = match &e {
            DiagnosisError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "invalid_input"),
            DiagnosisError::InvalidCircuit { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "invalid_circuit")
            }
            DiagnosisError::BackendUnavailable { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable")
            }
            DiagnosisError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            DiagnosisError::InvalidIndex { .. } | DiagnosisError::Io { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal")
            }
        };
        if status.is_server_error() {
            log::error!("diagnosis failed: {e}");
        } else {
            log::debug!("rejected request: {e}");
        }
        Self::new(status, kind, e.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

async fn handle_diagnose(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<DiagnosisRequest>, JsonRejection>,
) -> Result<Json<DiagnosisResult>, ApiError> {
    let Json(request) = payload?;
    let task_state = Arc::clone(&state);
    let result = tokio::task::spawn_blocking(move || {
        diagnose_configured(
            &request,
            &task_state.config,
            &task_state.breaker,
            &CancelFlag::new(),
        )
    })
    .await
    .map_err(|e| {
        log::error!("diagnosis task panicked: {e}");
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", "diagnosis task failed")
    })??;
    Ok(Json(result))
}

async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let backend = &state.config.backend;
    let available = state.config.build_evaluator().is_ok();
    Json(HealthResponse {
        status: if available {
            "healthy".to_string()
        } else {
            "degraded".to_string()
        },
        version: rootcause_core::VERSION.to_string(),
        backend: BackendInfo {
            backend_type: backend.backend_type.to_string(),
            name: backend.backend_name.clone(),
            available,
            breaker: state.breaker.state().to_string(),
        },
    })
}

async fn handle_index(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let cfg = &state.config;
    Json(serde_json::json!({
        "name": "rootcause diagnosis server",
        "version": rootcause_core::VERSION,
        "backend": cfg.backend.backend_type.to_string(),
        "defaults": {
            "alpha": cfg.qubo.alpha,
            "beta": cfg.qubo.beta,
            "gamma": cfg.qubo.gamma,
            "qaoa_depth": cfg.qaoa.depth,
            "optimizer": cfg.qaoa.optimizer.as_str(),
            "max_iterations": cfg.qaoa.max_iterations,
            "shots": cfg.qaoa.shots,
        },
        "endpoints": {
            "/": "This API index",
            "/health": "Health check",
            "/diagnose-plant-anomaly": {
                "method": "POST",
                "description": "Rank failure-pattern hypotheses for an anomaly window",
                "body": {
                    "anomaly_id": "string",
                    "plant_id": "string (optional)",
                    "abnormal_sensors": "[{sensor_id, severity}]",
                    "patterns":
                        "[{pattern_id, description, affected_sensors, weight?, topology_tags?}]",
                    "alpha": "number (optional)",
                    "beta": "number (optional)",
                    "gamma": "number (optional)",
                }
            },
        },
    }))
}

/// Build the axum router.
pub fn build_router(config: ServiceConfig) -> Router {
    let state = Arc::new(AppState {
        config,
        breaker: CircuitBreaker::default(),
    });

    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/diagnose-plant-anomaly", post(handle_diagnose))
        .with_state(state)
}

/// Run the HTTP diagnosis server until the process is stopped.
pub async fn run_server(config: ServiceConfig, host: &str, port: u16) -> std::io::Result<()> {
    let app = build_router(config);
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("listening on http://{addr}");
    axum::serve(listener, app).await
}
