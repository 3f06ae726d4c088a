//! End-to-end orchestration: request → ranked hypotheses + quality metrics.
//!
//! ```text
//! build_energy_model → to_spin → VariationalOptimizer → decode → analyze
//! ```
//!
//! The stages run strictly in sequence on the calling thread. Evaluator
//! selection and fallback policy live here, never inside the optimizer: a
//! fallback always restarts the attempt on the other evaluator.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::breaker::CircuitBreaker;
use crate::config::ServiceConfig;
use crate::decode::{Solution, decode};
use crate::error::Result;
use crate::evaluator::{BackendKind, Evaluator};
use crate::ising::to_spin;
use crate::observation::{FailurePattern, SensorObservation};
use crate::quality::{QualityMetrics, analyze};
use crate::qubo::{QuboWeights, build_energy_model};
use crate::variational::{CancelFlag, OptimizationMetadata, VariationalOptimizer};

/// One diagnosis request. Omitted weights fall back to configured defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisRequest {
    pub anomaly_id: String,
    #[serde(default)]
    pub plant_id: String,
    pub abnormal_sensors: Vec<SensorObservation>,
    pub patterns: Vec<FailurePattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beta: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gamma: Option<f64>,
}

impl DiagnosisRequest {
    pub fn new(
        anomaly_id: impl Into<String>,
        abnormal_sensors: Vec<SensorObservation>,
        patterns: Vec<FailurePattern>,
    ) -> Self {
        Self {
            anomaly_id: anomaly_id.into(),
            plant_id: String::new(),
            abnormal_sensors,
            patterns,
            alpha: None,
            beta: None,
            gamma: None,
        }
    }

    /// Request weights layered over `defaults`.
    pub fn weights(&self, defaults: QuboWeights) -> QuboWeights {
        QuboWeights {
            alpha: self.alpha.unwrap_or(defaults.alpha),
            beta: self.beta.unwrap_or(defaults.beta),
            gamma: self.gamma.unwrap_or(defaults.gamma),
        }
    }

    pub fn sensor_ids(&self) -> Vec<String> {
        self.abnormal_sensors
            .iter()
            .map(|s| s.sensor_id().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendMetadata {
    pub backend_name: String,
    pub backend_type: BackendKind,
    pub execution_time_seconds: f64,
    pub shots: u64,
    pub qaoa_depth: usize,
    pub execution_id: Uuid,
    /// True when the primary evaluator was unavailable and the fallback ran.
    pub fallback_used: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosisResult {
    pub anomaly_id: String,
    /// Ranked best first.
    pub solutions: Vec<Solution>,
    pub backend_metadata: BackendMetadata,
    pub quality_metrics: QualityMetrics,
    pub optimization: OptimizationMetadata,
}

impl DiagnosisResult {
    /// Best-ranked hypothesis, if any sample decoded.
    pub fn top(&self) -> Option<&Solution> {
        self.solutions.first()
    }
}

/// Run the full pipeline once against `evaluator`.
pub fn diagnose(
    request: &DiagnosisRequest,
    config: &ServiceConfig,
    evaluator: Arc<dyn Evaluator>,
    cancel: &CancelFlag,
) -> Result<DiagnosisResult> {
    let started = Instant::now();
    let weights = request.weights(config.qubo);
    log::info!(
        "diagnosing anomaly '{}' ({} sensors, {} patterns, alpha={} beta={} gamma={})",
        request.anomaly_id,
        request.abnormal_sensors.len(),
        request.patterns.len(),
        weights.alpha,
        weights.beta,
        weights.gamma
    );

    let model = build_energy_model(&request.abnormal_sensors, &request.patterns, weights)?;
    let hamiltonian = to_spin(&model.coefficients, &model.index)?;

    let optimizer = VariationalOptimizer::new(config.optimizer_config())?;
    let outcome = optimizer.optimize(&hamiltonian, Arc::clone(&evaluator), cancel)?;

    let solutions = decode(
        &outcome.samples,
        &model.index,
        &request.abnormal_sensors,
        &request.patterns,
        &model.coefficients,
    )?;
    let quality_metrics = analyze(&solutions, &request.sensor_ids());

    let backend_metadata = BackendMetadata {
        backend_name: evaluator.name().to_string(),
        backend_type: evaluator.kind(),
        execution_time_seconds: started.elapsed().as_secs_f64(),
        shots: config.qaoa.shots,
        qaoa_depth: config.qaoa.depth,
        execution_id: Uuid::new_v4(),
        fallback_used: false,
    };

    log::info!(
        "anomaly '{}': {} hypotheses, coverage {:.1}%, {:.3}s",
        request.anomaly_id,
        solutions.len(),
        quality_metrics.coverage_rate,
        backend_metadata.execution_time_seconds
    );

    Ok(DiagnosisResult {
        anomaly_id: request.anomaly_id.clone(),
        solutions,
        backend_metadata,
        quality_metrics,
        optimization: outcome.metadata,
    })
}

/// One attempt on `primary`, or on `fallback` when the primary is
/// unavailable.
///
/// An open `breaker` sends the attempt straight to `fallback`. Otherwise the
/// primary runs the whole attempt; if it reports `BackendUnavailable` the
/// failure is recorded and the attempt is repeated from scratch on
/// `fallback`. No other error triggers the fallback, and the two evaluators
/// never share one optimization.
pub fn diagnose_with_fallback(
    request: &DiagnosisRequest,
    config: &ServiceConfig,
    primary: Arc<dyn Evaluator>,
    fallback: Arc<dyn Evaluator>,
    breaker: &CircuitBreaker,
    cancel: &CancelFlag,
) -> Result<DiagnosisResult> {
    if !breaker.allow_request() {
        log::info!(
            "circuit breaker open for '{}'; running on '{}'",
            primary.name(),
            fallback.name()
        );
        return diagnose_on_fallback(request, config, fallback, cancel);
    }
    match diagnose(request, config, primary, cancel) {
        Ok(result) => {
            breaker.record_success();
            Ok(result)
        }
        Err(e) if e.is_backend_failure() => {
            breaker.record_failure();
            log::warn!("{e}; retrying on '{}'", fallback.name());
            diagnose_on_fallback(request, config, fallback, cancel)
        }
        Err(e) => Err(e),
    }
}

fn diagnose_on_fallback(
    request: &DiagnosisRequest,
    config: &ServiceConfig,
    fallback: Arc<dyn Evaluator>,
    cancel: &CancelFlag,
) -> Result<DiagnosisResult> {
    let mut result = diagnose(request, config, fallback, cancel)?;
    result.backend_metadata.fallback_used = true;
    Ok(result)
}

/// Run against the evaluator `config` selects, with the local simulator as
/// fallback. A configured backend that cannot even be constructed counts as
/// a failed attempt on `breaker`.
pub fn diagnose_configured(
    request: &DiagnosisRequest,
    config: &ServiceConfig,
    breaker: &CircuitBreaker,
    cancel: &CancelFlag,
) -> Result<DiagnosisResult> {
    let fallback = config.simulator()?;
    match config.build_evaluator() {
        Ok(primary) => {
            diagnose_with_fallback(request, config, primary, fallback, breaker, cancel)
        }
        Err(e) if e.is_backend_failure() => {
            breaker.record_failure();
            log::warn!("{e}; running on the local simulator");
            diagnose_on_fallback(request, config, fallback, cancel)
        }
        Err(e) => Err(e),
    }
}
