//! Severity featurization ahead of the energy model.

use serde::{Deserialize, Serialize};

use crate::error::{DiagnosisError, Result};
use crate::observation::SensorObservation;

/// One raw reading, typically a z-score or residual. Readings are assumed
/// to arrive in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub value: f64,
}

impl SensorReading {
    pub fn new(sensor_id: impl Into<String>, value: f64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            value,
        }
    }
}

/// `(x − mean) / std` for every value.
pub fn compute_z_scores(values: &[f64], mean: f64, std: f64) -> Result<Vec<f64>> {
    if !mean.is_finite() {
        return Err(DiagnosisError::invalid_input(format!("mean must be finite, got {mean}")));
    }
    if !std.is_finite() || std <= 0.0 {
        return Err(DiagnosisError::invalid_input(format!(
            "standard deviation must be finite and > 0, got {std}"
        )));
    }
    Ok(values.iter().map(|x| (x - mean) / std).collect())
}

/// Severities divided by the largest one, so the most severe sensor scores 1.
/// All zeros when every severity is zero.
pub fn normalize_severities(sensors: &[SensorObservation]) -> Vec<f64> {
    let max = sensors
        .iter()
        .map(SensorObservation::severity)
        .fold(0.0, f64::max);
    if max <= 0.0 {
        return vec![0.0; sensors.len()];
    }
    sensors.iter().map(|s| s.severity() / max).collect()
}

/// Collapse a stream of readings into one observation per sensor.
///
/// Each sensor's severity is the mean absolute value over its last `window`
/// readings. Sensors appear in order of first appearance.
pub fn aggregate_window(
    readings: &[SensorReading],
    window: usize,
) -> Result<Vec<SensorObservation>> {
    if window == 0 {
        return Err(DiagnosisError::invalid_input("window size must be at least 1"));
    }

    let mut order: Vec<&str> = Vec::new();
    let mut series: Vec<Vec<f64>> = Vec::new();
    for r in readings {
        if !r.value.is_finite() {
            return Err(DiagnosisError::invalid_input(format!(
                "sensor '{}' has non-finite reading {}",
                r.sensor_id, r.value
            )));
        }
        match order.iter().position(|id| *id == r.sensor_id) {
            Some(i) => series[i].push(r.value),
            None => {
                order.push(&r.sensor_id);
                series.push(vec![r.value]);
            }
        }
    }

    order
        .into_iter()
        .zip(series)
        .map(|(id, values)| {
            let tail = &values[values.len().saturating_sub(window)..];
            let severity = tail.iter().map(|v| v.abs()).sum::<f64>() / tail.len() as f64;
            SensorObservation::new(id, severity)
        })
        .collect()
}
