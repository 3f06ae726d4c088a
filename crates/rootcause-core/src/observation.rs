//! Validated input value objects: abnormal sensors and known failure patterns.
//!
//! Both types are immutable once constructed. Construction (directly or through
//! serde) rejects values the energy model cannot use, so downstream stages can
//! treat them as trusted.

use serde::{Deserialize, Serialize};

use crate::error::{DiagnosisError, Result};

/// Default weight applied to a pattern when none is supplied.
pub const DEFAULT_PATTERN_WEIGHT: f64 = 1.0;

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// One abnormal sensor in the current anomaly window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SensorObservationPayload")]
pub struct SensorObservation {
    sensor_id: String,
    severity: f64,
}

/// Unvalidated wire form of [`SensorObservation`].
#[derive(Debug, Clone, Deserialize)]
struct SensorObservationPayload {
    sensor_id: String,
    severity: f64,
}

impl TryFrom<SensorObservationPayload> for SensorObservation {
    type Error = DiagnosisError;

    fn try_from(raw: SensorObservationPayload) -> Result<Self> {
        Self::new(raw.sensor_id, raw.severity)
    }
}

impl SensorObservation {
    /// Create a sensor observation. The id must be non-blank and the severity
    /// finite and non-negative.
    pub fn new(sensor_id: impl Into<String>, severity: f64) -> Result<Self> {
        let sensor_id = sensor_id.into();
        if sensor_id.trim().is_empty() {
            return Err(DiagnosisError::invalid_input("sensor id must not be empty"));
        }
        if !severity.is_finite() || severity < 0.0 {
            return Err(DiagnosisError::invalid_input(format!(
                "sensor '{sensor_id}' has invalid severity {severity} (must be finite and >= 0)"
            )));
        }
        Ok(Self {
            sensor_id,
            severity,
        })
    }

    pub fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    pub fn severity(&self) -> f64 {
        self.severity
    }
}

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

/// A known failure mode and the sensors it is declared to explain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FailurePatternPayload")]
pub struct FailurePattern {
    pattern_id: String,
    description: String,
    affected_sensors: Vec<String>,
    weight: f64,
    topology_tags: Vec<String>,
}

/// Unvalidated wire form of [`FailurePattern`].
#[derive(Debug, Clone, Deserialize)]
struct FailurePatternPayload {
    pattern_id: String,
    #[serde(default)]
    description: String,
    affected_sensors: Vec<String>,
    #[serde(default)]
    weight: Option<f64>,
    #[serde(default)]
    topology_tags: Option<Vec<String>>,
}

impl TryFrom<FailurePatternPayload> for FailurePattern {
    type Error = DiagnosisError;

    fn try_from(raw: FailurePatternPayload) -> Result<Self> {
        let pattern = Self::new(raw.pattern_id, raw.description, raw.affected_sensors)?;
        let pattern = match raw.weight {
            Some(w) => pattern.with_weight(w)?,
            None => pattern,
        };
        Ok(pattern.with_topology_tags(raw.topology_tags.unwrap_or_default()))
    }
}

impl FailurePattern {
    /// Create a pattern with the default weight and no topology tags.
    ///
    /// Duplicate sensor ids are collapsed (first occurrence wins the position).
    /// A pattern that affects no sensors is rejected.
    pub fn new<S: Into<String>>(
        pattern_id: impl Into<String>,
        description: impl Into<String>,
        affected_sensors: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let pattern_id = pattern_id.into();
        if pattern_id.trim().is_empty() {
            return Err(DiagnosisError::invalid_input("pattern id must not be empty"));
        }

        let mut sensors: Vec<String> = Vec::new();
        for s in affected_sensors {
            let s = s.into();
            if s.trim().is_empty() {
                return Err(DiagnosisError::invalid_input(format!(
                    "pattern '{pattern_id}' lists a blank sensor id"
                )));
            }
            if !sensors.contains(&s) {
                sensors.push(s);
            }
        }
        if sensors.is_empty() {
            return Err(DiagnosisError::invalid_input(format!(
                "pattern '{pattern_id}' affects no sensors"
            )));
        }

        Ok(Self {
            pattern_id,
            description: description.into(),
            affected_sensors: sensors,
            weight: DEFAULT_PATTERN_WEIGHT,
            topology_tags: Vec::new(),
        })
    }

    /// Replace the pattern weight. Must be finite and non-negative.
    pub fn with_weight(mut self, weight: f64) -> Result<Self> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(DiagnosisError::invalid_input(format!(
                "pattern '{}' has invalid weight {weight}",
                self.pattern_id
            )));
        }
        self.weight = weight;
        Ok(self)
    }

    /// Attach opaque topology tags. The pipeline does not interpret them.
    pub fn with_topology_tags<S: Into<String>>(
        mut self,
        tags: impl IntoIterator<Item = S>,
    ) -> Self {
        self.topology_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn pattern_id(&self) -> &str {
        &self.pattern_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn affected_sensors(&self) -> &[String] {
        &self.affected_sensors
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn topology_tags(&self) -> &[String] {
        &self.topology_tags
    }

    /// Whether this pattern declares coverage of `sensor_id`.
    pub fn covers(&self, sensor_id: &str) -> bool {
        self.affected_sensors.iter().any(|s| s == sensor_id)
    }
}
