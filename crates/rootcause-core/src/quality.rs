//! Coverage and residual analysis over a ranked solution list.

use serde::{Deserialize, Serialize};

use crate::decode::Solution;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Percentage of the sensor universe covered by the top solution.
    pub coverage_rate: f64,
    /// Mean number of selected patterns across all returned solutions.
    pub average_pattern_count: f64,
    /// Sensors the top solution leaves unexplained, in universe order.
    pub residual_anomalies: Vec<String>,
}

/// Analyze `solutions` (already ranked) against the full sensor universe.
pub fn analyze(solutions: &[Solution], all_sensor_ids: &[String]) -> QualityMetrics {
    let covered: &[String] = solutions
        .first()
        .map(Solution::covered_sensors)
        .unwrap_or_default();

    let covered_in_universe = all_sensor_ids.iter().filter(|id| covered.contains(*id)).count();
    let coverage_rate = if all_sensor_ids.is_empty() {
        0.0
    } else {
        100.0 * covered_in_universe as f64 / all_sensor_ids.len() as f64
    };

    let average_pattern_count = if solutions.is_empty() {
        0.0
    } else {
        solutions.iter().map(Solution::pattern_count).sum::<usize>() as f64 / solutions.len() as f64
    };

    let residual_anomalies = all_sensor_ids
        .iter()
        .filter(|id| !covered.contains(*id))
        .cloned()
        .collect();

    QualityMetrics {
        coverage_rate,
        average_pattern_count,
        residual_anomalies,
    }
}
