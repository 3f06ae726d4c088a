//! Sample decoding: bit assignments → ranked diagnostic hypotheses.

use std::cmp::Ordering;

use serde::Serialize;

use crate::error::{DiagnosisError, Result};
use crate::evaluator::{Bitstring, SampleDistribution};
use crate::observation::{FailurePattern, SensorObservation};
use crate::qubo::{CoefficientMap, VariableIndex};

/// One decoded hypothesis. Read-only once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Solution {
    selected_patterns: Vec<String>,
    covered_sensors: Vec<String>,
    energy: f64,
    sample_frequency: f64,
    confidence_score: f64,
    count: u64,
    assignment: Bitstring,
}

impl Solution {
    /// Selected pattern ids in variable-index order.
    pub fn selected_patterns(&self) -> &[String] {
        &self.selected_patterns
    }

    /// Request sensors explained by the selected patterns, in request order.
    pub fn covered_sensors(&self) -> &[String] {
        &self.covered_sensors
    }

    /// Exact QUBO energy of `assignment`.
    pub fn energy(&self) -> f64 {
        self.energy
    }

    /// `count / total_draws`.
    pub fn sample_frequency(&self) -> f64 {
        self.sample_frequency
    }

    /// Score in `[0, 100]`.
    pub fn confidence_score(&self) -> f64 {
        self.confidence_score
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn assignment(&self) -> &Bitstring {
        &self.assignment
    }

    pub fn pattern_count(&self) -> usize {
        self.selected_patterns.len()
    }
}

/// Confidence of a solution relative to the batch.
///
/// `100 · (freq / max_freq) / (1 + (energy − best_energy))`, clamped to
/// `[0, 100]`. The best-energy solution at the highest frequency scores 100;
/// the score falls with energy and rises with frequency.
pub fn confidence(energy: f64, best_energy: f64, frequency: f64, max_frequency: f64) -> f64 {
    if max_frequency <= 0.0 {
        return 0.0;
    }
    let gap = (energy - best_energy).max(0.0);
    (100.0 * (frequency / max_frequency) / (1.0 + gap)).clamp(0.0, 100.0)
}

/// Decode every distinct assignment in `samples` and rank the results.
///
/// Ranking: energy ascending, then frequency descending, then the sorted
/// selected-pattern ids lexicographically, then the assignment itself. The
/// last key makes the order strict for distinct assignments.
pub fn decode(
    samples: &SampleDistribution,
    index: &VariableIndex,
    sensors: &[SensorObservation],
    patterns: &[FailurePattern],
    coefficients: &CoefficientMap,
) -> Result<Vec<Solution>> {
    coefficients.check_index(index)?;
    if samples.num_bits() != index.len() {
        return Err(DiagnosisError::invalid_index(format!(
            "samples have {} bits, index has {} variables",
            samples.num_bits(),
            index.len()
        )));
    }

    let mut pattern_slots = Vec::with_capacity(patterns.len());
    for p in patterns {
        let slot = index.pattern_index(p.pattern_id()).ok_or_else(|| {
            DiagnosisError::invalid_index(format!("pattern '{}' has no variable", p.pattern_id()))
        })?;
        pattern_slots.push((slot, p));
    }

    let total = samples.total_draws();
    if total == 0 {
        return Ok(Vec::new());
    }

    let mut decoded: Vec<(Vec<String>, Solution)> = Vec::with_capacity(samples.len());
    for (bits, count) in samples.iter() {
        let selected: Vec<&FailurePattern> = pattern_slots
            .iter()
            .filter(|(slot, _)| bits.get(*slot))
            .map(|&(_, p)| p)
            .collect();
        let covered = sensors
            .iter()
            .filter(|s| selected.iter().any(|p| p.covers(s.sensor_id())))
            .map(|s| s.sensor_id().to_string())
            .collect();
        let selected_patterns: Vec<String> =
            selected.iter().map(|p| p.pattern_id().to_string()).collect();
        let mut sort_key = selected_patterns.clone();
        sort_key.sort();

        let solution = Solution {
            selected_patterns,
            covered_sensors: covered,
            energy: coefficients.energy(bits.bits())?,
            sample_frequency: count as f64 / total as f64,
            confidence_score: 0.0,
            count,
            assignment: bits.clone(),
        };
        decoded.push((sort_key, solution));
    }

    decoded.sort_by(|(ka, a), (kb, b)| rank(a, ka, b, kb));

    let best_energy = decoded.first().map_or(0.0, |(_, s)| s.energy);
    let max_frequency = decoded
        .iter()
        .map(|(_, s)| s.sample_frequency)
        .fold(0.0, f64::max);

    let solutions: Vec<Solution> = decoded
        .into_iter()
        .map(|(_, mut s)| {
            s.confidence_score =
                confidence(s.energy, best_energy, s.sample_frequency, max_frequency);
            s
        })
        .collect();

    log::debug!(
        "decoded {} distinct assignments from {total} draws",
        solutions.len()
    );
    Ok(solutions)
}

fn rank(a: &Solution, a_key: &[String], b: &Solution, b_key: &[String]) -> Ordering {
    a.energy
        .total_cmp(&b.energy)
        .then_with(|| b.count.cmp(&a.count))
        .then_with(|| a_key.cmp(b_key))
        .then_with(|| a.assignment.cmp(&b.assignment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qubo::{QuboWeights, build_energy_model};

    fn fixture() -> (Vec<SensorObservation>, Vec<FailurePattern>) {
        let sensors = vec![
            SensorObservation::new("TEMP_001", 2.5).unwrap(),
            SensorObservation::new("PRESSURE_001", 3.0).unwrap(),
            SensorObservation::new("FLOW_001", 1.8).unwrap(),
        ];
        let patterns = vec![
            FailurePattern::new("PUMP_CAVITATION", "", ["PRESSURE_001", "FLOW_001", "VIB_009"])
                .unwrap(),
            FailurePattern::new("HEAT_EXCHANGER_FOULING", "", ["TEMP_001"]).unwrap(),
        ];
        (sensors, patterns)
    }

    fn dist(entries: &[(&str, u64)]) -> SampleDistribution {
        SampleDistribution::from_counts(
            5,
            entries.iter().map(|(b, c)| (b.parse::<Bitstring>().unwrap(), *c)),
        )
        .unwrap()
    }

    #[test]
    fn test_decode_reads_patterns_and_coverage() {
        let (sensors, patterns) = fixture();
        let m = build_energy_model(&sensors, &patterns, QuboWeights::default()).unwrap();
        // z_TEMP z_PRESS z_FLOW y_PUMP y_HX
        let d = dist(&[("01110", 10)]);
        let sols = decode(&d, &m.index, &sensors, &patterns, &m.coefficients).unwrap();
        assert_eq!(sols.len(), 1);
        let s = &sols[0];
        assert_eq!(s.selected_patterns(), ["PUMP_CAVITATION"]);
        // VIB_009 is outside the request and never counts.
        assert_eq!(s.covered_sensors(), ["PRESSURE_001", "FLOW_001"]);
        assert!((s.sample_frequency() - 1.0).abs() < 1e-12);
        assert!((s.confidence_score() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_recomputes_exact_energy() {
        let (sensors, patterns) = fixture();
        let m = build_energy_model(&sensors, &patterns, QuboWeights::default()).unwrap();
        let d = dist(&[("11111", 3), ("00000", 1)]);
        let sols = decode(&d, &m.index, &sensors, &patterns, &m.coefficients).unwrap();
        for s in &sols {
            let expected = m.coefficients.energy(s.assignment().bits()).unwrap();
            assert_eq!(s.energy(), expected);
        }
    }

    #[test]
    fn test_ranking_energy_then_frequency() {
        let (sensors, patterns) = fixture();
        let m = build_energy_model(&sensors, &patterns, QuboWeights::default()).unwrap();
        let d = dist(&[("11111", 2), ("00000", 50), ("01110", 5), ("11101", 9)]);
        let sols = decode(&d, &m.index, &sensors, &patterns, &m.coefficients).unwrap();
        for pair in sols.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.energy() < b.energy()
                    || (a.energy() == b.energy() && a.count() >= b.count())
            );
        }
        // Confidence is capped at 100 and non-negative.
        assert!(sols.iter().all(|s| (0.0..=100.0).contains(&s.confidence_score())));
    }

    #[test]
    fn test_exact_ties_resolved_by_pattern_ids() {
        // Zero weights make every assignment cost 0.
        let (sensors, patterns) = fixture();
        let m = build_energy_model(&sensors, &patterns, QuboWeights::new(0.0, 0.0, 0.0)).unwrap();
        let d = dist(&[("00001", 4), ("00010", 4), ("00000", 4)]);
        let sols = decode(&d, &m.index, &sensors, &patterns, &m.coefficients).unwrap();
        let order: Vec<Vec<String>> = sols.iter().map(|s| s.selected_patterns().to_vec()).collect();
        assert_eq!(
            order,
            vec![
                vec![],
                vec!["HEAT_EXCHANGER_FOULING".to_string()],
                vec!["PUMP_CAVITATION".to_string()],
            ]
        );
    }

    #[test]
    fn test_identical_pattern_sets_ordered_by_assignment() {
        let (sensors, patterns) = fixture();
        let m = build_energy_model(&sensors, &patterns, QuboWeights::new(0.0, 0.0, 0.0)).unwrap();
        let d = dist(&[("10000", 1), ("01000", 1)]);
        let sols = decode(&d, &m.index, &sensors, &patterns, &m.coefficients).unwrap();
        assert_eq!(sols[0].assignment().to_string(), "01000");
        assert_eq!(sols[1].assignment().to_string(), "10000");
    }

    #[test]
    fn test_width_mismatch_is_index_error() {
        let (sensors, patterns) = fixture();
        let m = build_energy_model(&sensors, &patterns, QuboWeights::default()).unwrap();
        let d = SampleDistribution::from_counts(4, [("0000".parse().unwrap(), 1)]).unwrap();
        assert!(matches!(
            decode(&d, &m.index, &sensors, &patterns, &m.coefficients),
            Err(DiagnosisError::InvalidIndex { .. })
        ));
    }

    #[test]
    fn test_empty_distribution_decodes_to_nothing() {
        let (sensors, patterns) = fixture();
        let m = build_energy_model(&sensors, &patterns, QuboWeights::default()).unwrap();
        let d = SampleDistribution::new(5);
        assert!(decode(&d, &m.index, &sensors, &patterns, &m.coefficients).unwrap().is_empty());
    }

    #[test]
    fn test_confidence_monotonicity() {
        assert!((confidence(1.0, 1.0, 0.5, 0.5) - 100.0).abs() < 1e-12);
        assert!(confidence(2.0, 1.0, 0.5, 0.5) < confidence(1.5, 1.0, 0.5, 0.5));
        assert!(confidence(1.5, 1.0, 0.4, 0.5) > confidence(1.5, 1.0, 0.2, 0.5));
        assert_eq!(confidence(1.0, 1.0, 0.0, 0.0), 0.0);
    }
}
