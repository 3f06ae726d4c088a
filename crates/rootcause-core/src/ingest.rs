//! CSV loaders for sensors and the pattern library.
//!
//! Sensors:
//!
//! ```text
//! sensor_id,severity
//! TEMP_001,2.5
//! ```
//!
//! Patterns (`weight` and `topology_tags` columns are optional; list cells are
//! `;`-separated):
//!
//! ```text
//! pattern_id,description,affected_sensors,weight,topology_tags
//! PUMP_CAVITATION,"Pump cavitation, low NPSH",PRESSURE_001;FLOW_001,1.0,pump_station
//! ```
//!
//! Raw readings, in chronological order, for [`aggregate_window`]. With
//! `mean` and `std` columns each value is first converted to a z-score:
//!
//! ```text
//! sensor_id,value,mean,std
//! TEMP_001,81.5,70.0,4.0
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Columns are matched by
//! header name, so their order is free.
//!
//! [`aggregate_window`]: crate::features::aggregate_window

use std::collections::HashSet;
use std::path::Path;

use crate::error::{DiagnosisError, Result};
use crate::features::{SensorReading, compute_z_scores};
use crate::observation::{FailurePattern, SensorObservation};

pub fn load_sensors_csv(path: impl AsRef<Path>) -> Result<Vec<SensorObservation>> {
    parse_sensors_csv(&read(path.as_ref())?)
}

pub fn load_patterns_csv(path: impl AsRef<Path>) -> Result<Vec<FailurePattern>> {
    parse_patterns_csv(&read(path.as_ref())?)
}

pub fn load_readings_csv(path: impl AsRef<Path>) -> Result<Vec<SensorReading>> {
    parse_readings_csv(&read(path.as_ref())?)
}

pub fn parse_sensors_csv(text: &str) -> Result<Vec<SensorObservation>> {
    let table = Table::parse(text)?;
    let id_col = table.column("sensor_id")?;
    let sev_col = table.column("severity")?;

    let mut sensors = Vec::with_capacity(table.rows.len());
    for (line, fields) in &table.rows {
        let id = table.cell(fields, id_col);
        let raw = table.cell(fields, sev_col);
        let severity: f64 = raw.parse().map_err(|_| {
            DiagnosisError::invalid_input(format!("line {line}: severity '{raw}' is not a number"))
        })?;
        let sensor = SensorObservation::new(id, severity).map_err(|e| at_line(*line, e))?;
        sensors.push(sensor);
    }
    log::debug!("parsed {} sensors", sensors.len());
    Ok(sensors)
}

pub fn parse_patterns_csv(text: &str) -> Result<Vec<FailurePattern>> {
    let table = Table::parse(text)?;
    let id_col = table.column("pattern_id")?;
    let sensors_col = table.column("affected_sensors")?;
    let desc_col = table.optional_column("description");
    let weight_col = table.optional_column("weight");
    let tags_col = table.optional_column("topology_tags");

    let mut patterns = Vec::with_capacity(table.rows.len());
    for (line, fields) in &table.rows {
        let description = desc_col.map_or("", |c| table.cell(fields, c));
        let mut pattern = FailurePattern::new(
            table.cell(fields, id_col),
            description,
            split_list(table.cell(fields, sensors_col)),
        )
        .map_err(|e| at_line(*line, e))?;

        if let Some(raw) = weight_col.map(|c| table.cell(fields, c)).filter(|s| !s.is_empty()) {
            let weight: f64 = raw.parse().map_err(|_| {
                DiagnosisError::invalid_input(format!(
                    "line {line}: weight '{raw}' is not a number"
                ))
            })?;
            pattern = pattern.with_weight(weight).map_err(|e| at_line(*line, e))?;
        }
        if let Some(c) = tags_col {
            pattern = pattern.with_topology_tags(split_list(table.cell(fields, c)));
        }
        patterns.push(pattern);
    }
    log::debug!("parsed {} patterns", patterns.len());
    Ok(patterns)
}

pub fn parse_readings_csv(text: &str) -> Result<Vec<SensorReading>> {
    let table = Table::parse(text)?;
    let id_col = table.column("sensor_id")?;
    let value_col = table.column("value")?;
    let baseline = table.optional_column("mean").zip(table.optional_column("std"));

    let number = |line: usize, what: &str, raw: &str| -> Result<f64> {
        raw.parse().map_err(|_| {
            DiagnosisError::invalid_input(format!("line {line}: {what} '{raw}' is not a number"))
        })
    };

    let mut readings = Vec::with_capacity(table.rows.len());
    for (line, fields) in &table.rows {
        let id = table.cell(fields, id_col);
        if id.is_empty() {
            return Err(DiagnosisError::invalid_input(format!("line {line}: empty sensor_id")));
        }
        let mut value = number(*line, "value", table.cell(fields, value_col))?;
        if let Some((mean_col, std_col)) = baseline {
            let mean = number(*line, "mean", table.cell(fields, mean_col))?;
            let std = number(*line, "std", table.cell(fields, std_col))?;
            let z = compute_z_scores(&[value], mean, std).map_err(|e| at_line(*line, e))?;
            value = z[0];
        }
        readings.push(SensorReading::new(id, value));
    }
    log::debug!("parsed {} readings", readings.len());
    Ok(readings)
}

/// Reject libraries with duplicate pattern ids or patterns covering nothing.
pub fn validate_pattern_library(patterns: &[FailurePattern]) -> Result<()> {
    if patterns.is_empty() {
        return Err(DiagnosisError::invalid_input("pattern library is empty"));
    }
    let mut seen = HashSet::new();
    for p in patterns {
        if !seen.insert(p.pattern_id()) {
            return Err(DiagnosisError::invalid_input(format!(
                "duplicate pattern id '{}'",
                p.pattern_id()
            )));
        }
        if p.affected_sensors().is_empty() {
            return Err(DiagnosisError::invalid_input(format!(
                "pattern '{}' affects no sensors",
                p.pattern_id()
            )));
        }
    }
    Ok(())
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|source| DiagnosisError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn at_line(line: usize, err: DiagnosisError) -> DiagnosisError {
    match err {
        DiagnosisError::InvalidInput { reason } => {
            DiagnosisError::invalid_input(format!("line {line}: {reason}"))
        }
        other => other,
    }
}

fn split_list(cell: &str) -> Vec<String> {
    cell.split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Minimal CSV table
// ---------------------------------------------------------------------------

struct Table {
    header: Vec<String>,
    /// `(1-based line number, fields)`
    rows: Vec<(usize, Vec<String>)>,
}

impl Table {
    fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

        let Some((header_line, header)) = lines.next() else {
            return Err(DiagnosisError::invalid_input("CSV input has no header"));
        };
        let header: Vec<String> = split_record(header, header_line)?
            .into_iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .collect();

        let mut rows = Vec::new();
        for (line, text) in lines {
            let fields = split_record(text, line)?;
            if fields.len() > header.len() {
                return Err(DiagnosisError::invalid_input(format!(
                    "line {line}: {} fields but header has {}",
                    fields.len(),
                    header.len()
                )));
            }
            rows.push((line, fields));
        }
        Ok(Self { header, rows })
    }

    fn optional_column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    fn column(&self, name: &str) -> Result<usize> {
        self.optional_column(name).ok_or_else(|| {
            DiagnosisError::invalid_input(format!("CSV header is missing column '{name}'"))
        })
    }

    /// Trimmed cell; missing trailing cells read as empty.
    fn cell<'a>(&self, fields: &'a [String], col: usize) -> &'a str {
        fields.get(col).map_or("", |s| s.trim())
    }
}

/// Split one record on commas, honoring double quotes (`""` escapes a quote).
fn split_record(line: &str, line_no: usize) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => quoted = false,
            ('"', false) if current.trim().is_empty() => {
                current.clear();
                quoted = true;
            }
            (',', false) => fields.push(std::mem::take(&mut current)),
            (c, _) => current.push(c),
        }
    }
    if quoted {
        return Err(DiagnosisError::invalid_input(format!(
            "line {line_no}: unterminated quoted field"
        )));
    }
    fields.push(current);
    Ok(fields)
}
