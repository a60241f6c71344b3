// src/memory/temporal.rs
//! Time-series context that turns isolated facts into trajectories.
//!
//! A memory (or any observed metric) carries windowed averages over three
//! horizons so downstream consumers can tell "slipping for a month" apart
//! from "one bad day".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of change across the current and previous windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
    Volatile,
}

impl Default for Trend {
    fn default() -> Self {
        Trend::Stable
    }
}

/// Observation windows in days, most recent first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TemporalWindows {
    pub current: i64,
    pub previous: i64,
    pub baseline: i64,
}

impl Default for TemporalWindows {
    fn default() -> Self {
        Self {
            current: 14,
            previous: 30,
            baseline: 90,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalMetadata {
    pub first_observed: Option<DateTime<Utc>>,
    pub last_observed: Option<DateTime<Utc>>,
    pub occurrences: u64,
    #[serde(default)]
    pub trend: Trend,
    /// Average over the current window.
    pub current: f64,
    /// Average over the previous window.
    pub previous: f64,
    /// Average over the baseline window.
    pub baseline: f64,
    /// current - previous
    pub delta: f64,
    /// Change of the delta itself between windows.
    pub velocity: f64,
}

/// Compute temporal metadata from a series of `(timestamp, value)` pairs.
///
/// Pure in `now` so callers control the reference point.
pub fn compute_temporal(
    mut values: Vec<(DateTime<Utc>, f64)>,
    windows: TemporalWindows,
    now: DateTime<Utc>,
) -> TemporalMetadata {
    if values.is_empty() {
        return TemporalMetadata::default();
    }

    values.sort_by_key(|(dt, _)| *dt);

    let age_days = |dt: &DateTime<Utc>| (now - *dt).num_days();
    let avg = |vals: &[f64]| {
        if vals.is_empty() {
            0.0
        } else {
            vals.iter().sum::<f64>() / vals.len() as f64
        }
    };

    let current_vals: Vec<f64> = values
        .iter()
        .filter(|(dt, _)| age_days(dt) <= windows.current)
        .map(|(_, v)| *v)
        .collect();
    let previous_vals: Vec<f64> = values
        .iter()
        .filter(|(dt, _)| {
            let days = age_days(dt);
            days > windows.current && days <= windows.previous
        })
        .map(|(_, v)| *v)
        .collect();
    let baseline_vals: Vec<f64> = values
        .iter()
        .filter(|(dt, _)| {
            let days = age_days(dt);
            days > windows.previous && days <= windows.baseline
        })
        .map(|(_, v)| *v)
        .collect();

    let current = avg(&current_vals);
    let previous = avg(&previous_vals);
    let baseline = avg(&baseline_vals);
    let delta = current - previous;

    let trend = if current_vals.len() < 2 || delta.abs() < 0.5 {
        Trend::Stable
    } else if delta > 0.0 {
        Trend::Improving
    } else {
        Trend::Declining
    };

    let velocity = if previous != 0.0 && baseline != 0.0 {
        delta - (previous - baseline)
    } else {
        0.0
    };

    TemporalMetadata {
        first_observed: Some(values[0].0),
        last_observed: Some(values[values.len() - 1].0),
        occurrences: values.len() as u64,
        trend,
        current,
        previous,
        baseline,
        delta,
        velocity,
    }
}
