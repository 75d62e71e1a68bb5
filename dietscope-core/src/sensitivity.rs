//! One-at-a-time sensitivity analysis
//!
//! Each named parameter perturbs the baseline total by a fixed percentage in
//! both directions. Two presentations are derived from the same inputs:
//! - tornado: independent perturbations ranked by swing
//! - waterfall: perturbations applied sequentially in the given order
//!
//! Global invariants enforced:
//! - Output is sorted by |increase_total - baseline| descending, ties by name
//! - Sorting is stable, so identical inputs give identical ordering
//! - Waterfall order is exactly the parameter order passed in

use crate::delta::percent_delta;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named perturbation, `pct` as a fraction (0.20 = 20%)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensitivityParameter {
    pub name: String,
    pub pct: f64,
}

impl SensitivityParameter {
    pub fn new(name: impl Into<String>, pct: f64) -> Self {
        SensitivityParameter {
            name: name.into(),
            pct,
        }
    }
}

/// Default parameter set: emission factors, diet adherence, waste rate
pub fn default_parameters() -> Vec<SensitivityParameter> {
    vec![
        SensitivityParameter::new("impact_factor", 0.20),
        SensitivityParameter::new("diet_adherence", 0.15),
        SensitivityParameter::new("waste_rate", 0.10),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Increase => "increase",
            Direction::Decrease => "decrease",
        }
    }

    fn factor(&self, pct: f64) -> f64 {
        match self {
            Direction::Increase => 1.0 + pct,
            Direction::Decrease => 1.0 - pct,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result for one (parameter, direction)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SensitivityRecord {
    pub parameter: String,
    pub direction: Direction,
    pub pct: f64,
    pub baseline_total: f64,
    pub perturbed_total: f64,
    pub delta: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_delta: Option<f64>,
}

fn perturb(
    baseline_total: f64,
    param: &SensitivityParameter,
    direction: Direction,
) -> SensitivityRecord {
    let perturbed_total = baseline_total * direction.factor(param.pct);
    SensitivityRecord {
        parameter: param.name.clone(),
        direction,
        pct: param.pct,
        baseline_total,
        perturbed_total,
        delta: perturbed_total - baseline_total,
        percent_delta: percent_delta(baseline_total, perturbed_total),
    }
}

/// Perturb every parameter independently; increase precedes decrease per parameter
pub fn run(baseline_total: f64, parameters: &[SensitivityParameter]) -> Vec<SensitivityRecord> {
    let mut ranked: Vec<&SensitivityParameter> = parameters.iter().collect();
    ranked.sort_by(|a, b| {
        let swing_a = (baseline_total * a.pct).abs();
        let swing_b = (baseline_total * b.pct).abs();
        swing_b.total_cmp(&swing_a).then_with(|| a.name.cmp(&b.name))
    });

    ranked
        .into_iter()
        .flat_map(|p| {
            [
                perturb(baseline_total, p, Direction::Increase),
                perturb(baseline_total, p, Direction::Decrease),
            ]
        })
        .collect()
}

/// One tornado bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TornadoBar {
    pub parameter: String,
    pub pct: f64,
    pub low_total: f64,
    pub high_total: f64,
    /// high_total - low_total
    pub swing: f64,
}

/// Collapse ranked records into one bar per parameter, keeping rank order
pub fn tornado(records: &[SensitivityRecord]) -> Vec<TornadoBar> {
    let mut bars: Vec<TornadoBar> = Vec::new();
    for r in records {
        let idx = match bars.iter().position(|b| b.parameter == r.parameter) {
            Some(i) => i,
            None => {
                bars.push(TornadoBar {
                    parameter: r.parameter.clone(),
                    pct: r.pct,
                    low_total: r.baseline_total,
                    high_total: r.baseline_total,
                    swing: 0.0,
                });
                bars.len() - 1
            }
        };
        let bar = &mut bars[idx];
        bar.low_total = bar.low_total.min(r.perturbed_total);
        bar.high_total = bar.high_total.max(r.perturbed_total);
        bar.swing = bar.high_total - bar.low_total;
    }
    bars
}

/// One step of the cumulative waterfall
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WaterfallStep {
    pub parameter: String,
    pub direction: Direction,
    pub pct: f64,
    pub before: f64,
    pub after: f64,
    pub step_delta: f64,
    pub cumulative_delta: f64,
}

/// Apply parameters sequentially, each compounding on the running total
pub fn waterfall(
    baseline_total: f64,
    parameters: &[SensitivityParameter],
    direction: Direction,
) -> Vec<WaterfallStep> {
    let mut running = baseline_total;
    parameters
        .iter()
        .map(|p| {
            let before = running;
            running = before * direction.factor(p.pct);
            WaterfallStep {
                parameter: p.name.clone(),
                direction,
                pct: p.pct,
                before,
                after: running,
                step_delta: running - before,
                cumulative_delta: running - baseline_total,
            }
        })
        .collect()
}

/// Ranked records, tornado bars and waterfall for one baseline total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SensitivityAnalysis {
    pub baseline_total: f64,
    pub records: Vec<SensitivityRecord>,
    pub tornado: Vec<TornadoBar>,
    pub waterfall: Vec<WaterfallStep>,
}

pub fn analyze(
    baseline_total: f64,
    parameters: &[SensitivityParameter],
    waterfall_direction: Direction,
) -> SensitivityAnalysis {
    let records = run(baseline_total, parameters);
    SensitivityAnalysis {
        baseline_total,
        tornado: tornado(&records),
        waterfall: waterfall(baseline_total, parameters, waterfall_direction),
        records,
    }
}
