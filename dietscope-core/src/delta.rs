//! Baseline-to-goal delta computation
//!
//! Compares two diets' emissions category by category for one metric. The
//! Scope 1+2 waste and retail add-ons have no category, so they get a
//! diet-level row of their own.
//!
//! Global invariants enforced:
//! - Category deltas plus the add-on delta sum to the total delta
//! - The total matches the diet totals (`DietEmissions::total_co2` for co2)
//! - A zero baseline yields `percent_delta = None`, never a panic or NaN
//! - Records follow `Category::ALL` order, so output is deterministic

use crate::reference::Category;
use crate::scope::{DietEmissions, EmissionsRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Quantity being compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Scope 1+2 CO2e (tonnes)
    Scope12,
    /// Scope 3 CO2e (tonnes)
    Scope3,
    /// Scope 1+2 plus Scope 3 CO2e (tonnes)
    Co2,
    /// m2 * year
    Land,
    /// litres
    Water,
    /// tonnes of food
    Mass,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::Scope12,
        Metric::Scope3,
        Metric::Co2,
        Metric::Land,
        Metric::Water,
        Metric::Mass,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Scope12 => "scope12",
            Metric::Scope3 => "scope3",
            Metric::Co2 => "co2",
            Metric::Land => "land",
            Metric::Water => "water",
            Metric::Mass => "mass",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Metric::Scope12 | Metric::Scope3 | Metric::Co2 => "t CO2e",
            Metric::Land => "m2*yr",
            Metric::Water => "L",
            Metric::Mass => "t",
        }
    }

    /// Value of this metric in a category record
    pub fn value(&self, record: &EmissionsRecord) -> f64 {
        match self {
            Metric::Scope12 => record.co2_scope12,
            Metric::Scope3 => record.co2_scope3,
            Metric::Co2 => record.co2(),
            Metric::Land => record.land_m2,
            Metric::Water => record.water_l,
            Metric::Mass => record.mass_tonnes,
        }
    }

    /// Waste and retail add-ons of a diet counted by this metric
    pub fn add_ons(&self, em: &DietEmissions) -> f64 {
        match self {
            Metric::Scope12 | Metric::Co2 => em.scope12.waste + em.scope12.retail,
            Metric::Scope3 | Metric::Land | Metric::Water | Metric::Mass => 0.0,
        }
    }

    /// Diet-level total of this metric, add-ons included
    pub fn diet_total(&self, em: &DietEmissions) -> f64 {
        match self {
            Metric::Scope12 => em.scope12.total,
            Metric::Scope3 => em.scope3_total,
            Metric::Co2 => em.total_co2(),
            Metric::Land => em.land_total_m2,
            Metric::Water => em.water_total_l,
            Metric::Mass => em.mass_total_tonnes,
        }
    }

    pub fn includes_add_ons(&self) -> bool {
        matches!(self, Metric::Scope12 | Metric::Co2)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .find(|m| m.as_str() == s)
            .copied()
            .ok_or_else(|| {
                format!(
                    "unknown metric '{}' (expected one of: scope12, scope3, co2, land, water, mass)",
                    s
                )
            })
    }
}

/// Baseline vs goal numbers for one quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeltaValue {
    pub baseline_value: f64,
    pub goal_value: f64,
    pub absolute_delta: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_delta: Option<f64>,
}

impl DeltaValue {
    pub fn new(baseline_value: f64, goal_value: f64) -> Self {
        DeltaValue {
            baseline_value,
            goal_value,
            absolute_delta: goal_value - baseline_value,
            percent_delta: percent_delta(baseline_value, goal_value),
        }
    }
}

/// Delta for one (baseline, goal, category)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeltaRecord {
    pub baseline: String,
    pub goal: String,
    pub category: Category,
    #[serde(flatten)]
    pub value: DeltaValue,
}

/// All category deltas of a baseline -> goal pair, the add-on row and the total
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeltaReport {
    pub baseline: String,
    pub goal: String,
    pub metric: Metric,
    pub records: Vec<DeltaRecord>,
    /// Waste and retail add-ons; zero for metrics that do not carry them
    pub add_ons: DeltaValue,
    /// Whole-diet values, add-ons included
    pub total: DeltaValue,
}

impl DeltaReport {
    pub fn record(&self, category: Category) -> Option<&DeltaRecord> {
        self.records.iter().find(|r| r.category == category)
    }

    /// Records ordered by largest absolute change first (ties by category order)
    pub fn ranked(&self) -> Vec<&DeltaRecord> {
        let mut ranked: Vec<&DeltaRecord> = self.records.iter().collect();
        ranked.sort_by(|a, b| {
            b.value
                .absolute_delta
                .abs()
                .total_cmp(&a.value.absolute_delta.abs())
                .then(a.category.cmp(&b.category))
        });
        ranked
    }
}

/// Percent change relative to the baseline; None when the baseline is zero
pub fn percent_delta(baseline_value: f64, goal_value: f64) -> Option<f64> {
    if baseline_value == 0.0 {
        return None;
    }
    Some((goal_value - baseline_value) / baseline_value * 100.0)
}

/// Per-category delta between two diets for a metric
pub fn delta(baseline: &DietEmissions, goal: &DietEmissions, metric: Metric) -> DeltaReport {
    let mut values: BTreeMap<Category, (f64, f64)> =
        Category::ALL.iter().map(|c| (*c, (0.0, 0.0))).collect();
    for record in &baseline.categories {
        values.entry(record.category).or_default().0 += metric.value(record);
    }
    for record in &goal.categories {
        values.entry(record.category).or_default().1 += metric.value(record);
    }

    let records: Vec<DeltaRecord> = values
        .into_iter()
        .map(|(category, (b, g))| DeltaRecord {
            baseline: baseline.diet.clone(),
            goal: goal.diet.clone(),
            category,
            value: DeltaValue::new(b, g),
        })
        .collect();

    DeltaReport {
        baseline: baseline.diet.clone(),
        goal: goal.diet.clone(),
        metric,
        records,
        add_ons: DeltaValue::new(metric.add_ons(baseline), metric.add_ons(goal)),
        total: DeltaValue::new(metric.diet_total(baseline), metric.diet_total(goal)),
    }
}
