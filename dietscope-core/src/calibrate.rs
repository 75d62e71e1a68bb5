//! Calibration of Scope 1+2 fractions against an external empirical total
//!
//! A single global scalar is applied to every item's Scope 1+2 fraction so the
//! baseline diet's Scope 1+2 total (with waste and retail add-ons) matches the
//! target. Relative ratios between items are preserved.
//!
//! Global invariants enforced:
//! - The reference factor table is never mutated; calibration yields a new table
//! - One-shot closed form, no iteration
//! - A result outside tolerance is `CalibrationConvergence`, fatal for the run
//! - So is any scaled fraction above 1.0, in or out of the baseline diet
//! - Override rules are applied afterwards, in order, each to a fresh table

use crate::error::ModelError;
use crate::reference::{DietProfile, FactorTable, ImpactFactor};
use crate::scope::{self, ScopeAddOns};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const DEFAULT_TOLERANCE: f64 = 0.001;

/// External empirical Scope 1+2 total, versioned because published baselines move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTarget {
    pub value_tonnes: f64,
    pub version: String,
}

impl CalibrationTarget {
    pub fn new(value_tonnes: f64, version: impl Into<String>) -> Self {
        CalibrationTarget {
            value_tonnes,
            version: version.into(),
        }
    }
}

/// Manual post-calibration adjustment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideAction {
    /// Replace the calibrated fraction
    SetFraction(f64),
    /// Multiply the calibrated fraction
    Scale(f64),
}

/// Ordered override with a mandatory justification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverrideRule {
    pub item: String,
    pub action: OverrideAction,
    pub justification: String,
}

impl OverrideRule {
    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |reason: String| ModelError::InvalidOverride {
            item: self.item.clone(),
            reason,
        };
        if self.justification.trim().is_empty() {
            return Err(invalid("justification must not be empty".to_string()));
        }
        match self.action {
            OverrideAction::SetFraction(v) if !(0.0..=1.0).contains(&v) => {
                Err(invalid(format!("fraction must be in [0, 1] (got {})", v)))
            }
            OverrideAction::Scale(k) if !k.is_finite() || k < 0.0 => {
                Err(invalid(format!("scale must be finite and >= 0 (got {})", k)))
            }
            _ => Ok(()),
        }
    }

    fn apply(&self, fraction: f64) -> f64 {
        match self.action {
            OverrideAction::SetFraction(v) => v,
            OverrideAction::Scale(k) => fraction * k,
        }
    }
}

/// Immutable factor table with calibrated Scope 1+2 fractions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedFactorTable {
    table: FactorTable,
    scale_factor: f64,
    target: CalibrationTarget,
    overrides: Vec<OverrideRule>,
}

impl CalibratedFactorTable {
    pub fn factors(&self) -> &FactorTable {
        &self.table
    }

    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn target(&self) -> &CalibrationTarget {
        &self.target
    }

    /// Overrides applied so far, in application order
    pub fn overrides(&self) -> &[OverrideRule] {
        &self.overrides
    }

    /// Apply override rules in order, returning a new table
    pub fn with_overrides(
        &self,
        rules: &[OverrideRule],
    ) -> Result<CalibratedFactorTable, ModelError> {
        let mut entries = self.table.map_factors(|_, f| *f);
        for rule in rules {
            rule.validate()?;
            let factor = entries
                .get_mut(&rule.item)
                .ok_or_else(|| ModelError::InvalidOverride {
                    item: rule.item.clone(),
                    reason: "no such food item in the factor table".to_string(),
                })?;
            let updated = rule.apply(factor.scope12_fraction);
            if !(0.0..=1.0).contains(&updated) {
                return Err(ModelError::InvalidOverride {
                    item: rule.item.clone(),
                    reason: format!("resulting fraction {} is outside [0, 1]", updated),
                });
            }
            debug!(
                item = %rule.item,
                from = factor.scope12_fraction,
                to = updated,
                justification = %rule.justification,
                "applying scope12 override"
            );
            factor.scope12_fraction = updated;
        }
        let mut overrides = self.overrides.clone();
        overrides.extend(rules.iter().cloned());
        Ok(CalibratedFactorTable {
            table: FactorTable::new(entries)?,
            scale_factor: self.scale_factor,
            target: self.target.clone(),
            overrides,
        })
    }
}

/// Outcome of a calibration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CalibrationReport {
    pub baseline_diet: String,
    pub target_version: String,
    pub target_tonnes: f64,
    pub uncalibrated_total: f64,
    pub calibrated_total: f64,
    pub scale_factor: f64,
    pub relative_error: f64,
    pub tolerance: f64,
    /// Relative error after override rules, when any were applied
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub post_override_error: Option<f64>,
}

/// Calibration table plus its report
#[derive(Debug, Clone)]
pub struct Calibration {
    pub table: CalibratedFactorTable,
    pub report: CalibrationReport,
}

/// Calibrates Scope 1+2 fractions for a fixed population and add-on rates
#[derive(Debug, Clone, Copy)]
pub struct Calibrator<'a> {
    factors: &'a FactorTable,
    population: u64,
    add_ons: ScopeAddOns,
}

impl<'a> Calibrator<'a> {
    pub fn new(factors: &'a FactorTable, population: u64, add_ons: ScopeAddOns) -> Self {
        Calibrator {
            factors,
            population,
            add_ons,
        }
    }

    /// Baseline Scope 1+2 total (base + waste + retail) under a factor table
    pub fn scope12_total(
        &self,
        baseline: &DietProfile,
        table: &FactorTable,
    ) -> Result<f64, ModelError> {
        let em = scope::compute_diet_emissions(baseline, table, self.population, &self.add_ons)?;
        Ok(em.scope12.total)
    }

    /// Scale every Scope 1+2 fraction by `target / uncalibrated_total`
    pub fn calibrate(
        &self,
        baseline: &DietProfile,
        target: &CalibrationTarget,
        tolerance: f64,
    ) -> Result<Calibration, ModelError> {
        let uncalibrated = self.scope12_total(baseline, self.factors)?;
        let convergence_error =
            |recomputed: f64, exceeded: Vec<String>| ModelError::CalibrationConvergence {
                target_version: target.version.clone(),
                target: target.value_tonnes,
                recomputed,
                relative_error: relative_error(recomputed, target.value_tonnes),
                tolerance,
                exceeded,
            };

        let solvable = target.value_tonnes > 0.0 && uncalibrated > 0.0 && uncalibrated.is_finite();
        if !solvable {
            return Err(convergence_error(uncalibrated, Vec::new()));
        }

        let scale_factor = target.value_tonnes / uncalibrated;
        let mut exceeded = Vec::new();
        let entries = self.factors.map_factors(|item, f| {
            let scaled = f.scope12_fraction * scale_factor;
            if scaled > 1.0 {
                exceeded.push(item.to_string());
            }
            ImpactFactor {
                scope12_fraction: scaled.min(1.0),
                ..*f
            }
        });
        let table = FactorTable::new(entries)?;
        let calibrated = self.scope12_total(baseline, &table)?;

        // A fraction clamped at 1.0 breaks the single-scalar ratio between items
        if !exceeded.is_empty() {
            warn!(
                items = ?exceeded,
                scale_factor,
                "scale factor pushes scope12 fractions above 1.0"
            );
            return Err(convergence_error(calibrated, exceeded));
        }
        let error = relative_error(calibrated, target.value_tonnes);
        if error > tolerance {
            return Err(convergence_error(calibrated, Vec::new()));
        }

        info!(
            target = target.value_tonnes,
            version = %target.version,
            uncalibrated,
            calibrated,
            scale_factor,
            "calibration converged"
        );

        Ok(Calibration {
            table: CalibratedFactorTable {
                table,
                scale_factor,
                target: target.clone(),
                overrides: Vec::new(),
            },
            report: CalibrationReport {
                baseline_diet: baseline.name.clone(),
                target_version: target.version.clone(),
                target_tonnes: target.value_tonnes,
                uncalibrated_total: uncalibrated,
                calibrated_total: calibrated,
                scale_factor,
                relative_error: error,
                tolerance,
                post_override_error: None,
            },
        })
    }

    /// Apply overrides to a calibration and record the residual against the target
    pub fn apply_overrides(
        &self,
        baseline: &DietProfile,
        calibration: Calibration,
        rules: &[OverrideRule],
    ) -> Result<Calibration, ModelError> {
        if rules.is_empty() {
            return Ok(calibration);
        }
        let table = calibration.table.with_overrides(rules)?;
        let total = self.scope12_total(baseline, table.factors())?;
        let mut report = calibration.report;
        report.post_override_error = Some(relative_error(total, report.target_tonnes));
        Ok(Calibration { table, report })
    }
}

fn relative_error(value: f64, target: f64) -> f64 {
    if target == 0.0 {
        return f64::INFINITY;
    }
    ((value - target) / target).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Category;
    use std::collections::BTreeMap;

    fn factor(category: Category, co2: f64, fraction: f64) -> ImpactFactor {
        ImpactFactor {
            category,
            co2,
            land: 1.0,
            water: 1.0,
            scope12_fraction: fraction,
        }
    }

    fn table() -> FactorTable {
        let mut entries = BTreeMap::new();
        entries.insert("Beef".to_string(), factor(Category::RedMeat, 53.0, 0.4717));
        entries.insert("Coffee".to_string(), factor(Category::Beverages, 37.8, 0.9259));
        entries.insert("Grains".to_string(), factor(Category::Staples, 3.6, 0.6944));
        FactorTable::new(entries).unwrap()
    }

    fn diet() -> DietProfile {
        let grams = [("Beef", 10.0), ("Coffee", 12.0), ("Grains", 230.0)]
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        DietProfile::new("Baseline", grams).unwrap()
    }

    #[test]
    fn test_calibration_converges_and_preserves_ratios() {
        let factors = table();
        let cal = Calibrator::new(&factors, 882_000, ScopeAddOns::default());
        let uncal = cal.scope12_total(&diet(), &factors).unwrap();
        let target = CalibrationTarget::new(uncal * 0.6669, "test");

        let result = cal.calibrate(&diet(), &target, DEFAULT_TOLERANCE).unwrap();
        assert!((result.report.scale_factor - 0.6669).abs() < 1e-9);
        assert!(result.report.relative_error <= DEFAULT_TOLERANCE);

        let beef = result.table.factors().get("Beef").unwrap().scope12_fraction;
        let grains = result.table.factors().get("Grains").unwrap().scope12_fraction;
        assert!((beef / grains - 0.4717 / 0.6944).abs() < 1e-12);

        // Source table untouched
        assert_eq!(factors.get("Beef").unwrap().scope12_fraction, 0.4717);
    }

    #[test]
    fn test_unit_fraction_item_scales_by_factor() {
        let mut entries = BTreeMap::new();
        entries.insert("X".to_string(), factor(Category::Staples, 10.0, 1.0));
        let factors = FactorTable::new(entries).unwrap();
        let grams = [("X".to_string(), 100.0)].into_iter().collect();
        let baseline = DietProfile::new("Only X", grams).unwrap();
        let add_ons = ScopeAddOns {
            waste_rate: 0.0,
            retail_rate: 0.0,
        };
        let cal = Calibrator::new(&factors, 1_000, add_ons);
        let uncal = cal.scope12_total(&baseline, &factors).unwrap();
        let target = CalibrationTarget::new(uncal * 1_750_000.0 / 2_624_000.0, "scenario");
        let result = cal.calibrate(&baseline, &target, DEFAULT_TOLERANCE).unwrap();
        assert!((result.report.scale_factor - 0.6669).abs() < 1e-4);
        let fraction = result.table.factors().get("X").unwrap().scope12_fraction;
        assert!((fraction - result.report.scale_factor).abs() < 1e-12);
    }

    #[test]
    fn test_unreachable_target_fails_convergence() {
        let factors = table();
        let cal = Calibrator::new(&factors, 882_000, ScopeAddOns::default());
        let uncal = cal.scope12_total(&diet(), &factors).unwrap();
        let target = CalibrationTarget::new(uncal * 3.0, "too-high");
        let err = cal.calibrate(&diet(), &target, DEFAULT_TOLERANCE).unwrap_err();
        assert!(err.is_fatal());
        match err {
            ModelError::CalibrationConvergence { exceeded, .. } => {
                assert_eq!(exceeded, vec!["Beef", "Coffee", "Grains"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_fraction_above_one_outside_baseline_fails() {
        let mut entries = BTreeMap::new();
        entries.insert("Coffee".to_string(), factor(Category::Beverages, 37.8, 0.9));
        entries.insert("Grains".to_string(), factor(Category::Staples, 3.6, 0.5));
        let factors = FactorTable::new(entries).unwrap();
        let grams = [("Grains".to_string(), 230.0)].into_iter().collect();
        let baseline = DietProfile::new("Grains only", grams).unwrap();
        let cal = Calibrator::new(&factors, 882_000, ScopeAddOns::default());
        let uncal = cal.scope12_total(&baseline, &factors).unwrap();

        // Grains alone would reach the target exactly at 0.75
        let target = CalibrationTarget::new(uncal * 1.5, "coffee-overflow");
        let err = cal.calibrate(&baseline, &target, DEFAULT_TOLERANCE).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("Coffee"));
        match err {
            ModelError::CalibrationConvergence {
                exceeded,
                relative_error,
                ..
            } => {
                assert_eq!(exceeded, vec!["Coffee"]);
                assert!(relative_error < 1e-9);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_zero_baseline_fails_convergence() {
        let factors = table();
        let cal = Calibrator::new(&factors, 882_000, ScopeAddOns::default());
        let empty = DietProfile::new("Empty", BTreeMap::new()).unwrap();
        let err = cal
            .calibrate(&empty, &CalibrationTarget::new(1_750_000.0, "v"), DEFAULT_TOLERANCE)
            .unwrap_err();
        assert!(matches!(err, ModelError::CalibrationConvergence { .. }));
    }

    #[test]
    fn test_overrides_apply_in_order() {
        let factors = table();
        let cal = Calibrator::new(&factors, 882_000, ScopeAddOns::default());
        let uncal = cal.scope12_total(&diet(), &factors).unwrap();
        let calibration = cal
            .calibrate(&diet(), &CalibrationTarget::new(uncal * 0.7, "v"), DEFAULT_TOLERANCE)
            .unwrap();
        let rules = vec![
            OverrideRule {
                item: "Coffee".to_string(),
                action: OverrideAction::SetFraction(0.6),
                justification: "roasting energy is local".to_string(),
            },
            OverrideRule {
                item: "Coffee".to_string(),
                action: OverrideAction::Scale(0.5),
                justification: "half of roasting happens abroad".to_string(),
            },
        ];
        let adjusted = cal.apply_overrides(&diet(), calibration, &rules).unwrap();
        let coffee = adjusted.table.factors().get("Coffee").unwrap().scope12_fraction;
        assert!((coffee - 0.3).abs() < 1e-12);
        assert_eq!(adjusted.table.overrides().len(), 2);
        assert!(adjusted.report.post_override_error.is_some());
    }

    #[test]
    fn test_override_rejects_unknown_item_and_empty_justification() {
        let factors = table();
        let cal = Calibrator::new(&factors, 882_000, ScopeAddOns::default());
        let uncal = cal.scope12_total(&diet(), &factors).unwrap();
        let calibration = cal
            .calibrate(&diet(), &CalibrationTarget::new(uncal * 0.7, "v"), DEFAULT_TOLERANCE)
            .unwrap();
        let unknown = OverrideRule {
            item: "Lamb".to_string(),
            action: OverrideAction::SetFraction(0.5),
            justification: "x".to_string(),
        };
        assert!(calibration.table.with_overrides(&[unknown]).is_err());
        let blank = OverrideRule {
            item: "Beef".to_string(),
            action: OverrideAction::SetFraction(0.5),
            justification: "  ".to_string(),
        };
        assert!(calibration.table.with_overrides(&[blank]).is_err());
        let overflow = OverrideRule {
            item: "Coffee".to_string(),
            action: OverrideAction::Scale(5.0),
            justification: "x".to_string(),
        };
        assert!(calibration.table.with_overrides(&[overflow]).is_err());
    }

    #[test]
    fn test_override_json_shape() {
        let json = r#"{"item": "Coffee", "action": {"set_fraction": 0.6}, "justification": "roasting"}"#;
        let rule: OverrideRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.action, OverrideAction::SetFraction(0.6));
    }
}
