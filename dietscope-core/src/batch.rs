//! Full batch run
//!
//! Calibrate once, then compute every diet, the baseline-to-goal deltas, the
//! neighborhood simulation and the sensitivity analysis.
//!
//! Global invariants enforced:
//! - Calibration and override errors abort the whole run
//! - Diet, goal and neighborhood failures are isolated and reported per unit
//! - Units run in parallel over shared immutable tables; results are returned
//!   in deterministic (name-sorted) order

use crate::calibrate::{CalibrationReport, Calibrator, OverrideRule};
use crate::config::ResolvedConfig;
use crate::delta::{self, DeltaReport, Metric};
use crate::error::ModelError;
use crate::reference::{DietProfile, ReferenceDataStore};
use crate::scope::{self, DietEmissions};
use crate::sensitivity::{self, Direction, SensitivityAnalysis};
use crate::spatial::{self, SpatialRun};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Knobs that select what the batch reports, not how the model computes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchOptions {
    pub metric: Metric,
    pub waterfall_direction: Direction,
}

impl Default for BatchOptions {
    fn default() -> Self {
        BatchOptions {
            metric: Metric::Co2,
            waterfall_direction: Direction::Decrease,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    Diet,
    Goal,
    Neighborhood,
}

impl UnitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Diet => "diet",
            UnitKind::Goal => "goal",
            UnitKind::Neighborhood => "neighborhood",
        }
    }
}

/// A unit of work that failed without stopping the run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct UnitFailure {
    pub kind: UnitKind,
    pub id: String,
    pub message: String,
}

/// Per-unit success/failure counts
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RunSummary {
    pub diets_ok: usize,
    pub diets_failed: usize,
    pub goals_ok: usize,
    pub goals_failed: usize,
    pub neighborhoods_ok: usize,
    pub neighborhoods_failed: usize,
    pub failures: Vec<UnitFailure>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, kind: UnitKind, id: &str, message: String) {
        warn!(unit = kind.as_str(), id, %message, "unit failed");
        self.failures.push(UnitFailure {
            kind,
            id: id.to_string(),
            message,
        });
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct BatchOutcome {
    pub calibration: CalibrationReport,
    pub overrides: Vec<OverrideRule>,
    pub emissions: Vec<DietEmissions>,
    pub deltas: Vec<DeltaReport>,
    pub spatial: SpatialRun,
    pub sensitivity: SensitivityAnalysis,
    pub summary: RunSummary,
}

impl BatchOutcome {
    pub fn emissions_for(&self, diet: &str) -> Option<&DietEmissions> {
        self.emissions.iter().find(|e| e.diet == diet)
    }
}

/// Run the whole pipeline against a reference store
pub fn run_batch(
    store: &ReferenceDataStore,
    config: &ResolvedConfig,
    options: BatchOptions,
) -> Result<BatchOutcome, ModelError> {
    let baseline = store.diet(&config.baseline_diet)?;

    let calibrator = Calibrator::new(store.factors(), config.population, config.add_ons);
    let calibration = calibrator.calibrate(baseline, &config.target, config.tolerance)?;
    let calibration = calibrator.apply_overrides(baseline, calibration, &config.overrides)?;
    let factors = calibration.table.factors();

    let mut summary = RunSummary::default();

    let diets: Vec<&DietProfile> = store.diets().collect();
    let outcomes: Vec<(String, Result<DietEmissions, ModelError>)> = diets
        .par_iter()
        .map(|d| {
            debug!(diet = %d.name, "computing diet emissions");
            (
                d.name.clone(),
                scope::compute_diet_emissions(d, factors, config.population, &config.add_ons),
            )
        })
        .collect();

    let mut emissions = Vec::with_capacity(outcomes.len());
    for (name, outcome) in outcomes {
        match outcome {
            Ok(em) => {
                summary.diets_ok += 1;
                emissions.push(em);
            }
            Err(e) => {
                summary.diets_failed += 1;
                summary.fail(UnitKind::Diet, &name, e.to_string());
            }
        }
    }

    let baseline_em = emissions
        .iter()
        .find(|e| e.diet == config.baseline_diet)
        .cloned()
        .ok_or_else(|| ModelError::UnknownDiet(config.baseline_diet.clone()))?;

    let mut deltas = Vec::with_capacity(config.goal_diets.len());
    for goal in &config.goal_diets {
        match emissions.iter().find(|e| &e.diet == goal) {
            Some(goal_em) => {
                summary.goals_ok += 1;
                deltas.push(delta::delta(&baseline_em, goal_em, options.metric));
            }
            None => {
                summary.goals_failed += 1;
                let message = match store.diet(goal) {
                    Err(e) => e.to_string(),
                    Ok(_) => format!("emissions for goal diet '{}' failed", goal),
                };
                summary.fail(UnitKind::Goal, goal, message);
            }
        }
    }

    let spatial = spatial::simulate(
        baseline,
        store.neighborhoods(),
        factors,
        &config.heterogeneity,
        &config.add_ons,
    );
    summary.neighborhoods_ok = spatial.results.len();
    summary.neighborhoods_failed = spatial.skipped.len();
    for skipped in &spatial.skipped {
        summary.failures.push(UnitFailure {
            kind: UnitKind::Neighborhood,
            id: skipped.neighborhood.clone(),
            message: skipped.reason.clone(),
        });
    }

    let sensitivity = sensitivity::analyze(
        baseline_em.total_co2(),
        &config.sensitivity,
        options.waterfall_direction,
    );

    info!(
        diets_ok = summary.diets_ok,
        diets_failed = summary.diets_failed,
        neighborhoods_ok = summary.neighborhoods_ok,
        neighborhoods_failed = summary.neighborhoods_failed,
        "batch run complete"
    );

    Ok(BatchOutcome {
        calibration: calibration.report,
        overrides: calibration.table.overrides().to_vec(),
        emissions,
        deltas,
        spatial,
        sensitivity,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::CalibrationTarget;

    const DOC: &str = r#"{
        "factors": {
            "Beef": {"category": "Red Meat", "co2": 53.0, "land": 25.0, "water": 15400, "scope12_fraction": 0.47},
            "Grains": {"category": "Staples", "co2": 3.6, "land": 1.4, "water": 1600, "scope12_fraction": 0.69},
            "Pulses": {"category": "Plant Protein", "co2": 4.9, "land": 3.4, "water": 4000, "scope12_fraction": 0.82}
        },
        "diets": {
            "Base": {"Beef": 20, "Grains": 200},
            "Goal": {"Beef": 5, "Grains": 220, "Pulses": 40},
            "Broken": {"Beef": 10, "Lamb": 30}
        },
        "neighborhoods": {
            "Oost": {"population": 135000, "income": 36000, "high_education_fraction": 0.55},
            "Ghost": {"population": 0, "income": 30000, "high_education_fraction": 0.4}
        }
    }"#;

    fn config(store: &ReferenceDataStore, target_scale: f64) -> ResolvedConfig {
        let mut config = ResolvedConfig::defaults().unwrap();
        config.baseline_diet = "Base".to_string();
        config.goal_diets = vec!["Goal".to_string(), "Missing".to_string()];
        let calibrator = Calibrator::new(store.factors(), config.population, config.add_ons);
        let uncal = calibrator
            .scope12_total(store.diet("Base").unwrap(), store.factors())
            .unwrap();
        config.target = CalibrationTarget::new(uncal * target_scale, "test");
        config
    }

    #[test]
    fn test_partial_failures_are_isolated() {
        let store = ReferenceDataStore::from_json(DOC).unwrap();
        let config = config(&store, 0.7);
        let outcome = run_batch(&store, &config, BatchOptions::default()).unwrap();

        assert_eq!(outcome.summary.diets_ok, 2);
        assert_eq!(outcome.summary.diets_failed, 1);
        assert_eq!(outcome.summary.goals_ok, 1);
        assert_eq!(outcome.summary.goals_failed, 1);
        assert_eq!(outcome.summary.neighborhoods_ok, 1);
        assert_eq!(outcome.summary.neighborhoods_failed, 1);
        assert!(!outcome.summary.is_success());

        let kinds: Vec<(UnitKind, &str)> = outcome
            .summary
            .failures
            .iter()
            .map(|f| (f.kind, f.id.as_str()))
            .collect();
        assert!(kinds.contains(&(UnitKind::Diet, "Broken")));
        assert!(kinds.contains(&(UnitKind::Goal, "Missing")));
        assert!(kinds.contains(&(UnitKind::Neighborhood, "Ghost")));

        assert_eq!(outcome.deltas.len(), 1);
        assert!(outcome.deltas[0].total.absolute_delta < 0.0);
        assert_eq!(outcome.sensitivity.records.len(), 6);
        assert_eq!(outcome.sensitivity.waterfall.len(), 3);
        assert!((outcome.calibration.scale_factor - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_calibration_failure_is_fatal() {
        let store = ReferenceDataStore::from_json(DOC).unwrap();
        let config = config(&store, 5.0);
        let err = run_batch(&store, &config, BatchOptions::default()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unknown_baseline_is_fatal() {
        let store = ReferenceDataStore::from_json(DOC).unwrap();
        let mut config = config(&store, 0.7);
        config.baseline_diet = "Nope".to_string();
        assert!(matches!(
            run_batch(&store, &config, BatchOptions::default()),
            Err(ModelError::UnknownDiet(_))
        ));
    }

    #[test]
    fn test_output_is_deterministic() {
        let store = ReferenceDataStore::from_json(DOC).unwrap();
        let config = config(&store, 0.7);
        let a = run_batch(&store, &config, BatchOptions::default()).unwrap();
        let b = run_batch(&store, &config, BatchOptions::default()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        let names: Vec<&str> = a.emissions.iter().map(|e| e.diet.as_str()).collect();
        assert_eq!(names, vec!["Base", "Goal"]);
    }
}
