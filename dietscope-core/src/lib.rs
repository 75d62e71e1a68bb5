//! dietscope core library - calibrated multi-scope dietary emissions model

#![deny(warnings)]

// Global invariants enforced in this crate:
// - Reference tables are built once and never mutated; calibration and
//   overrides always produce new tables
// - No global mutable state; every component is a pure transformation
// - Missing impact factors are errors, never silent zeros
// - Parallel work reads shared immutable data and writes disjoint records
// - Every output collection has an explicit, deterministic order

pub mod batch;
pub mod calibrate;
pub mod config;
pub mod delta;
pub mod error;
pub mod heterogeneity;
pub mod impact;
pub mod reference;
pub mod report;
pub mod scope;
pub mod sensitivity;
pub mod spatial;

pub use batch::{run_batch, BatchOptions, BatchOutcome, RunSummary};
pub use calibrate::{CalibratedFactorTable, CalibrationTarget, Calibrator, OverrideRule};
pub use config::ResolvedConfig;
pub use delta::{DeltaRecord, DeltaReport, Metric};
pub use error::ModelError;
pub use reference::{
    Category, DietProfile, FactorTable, ImpactFactor, Neighborhood, ReferenceDataStore,
};
pub use report::{render_batch_text, render_json};
pub use scope::{DietEmissions, EmissionsRecord, ScopeAddOns};
pub use sensitivity::{Direction, SensitivityAnalysis, SensitivityParameter, SensitivityRecord};

use anyhow::Result;

/// Calibrate against the configured target, then apply the configured overrides
pub fn calibrated_factors(
    store: &ReferenceDataStore,
    config: &ResolvedConfig,
) -> Result<calibrate::Calibration> {
    let baseline = store.diet(&config.baseline_diet)?;
    let calibrator = Calibrator::new(store.factors(), config.population, config.add_ons);
    let calibration = calibrator.calibrate(baseline, &config.target, config.tolerance)?;
    Ok(calibrator.apply_overrides(baseline, calibration, &config.overrides)?)
}

/// Emissions of one named diet under the calibrated table
pub fn diet_emissions(
    store: &ReferenceDataStore,
    config: &ResolvedConfig,
    diet: &str,
) -> Result<DietEmissions> {
    let calibration = calibrated_factors(store, config)?;
    let profile = store.diet(diet)?;
    Ok(scope::compute_diet_emissions(
        profile,
        calibration.table.factors(),
        config.population,
        &config.add_ons,
    )?)
}

/// Delta between two named diets under the calibrated table
pub fn diet_delta(
    store: &ReferenceDataStore,
    config: &ResolvedConfig,
    baseline: &str,
    goal: &str,
    metric: Metric,
) -> Result<DeltaReport> {
    let calibration = calibrated_factors(store, config)?;
    let factors = calibration.table.factors();
    let compute = |name: &str| -> Result<DietEmissions> {
        Ok(scope::compute_diet_emissions(
            store.diet(name)?,
            factors,
            config.population,
            &config.add_ons,
        )?)
    };
    Ok(delta::delta(&compute(baseline)?, &compute(goal)?, metric))
}

/// Sensitivity of the calibrated baseline total (all scopes, with add-ons)
pub fn baseline_sensitivity(
    store: &ReferenceDataStore,
    config: &ResolvedConfig,
    waterfall_direction: Direction,
) -> Result<SensitivityAnalysis> {
    let baseline = diet_emissions(store, config, &config.baseline_diet)?;
    Ok(sensitivity::analyze(
        baseline.total_co2(),
        &config.sensitivity,
        waterfall_direction,
    ))
}
