//! Neighborhood-level simulation
//!
//! Applies each neighborhood's composite beta to a base diet and computes
//! emissions for that neighborhood's population.
//!
//! Global invariants enforced:
//! - An invalid neighborhood fails only its own unit; the others still run
//! - Results are sorted by neighborhood id regardless of execution order

use crate::error::ModelError;
use crate::heterogeneity::{self, CompositeBeta, HeterogeneityParams};
use crate::reference::{DietProfile, FactorTable, Neighborhood};
use crate::scope::{self, DietEmissions, ScopeAddOns};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Emissions of one neighborhood under a diet scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NeighborhoodResult {
    pub neighborhood: String,
    pub population: u64,
    pub beta: CompositeBeta,
    pub emissions: DietEmissions,
    /// kg CO2e per person per day, all scopes
    pub co2_per_capita_daily: f64,
}

/// Neighborhood that could not be simulated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SkippedNeighborhood {
    pub neighborhood: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SpatialRun {
    pub diet: String,
    pub results: Vec<NeighborhoodResult>,
    pub skipped: Vec<SkippedNeighborhood>,
}

impl SpatialRun {
    /// Sum of neighborhood totals (tonnes CO2e/year, all scopes)
    pub fn total_co2(&self) -> f64 {
        self.results.iter().map(|r| r.emissions.total_co2()).sum()
    }

    pub fn total_population(&self) -> u64 {
        self.results.iter().map(|r| r.population).sum()
    }
}

/// Simulate a single neighborhood
pub fn simulate_neighborhood(
    diet: &DietProfile,
    neighborhood: &Neighborhood,
    factors: &FactorTable,
    params: &HeterogeneityParams,
    add_ons: &ScopeAddOns,
) -> Result<NeighborhoodResult, ModelError> {
    let beta = heterogeneity::composite_beta(neighborhood, params)?;
    let local = heterogeneity::neighborhood_diet(diet, &neighborhood.id, &beta, factors)?;
    // validate() has rejected population <= 0
    let population = neighborhood.population.unsigned_abs();
    let emissions = scope::compute_diet_emissions(&local, factors, population, add_ons)?;
    let co2_per_capita_daily = emissions.per_capita_daily().co2;
    debug!(
        neighborhood = %neighborhood.id,
        volume = beta.volume,
        tier = ?beta.tier,
        total = emissions.total_co2(),
        "simulated neighborhood"
    );
    Ok(NeighborhoodResult {
        neighborhood: neighborhood.id.clone(),
        population,
        beta,
        emissions,
        co2_per_capita_daily,
    })
}

/// Simulate every neighborhood in parallel, skipping and logging failures
pub fn simulate(
    diet: &DietProfile,
    neighborhoods: &[Neighborhood],
    factors: &FactorTable,
    params: &HeterogeneityParams,
    add_ons: &ScopeAddOns,
) -> SpatialRun {
    let outcomes: Vec<(String, Result<NeighborhoodResult, ModelError>)> = neighborhoods
        .par_iter()
        .map(|n| {
            (
                n.id.clone(),
                simulate_neighborhood(diet, n, factors, params, add_ons),
            )
        })
        .collect();

    let mut run = SpatialRun {
        diet: diet.name.clone(),
        ..SpatialRun::default()
    };
    for (id, outcome) in outcomes {
        match outcome {
            Ok(result) => run.results.push(result),
            Err(e) => {
                warn!(neighborhood = %id, error = %e, "skipping neighborhood");
                run.skipped.push(SkippedNeighborhood {
                    neighborhood: id,
                    reason: e.to_string(),
                });
            }
        }
    }
    run.results.sort_by(|a, b| a.neighborhood.cmp(&b.neighborhood));
    run.skipped.sort_by(|a, b| a.neighborhood.cmp(&b.neighborhood));
    run
}
