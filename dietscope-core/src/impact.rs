//! Raw impact calculation
//!
//! Converts grams/person/day into daily per-person and annual population-scale
//! CO2, land and water impacts, before any scope split.
//!
//! Global invariants enforced:
//! - Pure functions of their inputs
//! - Missing factors abort the diet with `MissingFactor`, never default to zero
//! - Items are visited in diet key order (BTreeMap), so sums are reproducible

use crate::error::ModelError;
use crate::reference::{Category, DietProfile, FactorTable};
use serde::{Deserialize, Serialize};

pub const DAYS_PER_YEAR: f64 = 365.0;
pub const GRAMS_PER_KG: f64 = 1000.0;
pub const KG_PER_TONNE: f64 = 1000.0;

/// Daily per-person impact
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawImpact {
    /// kg CO2e
    pub co2: f64,
    /// m2 * year
    pub land: f64,
    /// litres
    pub water: f64,
}

/// Annual population-scale impact of one food item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemImpact {
    pub item: String,
    pub category: Category,
    pub grams_per_day: f64,
    pub mass_tonnes: f64,
    pub co2_tonnes: f64,
    pub land_m2: f64,
    pub water_l: f64,
}

/// Daily per-person impact of a diet: sum over items of (g / 1000) * factor
pub fn compute_raw_impact(
    diet: &DietProfile,
    factors: &FactorTable,
) -> Result<RawImpact, ModelError> {
    let mut res = RawImpact::default();
    for (item, grams) in &diet.grams_per_day {
        let f = factors.lookup(&diet.name, item)?;
        let kg = grams / GRAMS_PER_KG;
        res.co2 += kg * f.co2;
        res.land += kg * f.land;
        res.water += kg * f.water;
    }
    Ok(res)
}

/// Scale a daily per-person quantity to an annual population total
pub fn annual_total(daily_per_person: f64, population: u64) -> f64 {
    daily_per_person * DAYS_PER_YEAR * population as f64
}

/// Inverse of `annual_total`
pub fn daily_per_person(annual: f64, population: u64) -> f64 {
    if population == 0 {
        return 0.0;
    }
    annual / DAYS_PER_YEAR / population as f64
}

/// Per-item annual impacts for a whole population
pub fn compute_item_impacts(
    diet: &DietProfile,
    factors: &FactorTable,
    population: u64,
) -> Result<Vec<ItemImpact>, ModelError> {
    diet.grams_per_day
        .iter()
        .map(|(item, grams)| {
            let f = factors.lookup(&diet.name, item)?;
            let annual_kg = annual_total(grams / GRAMS_PER_KG, population);
            Ok(ItemImpact {
                item: item.clone(),
                category: f.category,
                grams_per_day: *grams,
                mass_tonnes: annual_kg / KG_PER_TONNE,
                co2_tonnes: annual_kg * f.co2 / KG_PER_TONNE,
                land_m2: annual_kg * f.land,
                water_l: annual_kg * f.water,
            })
        })
        .collect()
}
