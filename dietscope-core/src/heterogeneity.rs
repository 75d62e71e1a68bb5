//! Demographic heterogeneity multipliers
//!
//! Two independent, multiplicative drivers:
//! - Income drives total volume: `volume = C1 * exp(C2 * income / national_avg_income)`
//! - Education drives composition as a two-regime step, not a smooth curve
//!
//! A fraction exactly at the threshold falls in the low tier.

use crate::error::ModelError;
use crate::reference::{Category, ConsumptionClass, DietProfile, FactorTable, Neighborhood};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Calibration constants for the heterogeneity model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeterogeneityParams {
    pub national_avg_income: f64,
    pub c1: f64,
    pub c2: f64,
    pub education_threshold: f64,
}

impl Default for HeterogeneityParams {
    fn default() -> Self {
        HeterogeneityParams {
            national_avg_income: 32_000.0,
            c1: 0.8,
            c2: 0.2,
            education_threshold: 0.5,
        }
    }
}

/// Behavioral regime selected by the education threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EducationTier {
    High,
    Low,
}

impl EducationTier {
    /// Strictly above the threshold is High
    pub fn classify(high_education_fraction: f64, threshold: f64) -> Self {
        if high_education_fraction > threshold {
            EducationTier::High
        } else {
            EducationTier::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EducationTier::High => "high",
            EducationTier::Low => "low",
        }
    }

    /// (meat_mod, plant_mod)
    pub fn modifiers(&self) -> (f64, f64) {
        match self {
            EducationTier::High => (0.85, 1.15),
            EducationTier::Low => (1.10, 0.90),
        }
    }
}

/// Composite multiplier for one neighborhood
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeBeta {
    pub volume: f64,
    pub meat_mod: f64,
    pub plant_mod: f64,
    pub tier: EducationTier,
}

impl CompositeBeta {
    /// Behavioral modifier for a consumption class
    pub fn class_modifier(&self, class: ConsumptionClass) -> f64 {
        match class {
            ConsumptionClass::Animal => self.meat_mod,
            ConsumptionClass::Plant => self.plant_mod,
            ConsumptionClass::Neutral => 1.0,
        }
    }

    /// Full multiplier (volume x behavioral) for a category
    pub fn multiplier(&self, category: Category) -> f64 {
        self.volume * self.class_modifier(category.class())
    }

    pub fn scale_grams(&self, base_grams: f64, category: Category) -> f64 {
        base_grams * self.multiplier(category)
    }
}

/// Income-driven volume multiplier; positive and increasing for C1, C2 > 0
pub fn volume_multiplier(income: f64, params: &HeterogeneityParams) -> f64 {
    params.c1 * (params.c2 * (income / params.national_avg_income)).exp()
}

/// Composite beta for a neighborhood, rejecting non-positive population or income
pub fn composite_beta(
    neighborhood: &Neighborhood,
    params: &HeterogeneityParams,
) -> Result<CompositeBeta, ModelError> {
    neighborhood.validate()?;
    let tier = EducationTier::classify(
        neighborhood.high_education_fraction,
        params.education_threshold,
    );
    let (meat_mod, plant_mod) = tier.modifiers();
    Ok(CompositeBeta {
        volume: volume_multiplier(neighborhood.income, params),
        meat_mod,
        plant_mod,
        tier,
    })
}

/// Derive the neighborhood-specific consumption profile from a base diet
pub fn neighborhood_diet(
    diet: &DietProfile,
    neighborhood_id: &str,
    beta: &CompositeBeta,
    factors: &FactorTable,
) -> Result<DietProfile, ModelError> {
    let grams = diet
        .grams_per_day
        .iter()
        .map(|(item, grams)| {
            let f = factors.lookup(&diet.name, item)?;
            Ok((item.clone(), beta.scale_grams(*grams, f.category)))
        })
        .collect::<Result<BTreeMap<_, _>, ModelError>>()?;
    Ok(DietProfile {
        name: format!("{} @ {}", diet.name, neighborhood_id),
        grams_per_day: grams,
    })
}
