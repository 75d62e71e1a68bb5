//! Reference data store - immutable lookup tables
//!
//! Global invariants enforced:
//! - Constructed once, read-only afterwards (no interior mutability)
//! - scope12_fraction in [0, 1]; co2, land, water >= 0
//! - Diet masses >= 0
//! - BTreeMap storage so every traversal order is deterministic
//!
//! Neighborhood validity is not checked at load: an invalid
//! neighborhood only fails its own unit of work.

use crate::error::ModelError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Food category (14 groups)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "Red Meat")]
    RedMeat,
    #[serde(rename = "Poultry")]
    Poultry,
    #[serde(rename = "Fish")]
    Fish,
    #[serde(rename = "Dairy")]
    Dairy,
    #[serde(rename = "Eggs")]
    Eggs,
    #[serde(rename = "Plant Protein")]
    PlantProtein,
    #[serde(rename = "Staples")]
    Staples,
    #[serde(rename = "Vegetables")]
    Vegetables,
    #[serde(rename = "Fruits")]
    Fruits,
    #[serde(rename = "Ultra-Processed")]
    UltraProcessed,
    #[serde(rename = "Beverages")]
    Beverages,
    #[serde(rename = "Alcohol")]
    Alcohol,
    #[serde(rename = "Fats & Oils")]
    FatsOils,
    #[serde(rename = "Condiments")]
    Condiments,
}

/// Which behavioral modifier applies to a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsumptionClass {
    Animal,
    Plant,
    Neutral,
}

impl Category {
    /// All categories in display order (high to low impact intensity)
    pub const ALL: [Category; 14] = [
        Category::RedMeat,
        Category::Poultry,
        Category::Fish,
        Category::Dairy,
        Category::Eggs,
        Category::PlantProtein,
        Category::Staples,
        Category::Vegetables,
        Category::Fruits,
        Category::UltraProcessed,
        Category::Beverages,
        Category::Alcohol,
        Category::FatsOils,
        Category::Condiments,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::RedMeat => "Red Meat",
            Category::Poultry => "Poultry",
            Category::Fish => "Fish",
            Category::Dairy => "Dairy",
            Category::Eggs => "Eggs",
            Category::PlantProtein => "Plant Protein",
            Category::Staples => "Staples",
            Category::Vegetables => "Vegetables",
            Category::Fruits => "Fruits",
            Category::UltraProcessed => "Ultra-Processed",
            Category::Beverages => "Beverages",
            Category::Alcohol => "Alcohol",
            Category::FatsOils => "Fats & Oils",
            Category::Condiments => "Condiments",
        }
    }

    pub fn class(&self) -> ConsumptionClass {
        match self {
            Category::RedMeat
            | Category::Poultry
            | Category::Fish
            | Category::Dairy
            | Category::Eggs => ConsumptionClass::Animal,
            Category::PlantProtein
            | Category::Staples
            | Category::Vegetables
            | Category::Fruits => ConsumptionClass::Plant,
            Category::UltraProcessed
            | Category::Beverages
            | Category::Alcohol
            | Category::FatsOils
            | Category::Condiments => ConsumptionClass::Neutral,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item impact factor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImpactFactor {
    pub category: Category,
    /// kg CO2e per kg
    pub co2: f64,
    /// m2 * year per kg
    pub land: f64,
    /// litres per kg
    pub water: f64,
    /// Fraction of co2 attributable to local production, retail and waste
    pub scope12_fraction: f64,
}

impl ImpactFactor {
    pub fn validate(&self, item: &str) -> Result<(), ModelError> {
        let invalid = |reason: String| ModelError::InvalidFactor {
            item: item.to_string(),
            reason,
        };
        for (name, value) in [("co2", self.co2), ("land", self.land), ("water", self.water)] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{} must be finite and >= 0 (got {})", name, value)));
            }
        }
        if !(0.0..=1.0).contains(&self.scope12_fraction) {
            return Err(invalid(format!(
                "scope12_fraction must be in [0, 1] (got {})",
                self.scope12_fraction
            )));
        }
        Ok(())
    }
}

/// Food item -> impact factor lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactorTable {
    entries: BTreeMap<String, ImpactFactor>,
}

impl FactorTable {
    /// Build a table, validating every factor
    pub fn new(entries: BTreeMap<String, ImpactFactor>) -> Result<Self, ModelError> {
        for (item, factor) in &entries {
            if item.trim().is_empty() {
                return Err(ModelError::InvalidFactor {
                    item: item.clone(),
                    reason: "food item identifier must not be empty".to_string(),
                });
            }
            factor.validate(item)?;
        }
        Ok(FactorTable { entries })
    }

    /// Look up a factor; a missing item is an error, never a zero default
    pub fn lookup(&self, diet: &str, item: &str) -> Result<&ImpactFactor, ModelError> {
        self.entries
            .get(item)
            .ok_or_else(|| ModelError::MissingFactor {
                diet: diet.to_string(),
                item: item.to_string(),
            })
    }

    pub fn get(&self, item: &str) -> Option<&ImpactFactor> {
        self.entries.get(item)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ImpactFactor)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Derive a new table by mapping every factor (the source is untouched)
    pub(crate) fn map_factors<F>(&self, mut f: F) -> BTreeMap<String, ImpactFactor>
    where
        F: FnMut(&str, &ImpactFactor) -> ImpactFactor,
    {
        self.entries
            .iter()
            .map(|(item, factor)| (item.clone(), f(item, factor)))
            .collect()
    }
}

/// Named diet scenario: food item -> grams/person/day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DietProfile {
    pub name: String,
    pub grams_per_day: BTreeMap<String, f64>,
}

impl DietProfile {
    pub fn new(
        name: impl Into<String>,
        grams_per_day: BTreeMap<String, f64>,
    ) -> Result<Self, ModelError> {
        let diet = DietProfile {
            name: name.into(),
            grams_per_day,
        };
        diet.validate()?;
        Ok(diet)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::InvalidDiet {
                diet: self.name.clone(),
                reason: "diet name must not be empty".to_string(),
            });
        }
        for (item, grams) in &self.grams_per_day {
            if !grams.is_finite() || *grams < 0.0 {
                return Err(ModelError::InvalidDiet {
                    diet: self.name.clone(),
                    reason: format!("mass for '{}' must be finite and >= 0 (got {})", item, grams),
                });
            }
        }
        Ok(())
    }

    /// Total grams/person/day across all items
    pub fn total_grams(&self) -> f64 {
        self.grams_per_day.values().sum()
    }
}

/// District-level demographics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighborhood {
    pub id: String,
    pub population: i64,
    /// Average income (currency/year)
    pub income: f64,
    /// Fraction of residents with higher education (0..1)
    pub high_education_fraction: f64,
}

impl Neighborhood {
    /// Reject non-positive population or income
    pub fn validate(&self) -> Result<(), ModelError> {
        let invalid = |reason: String| ModelError::InvalidNeighborhood {
            id: self.id.clone(),
            reason,
        };
        if self.population <= 0 {
            return Err(invalid(format!(
                "population must be positive (got {})",
                self.population
            )));
        }
        if !self.income.is_finite() || self.income <= 0.0 {
            return Err(invalid(format!("income must be positive (got {})", self.income)));
        }
        if !(0.0..=1.0).contains(&self.high_education_fraction) {
            return Err(invalid(format!(
                "high_education_fraction must be in [0, 1] (got {})",
                self.high_education_fraction
            )));
        }
        Ok(())
    }
}

/// On-disk shape of the reference tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceDocument {
    pub factors: BTreeMap<String, ImpactFactor>,
    #[serde(default)]
    pub diets: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default)]
    pub neighborhoods: BTreeMap<String, NeighborhoodRow>,
}

/// Neighborhood row keyed by id in the reference document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeighborhoodRow {
    pub population: i64,
    pub income: f64,
    pub high_education_fraction: f64,
}

/// Immutable reference tables shared by every component
#[derive(Debug, Clone)]
pub struct ReferenceDataStore {
    factors: FactorTable,
    diets: BTreeMap<String, DietProfile>,
    neighborhoods: Vec<Neighborhood>,
}

impl ReferenceDataStore {
    pub fn new(
        factors: FactorTable,
        diets: Vec<DietProfile>,
        neighborhoods: Vec<Neighborhood>,
    ) -> Result<Self, ModelError> {
        let mut by_name: BTreeMap<String, DietProfile> = BTreeMap::new();
        for diet in diets {
            diet.validate()?;
            if by_name.contains_key(&diet.name) {
                return Err(ModelError::InvalidDiet {
                    diet: diet.name,
                    reason: "duplicate diet name".to_string(),
                });
            }
            by_name.insert(diet.name.clone(), diet);
        }
        let mut neighborhoods = neighborhoods;
        neighborhoods.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(ReferenceDataStore {
            factors,
            diets: by_name,
            neighborhoods,
        })
    }

    pub fn from_document(doc: ReferenceDocument) -> Result<Self, ModelError> {
        let factors = FactorTable::new(doc.factors)?;
        let diets = doc
            .diets
            .into_iter()
            .map(|(name, grams)| DietProfile::new(name, grams))
            .collect::<Result<Vec<_>, _>>()?;
        let neighborhoods = doc
            .neighborhoods
            .into_iter()
            .map(|(id, row)| Neighborhood {
                id,
                population: row.population,
                income: row.income,
                high_education_fraction: row.high_education_fraction,
            })
            .collect();
        Self::new(factors, diets, neighborhoods)
    }

    /// Parse and validate reference tables from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let doc: ReferenceDocument =
            serde_json::from_str(json).context("failed to parse reference data")?;
        Ok(Self::from_document(doc)?)
    }

    /// Load reference tables from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read reference data: {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("invalid reference data in: {}", path.display()))
    }

    pub fn factors(&self) -> &FactorTable {
        &self.factors
    }

    pub fn diet(&self, name: &str) -> Result<&DietProfile, ModelError> {
        self.diets
            .get(name)
            .ok_or_else(|| ModelError::UnknownDiet(name.to_string()))
    }

    pub fn diets(&self) -> impl Iterator<Item = &DietProfile> {
        self.diets.values()
    }

    pub fn diet_names(&self) -> Vec<&str> {
        self.diets.keys().map(|k| k.as_str()).collect()
    }

    pub fn neighborhoods(&self) -> &[Neighborhood] {
        &self.neighborhoods
    }
}
