//! Scope decomposition and per-diet emissions
//!
//! Splits every item's CO2 into Scope 1+2 (local) and Scope 3 (supply chain)
//! and rolls items up into one record per category.
//!
//! Global invariants enforced:
//! - scope12 + scope3 == item co2 for every item, before add-ons
//! - Waste and retail add-ons are applied once to the diet's base Scope 1+2
//!   total and are additive on top of it, never redistributed
//! - Category records are strictly derived and emitted in `Category::ALL` order

use crate::error::ModelError;
use crate::impact::{self, RawImpact};
use crate::reference::{Category, DietProfile, FactorTable, ImpactFactor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scope split of a single CO2 quantity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScopeSplit {
    pub scope12: f64,
    pub scope3: f64,
}

/// Split `item_co2` by the factor's Scope 1+2 fraction
pub fn decompose(item_co2: f64, factor: &ImpactFactor) -> ScopeSplit {
    let scope12 = item_co2 * factor.scope12_fraction;
    // Subtraction keeps scope12 + scope3 == item_co2
    ScopeSplit {
        scope12,
        scope3: item_co2 - scope12,
    }
}

/// Diet-level Scope 1+2 add-on rates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScopeAddOns {
    pub waste_rate: f64,
    pub retail_rate: f64,
}

impl Default for ScopeAddOns {
    fn default() -> Self {
        ScopeAddOns {
            waste_rate: 0.11,
            retail_rate: 0.025,
        }
    }
}

/// Scope 1+2 totals with add-ons (tonnes CO2e/year)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scope12Totals {
    pub base: f64,
    pub waste: f64,
    pub retail: f64,
    pub total: f64,
}

impl ScopeAddOns {
    pub fn apply(&self, base_scope12_total: f64) -> Scope12Totals {
        let waste = base_scope12_total * self.waste_rate;
        let retail = base_scope12_total * self.retail_rate;
        Scope12Totals {
            base: base_scope12_total,
            waste,
            retail,
            total: base_scope12_total + waste + retail,
        }
    }
}

/// Annual emissions of one food item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEmissions {
    pub item: String,
    pub category: Category,
    pub co2: f64,
    pub co2_scope12: f64,
    pub co2_scope3: f64,
    pub land_m2: f64,
    pub water_l: f64,
    pub mass_tonnes: f64,
}

/// One row per (diet, category); CO2 in tonnes CO2e/year
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmissionsRecord {
    pub diet: String,
    pub category: Category,
    pub co2_scope12: f64,
    pub co2_scope3: f64,
    pub land_m2: f64,
    pub water_l: f64,
    pub mass_tonnes: f64,
}

impl EmissionsRecord {
    fn empty(diet: &str, category: Category) -> Self {
        EmissionsRecord {
            diet: diet.to_string(),
            category,
            co2_scope12: 0.0,
            co2_scope3: 0.0,
            land_m2: 0.0,
            water_l: 0.0,
            mass_tonnes: 0.0,
        }
    }

    pub fn co2(&self) -> f64 {
        self.co2_scope12 + self.co2_scope3
    }
}

/// Percent shares of the total CO2 (None when the total is zero)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScopeShares {
    pub scope12_pct: Option<f64>,
    pub scope3_pct: Option<f64>,
}

/// Complete annual emissions of a diet for a population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DietEmissions {
    pub diet: String,
    pub population: u64,
    pub items: Vec<ItemEmissions>,
    pub categories: Vec<EmissionsRecord>,
    pub scope12: Scope12Totals,
    pub scope3_total: f64,
    pub land_total_m2: f64,
    pub water_total_l: f64,
    pub mass_total_tonnes: f64,
}

impl DietEmissions {
    /// Scope 1+2 (with add-ons) plus Scope 3
    pub fn total_co2(&self) -> f64 {
        self.scope12.total + self.scope3_total
    }

    pub fn category(&self, category: Category) -> Option<&EmissionsRecord> {
        self.categories.iter().find(|r| r.category == category)
    }

    pub fn shares(&self) -> ScopeShares {
        let total = self.total_co2();
        if total == 0.0 {
            return ScopeShares {
                scope12_pct: None,
                scope3_pct: None,
            };
        }
        ScopeShares {
            scope12_pct: Some(self.scope12.total / total * 100.0),
            scope3_pct: Some(self.scope3_total / total * 100.0),
        }
    }

    /// Daily per-person view: kg CO2e (all scopes), m2 land, litres water
    pub fn per_capita_daily(&self) -> RawImpact {
        RawImpact {
            co2: impact::daily_per_person(self.total_co2(), self.population)
                * impact::KG_PER_TONNE,
            land: impact::daily_per_person(self.land_total_m2, self.population),
            water: impact::daily_per_person(self.water_total_l, self.population),
        }
    }
}

/// Compute item- and category-level emissions of a diet
pub fn compute_diet_emissions(
    diet: &DietProfile,
    factors: &FactorTable,
    population: u64,
    add_ons: &ScopeAddOns,
) -> Result<DietEmissions, ModelError> {
    let impacts = impact::compute_item_impacts(diet, factors, population)?;

    let mut items = Vec::with_capacity(impacts.len());
    for imp in impacts {
        let factor = factors.lookup(&diet.name, &imp.item)?;
        let split = decompose(imp.co2_tonnes, factor);
        items.push(ItemEmissions {
            item: imp.item,
            category: imp.category,
            co2: imp.co2_tonnes,
            co2_scope12: split.scope12,
            co2_scope3: split.scope3,
            land_m2: imp.land_m2,
            water_l: imp.water_l,
            mass_tonnes: imp.mass_tonnes,
        });
    }

    let categories = aggregate_categories(&diet.name, &items);
    let base_scope12: f64 = items.iter().map(|i| i.co2_scope12).sum();

    Ok(DietEmissions {
        diet: diet.name.clone(),
        population,
        scope12: add_ons.apply(base_scope12),
        scope3_total: items.iter().map(|i| i.co2_scope3).sum(),
        land_total_m2: items.iter().map(|i| i.land_m2).sum(),
        water_total_l: items.iter().map(|i| i.water_l).sum(),
        mass_total_tonnes: items.iter().map(|i| i.mass_tonnes).sum(),
        items,
        categories,
    })
}

/// Roll items up into one record per category (all categories, zeros included)
pub fn aggregate_categories(diet: &str, items: &[ItemEmissions]) -> Vec<EmissionsRecord> {
    let mut by_category: BTreeMap<Category, EmissionsRecord> = Category::ALL
        .iter()
        .map(|c| (*c, EmissionsRecord::empty(diet, *c)))
        .collect();

    for item in items {
        let entry = by_category
            .entry(item.category)
            .or_insert_with(|| EmissionsRecord::empty(diet, item.category));
        entry.co2_scope12 += item.co2_scope12;
        entry.co2_scope3 += item.co2_scope3;
        entry.land_m2 += item.land_m2;
        entry.water_l += item.water_l;
        entry.mass_tonnes += item.mass_tonnes;
    }

    by_category.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::ImpactFactor;

    fn factor(category: Category, co2: f64, fraction: f64) -> ImpactFactor {
        ImpactFactor {
            category,
            co2,
            land: 2.0,
            water: 500.0,
            scope12_fraction: fraction,
        }
    }

    fn table() -> FactorTable {
        let mut entries = BTreeMap::new();
        entries.insert("Beef".to_string(), factor(Category::RedMeat, 25.0, 0.5));
        entries.insert("Pork".to_string(), factor(Category::RedMeat, 5.0, 0.37));
        entries.insert("Grains".to_string(), factor(Category::Staples, 1.1, 0.0731));
        FactorTable::new(entries).unwrap()
    }

    fn diet(items: &[(&str, f64)]) -> DietProfile {
        DietProfile::new(
            "Test",
            items.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_decompose_is_additive() {
        let cases = [(912_500.0, 0.5), (0.3, 0.1), (17.77, 0.333), (1e9, 1.0), (5.0, 0.0)];
        for (co2, fraction) in cases {
            let split = decompose(co2, &factor(Category::RedMeat, 1.0, fraction));
            let sum = split.scope12 + split.scope3;
            assert!((sum - co2).abs() <= 1e-9 * co2.abs().max(1.0));
        }
    }

    #[test]
    fn test_add_ons_are_additive() {
        let totals = ScopeAddOns::default().apply(1000.0);
        assert!((totals.waste - 110.0).abs() < 1e-9);
        assert!((totals.retail - 25.0).abs() < 1e-9);
        assert!((totals.total - 1135.0).abs() < 1e-9);
        assert_eq!(totals.base, 1000.0);
    }

    #[test]
    fn test_single_beef_scenario() {
        let em = compute_diet_emissions(
            &diet(&[("Beef", 100.0)]),
            &table(),
            1_000_000,
            &ScopeAddOns {
                waste_rate: 0.0,
                retail_rate: 0.0,
            },
        )
        .unwrap();
        assert!((em.scope12.base - 456_250.0).abs() < 1e-6);
        assert!((em.scope3_total - 456_250.0).abs() < 1e-6);
        assert!((em.total_co2() - 912_500.0).abs() < 1e-6);
        let shares = em.shares();
        assert!((shares.scope12_pct.unwrap() - 50.0).abs() < 1e-9);
        assert!((em.per_capita_daily().co2 - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_categories_cover_all_and_sum_to_items() {
        let em = compute_diet_emissions(
            &diet(&[("Beef", 10.0), ("Pork", 15.0), ("Grains", 230.0)]),
            &table(),
            882_000,
            &ScopeAddOns::default(),
        )
        .unwrap();
        assert_eq!(em.categories.len(), 14);
        assert_eq!(em.categories[0].category, Category::RedMeat);

        let red = em.category(Category::RedMeat).unwrap();
        let red_items: f64 = em
            .items
            .iter()
            .filter(|i| i.category == Category::RedMeat)
            .map(|i| i.co2)
            .sum();
        assert!((red.co2() - red_items).abs() < 1e-6);

        let base_sum: f64 = em.categories.iter().map(|r| r.co2_scope12).sum();
        assert!((base_sum - em.scope12.base).abs() < 1e-6);
        assert_eq!(em.category(Category::Fish).unwrap().co2(), 0.0);
    }

    #[test]
    fn test_zero_diet_has_no_shares() {
        let em = compute_diet_emissions(&diet(&[]), &table(), 10, &ScopeAddOns::default()).unwrap();
        assert_eq!(em.shares().scope12_pct, None);
        assert_eq!(em.total_co2(), 0.0);
    }
}
