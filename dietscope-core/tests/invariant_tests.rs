//! Invariant Tests
//!
//! Properties that must hold for every diet in the reference data, plus the
//! documented numeric scenarios.

use dietscope_core::delta::{self, percent_delta};
use dietscope_core::heterogeneity::{self, EducationTier, HeterogeneityParams};
use dietscope_core::impact;
use dietscope_core::scope::{self, ScopeAddOns};
use dietscope_core::sensitivity;
use dietscope_core::{
    run_batch, BatchOptions, DietProfile, Direction, Metric, ModelError, Neighborhood,
    ReferenceDataStore, ResolvedConfig,
};
use std::path::PathBuf;

fn store() -> ReferenceDataStore {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../data/amsterdam.json");
    ReferenceDataStore::load(&path).expect("bundled reference data should load")
}

#[test]
fn test_scope_additivity_for_every_item() {
    let store = store();
    let calibration =
        dietscope_core::calibrated_factors(&store, &ResolvedConfig::defaults().unwrap()).unwrap();
    for diet in store.diets() {
        let em = scope::compute_diet_emissions(
            diet,
            calibration.table.factors(),
            882_000,
            &ScopeAddOns::default(),
        )
        .unwrap();
        for item in &em.items {
            let sum = item.co2_scope12 + item.co2_scope3;
            assert!(
                (sum - item.co2).abs() <= 1e-9 * item.co2.abs().max(1.0),
                "{} / {}: {} != {}",
                diet.name,
                item.item,
                sum,
                item.co2
            );
        }
        // Add-ons sit on top of the base, never inside it
        let base: f64 = em.items.iter().map(|i| i.co2_scope12).sum();
        assert!((em.scope12.base - base).abs() <= 1e-9 * base.max(1.0));
        assert!((em.scope12.total - base * 1.135).abs() <= 1e-6 * base.max(1.0));
    }
}

#[test]
fn test_delta_additivity_for_every_pair() {
    let store = store();
    let config = ResolvedConfig::defaults().unwrap();
    let outcome = run_batch(&store, &config, BatchOptions::default()).unwrap();
    let baseline = outcome.emissions_for("Monitor 2024").unwrap();
    for goal in &outcome.emissions {
        for metric in Metric::ALL {
            let report = delta::delta(baseline, goal, metric);
            let categories: f64 = report.records.iter().map(|r| r.value.absolute_delta).sum();
            let sum = categories + report.add_ons.absolute_delta;
            let scale = report.total.baseline_value.abs().max(1.0);
            assert!(
                (sum - report.total.absolute_delta).abs() <= 1e-9 * scale,
                "{} {}",
                goal.diet,
                metric
            );
        }
    }
}

#[test]
fn test_sensitivity_ranking_is_stable() {
    let store = store();
    let config = ResolvedConfig::defaults().unwrap();
    let run = || dietscope_core::baseline_sensitivity(&store, &config, Direction::Decrease);
    let first = run().unwrap();
    let second = run().unwrap();
    assert_eq!(first, second);

    let swings: Vec<f64> = first
        .records
        .iter()
        .filter(|r| r.direction == Direction::Increase)
        .map(|r| (r.perturbed_total - first.baseline_total).abs())
        .collect();
    assert!(swings.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(first.tornado[0].parameter, "impact_factor");
    assert_eq!(first.waterfall.len(), config.sensitivity.len());
}

#[test]
fn test_volume_monotonic_and_tier_step() {
    let params = HeterogeneityParams::default();
    let mut prev = 0.0;
    for income in (1..=20).map(|k| k as f64 * 5_000.0) {
        let v = heterogeneity::volume_multiplier(income, &params);
        assert!(v > prev);
        prev = v;
    }
    for (edu, tier) in [
        (0.0, EducationTier::Low),
        (0.5, EducationTier::Low),
        (0.5001, EducationTier::High),
        (1.0, EducationTier::High),
    ] {
        assert_eq!(EducationTier::classify(edu, params.education_threshold), tier);
    }
}

#[test]
fn test_scenario_single_beef_item() {
    let json = r#"{
        "factors": {"Beef": {"category": "Red Meat", "co2": 25.0, "land": 25.0, "water": 15400, "scope12_fraction": 0.5}},
        "diets": {"Beef only": {"Beef": 100}}
    }"#;
    let store = ReferenceDataStore::from_json(json).unwrap();
    let diet = store.diet("Beef only").unwrap();

    let daily = impact::compute_raw_impact(diet, store.factors()).unwrap();
    assert!((daily.co2 - 2.5).abs() < 1e-12);
    assert!((impact::annual_total(daily.co2, 1_000_000) - 912_500_000.0).abs() < 1e-3);

    let no_add_ons = ScopeAddOns {
        waste_rate: 0.0,
        retail_rate: 0.0,
    };
    let em = scope::compute_diet_emissions(diet, store.factors(), 1_000_000, &no_add_ons).unwrap();
    assert!((em.total_co2() - 912_500.0).abs() < 1e-6);
    assert!((em.scope12.total - 456_250.0).abs() < 1e-6);
    assert!((em.scope3_total - 456_250.0).abs() < 1e-6);
}

#[test]
fn test_scenario_volume_at_national_average() {
    let n = Neighborhood {
        id: "Average".to_string(),
        population: 1,
        income: 32_000.0,
        high_education_fraction: 0.3,
    };
    let beta = heterogeneity::composite_beta(&n, &HeterogeneityParams::default()).unwrap();
    assert!((beta.volume - 0.977).abs() < 1e-3);
}

#[test]
fn test_scenario_goal_percent_delta() {
    let pct = percent_delta(2_923_844.0, 2_172_385.0).unwrap();
    assert!((pct + 25.70).abs() < 0.005);
    assert_eq!(percent_delta(0.0, 2_172_385.0), None);
}

#[test]
fn test_missing_factor_names_the_item() {
    let json = r#"{
        "factors": {"Beef": {"category": "Red Meat", "co2": 25.0, "land": 25.0, "water": 15400, "scope12_fraction": 0.5}},
        "diets": {"Odd": {"Beef": 10, "Lamb": 20}}
    }"#;
    let store = ReferenceDataStore::from_json(json).unwrap();
    let err = scope::compute_diet_emissions(
        store.diet("Odd").unwrap(),
        store.factors(),
        1000,
        &ScopeAddOns::default(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        ModelError::MissingFactor {
            diet: "Odd".to_string(),
            item: "Lamb".to_string()
        }
    );
}

#[test]
fn test_neighborhood_diet_keeps_items() {
    let store = store();
    let base: &DietProfile = store.diet("Monitor 2024").unwrap();
    for n in store.neighborhoods() {
        let beta = heterogeneity::composite_beta(n, &HeterogeneityParams::default()).unwrap();
        let local = heterogeneity::neighborhood_diet(base, &n.id, &beta, store.factors()).unwrap();
        assert_eq!(local.grams_per_day.len(), base.grams_per_day.len());
        assert!(local.total_grams() > 0.0);
    }
    let params = sensitivity::default_parameters();
    let analysis = sensitivity::analyze(0.0, &params, Direction::Increase);
    assert!(analysis.records.iter().all(|r| r.percent_delta.is_none()));
}
