//! Reporting and output generation
//!
//! Global invariants enforced:
//! - Deterministic output ordering (records are rendered in the order given)
//! - Byte-for-byte identical output across runs

use crate::batch::{BatchOutcome, RunSummary};
use crate::calibrate::CalibrationReport;
use crate::delta::{DeltaReport, DeltaValue};
use crate::scope::DietEmissions;
use crate::sensitivity::SensitivityAnalysis;
use crate::spatial::SpatialRun;
use serde::Serialize;

/// Render per-category emissions of one diet
pub fn render_emissions_text(em: &DietEmissions) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Diet: {} (population {})\n",
        em.diet, em.population
    ));
    output.push_str(&format!(
        "{:<16} {:>14} {:>14} {:>16} {:>18} {:>12}\n",
        "CATEGORY", "SCOPE12 (t)", "SCOPE3 (t)", "LAND (m2*yr)", "WATER (L)", "MASS (t)"
    ));
    for r in &em.categories {
        output.push_str(&format!(
            "{:<16} {:>14.0} {:>14.0} {:>16.0} {:>18.0} {:>12.0}\n",
            r.category.as_str(),
            r.co2_scope12,
            r.co2_scope3,
            r.land_m2,
            r.water_l,
            r.mass_tonnes
        ));
    }
    output.push_str(&format!(
        "{:<16} {:>14.0} {:>14.0} {:>16.0} {:>18.0} {:>12.0}\n",
        "Subtotal",
        em.scope12.base,
        em.scope3_total,
        em.land_total_m2,
        em.water_total_l,
        em.mass_total_tonnes
    ));
    output.push_str(&format!("{:<16} {:>14.0}\n", "+ Waste", em.scope12.waste));
    output.push_str(&format!("{:<16} {:>14.0}\n", "+ Retail", em.scope12.retail));
    output.push_str(&format!(
        "{:<16} {:>14.0} {:>14.0}  total {:.0} t CO2e\n",
        "Total",
        em.scope12.total,
        em.scope3_total,
        em.total_co2()
    ));

    let shares = em.shares();
    output.push_str(&format!(
        "Shares: scope 1+2 {}, scope 3 {}\n",
        fmt_pct(shares.scope12_pct),
        fmt_pct(shares.scope3_pct)
    ));
    let daily = em.per_capita_daily();
    output.push_str(&format!(
        "Per capita per day: {:.2} kg CO2e, {:.2} m2 land, {:.0} L water\n",
        daily.co2, daily.land, daily.water
    ));
    output
}

/// Render a baseline -> goal delta table
pub fn render_delta_text(report: &DeltaReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Delta: {} -> {} [{} in {}]\n",
        report.baseline,
        report.goal,
        report.metric,
        report.metric.unit()
    ));
    output.push_str(&format!(
        "{:<16} {:>16} {:>16} {:>16} {:>10}\n",
        "CATEGORY", "BASELINE", "GOAL", "DELTA", "PCT"
    ));
    for r in &report.records {
        output.push_str(&format!(
            "{:<16} {:>16.0} {:>16.0} {:>+16.0} {:>10}\n",
            r.category.as_str(),
            r.value.baseline_value,
            r.value.goal_value,
            r.value.absolute_delta,
            fmt_pct(r.value.percent_delta)
        ));
    }
    if report.metric.includes_add_ons() {
        output.push_str(&delta_row("Waste & retail", &report.add_ons));
    }
    output.push_str(&delta_row("Total", &report.total));

    let largest: Vec<String> = report
        .ranked()
        .into_iter()
        .filter(|r| r.value.absolute_delta != 0.0)
        .take(3)
        .map(|r| format!("{} {:+.0}", r.category, r.value.absolute_delta))
        .collect();
    if !largest.is_empty() {
        output.push_str(&format!("Largest changes: {}\n", largest.join(", ")));
    }
    output
}

fn delta_row(label: &str, value: &DeltaValue) -> String {
    format!(
        "{:<16} {:>16.0} {:>16.0} {:>+16.0} {:>10}\n",
        label,
        value.baseline_value,
        value.goal_value,
        value.absolute_delta,
        fmt_pct(value.percent_delta)
    )
}

/// Render tornado ranking and waterfall sequence
pub fn render_sensitivity_text(analysis: &SensitivityAnalysis) -> String {
    let mut output = String::new();
    output.push_str(&format!("Baseline total: {:.0} t CO2e\n", analysis.baseline_total));

    output.push_str(&format!(
        "{:<20} {:<9} {:>7} {:>16} {:>16} {:>10}\n",
        "PARAMETER", "DIRECTION", "PCT", "TOTAL", "DELTA", "DELTA %"
    ));
    for r in &analysis.records {
        output.push_str(&format!(
            "{:<20} {:<9} {:>6.1}% {:>16.0} {:>+16.0} {:>10}\n",
            truncate_or_pad(&r.parameter, 20),
            r.direction.as_str(),
            r.pct * 100.0,
            r.perturbed_total,
            r.delta,
            fmt_pct(r.percent_delta)
        ));
    }

    output.push_str("\nTornado:\n");
    for bar in &analysis.tornado {
        output.push_str(&format!(
            "  {:<20} {:>16.0} .. {:<16.0} swing {:.0}\n",
            truncate_or_pad(&bar.parameter, 20),
            bar.low_total,
            bar.high_total,
            bar.swing
        ));
    }

    if let Some(first) = analysis.waterfall.first() {
        output.push_str(&format!("\nWaterfall ({}):\n", first.direction));
        output.push_str(&format!("  {:<20} {:>16.0}\n", "start", first.before));
    }
    for step in &analysis.waterfall {
        output.push_str(&format!(
            "  {:<20} {:>+16.0} -> {:.0} (cumulative {:+.0})\n",
            truncate_or_pad(&step.parameter, 20),
            step.step_delta,
            step.after,
            step.cumulative_delta
        ));
    }
    output
}

pub fn render_calibration_text(report: &CalibrationReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Calibration against {} ({:.0} t Scope 1+2, baseline '{}')\n",
        report.target_version, report.target_tonnes, report.baseline_diet
    ));
    output.push_str(&format!("  uncalibrated total: {:.0} t\n", report.uncalibrated_total));
    output.push_str(&format!("  calibrated total:   {:.0} t\n", report.calibrated_total));
    output.push_str(&format!("  scale factor:       {:.4}\n", report.scale_factor));
    output.push_str(&format!(
        "  relative error:     {:.6} (tolerance {})\n",
        report.relative_error, report.tolerance
    ));
    if let Some(err) = report.post_override_error {
        output.push_str(&format!("  after overrides:    {:.6} relative error\n", err));
    }
    output
}

pub fn render_spatial_text(run: &SpatialRun) -> String {
    let mut output = String::new();
    output.push_str(&format!("Neighborhoods under '{}':\n", run.diet));
    output.push_str(&format!(
        "{:<14} {:>10} {:>8} {:>5} {:>16} {:>12}\n",
        "NEIGHBORHOOD", "POPULATION", "VOLUME", "TIER", "TOTAL (t)", "KG/CAP/DAY"
    ));
    for r in &run.results {
        output.push_str(&format!(
            "{:<14} {:>10} {:>8.3} {:>5} {:>16.0} {:>12.2}\n",
            truncate_or_pad(&r.neighborhood, 14),
            r.population,
            r.beta.volume,
            r.beta.tier.as_str(),
            r.emissions.total_co2(),
            r.co2_per_capita_daily
        ));
    }
    for s in &run.skipped {
        output.push_str(&format!("skipped {}: {}\n", s.neighborhood, s.reason));
    }
    output
}

pub fn render_summary_text(summary: &RunSummary) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "Diets: {} ok, {} failed; goals: {} ok, {} failed; neighborhoods: {} ok, {} failed\n",
        summary.diets_ok,
        summary.diets_failed,
        summary.goals_ok,
        summary.goals_failed,
        summary.neighborhoods_ok,
        summary.neighborhoods_failed
    ));
    for f in &summary.failures {
        output.push_str(&format!(
            "  failed {} '{}': {}\n",
            f.kind.as_str(),
            f.id,
            f.message
        ));
    }
    output
}

/// Render everything a batch run produced
pub fn render_batch_text(outcome: &BatchOutcome) -> String {
    let mut output = render_calibration_text(&outcome.calibration);
    if !outcome.overrides.is_empty() {
        output.push_str("Overrides:\n");
        for rule in &outcome.overrides {
            output.push_str(&format!(
                "  {} {:?}: {}\n",
                rule.item, rule.action, rule.justification
            ));
        }
    }

    output.push_str(&format!(
        "\n{:<28} {:>14} {:>14} {:>14} {:>10} {:>10}\n",
        "DIET", "SCOPE12 (t)", "SCOPE3 (t)", "TOTAL (t)", "KG/DAY", "SCOPE12 %"
    ));
    for em in &outcome.emissions {
        output.push_str(&format!(
            "{:<28} {:>14.0} {:>14.0} {:>14.0} {:>10.2} {:>10}\n",
            truncate_or_pad(&em.diet, 28),
            em.scope12.total,
            em.scope3_total,
            em.total_co2(),
            em.per_capita_daily().co2,
            fmt_pct(em.shares().scope12_pct)
        ));
    }

    for d in &outcome.deltas {
        output.push('\n');
        output.push_str(&render_delta_text(d));
    }
    output.push('\n');
    output.push_str(&render_spatial_text(&outcome.spatial));
    output.push('\n');
    output.push_str(&render_sensitivity_text(&outcome.sensitivity));
    output.push('\n');
    output.push_str(&render_summary_text(&outcome.summary));
    output
}

/// Render any record collection as pretty JSON
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

fn fmt_pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:+.2}%", v),
        None => "n/a".to_string(),
    }
}

/// Truncate or pad string to fixed width
fn truncate_or_pad(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        format!("{:<width$}", s, width = width)
    }
}
