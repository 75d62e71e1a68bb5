//! Configuration file support for dietscope
//!
//! Loads model parameters from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.dietscoperc.json` in project root
//! 3. `dietscope.config.json` in project root
//!
//! All fields are optional. Missing values fall back to the Amsterdam defaults.

use crate::calibrate::{CalibrationTarget, OverrideRule, DEFAULT_TOLERANCE};
use crate::heterogeneity::HeterogeneityParams;
use crate::scope::ScopeAddOns;
use crate::sensitivity::{self, SensitivityParameter};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_POPULATION: u64 = 882_000;
pub const DEFAULT_BASELINE_DIET: &str = "Monitor 2024";
pub const DEFAULT_GOAL_DIETS: &[&str] = &["Dutch Goal 60:40", "Amsterdam Goal 70:30", "EAT-Lancet"];
/// Scope 1+2 food emissions reported by the 2024 municipal monitor (tonnes/year)
pub const DEFAULT_TARGET_TONNES: f64 = 1_750_000.0;
pub const DEFAULT_TARGET_VERSION: &str = "monitor-2024";

/// dietscope configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DietscopeConfig {
    /// Population the per-capita diets are scaled to (default: 882,000)
    #[serde(default)]
    pub population: Option<u64>,

    /// Diet used as baseline and calibration reference (default: "Monitor 2024")
    #[serde(default)]
    pub baseline_diet: Option<String>,

    /// Diets compared against the baseline
    #[serde(default)]
    pub goal_diets: Option<Vec<String>>,

    #[serde(default)]
    pub calibration: Option<CalibrationConfig>,

    #[serde(default)]
    pub scope: Option<ScopeConfig>,

    #[serde(default)]
    pub heterogeneity: Option<HeterogeneityConfig>,

    /// Sensitivity parameters, in waterfall order
    #[serde(default)]
    pub sensitivity: Option<Vec<SensitivityParameter>>,

    /// Post-calibration overrides, applied in order
    #[serde(default)]
    pub overrides: Vec<OverrideRule>,
}

/// Calibration target and tolerance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CalibrationConfig {
    /// Scope 1+2 target in tonnes CO2e/year (default: 1,750,000)
    pub target_tonnes: Option<f64>,
    /// Label of the published baseline the target comes from
    pub version: Option<String>,
    /// Maximum relative error (default: 0.001)
    pub tolerance: Option<f64>,
}

/// Diet-level add-on rates
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeConfig {
    /// Food waste share of base Scope 1+2 (default: 0.11)
    pub waste_rate: Option<f64>,
    /// Retail and distribution share of base Scope 1+2 (default: 0.025)
    pub retail_rate: Option<f64>,
}

/// Demographic heterogeneity constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeterogeneityConfig {
    pub national_avg_income: Option<f64>,
    pub c1: Option<f64>,
    pub c2: Option<f64>,
    pub education_threshold: Option<f64>,
}

/// Resolved configuration with every default filled in
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub population: u64,
    pub baseline_diet: String,
    pub goal_diets: Vec<String>,
    pub target: CalibrationTarget,
    pub tolerance: f64,
    pub add_ons: ScopeAddOns,
    pub heterogeneity: HeterogeneityParams,
    pub sensitivity: Vec<SensitivityParameter>,
    pub overrides: Vec<OverrideRule>,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

impl DietscopeConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if self.population == Some(0) {
            anyhow::bail!("population must be positive (got 0)");
        }

        if let Some(ref name) = self.baseline_diet {
            if name.trim().is_empty() {
                anyhow::bail!("baseline_diet must not be empty");
            }
        }
        if let Some(ref goals) = self.goal_diets {
            if goals.iter().any(|g| g.trim().is_empty()) {
                anyhow::bail!("goal_diets must not contain empty names");
            }
        }

        if let Some(ref c) = self.calibration {
            if let Some(target) = c.target_tonnes {
                if !target.is_finite() || target <= 0.0 {
                    anyhow::bail!("calibration.target_tonnes must be positive (got {})", target);
                }
            }
            if let Some(ref version) = c.version {
                if version.trim().is_empty() {
                    anyhow::bail!("calibration.version must not be empty");
                }
            }
            if let Some(tol) = c.tolerance {
                if tol.is_nan() || tol <= 0.0 || tol >= 1.0 {
                    anyhow::bail!("calibration.tolerance must be in (0, 1) (got {})", tol);
                }
            }
        }

        if let Some(ref s) = self.scope {
            for (name, val) in [("waste_rate", s.waste_rate), ("retail_rate", s.retail_rate)] {
                if let Some(v) = val {
                    if !v.is_finite() || v < 0.0 {
                        anyhow::bail!("scope.{} must be non-negative (got {})", name, v);
                    }
                }
            }
        }

        if let Some(ref h) = self.heterogeneity {
            for (name, val) in [
                ("national_avg_income", h.national_avg_income),
                ("c1", h.c1),
                ("c2", h.c2),
            ] {
                if let Some(v) = val {
                    if !v.is_finite() || v <= 0.0 {
                        anyhow::bail!("heterogeneity.{} must be positive (got {})", name, v);
                    }
                }
            }
            if let Some(t) = h.education_threshold {
                if !(0.0..=1.0).contains(&t) {
                    anyhow::bail!(
                        "heterogeneity.education_threshold must be in [0, 1] (got {})",
                        t
                    );
                }
            }
        }

        if let Some(ref params) = self.sensitivity {
            for p in params {
                if p.name.trim().is_empty() {
                    anyhow::bail!("sensitivity parameter names must not be empty");
                }
                if p.pct.is_nan() || p.pct <= 0.0 || p.pct > 1.0 {
                    anyhow::bail!(
                        "sensitivity.{}.pct must be in (0, 1] (got {})",
                        p.name,
                        p.pct
                    );
                }
            }
        }

        for rule in &self.overrides {
            rule.validate().context("invalid override rule")?;
        }

        Ok(())
    }

    /// Resolve config into a flat form ready for use
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let (target_tonnes, version, tolerance) = match &self.calibration {
            Some(c) => (
                c.target_tonnes.unwrap_or(DEFAULT_TARGET_TONNES),
                c.version.clone().unwrap_or_else(|| DEFAULT_TARGET_VERSION.to_string()),
                c.tolerance.unwrap_or(DEFAULT_TOLERANCE),
            ),
            None => (
                DEFAULT_TARGET_TONNES,
                DEFAULT_TARGET_VERSION.to_string(),
                DEFAULT_TOLERANCE,
            ),
        };

        let defaults = ScopeAddOns::default();
        let add_ons = match &self.scope {
            Some(s) => ScopeAddOns {
                waste_rate: s.waste_rate.unwrap_or(defaults.waste_rate),
                retail_rate: s.retail_rate.unwrap_or(defaults.retail_rate),
            },
            None => defaults,
        };

        let defaults = HeterogeneityParams::default();
        let heterogeneity = match &self.heterogeneity {
            Some(h) => HeterogeneityParams {
                national_avg_income: h.national_avg_income.unwrap_or(defaults.national_avg_income),
                c1: h.c1.unwrap_or(defaults.c1),
                c2: h.c2.unwrap_or(defaults.c2),
                education_threshold: h.education_threshold.unwrap_or(defaults.education_threshold),
            },
            None => defaults,
        };

        Ok(ResolvedConfig {
            population: self.population.unwrap_or(DEFAULT_POPULATION),
            baseline_diet: self
                .baseline_diet
                .clone()
                .unwrap_or_else(|| DEFAULT_BASELINE_DIET.to_string()),
            goal_diets: self
                .goal_diets
                .clone()
                .unwrap_or_else(|| DEFAULT_GOAL_DIETS.iter().map(|s| s.to_string()).collect()),
            target: CalibrationTarget::new(target_tonnes, version),
            tolerance,
            add_ons,
            heterogeneity,
            sensitivity: self
                .sensitivity
                .clone()
                .unwrap_or_else(sensitivity::default_parameters),
            overrides: self.overrides.clone(),
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        DietscopeConfig::default().resolve()
    }
}

/// Discover and load a config file from the project root
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(project_root: &Path) -> Result<Option<(DietscopeConfig, PathBuf)>> {
    for name in [".dietscoperc.json", "dietscope.config.json"] {
        let path = project_root.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<DietscopeConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: DietscopeConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config for a project
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config from the project root.
/// Returns default config if nothing is found.
pub fn load_and_resolve(project_root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = if let Some(path) = config_path {
        let config = load_config_file(path)?;
        (config, Some(path.to_path_buf()))
    } else {
        match discover_config(project_root)? {
            Some((config, path)) => (config, Some(path)),
            None => (DietscopeConfig::default(), None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}
