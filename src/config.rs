//! Engine configuration
//!
//! Every field has a serde default so a partial JSON file (or none at all)
//! yields a usable configuration. Environment variables prefixed with
//! `VALUATION_` override file values.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, ValuationError};

/// Minimum decimal places kept on persisted derived metrics
pub const MIN_PRECISION_DIGITS: u32 = 12;

/// Longest staleness window accepted, in days
pub const MAX_STALENESS_DAYS: i64 = 36_500;

/// What the export ledger does when the exporting user has been deactivated
/// by the time the rendered document is registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InactiveExporterPolicy {
    /// Register the document under the original exporter anyway
    #[default]
    KeepExporter,
    /// Register the document under the given user instead
    AttributeTo(String),
    /// Fail the export with an error message
    FailExport,
}

/// Configuration recognized by the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Decimal places retained on stored derived metrics and summary stats
    #[serde(default = "default_precision_digits")]
    pub precision_digits: u32,

    /// Age (in days) past which a precedent transaction stops contributing
    #[serde(default = "default_staleness_days")]
    pub staleness_days: i64,

    /// Terminal growth used by Monte Carlo when the valuation has none
    #[serde(default = "default_mc_growth")]
    pub monte_carlo_default_growth: Decimal,

    /// Standard deviation of the per-year multiplicative shock
    #[serde(default = "default_mc_sigma")]
    pub monte_carlo_shock_sigma: Decimal,

    /// Upper bound on Monte Carlo trials per call
    #[serde(default = "default_mc_max_iterations")]
    pub monte_carlo_max_iterations: usize,

    /// Floor sampled multipliers at zero (no sign flips on cash flows)
    #[serde(default)]
    pub monte_carlo_clip_shocks: bool,

    /// Forecast horizon used when a new valuation omits it
    #[serde(default = "default_forecast_years")]
    pub default_forecast_years: u32,

    /// Default page size for export log listings
    #[serde(default = "default_export_list_limit")]
    pub export_list_limit: usize,

    /// Lifetime of presigned download URLs
    #[serde(default = "default_presigned_ttl")]
    pub presigned_url_ttl_seconds: u64,

    /// Bars kept by the tornado diagnostic
    #[serde(default = "default_tornado_top_n")]
    pub tornado_top_n: usize,

    #[serde(default)]
    pub inactive_exporter_policy: InactiveExporterPolicy,
}

fn default_precision_digits() -> u32 { MIN_PRECISION_DIGITS }
fn default_staleness_days() -> i64 { 365 }
fn default_mc_growth() -> Decimal { dec!(0.02) }
fn default_mc_sigma() -> Decimal { dec!(0.05) }
fn default_mc_max_iterations() -> usize { 100_000 }
fn default_forecast_years() -> u32 { 5 }
fn default_export_list_limit() -> usize { 20 }
fn default_presigned_ttl() -> u64 { 3600 }
fn default_tornado_top_n() -> usize { 5 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            precision_digits: default_precision_digits(),
            staleness_days: default_staleness_days(),
            monte_carlo_default_growth: default_mc_growth(),
            monte_carlo_shock_sigma: default_mc_sigma(),
            monte_carlo_max_iterations: default_mc_max_iterations(),
            monte_carlo_clip_shocks: false,
            default_forecast_years: default_forecast_years(),
            export_list_limit: default_export_list_limit(),
            presigned_url_ttl_seconds: default_presigned_ttl(),
            tornado_top_n: default_tornado_top_n(),
            inactive_exporter_policy: InactiveExporterPolicy::KeepExporter,
        }
    }
}

impl EngineConfig {
    /// Load from an optional JSON file, apply `VALUATION_*` environment
    /// overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    ValuationError::InvalidConfig(format!("{}: {e}", path.display()))
                })?;
                serde_json::from_str(&raw)
                    .map_err(|e| ValuationError::InvalidConfig(format!("{}: {e}", path.display())))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        log::debug!("engine config loaded: {config:?}");
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VALUATION_PRECISION_DIGITS") {
            self.precision_digits = parse_override("VALUATION_PRECISION_DIGITS", &v)?;
        }
        if let Some(v) = lookup("VALUATION_STALENESS_DAYS") {
            self.staleness_days = parse_override("VALUATION_STALENESS_DAYS", &v)?;
        }
        if let Some(v) = lookup("VALUATION_MC_DEFAULT_GROWTH") {
            self.monte_carlo_default_growth = parse_override("VALUATION_MC_DEFAULT_GROWTH", &v)?;
        }
        if let Some(v) = lookup("VALUATION_MC_SHOCK_SIGMA") {
            self.monte_carlo_shock_sigma = parse_override("VALUATION_MC_SHOCK_SIGMA", &v)?;
        }
        if let Some(v) = lookup("VALUATION_MC_MAX_ITERATIONS") {
            self.monte_carlo_max_iterations = parse_override("VALUATION_MC_MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = lookup("VALUATION_MC_CLIP_SHOCKS") {
            self.monte_carlo_clip_shocks = parse_override("VALUATION_MC_CLIP_SHOCKS", &v)?;
        }
        if let Some(v) = lookup("VALUATION_DEFAULT_FORECAST_YEARS") {
            self.default_forecast_years = parse_override("VALUATION_DEFAULT_FORECAST_YEARS", &v)?;
        }
        if let Some(v) = lookup("VALUATION_EXPORT_LIST_LIMIT") {
            self.export_list_limit = parse_override("VALUATION_EXPORT_LIST_LIMIT", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.precision_digits < MIN_PRECISION_DIGITS || self.precision_digits > 28 {
            return Err(ValuationError::InvalidConfig(format!(
                "precision_digits must be in [{MIN_PRECISION_DIGITS}, 28], got {}",
                self.precision_digits
            )));
        }
        if self.staleness_days <= 0 || self.staleness_days > MAX_STALENESS_DAYS {
            return Err(ValuationError::InvalidConfig(format!(
                "staleness_days must be in [1, {MAX_STALENESS_DAYS}], got {}",
                self.staleness_days
            )));
        }
        if self.monte_carlo_shock_sigma < Decimal::ZERO {
            return Err(ValuationError::InvalidConfig(
                "monte_carlo_shock_sigma must be non-negative".to_string(),
            ));
        }
        if self.monte_carlo_max_iterations == 0 {
            return Err(ValuationError::InvalidConfig(
                "monte_carlo_max_iterations must be positive".to_string(),
            ));
        }
        if self.default_forecast_years == 0 {
            return Err(ValuationError::InvalidConfig(
                "default_forecast_years must be positive".to_string(),
            ));
        }
        if self.export_list_limit == 0 {
            return Err(ValuationError::InvalidConfig(
                "export_list_limit must be positive".to_string(),
            ));
        }
        if let InactiveExporterPolicy::AttributeTo(user) = &self.inactive_exporter_policy {
            if user.trim().is_empty() {
                return Err(ValuationError::InvalidConfig(
                    "attribute_to requires a user id".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Round a derived value to the configured precision
    pub fn round(&self, value: Decimal) -> Decimal {
        value.round_dp(self.precision_digits)
    }
}

fn parse_override<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ValuationError::InvalidConfig(format!("{key}: cannot parse {raw:?}")))
}
