//! Seeded Monte Carlo simulation of enterprise value
//!
//! Each trial applies an independent multiplicative shock `1 + N(0, σ)` to
//! every forecast year, derives the terminal cash flow from the last sampled
//! year, and values the path with the Gordon growth model.
//!
//! All shocks are drawn up front from one `StdRng` seeded per call, in
//! trial-major order. Trials are then valued in parallel with an
//! order-preserving collect, so the output only depends on the inputs and
//! the seed.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::dcf::enterprise_value;
use super::stats::{mean, percentile_of_sorted};
use crate::error::{Result, ValuationError};
use crate::model::TerminalMethod;

/// Default per-year shock standard deviation
pub const DEFAULT_SHOCK_SIGMA: Decimal = dec!(0.05);

/// Sampler settings beyond the base inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloParams {
    pub iterations: usize,
    pub seed: u64,
    pub shock_sigma: Decimal,
    /// Floor each sampled multiplier at 0
    pub clip_shocks: bool,
}

impl MonteCarloParams {
    pub fn new(iterations: usize, seed: u64) -> Self {
        Self {
            iterations,
            seed,
            shock_sigma: DEFAULT_SHOCK_SIGMA,
            clip_shocks: false,
        }
    }
}

/// Distribution summary of simulated enterprise values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub iterations: usize,
    pub seed: u64,
    pub mean: Decimal,
    pub p10: Decimal,
    pub p50: Decimal,
    pub p90: Decimal,
    pub min: Decimal,
    pub max: Decimal,
}

/// Simulate with the default shock (σ = 0.05, unclipped)
pub fn monte_carlo(
    base_cash_flows: &[Decimal],
    rate: Decimal,
    growth: Decimal,
    iterations: usize,
    seed: u64,
) -> Result<MonteCarloResult> {
    monte_carlo_with(base_cash_flows, rate, growth, &MonteCarloParams::new(iterations, seed))
}

pub fn monte_carlo_with(
    base_cash_flows: &[Decimal],
    rate: Decimal,
    growth: Decimal,
    params: &MonteCarloParams,
) -> Result<MonteCarloResult> {
    if params.iterations == 0 {
        return Err(ValuationError::InvalidIterations(
            "iterations must be greater than 0".to_string(),
        ));
    }
    if rate <= Decimal::ZERO {
        return Err(ValuationError::InvalidRate(rate.to_string()));
    }
    if rate <= growth {
        return Err(ValuationError::InvalidGrowth {
            rate: rate.to_string(),
            growth: growth.to_string(),
        });
    }

    let multipliers = draw_multipliers(base_cash_flows.len(), params)?;
    let terminal_growth = Decimal::ONE + growth;

    let mut values = multipliers
        .par_iter()
        .map(|trial| {
            let sampled: Vec<Decimal> = base_cash_flows
                .iter()
                .zip(trial)
                .map(|(cf, m)| *cf * *m)
                .collect();
            let terminal_cf = sampled.last().map_or(Decimal::ZERO, |last| *last * terminal_growth);
            enterprise_value(&sampled, terminal_cf, rate, TerminalMethod::GordonGrowth, Some(growth), None)
        })
        .collect::<Result<Vec<Decimal>>>()?;

    values.sort();
    let summary = summarize(&values, params)?;
    log::debug!(
        "monte carlo: {} trials, seed {}, p10 {} p50 {} p90 {}",
        summary.iterations,
        summary.seed,
        summary.p10,
        summary.p50,
        summary.p90
    );
    Ok(summary)
}

fn draw_multipliers(years: usize, params: &MonteCarloParams) -> Result<Vec<Vec<Decimal>>> {
    let sigma = params
        .shock_sigma
        .to_f64()
        .ok_or_else(|| ValuationError::InvalidConfig("shock sigma out of range".to_string()))?;
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| ValuationError::InvalidConfig(format!("shock sigma {sigma}: {e}")))?;
    let mut rng = StdRng::seed_from_u64(params.seed);

    let mut trials = Vec::with_capacity(params.iterations);
    for _ in 0..params.iterations {
        let mut trial = Vec::with_capacity(years);
        for _ in 0..years {
            let mut multiplier = 1.0 + normal.sample(&mut rng);
            if params.clip_shocks {
                multiplier = multiplier.max(0.0);
            }
            let multiplier = Decimal::from_f64(multiplier).ok_or_else(|| {
                ValuationError::NumericOverflow(format!("shock multiplier {multiplier}"))
            })?;
            trial.push(multiplier);
        }
        trials.push(trial);
    }
    Ok(trials)
}

fn summarize(sorted: &[Decimal], params: &MonteCarloParams) -> Result<MonteCarloResult> {
    let missing = || ValuationError::InvalidIterations("no simulated values".to_string());
    Ok(MonteCarloResult {
        iterations: params.iterations,
        seed: params.seed,
        mean: match mean(sorted) {
            Some(m) => m,
            None if sorted.is_empty() => return Err(missing()),
            None => return Err(ValuationError::NumericOverflow("simulated value mean".to_string())),
        },
        p10: percentile_of_sorted(sorted, dec!(0.10)).ok_or_else(missing)?,
        p50: percentile_of_sorted(sorted, dec!(0.50)).ok_or_else(missing)?,
        p90: percentile_of_sorted(sorted, dec!(0.90)).ok_or_else(missing)?,
        min: *sorted.first().ok_or_else(missing)?,
        max: *sorted.last().ok_or_else(missing)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline_flows() -> Vec<Decimal> {
        vec![dec!(500000), dec!(650000), dec!(800000), dec!(950000), dec!(1100000)]
    }

    #[test]
    fn test_determinism() {
        let a = monte_carlo(&baseline_flows(), dec!(0.12), dec!(0.03), 100, 123).expect("mc");
        let b = monte_carlo(&baseline_flows(), dec!(0.12), dec!(0.03), 100, 123).expect("mc");
        assert_eq!(a, b);
        assert_eq!(a.iterations, 100);
        assert_eq!(a.seed, 123);
        assert!(a.p90 > a.p10);
        assert!(a.mean > Decimal::ZERO);
        assert!(a.min <= a.p10 && a.p10 <= a.p50 && a.p50 <= a.p90 && a.p90 <= a.max);
    }

    #[test]
    fn test_seed_changes_output() {
        let a = monte_carlo(&baseline_flows(), dec!(0.12), dec!(0.03), 200, 1).unwrap();
        let b = monte_carlo(&baseline_flows(), dec!(0.12), dec!(0.03), 200, 2).unwrap();
        assert_ne!(a.mean, b.mean);
    }

    #[test]
    fn test_zero_sigma_matches_deterministic_dcf() {
        let params = MonteCarloParams {
            shock_sigma: Decimal::ZERO,
            ..MonteCarloParams::new(10, 7)
        };
        let result = monte_carlo_with(&baseline_flows(), dec!(0.12), dec!(0.03), &params).unwrap();
        let terminal = dec!(1100000) * dec!(1.03);
        let expected = enterprise_value(
            &baseline_flows(),
            terminal,
            dec!(0.12),
            TerminalMethod::GordonGrowth,
            Some(dec!(0.03)),
            None,
        )
        .unwrap();
        assert_eq!(result.p10, expected);
        assert_eq!(result.p90, expected);
        assert_eq!(result.mean, expected);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            monte_carlo(&baseline_flows(), dec!(0.12), dec!(0.03), 0, 1),
            Err(ValuationError::InvalidIterations(_))
        ));
        assert!(matches!(
            monte_carlo(&baseline_flows(), dec!(0.02), dec!(0.03), 10, 1),
            Err(ValuationError::InvalidGrowth { .. })
        ));
        assert!(matches!(
            monte_carlo(&baseline_flows(), Decimal::ZERO, dec!(-0.01), 10, 1),
            Err(ValuationError::InvalidRate(_))
        ));
    }

    #[test]
    fn test_empty_flows() {
        let result = monte_carlo(&[], dec!(0.1), dec!(0.02), 5, 9).unwrap();
        assert_eq!(result.mean, Decimal::ZERO);
        assert_eq!(result.p90, Decimal::ZERO);
    }

    #[test]
    fn test_clipping_keeps_positive_flows_non_negative() {
        let params = MonteCarloParams {
            shock_sigma: dec!(2.0),
            clip_shocks: true,
            ..MonteCarloParams::new(200, 42)
        };
        let result = monte_carlo_with(&baseline_flows(), dec!(0.12), dec!(0.03), &params).unwrap();
        assert!(result.min >= Decimal::ZERO);
    }
}
