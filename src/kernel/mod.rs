//! Numeric kernel: DCF, terminal values, sensitivity, Monte Carlo, GTM KPIs
//!
//! Pure functions over `Decimal`. Doubles coming from the API layer are
//! converted once with [`to_decimal`]; nothing below this module touches
//! floating point except the Monte Carlo shock sampler.

mod dcf;
mod gtm;
mod monte_carlo;
pub mod stats;

pub use dcf::{
    compound_factor, enterprise_value, present_value, sensitivity_matrix, terminal_value_exit_multiple,
    terminal_value_gordon, SensitivityMatrix,
};
pub use gtm::{gtm_kpis, GtmInputs, GtmKpis};
pub use monte_carlo::{monte_carlo, monte_carlo_with, MonteCarloParams, MonteCarloResult, DEFAULT_SHOCK_SIGMA};

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

use crate::error::{Result, ValuationError};

/// Convert an API-edge double into a decimal. NaN and infinities are rejected.
pub fn to_decimal(value: f64) -> Result<Decimal> {
    if !value.is_finite() {
        return Err(ValuationError::InvariantViolation(format!("non-finite input {value}")));
    }
    Decimal::from_f64(value).ok_or_else(|| ValuationError::NumericOverflow(format!("input {value}")))
}

pub fn to_decimals(values: &[f64]) -> Result<Vec<Decimal>> {
    values.iter().map(|v| to_decimal(*v)).collect()
}

/// Convert back to a double for display at the API edge
pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_edge_conversion() {
        assert_eq!(to_decimal(0.12).unwrap(), dec!(0.12));
        assert_eq!(to_decimal(-1500000.0).unwrap(), dec!(-1500000));
        assert!(to_decimal(f64::NAN).is_err());
        assert!(to_decimal(f64::INFINITY).is_err());
        assert_relative_eq!(to_f64(dec!(9.3333)), 9.3333, epsilon = 1e-12);
    }

    #[test]
    fn test_edge_conversion_feeds_kernel() {
        let flows = to_decimals(&[500000.0, 650000.0, 800000.0, 950000.0, 1100000.0]).unwrap();
        let pv = present_value(&flows, to_decimal(0.12).unwrap()).unwrap();
        assert_relative_eq!(to_f64(pv), 2_761_940.505_862_5, epsilon = 1e-3);
    }
}
