//! Discounted cash flow primitives
//!
//! All functions are pure and operate on `Decimal`. Discount factors are
//! built by repeated multiplication so results do not depend on a floating
//! point `powf`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValuationError};
use crate::model::TerminalMethod;

fn overflow(context: &str) -> ValuationError {
    ValuationError::NumericOverflow(context.to_string())
}

fn check_rate(rate: Decimal) -> Result<()> {
    if rate <= Decimal::ZERO {
        return Err(ValuationError::InvalidRate(rate.to_string()));
    }
    Ok(())
}

/// (1 + r)^periods
pub fn compound_factor(rate: Decimal, periods: usize) -> Result<Decimal> {
    let growth = Decimal::ONE + rate;
    let mut factor = Decimal::ONE;
    for _ in 0..periods {
        factor = factor.checked_mul(growth).ok_or_else(|| overflow("compound_factor"))?;
    }
    Ok(factor)
}

/// Σ CF_t / (1+r)^t for t = 1..n
///
/// Fails with `InvalidRate` when `rate <= 0`. An empty sequence is worth 0.
pub fn present_value(cash_flows: &[Decimal], rate: Decimal) -> Result<Decimal> {
    check_rate(rate)?;
    let growth = Decimal::ONE + rate;
    let mut factor = Decimal::ONE;
    let mut total = Decimal::ZERO;
    for cf in cash_flows {
        factor = factor.checked_mul(growth).ok_or_else(|| overflow("present_value"))?;
        let discounted = cf.checked_div(factor).ok_or_else(|| overflow("present_value"))?;
        total = total.checked_add(discounted).ok_or_else(|| overflow("present_value"))?;
    }
    Ok(total)
}

/// Gordon growth terminal value: cf_n · (1+g) / (r − g)
///
/// `growth` may be negative (a declining business). Fails with
/// `InvalidGrowth` when `rate <= growth`.
pub fn terminal_value_gordon(cf_n: Decimal, rate: Decimal, growth: Decimal) -> Result<Decimal> {
    if rate <= growth {
        return Err(ValuationError::InvalidGrowth {
            rate: rate.to_string(),
            growth: growth.to_string(),
        });
    }
    cf_n.checked_mul(Decimal::ONE + growth)
        .and_then(|next| next.checked_div(rate - growth))
        .ok_or_else(|| overflow("terminal_value_gordon"))
}

/// Exit multiple terminal value: ebitda_n · multiple. No sign restrictions.
pub fn terminal_value_exit_multiple(ebitda_n: Decimal, multiple: Decimal) -> Result<Decimal> {
    ebitda_n
        .checked_mul(multiple)
        .ok_or_else(|| overflow("terminal_value_exit_multiple"))
}

/// PV of the explicit cash flows plus the chosen terminal value discounted
/// by (1+r)^n, n = number of explicit cash flows.
///
/// A missing growth rate under `GordonGrowth` is treated as 0.
pub fn enterprise_value(
    cash_flows: &[Decimal],
    terminal_cf: Decimal,
    rate: Decimal,
    method: TerminalMethod,
    growth: Option<Decimal>,
    exit_multiple: Option<Decimal>,
) -> Result<Decimal> {
    check_rate(rate)?;
    let terminal = match method {
        TerminalMethod::GordonGrowth => {
            terminal_value_gordon(terminal_cf, rate, growth.unwrap_or(Decimal::ZERO))?
        }
        TerminalMethod::ExitMultiple => {
            let multiple = exit_multiple.ok_or(ValuationError::MissingExitMultiple)?;
            terminal_value_exit_multiple(terminal_cf, multiple)?
        }
    };
    let explicit = present_value(cash_flows, rate)?;
    let discount = compound_factor(rate, cash_flows.len())?;
    let terminal_pv = terminal
        .checked_div(discount)
        .ok_or_else(|| overflow("enterprise_value"))?;
    explicit
        .checked_add(terminal_pv)
        .ok_or_else(|| overflow("enterprise_value"))
}

/// WACC x growth grid of enterprise values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityMatrix {
    pub wacc_values: Vec<Decimal>,
    pub growth_values: Vec<Decimal>,
    /// `cells[i][j]` for `wacc_values[i]`, `growth_values[j]`; None where the
    /// Gordon model is undefined (wacc <= growth)
    pub cells: Vec<Vec<Option<Decimal>>>,
}

/// Cell (i, j) = base_ev + TV_gordon(terminal_cf, wacc_i, growth_j) − terminal_cf
///
/// Non-increasing down each column and non-decreasing along each row for a
/// positive terminal cash flow.
pub fn sensitivity_matrix(
    base_ev: Decimal,
    wacc_values: &[Decimal],
    growth_values: &[Decimal],
    terminal_cf: Decimal,
) -> SensitivityMatrix {
    let cells = wacc_values
        .iter()
        .map(|&wacc| {
            growth_values
                .iter()
                .map(|&growth| {
                    terminal_value_gordon(terminal_cf, wacc, growth)
                        .ok()
                        .and_then(|tv| base_ev.checked_add(tv))
                        .and_then(|v| v.checked_sub(terminal_cf))
                })
                .collect()
        })
        .collect();

    SensitivityMatrix {
        wacc_values: wacc_values.to_vec(),
        growth_values: growth_values.to_vec(),
        cells,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn baseline_flows() -> Vec<Decimal> {
        vec![dec!(500000), dec!(650000), dec!(800000), dec!(950000), dec!(1100000)]
    }

    #[test]
    fn test_present_value_baseline() {
        let pv = present_value(&baseline_flows(), dec!(0.12)).expect("pv");
        assert_eq!(pv.round(), dec!(2761941));
    }

    #[test]
    fn test_present_value_edges() {
        assert_eq!(present_value(&[], dec!(0.1)).unwrap(), Decimal::ZERO);
        assert!(matches!(present_value(&[dec!(1)], Decimal::ZERO), Err(ValuationError::InvalidRate(_))));
        assert!(matches!(present_value(&[dec!(1)], dec!(-0.05)), Err(ValuationError::InvalidRate(_))));

        // Negative cash flows discount like any other
        let pv = present_value(&[dec!(-110)], dec!(0.10)).unwrap();
        assert_eq!(pv, dec!(-100));
    }

    #[test]
    fn test_gordon_terminal() {
        let tv = terminal_value_gordon(dec!(1200000), dec!(0.12), dec!(0.03)).expect("tv");
        assert_eq!(tv.round(), dec!(13733333));

        // Declining business
        let tv = terminal_value_gordon(dec!(100), dec!(0.10), dec!(-0.02)).unwrap();
        assert_eq!(tv, dec!(98) / dec!(0.12));

        assert!(matches!(
            terminal_value_gordon(dec!(100), dec!(0.03), dec!(0.05)),
            Err(ValuationError::InvalidGrowth { .. })
        ));
        assert!(matches!(
            terminal_value_gordon(dec!(100), dec!(0.05), dec!(0.05)),
            Err(ValuationError::InvalidGrowth { .. })
        ));
    }

    #[test]
    fn test_exit_multiple_terminal() {
        let tv = terminal_value_exit_multiple(dec!(1500000), dec!(8.5)).unwrap();
        assert_eq!(tv, dec!(12750000));
        let tv = terminal_value_exit_multiple(dec!(-200), dec!(5)).unwrap();
        assert_eq!(tv, dec!(-1000));
    }

    #[test]
    fn test_full_dcf_with_gordon() {
        let ev = enterprise_value(
            &baseline_flows(),
            dec!(1200000),
            dec!(0.12),
            TerminalMethod::GordonGrowth,
            Some(dec!(0.03)),
            None,
        )
        .expect("ev");
        assert!(ev > dec!(10500000) && ev < dec!(10600000), "ev = {ev}");
    }

    #[test]
    fn test_empty_flows_terminal_only() {
        let ev = enterprise_value(
            &[],
            dec!(1200000),
            dec!(0.12),
            TerminalMethod::GordonGrowth,
            Some(dec!(0.03)),
            None,
        )
        .unwrap();
        let tv = terminal_value_gordon(dec!(1200000), dec!(0.12), dec!(0.03)).unwrap();
        assert_eq!(ev, tv);
    }

    #[test]
    fn test_exit_multiple_dispatch() {
        let missing = enterprise_value(&[], dec!(100), dec!(0.1), TerminalMethod::ExitMultiple, None, None);
        assert!(matches!(missing, Err(ValuationError::MissingExitMultiple)));

        let ev = enterprise_value(
            &[dec!(110)],
            dec!(10),
            dec!(0.10),
            TerminalMethod::ExitMultiple,
            None,
            Some(dec!(11)),
        )
        .unwrap();
        // 110/1.1 + 110/1.1
        assert_eq!(ev, dec!(200));
    }

    #[test]
    fn test_enterprise_value_rejects_zero_rate_on_empty_flows() {
        let result = enterprise_value(&[], dec!(100), Decimal::ZERO, TerminalMethod::ExitMultiple, None, Some(dec!(5)));
        assert!(matches!(result, Err(ValuationError::InvalidRate(_))));
    }

    #[test]
    fn test_sensitivity_monotone() {
        let waccs = [dec!(0.08), dec!(0.10), dec!(0.12), dec!(0.14)];
        let growths = [dec!(0.01), dec!(0.02), dec!(0.03)];
        let matrix = sensitivity_matrix(dec!(10000000), &waccs, &growths, dec!(1200000));

        assert_eq!(matrix.cells.len(), 4);
        assert!(matrix.cells.iter().all(|row| row.len() == 3));

        for j in 0..growths.len() {
            for i in 1..waccs.len() {
                let above = matrix.cells[i - 1][j].unwrap();
                let below = matrix.cells[i][j].unwrap();
                assert!(below <= above);
            }
        }
        for row in &matrix.cells {
            for j in 1..growths.len() {
                assert!(row[j].unwrap() >= row[j - 1].unwrap());
            }
        }
    }

    #[test]
    fn test_sensitivity_undefined_cells() {
        let matrix = sensitivity_matrix(dec!(1000), &[dec!(0.03)], &[dec!(0.02), dec!(0.03), dec!(0.04)], dec!(100));
        assert!(matrix.cells[0][0].is_some());
        assert!(matrix.cells[0][1].is_none());
        assert!(matrix.cells[0][2].is_none());
    }
}
