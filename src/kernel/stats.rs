//! Descriptive statistics over decimals

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Min / max / median of a set of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: Decimal,
    pub max: Decimal,
    pub median: Decimal,
}

fn sorted(values: &[Decimal]) -> Vec<Decimal> {
    let mut sorted = values.to_vec();
    sorted.sort();
    sorted
}

/// Standard median of sorted values: even counts average the two middle values
pub fn median_of_sorted(sorted: &[Decimal]) -> Option<Decimal> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    if n % 2 == 1 {
        Some(sorted[n / 2])
    } else {
        sorted[n / 2 - 1]
            .checked_add(sorted[n / 2])
            .map(|sum| sum / Decimal::TWO)
    }
}

/// Percentile with linear interpolation between nearest ranks.
///
/// `p` is a fraction in [0, 1]; rank = p · (n − 1).
pub fn percentile_of_sorted(sorted: &[Decimal], p: Decimal) -> Option<Decimal> {
    let n = sorted.len();
    if n == 0 {
        return None;
    }
    let p = p.clamp(Decimal::ZERO, Decimal::ONE);
    let rank = p * Decimal::from(n - 1);
    let lower = rank.floor();
    let fraction = rank - lower;
    let lo = lower.to_usize().unwrap_or(0).min(n - 1);
    let hi = (lo + 1).min(n - 1);
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * fraction)
}

/// Mean; None when empty or when the running total overflows
pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let total = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))?;
    total.checked_div(Decimal::from(values.len()))
}

/// Σ(v·w) / Σw over (value, weight) pairs; None when the total weight is 0
/// or either sum overflows
pub fn weighted_average(pairs: &[(Decimal, Decimal)]) -> Option<Decimal> {
    let total_weight = pairs
        .iter()
        .try_fold(Decimal::ZERO, |acc, (_, w)| acc.checked_add(*w))?;
    if total_weight.is_zero() {
        return None;
    }
    let weighted = pairs
        .iter()
        .try_fold(Decimal::ZERO, |acc, (v, w)| acc.checked_add(v.checked_mul(*w)?))?;
    weighted.checked_div(total_weight)
}

pub fn value_range(values: &[Decimal]) -> Option<ValueRange> {
    let sorted = sorted(values);
    Some(ValueRange {
        min: *sorted.first()?,
        max: *sorted.last()?,
        median: median_of_sorted(&sorted)?,
    })
}
