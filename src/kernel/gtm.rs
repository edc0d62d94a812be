//! Go-to-market unit economics
//!
//! Every metric is optional: a zero (or non-positive) denominator yields
//! `None` for that metric only. `gtm_kpis` never fails.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

const HUNDRED: Decimal = dec!(100);

/// Period inputs for the KPI calculation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GtmInputs {
    #[serde(default)]
    pub marketing_spend: Decimal,
    #[serde(default)]
    pub sales_spend: Decimal,
    #[serde(default)]
    pub new_customers: Decimal,
    /// Average monthly revenue per account
    #[serde(default)]
    pub arpa: Decimal,
    /// Gross margin in percent, e.g. 75 for 75%
    #[serde(default)]
    pub gross_margin_pct: Decimal,
    /// Monthly logo churn in percent, e.g. 2 for 2%
    #[serde(default)]
    pub monthly_churn_pct: Decimal,
    /// ARR at the end of the period
    #[serde(default)]
    pub arr_current: Decimal,
    /// ARR at the end of the previous period
    #[serde(default)]
    pub arr_previous: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GtmKpis {
    pub cac: Option<Decimal>,
    pub ltv: Option<Decimal>,
    pub ltv_to_cac: Option<Decimal>,
    pub cac_payback_months: Option<Decimal>,
    pub magic_number: Option<Decimal>,
    pub sales_efficiency: Option<Decimal>,
}

fn ratio(numerator: Decimal, denominator: Decimal) -> Option<Decimal> {
    if denominator <= Decimal::ZERO {
        return None;
    }
    numerator.checked_div(denominator)
}

pub fn gtm_kpis(inputs: &GtmInputs) -> GtmKpis {
    let spend = inputs.marketing_spend + inputs.sales_spend;
    let arr_delta = inputs.arr_current - inputs.arr_previous;

    let cac = ratio(spend, inputs.new_customers);

    // Monthly gross profit per account
    let margin_per_account = inputs.arpa * inputs.gross_margin_pct / HUNDRED;
    let ltv = if inputs.gross_margin_pct > Decimal::ZERO && inputs.monthly_churn_pct > Decimal::ZERO {
        ratio(margin_per_account, inputs.monthly_churn_pct / HUNDRED)
    } else {
        None
    };

    let ltv_to_cac = match (ltv, cac) {
        (Some(ltv), Some(cac)) => ratio(ltv, cac),
        _ => None,
    };
    let cac_payback_months = cac.and_then(|cac| ratio(cac, margin_per_account));

    GtmKpis {
        cac,
        ltv,
        ltv_to_cac,
        cac_payback_months,
        magic_number: ratio(dec!(4) * arr_delta, spend),
        sales_efficiency: ratio(arr_delta, spend),
    }
}
