//! Valuation aggregate root: inputs, derived metrics and partial updates

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::{DealId, OrgId, UserId};

/// How value beyond the explicit forecast window is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TerminalMethod {
    #[default]
    GordonGrowth,
    ExitMultiple,
}

/// User-supplied DCF inputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationInputs {
    /// Explicit forecast horizon in years
    pub forecast_years: u32,

    /// Discount rate (WACC) as a fraction, e.g. 0.12
    pub discount_rate: Decimal,

    #[serde(default)]
    pub terminal_method: TerminalMethod,

    /// Perpetual growth for the Gordon method; treated as 0 when absent
    #[serde(default)]
    pub terminal_growth_rate: Option<Decimal>,

    /// EBITDA multiple for the exit-multiple method
    #[serde(default)]
    pub terminal_ebitda_multiple: Option<Decimal>,

    /// Free cash flows, year 1 first. May be empty or contain negatives.
    #[serde(default)]
    pub cash_flows: Vec<Decimal>,

    /// Terminal-year cash flow (terminal EBITDA for the exit-multiple method)
    #[serde(default)]
    pub terminal_cash_flow: Decimal,

    #[serde(default)]
    pub net_debt: Decimal,

    #[serde(default)]
    pub shares_outstanding: Option<Decimal>,
}

/// Metrics recomputed from the inputs on every create and update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DerivedMetrics {
    pub enterprise_value: Decimal,
    /// enterprise_value - net_debt
    pub equity_value: Decimal,
    /// equity_value / shares_outstanding; None unless shares_outstanding > 0
    pub implied_share_price: Option<Decimal>,
}

/// A stored DCF valuation for a deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub id: Uuid,
    pub deal_id: DealId,
    pub organization_id: OrgId,
    pub created_by: UserId,
    #[serde(flatten)]
    pub inputs: ValuationInputs,
    #[serde(flatten)]
    pub metrics: DerivedMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to create a valuation. Missing `forecast_years` falls back to the
/// configured default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewValuation {
    pub deal_id: DealId,
    #[serde(default)]
    pub forecast_years: Option<u32>,
    pub discount_rate: Decimal,
    #[serde(default)]
    pub terminal_method: TerminalMethod,
    #[serde(default)]
    pub terminal_growth_rate: Option<Decimal>,
    #[serde(default)]
    pub terminal_ebitda_multiple: Option<Decimal>,
    #[serde(default)]
    pub cash_flows: Vec<Decimal>,
    #[serde(default)]
    pub terminal_cash_flow: Decimal,
    #[serde(default)]
    pub net_debt: Decimal,
    #[serde(default)]
    pub shares_outstanding: Option<Decimal>,
}

impl NewValuation {
    pub fn into_inputs(self, default_forecast_years: u32) -> (DealId, ValuationInputs) {
        let inputs = ValuationInputs {
            forecast_years: self.forecast_years.unwrap_or(default_forecast_years),
            discount_rate: self.discount_rate,
            terminal_method: self.terminal_method,
            terminal_growth_rate: self.terminal_growth_rate,
            terminal_ebitda_multiple: self.terminal_ebitda_multiple,
            cash_flows: self.cash_flows,
            terminal_cash_flow: self.terminal_cash_flow,
            net_debt: self.net_debt,
            shares_outstanding: self.shares_outstanding,
        };
        (self.deal_id, inputs)
    }
}

/// Partial update: each supplied field replaces the stored one.
///
/// Clearable optional fields use `Option<Option<_>>`: absent leaves the
/// stored value alone, `null` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValuationUpdate {
    #[serde(default)]
    pub forecast_years: Option<u32>,
    #[serde(default)]
    pub discount_rate: Option<Decimal>,
    #[serde(default)]
    pub terminal_method: Option<TerminalMethod>,
    #[serde(default, deserialize_with = "double_option")]
    pub terminal_growth_rate: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "double_option")]
    pub terminal_ebitda_multiple: Option<Option<Decimal>>,
    #[serde(default)]
    pub cash_flows: Option<Vec<Decimal>>,
    #[serde(default)]
    pub terminal_cash_flow: Option<Decimal>,
    #[serde(default)]
    pub net_debt: Option<Decimal>,
    #[serde(default, deserialize_with = "double_option")]
    pub shares_outstanding: Option<Option<Decimal>>,
}

impl ValuationUpdate {
    pub fn is_empty(&self) -> bool {
        self.forecast_years.is_none()
            && self.discount_rate.is_none()
            && self.terminal_method.is_none()
            && self.terminal_growth_rate.is_none()
            && self.terminal_ebitda_multiple.is_none()
            && self.cash_flows.is_none()
            && self.terminal_cash_flow.is_none()
            && self.net_debt.is_none()
            && self.shares_outstanding.is_none()
    }

    /// Apply onto a copy of the inputs; the caller validates the result
    pub fn apply_to(&self, inputs: &ValuationInputs) -> ValuationInputs {
        let mut next = inputs.clone();
        if let Some(years) = self.forecast_years {
            next.forecast_years = years;
        }
        if let Some(rate) = self.discount_rate {
            next.discount_rate = rate;
        }
        if let Some(method) = self.terminal_method {
            next.terminal_method = method;
        }
        if let Some(growth) = self.terminal_growth_rate {
            next.terminal_growth_rate = growth;
        }
        if let Some(multiple) = self.terminal_ebitda_multiple {
            next.terminal_ebitda_multiple = multiple;
        }
        if let Some(flows) = &self.cash_flows {
            next.cash_flows = flows.clone();
        }
        if let Some(terminal) = self.terminal_cash_flow {
            next.terminal_cash_flow = terminal;
        }
        if let Some(debt) = self.net_debt {
            next.net_debt = debt;
        }
        if let Some(shares) = self.shares_outstanding {
            next.shares_outstanding = shares;
        }
        next
    }
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
