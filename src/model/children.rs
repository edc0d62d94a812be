//! Entities attached to a valuation: scenarios, comparables and precedents

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::OrgId;

fn default_weight() -> Decimal { Decimal::ONE }

/// A named counterfactual snapshot of a valuation.
///
/// Assumptions are opaque; the caller supplies the resulting EV/equity if it
/// wants them aggregated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub id: Uuid,
    pub valuation_id: Uuid,
    pub organization_id: OrgId,
    pub name: String,
    pub description: Option<String>,
    pub assumptions: BTreeMap<String, serde_json::Value>,
    pub enterprise_value: Option<Decimal>,
    pub equity_value: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewScenario {
    pub organization_id: OrgId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub assumptions: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub enterprise_value: Option<Decimal>,
    #[serde(default)]
    pub equity_value: Option<Decimal>,
}

impl Scenario {
    pub fn from_new(valuation_id: Uuid, new: NewScenario) -> Self {
        Self {
            id: Uuid::new_v4(),
            valuation_id,
            organization_id: new.organization_id,
            name: new.name,
            description: new.description,
            assumptions: new.assumptions,
            enterprise_value: new.enterprise_value,
            equity_value: new.equity_value,
            created_at: Utc::now(),
        }
    }
}

/// A trading comparable with a single snapshot of its multiples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparableCompany {
    pub id: Uuid,
    pub valuation_id: Uuid,
    pub organization_id: OrgId,
    pub company_name: String,
    pub ev_revenue_multiple: Option<Decimal>,
    pub ev_ebitda_multiple: Option<Decimal>,
    pub pe_ratio: Option<Decimal>,
    /// Relative weight in weighted averages; always > 0
    pub weight: Decimal,
    /// Outliers are excluded from every statistic
    pub is_outlier: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComparable {
    pub organization_id: OrgId,
    pub company_name: String,
    #[serde(default)]
    pub ev_revenue_multiple: Option<Decimal>,
    #[serde(default)]
    pub ev_ebitda_multiple: Option<Decimal>,
    #[serde(default)]
    pub pe_ratio: Option<Decimal>,
    #[serde(default = "default_weight")]
    pub weight: Decimal,
    #[serde(default)]
    pub is_outlier: bool,
}

impl ComparableCompany {
    pub fn from_new(valuation_id: Uuid, new: NewComparable) -> Self {
        Self {
            id: Uuid::new_v4(),
            valuation_id,
            organization_id: new.organization_id,
            company_name: new.company_name,
            ev_revenue_multiple: new.ev_revenue_multiple,
            ev_ebitda_multiple: new.ev_ebitda_multiple,
            pe_ratio: new.pe_ratio,
            weight: new.weight,
            is_outlier: new.is_outlier,
        }
    }

    /// No multiples at all: contributes to nothing
    pub fn is_inert(&self) -> bool {
        self.ev_revenue_multiple.is_none() && self.ev_ebitda_multiple.is_none() && self.pe_ratio.is_none()
    }
}

/// A precedent M&A transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecedentTransaction {
    pub id: Uuid,
    pub valuation_id: Uuid,
    pub organization_id: OrgId,
    pub target_company: String,
    pub acquirer_company: String,
    pub ev_ebitda_multiple: Option<Decimal>,
    pub weight: Decimal,
    pub announcement_date: Option<NaiveDate>,
    pub close_date: Option<NaiveDate>,
    /// Recomputed on every precedents summary
    pub is_stale: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrecedent {
    pub organization_id: OrgId,
    pub target_company: String,
    pub acquirer_company: String,
    #[serde(default)]
    pub ev_ebitda_multiple: Option<Decimal>,
    #[serde(default = "default_weight")]
    pub weight: Decimal,
    #[serde(default)]
    pub announcement_date: Option<NaiveDate>,
    #[serde(default)]
    pub close_date: Option<NaiveDate>,
}

impl PrecedentTransaction {
    pub fn from_new(valuation_id: Uuid, new: NewPrecedent, today: NaiveDate, staleness_days: i64) -> Self {
        let mut precedent = Self {
            id: Uuid::new_v4(),
            valuation_id,
            organization_id: new.organization_id,
            target_company: new.target_company,
            acquirer_company: new.acquirer_company,
            ev_ebitda_multiple: new.ev_ebitda_multiple,
            weight: new.weight,
            announcement_date: new.announcement_date,
            close_date: new.close_date,
            is_stale: false,
        };
        precedent.is_stale = precedent.compute_stale(today, staleness_days);
        precedent
    }

    /// Announcement date, falling back to the close date
    pub fn reference_date(&self) -> Option<NaiveDate> {
        self.announcement_date.or(self.close_date)
    }

    /// Stale when the reference date is older than `staleness_days` before
    /// `current_date`. Undated transactions are never stale, nor are any
    /// when the cutoff falls outside the representable calendar.
    pub fn compute_stale(&self, current_date: NaiveDate, staleness_days: i64) -> bool {
        let cutoff = Duration::try_days(staleness_days)
            .and_then(|window| current_date.checked_sub_signed(window));
        match (self.reference_date(), cutoff) {
            (Some(date), Some(cutoff)) => date < cutoff,
            _ => false,
        }
    }
}
