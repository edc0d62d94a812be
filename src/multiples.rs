//! Multiples analyzer: trading comparables and precedent transactions
//!
//! Outliers and stale precedents never contribute to a statistic. Missing
//! data yields `None`, never an error.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::require_valuation;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::kernel::stats;
use crate::model::{ComparableCompany, PrecedentTransaction};
use crate::store::{in_transaction, ValuationStore};

/// Subject-company figures the multiples are applied to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectMetrics {
    #[serde(default)]
    pub subject_revenue: Option<Decimal>,
    #[serde(default)]
    pub subject_ebitda: Option<Decimal>,
    /// Enables implied equity values from P/E
    #[serde(default)]
    pub subject_net_income: Option<Decimal>,
}

/// Statistics of one multiple across the contributing entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultipleStats {
    pub count: usize,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub median: Option<Decimal>,
    pub weighted_average: Option<Decimal>,
}

impl MultipleStats {
    /// Build from (value, weight) pairs
    pub fn from_pairs(pairs: &[(Decimal, Decimal)], config: &EngineConfig) -> Self {
        let values: Vec<Decimal> = pairs.iter().map(|(v, _)| *v).collect();
        let range = stats::value_range(&values);
        Self {
            count: pairs.len(),
            min: range.as_ref().map(|r| r.min),
            max: range.as_ref().map(|r| r.max),
            median: range.as_ref().map(|r| config.round(r.median)),
            weighted_average: stats::weighted_average(pairs).map(|v| config.round(v)),
        }
    }
}

/// A multiple's statistics applied to a subject figure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpliedValues {
    pub min: Option<Decimal>,
    pub median: Option<Decimal>,
    pub max: Option<Decimal>,
    pub weighted_average: Option<Decimal>,
}

impl ImpliedValues {
    pub fn apply(stats: &MultipleStats, subject: Option<Decimal>, config: &EngineConfig) -> Self {
        let implied = |multiple: Option<Decimal>| {
            multiple
                .zip(subject)
                .and_then(|(m, s)| m.checked_mul(s))
                .map(|v| config.round(v))
        };
        Self {
            min: implied(stats.min),
            median: implied(stats.median),
            max: implied(stats.max),
            weighted_average: implied(stats.weighted_average),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparablesSummary {
    pub ev_revenue: MultipleStats,
    pub ev_ebitda: MultipleStats,
    pub pe_ratio: MultipleStats,
    pub implied_ev_from_revenue: ImpliedValues,
    pub implied_ev_from_ebitda: ImpliedValues,
    pub implied_equity_from_pe: ImpliedValues,
    /// Number of entries flagged `is_outlier` and left out
    pub excluded_outliers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrecedentsSummary {
    pub ev_ebitda: MultipleStats,
    pub implied_ev_from_ebitda: ImpliedValues,
    /// Entries older than the staleness window, left out of the statistics
    pub stale_count: usize,
}

fn pairs<'a, T: 'a>(
    entries: impl Iterator<Item = &'a T>,
    multiple: impl Fn(&T) -> Option<Decimal>,
    weight: impl Fn(&T) -> Decimal,
) -> Vec<(Decimal, Decimal)> {
    entries
        .filter_map(|entry| multiple(entry).map(|m| (m, weight(entry))))
        .collect()
}

pub fn summarize_comparables(
    comparables: &[ComparableCompany],
    subject: &SubjectMetrics,
    config: &EngineConfig,
) -> ComparablesSummary {
    let included: Vec<&ComparableCompany> = comparables.iter().filter(|c| !c.is_outlier).collect();
    let excluded_outliers = comparables.len() - included.len();

    let ev_revenue = MultipleStats::from_pairs(
        &pairs(included.iter().copied(), |c| c.ev_revenue_multiple, |c| c.weight),
        config,
    );
    let ev_ebitda = MultipleStats::from_pairs(
        &pairs(included.iter().copied(), |c| c.ev_ebitda_multiple, |c| c.weight),
        config,
    );
    let pe_ratio = MultipleStats::from_pairs(
        &pairs(included.iter().copied(), |c| c.pe_ratio, |c| c.weight),
        config,
    );

    ComparablesSummary {
        implied_ev_from_revenue: ImpliedValues::apply(&ev_revenue, subject.subject_revenue, config),
        implied_ev_from_ebitda: ImpliedValues::apply(&ev_ebitda, subject.subject_ebitda, config),
        implied_equity_from_pe: ImpliedValues::apply(&pe_ratio, subject.subject_net_income, config),
        ev_revenue,
        ev_ebitda,
        pe_ratio,
        excluded_outliers,
    }
}

/// Precedents whose stored `is_stale` disagrees with the recomputed flag
pub fn staleness_changes(
    precedents: &[PrecedentTransaction],
    current_date: NaiveDate,
    staleness_days: i64,
) -> Vec<(Uuid, bool)> {
    precedents
        .iter()
        .filter_map(|p| {
            let stale = p.compute_stale(current_date, staleness_days);
            (stale != p.is_stale).then_some((p.id, stale))
        })
        .collect()
}

/// Summarize precedents, recomputing staleness against `current_date`
pub fn summarize_precedents(
    precedents: &[PrecedentTransaction],
    subject_ebitda: Option<Decimal>,
    current_date: NaiveDate,
    config: &EngineConfig,
) -> PrecedentsSummary {
    let (stale, fresh): (Vec<&PrecedentTransaction>, Vec<&PrecedentTransaction>) = precedents
        .iter()
        .partition(|p| p.compute_stale(current_date, config.staleness_days));

    let ev_ebitda = MultipleStats::from_pairs(
        &pairs(fresh.iter().copied(), |p| p.ev_ebitda_multiple, |p| p.weight),
        config,
    );
    PrecedentsSummary {
        implied_ev_from_ebitda: ImpliedValues::apply(&ev_ebitda, subject_ebitda, config),
        ev_ebitda,
        stale_count: stale.len(),
    }
}

/// Store-backed entry points of the analyzer
pub struct MultiplesAnalyzer {
    store: Arc<dyn ValuationStore>,
    config: EngineConfig,
}

impl MultiplesAnalyzer {
    pub fn new(store: Arc<dyn ValuationStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn comparables_summary(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        subject: &SubjectMetrics,
    ) -> Result<ComparablesSummary> {
        let tx = self.store.begin()?;
        require_valuation(&*tx, valuation_id, organization_id)?;
        let comparables = tx.list_comparables(valuation_id, organization_id)?;
        Ok(summarize_comparables(&comparables, subject, &self.config))
    }

    /// Summarize and persist any staleness flags that changed, in one write
    pub fn precedents_summary(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        subject_ebitda: Option<Decimal>,
        current_date: NaiveDate,
    ) -> Result<PrecedentsSummary> {
        in_transaction(self.store.as_ref(), |tx| {
            require_valuation(tx, valuation_id, organization_id)?;
            let precedents = tx.list_precedents(valuation_id, organization_id)?;

            let changes = staleness_changes(&precedents, current_date, self.config.staleness_days);
            if !changes.is_empty() {
                log::info!(
                    "valuation {valuation_id}: {} precedent staleness flags changed",
                    changes.len()
                );
                tx.update_precedent_staleness(organization_id, &changes)?;
            }
            Ok(summarize_precedents(&precedents, subject_ebitda, current_date, &self.config))
        })
    }
}
