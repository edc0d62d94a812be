//! Scenario summaries, tornado diagnostics and simulation entry points

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::require_valuation;
use crate::config::EngineConfig;
use crate::error::{Result, ValuationError};
use crate::kernel::stats::{value_range, ValueRange};
use crate::kernel::{monte_carlo_with, sensitivity_matrix, MonteCarloParams, MonteCarloResult, SensitivityMatrix};
use crate::model::Scenario;
use crate::store::ValuationStore;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub count: usize,
    pub enterprise_value_range: Option<ValueRange>,
    pub equity_value_range: Option<ValueRange>,
}

/// One sensitivity input for the tornado diagnostic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TornadoItem {
    pub metric: String,
    #[serde(default)]
    pub base_value: Option<Decimal>,
    #[serde(default)]
    pub scenario_value: Option<Decimal>,
    #[serde(default)]
    pub enterprise_value: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TornadoBar {
    pub metric: String,
    pub base_value: Option<Decimal>,
    pub scenario_value: Option<Decimal>,
    pub enterprise_value: Decimal,
    /// |enterprise_value - base_ev|
    pub delta: Decimal,
}

/// Count plus EV/equity ranges; scenarios without a value drop out of that range only
pub fn summarize_scenarios(scenarios: &[Scenario]) -> ScenarioSummary {
    let evs: Vec<Decimal> = scenarios.iter().filter_map(|s| s.enterprise_value).collect();
    let equities: Vec<Decimal> = scenarios.iter().filter_map(|s| s.equity_value).collect();
    ScenarioSummary {
        count: scenarios.len(),
        enterprise_value_range: value_range(&evs),
        equity_value_range: value_range(&equities),
    }
}

/// Rank metrics by how far their scenario EV moves from `base_ev`.
/// Ties keep input order.
pub fn tornado(base_ev: Decimal, items: &[TornadoItem], top_n: usize) -> Vec<TornadoBar> {
    let mut bars: Vec<TornadoBar> = items
        .iter()
        .filter_map(|item| {
            let ev = item.enterprise_value?;
            Some(TornadoBar {
                metric: item.metric.clone(),
                base_value: item.base_value,
                scenario_value: item.scenario_value,
                enterprise_value: ev,
                delta: (ev - base_ev).abs(),
            })
        })
        .collect();
    bars.sort_by(|a, b| b.delta.cmp(&a.delta));
    bars.truncate(top_n);
    bars
}

/// Store-backed scenario and simulation operations
pub struct ScenarioCoordinator {
    store: Arc<dyn ValuationStore>,
    config: EngineConfig,
}

impl ScenarioCoordinator {
    pub fn new(store: Arc<dyn ValuationStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn scenario_summary(&self, valuation_id: Uuid, organization_id: &str) -> Result<ScenarioSummary> {
        let tx = self.store.begin()?;
        require_valuation(&*tx, valuation_id, organization_id)?;
        let scenarios = tx.list_scenarios(valuation_id, organization_id)?;
        Ok(summarize_scenarios(&scenarios))
    }

    /// Tornado against the valuation's stored EV; `top_n` defaults to the
    /// configured value
    pub fn tornado_for_valuation(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        items: &[TornadoItem],
        top_n: Option<usize>,
    ) -> Result<Vec<TornadoBar>> {
        let tx = self.store.begin()?;
        let valuation = require_valuation(&*tx, valuation_id, organization_id)?;
        Ok(tornado(
            valuation.metrics.enterprise_value,
            items,
            top_n.unwrap_or(self.config.tornado_top_n),
        ))
    }

    /// Simulate the valuation's current cash flows. A missing terminal
    /// growth rate falls back to the configured default.
    pub fn monte_carlo_for_valuation(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        iterations: usize,
        seed: u64,
    ) -> Result<MonteCarloResult> {
        if iterations == 0 {
            return Err(ValuationError::InvalidIterations(
                "iterations must be greater than 0".to_string(),
            ));
        }
        if iterations > self.config.monte_carlo_max_iterations {
            return Err(ValuationError::InvalidIterations(format!(
                "{iterations} exceeds the limit of {}",
                self.config.monte_carlo_max_iterations
            )));
        }

        let valuation = {
            let tx = self.store.begin()?;
            require_valuation(&*tx, valuation_id, organization_id)?
        };
        let inputs = &valuation.inputs;
        let growth = inputs
            .terminal_growth_rate
            .unwrap_or(self.config.monte_carlo_default_growth);
        let params = MonteCarloParams {
            iterations,
            seed,
            shock_sigma: self.config.monte_carlo_shock_sigma,
            clip_shocks: self.config.monte_carlo_clip_shocks,
        };

        log::info!("monte carlo for valuation {valuation_id}: {iterations} trials, seed {seed}");
        monte_carlo_with(&inputs.cash_flows, inputs.discount_rate, growth, &params)
    }

    /// WACC x growth grid around the stored EV and terminal cash flow
    pub fn sensitivity_for_valuation(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        wacc_values: &[Decimal],
        growth_values: &[Decimal],
    ) -> Result<SensitivityMatrix> {
        let tx = self.store.begin()?;
        let valuation = require_valuation(&*tx, valuation_id, organization_id)?;
        Ok(sensitivity_matrix(
            valuation.metrics.enterprise_value,
            wacc_values,
            growth_values,
            valuation.inputs.terminal_cash_flow,
        ))
    }
}
