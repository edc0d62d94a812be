//! Valuation aggregate: create/update/delete with invariant checks and
//! explicit recomputation of derived metrics
//!
//! Every accessor takes `(id, organization_id)`. Rows owned by another
//! tenant surface as not-found.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Result, ValuationError};
use crate::kernel;
use crate::model::{
    Actor, ComparableCompany, DerivedMetrics, NewComparable, NewPrecedent, NewScenario, NewValuation,
    PrecedentTransaction, Scenario, TerminalMethod, Valuation, ValuationInputs, ValuationUpdate,
};
use crate::store::{in_transaction, StoreTx, ValuationStore};

/// Check I1-I3 plus the structural input constraints
pub fn validate_inputs(inputs: &ValuationInputs) -> Result<()> {
    if inputs.forecast_years == 0 {
        return Err(ValuationError::InvariantViolation(
            "forecast_years must be positive".to_string(),
        ));
    }
    if inputs.discount_rate <= Decimal::ZERO {
        return Err(ValuationError::InvalidRate(inputs.discount_rate.to_string()));
    }
    match inputs.terminal_method {
        TerminalMethod::GordonGrowth => {
            let growth = inputs.terminal_growth_rate.unwrap_or(Decimal::ZERO);
            if inputs.discount_rate <= growth {
                return Err(ValuationError::InvalidGrowth {
                    rate: inputs.discount_rate.to_string(),
                    growth: growth.to_string(),
                });
            }
        }
        TerminalMethod::ExitMultiple => {
            if inputs.terminal_ebitda_multiple.is_none() {
                return Err(ValuationError::MissingExitMultiple);
            }
        }
    }
    if inputs.shares_outstanding.is_some_and(|s| s < Decimal::ZERO) {
        return Err(ValuationError::InvariantViolation(
            "shares_outstanding must be non-negative".to_string(),
        ));
    }
    Ok(())
}

/// Validate the inputs and compute EV, equity value and implied share price
pub fn derive_metrics(inputs: &ValuationInputs, config: &EngineConfig) -> Result<DerivedMetrics> {
    validate_inputs(inputs)?;
    let enterprise_value = config.round(kernel::enterprise_value(
        &inputs.cash_flows,
        inputs.terminal_cash_flow,
        inputs.discount_rate,
        inputs.terminal_method,
        inputs.terminal_growth_rate,
        inputs.terminal_ebitda_multiple,
    )?);
    let equity_value = enterprise_value
        .checked_sub(inputs.net_debt)
        .ok_or_else(|| ValuationError::NumericOverflow("equity value".to_string()))?;
    let implied_share_price = inputs
        .shares_outstanding
        .filter(|shares| *shares > Decimal::ZERO)
        .and_then(|shares| equity_value.checked_div(shares))
        .map(|price| config.round(price));

    Ok(DerivedMetrics {
        enterprise_value,
        equity_value,
        implied_share_price,
    })
}

fn require_positive_weight(weight: Decimal, what: &str) -> Result<()> {
    if weight <= Decimal::ZERO {
        return Err(ValuationError::InvariantViolation(format!(
            "{what} weight must be positive, got {weight}"
        )));
    }
    Ok(())
}

fn require_name(name: &str, what: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ValuationError::InvariantViolation(format!("{what} must not be empty")));
    }
    Ok(())
}

/// Load the parent valuation inside a transaction and check that the child
/// being attached carries the same tenant
fn parent_for_child(
    tx: &dyn StoreTx,
    valuation_id: Uuid,
    organization_id: &str,
    child_org: &str,
) -> Result<Valuation> {
    let valuation = tx
        .get_valuation(valuation_id, organization_id)?
        .ok_or_else(|| ValuationError::ValuationNotFound(valuation_id.to_string()))?;
    if child_org != valuation.organization_id {
        return Err(ValuationError::CrossTenantViolation(format!(
            "child organization {child_org} does not own valuation {valuation_id}"
        )));
    }
    Ok(valuation)
}

/// CRUD over valuations and their attached children
pub struct ValuationService {
    store: Arc<dyn ValuationStore>,
    config: EngineConfig,
}

impl ValuationService {
    pub fn new(store: Arc<dyn ValuationStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn create(&self, actor: &Actor, new: NewValuation) -> Result<Valuation> {
        let (deal_id, inputs) = new.into_inputs(self.config.default_forecast_years);
        let metrics = derive_metrics(&inputs, &self.config)?;
        let now = Utc::now();
        let valuation = Valuation {
            id: Uuid::new_v4(),
            deal_id,
            organization_id: actor.organization_id.clone(),
            created_by: actor.user_id.clone(),
            inputs,
            metrics,
            created_at: now,
            updated_at: now,
        };

        in_transaction(self.store.as_ref(), |tx| tx.insert_valuation(&valuation))?;
        log::info!(
            "created valuation {} for deal {} (org {}), EV {}",
            valuation.id,
            valuation.deal_id,
            valuation.organization_id,
            valuation.metrics.enterprise_value
        );
        Ok(valuation)
    }

    pub fn get(&self, id: Uuid, organization_id: &str) -> Result<Valuation> {
        let tx = self.store.begin()?;
        tx.get_valuation(id, organization_id)?
            .ok_or_else(|| ValuationError::ValuationNotFound(id.to_string()))
    }

    pub fn list_by_deal(&self, deal_id: &str, organization_id: &str) -> Result<Vec<Valuation>> {
        let tx = self.store.begin()?;
        tx.list_valuations_by_deal(deal_id, organization_id)
    }

    /// Replace the supplied fields, revalidate, recompute derived metrics.
    /// Any violation rejects the whole update. An empty update writes nothing.
    pub fn update(&self, id: Uuid, organization_id: &str, update: ValuationUpdate) -> Result<Valuation> {
        if update.is_empty() {
            return self.get(id, organization_id);
        }
        let updated = in_transaction(self.store.as_ref(), |tx| {
            let current = tx
                .get_valuation(id, organization_id)?
                .ok_or_else(|| ValuationError::ValuationNotFound(id.to_string()))?;
            let inputs = update.apply_to(&current.inputs);
            let metrics = derive_metrics(&inputs, &self.config)?;
            let updated = Valuation {
                inputs,
                metrics,
                updated_at: Utc::now(),
                ..current
            };
            tx.update_valuation(&updated)?;
            Ok(updated)
        })?;
        log::info!(
            "updated valuation {} (org {}), EV {}",
            updated.id,
            updated.organization_id,
            updated.metrics.enterprise_value
        );
        Ok(updated)
    }

    /// Delete with cascade to scenarios, comparables, precedents and export
    /// logs. Documents produced by earlier exports are kept.
    pub fn delete(&self, id: Uuid, organization_id: &str) -> Result<()> {
        let deleted = in_transaction(self.store.as_ref(), |tx| tx.delete_valuation(id, organization_id))?;
        if !deleted {
            return Err(ValuationError::ValuationNotFound(id.to_string()));
        }
        log::info!("deleted valuation {id} (org {organization_id})");
        Ok(())
    }

    pub fn add_scenario(&self, valuation_id: Uuid, organization_id: &str, new: NewScenario) -> Result<Scenario> {
        require_name(&new.name, "scenario name")?;
        let scenario = in_transaction(self.store.as_ref(), |tx| {
            parent_for_child(tx, valuation_id, organization_id, &new.organization_id)?;
            let scenario = Scenario::from_new(valuation_id, new);
            tx.insert_scenario(&scenario)?;
            Ok(scenario)
        })?;
        log::debug!("added scenario {} to valuation {valuation_id}", scenario.id);
        Ok(scenario)
    }

    pub fn add_comparable(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        new: NewComparable,
    ) -> Result<ComparableCompany> {
        require_name(&new.company_name, "company_name")?;
        require_positive_weight(new.weight, "comparable")?;
        let comparable = in_transaction(self.store.as_ref(), |tx| {
            parent_for_child(tx, valuation_id, organization_id, &new.organization_id)?;
            let comparable = ComparableCompany::from_new(valuation_id, new);
            tx.insert_comparable(&comparable)?;
            Ok(comparable)
        })?;
        log::debug!("added comparable {} to valuation {valuation_id}", comparable.company_name);
        Ok(comparable)
    }

    /// Attach many comparables atomically (e.g. from a CSV import)
    pub fn add_comparables(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        rows: Vec<NewComparable>,
    ) -> Result<Vec<ComparableCompany>> {
        for row in &rows {
            require_name(&row.company_name, "company_name")?;
            require_positive_weight(row.weight, "comparable")?;
        }
        let inserted = in_transaction(self.store.as_ref(), |tx| {
            let mut inserted = Vec::with_capacity(rows.len());
            for row in rows {
                parent_for_child(tx, valuation_id, organization_id, &row.organization_id)?;
                let comparable = ComparableCompany::from_new(valuation_id, row);
                tx.insert_comparable(&comparable)?;
                inserted.push(comparable);
            }
            Ok(inserted)
        })?;
        log::info!("imported {} comparables into valuation {valuation_id}", inserted.len());
        Ok(inserted)
    }

    pub fn add_precedent(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        new: NewPrecedent,
    ) -> Result<PrecedentTransaction> {
        require_name(&new.target_company, "target_company")?;
        require_positive_weight(new.weight, "precedent")?;
        let today = Utc::now().date_naive();
        let precedent = in_transaction(self.store.as_ref(), |tx| {
            parent_for_child(tx, valuation_id, organization_id, &new.organization_id)?;
            let precedent = PrecedentTransaction::from_new(valuation_id, new, today, self.config.staleness_days);
            tx.insert_precedent(&precedent)?;
            Ok(precedent)
        })?;
        log::debug!("added precedent {} to valuation {valuation_id}", precedent.target_company);
        Ok(precedent)
    }

    pub fn list_scenarios(&self, valuation_id: Uuid, organization_id: &str) -> Result<Vec<Scenario>> {
        let tx = self.store.begin()?;
        require_valuation(&*tx, valuation_id, organization_id)?;
        tx.list_scenarios(valuation_id, organization_id)
    }

    pub fn list_comparables(&self, valuation_id: Uuid, organization_id: &str) -> Result<Vec<ComparableCompany>> {
        let tx = self.store.begin()?;
        require_valuation(&*tx, valuation_id, organization_id)?;
        tx.list_comparables(valuation_id, organization_id)
    }

    pub fn list_precedents(&self, valuation_id: Uuid, organization_id: &str) -> Result<Vec<PrecedentTransaction>> {
        let tx = self.store.begin()?;
        require_valuation(&*tx, valuation_id, organization_id)?;
        tx.list_precedents(valuation_id, organization_id)
    }
}

/// Not-found unless the valuation exists for this tenant
pub(crate) fn require_valuation(tx: &dyn StoreTx, valuation_id: Uuid, organization_id: &str) -> Result<Valuation> {
    tx.get_valuation(valuation_id, organization_id)?
        .ok_or_else(|| ValuationError::ValuationNotFound(valuation_id.to_string()))
}
