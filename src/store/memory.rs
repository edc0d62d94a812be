//! In-memory persistence adapter
//!
//! `begin` locks the tables and hands out a working copy; `commit` swaps the
//! copy back in. Holding the lock for the lifetime of the transaction
//! serialises writers the way row locks would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{StoreTx, ValuationStore};
use crate::error::{Result, ValuationError};
use crate::model::{
    ComparableCompany, Document, ExportLog, ExportStatus, PrecedentTransaction, Scenario, Valuation,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    valuations: HashMap<Uuid, Valuation>,
    scenarios: Vec<Scenario>,
    comparables: Vec<ComparableCompany>,
    precedents: Vec<PrecedentTransaction>,
    export_logs: HashMap<Uuid, ExportLog>,
    documents: HashMap<Uuid, Document>,
}

impl Tables {
    /// Foreign-key check for rows hanging off a valuation
    fn check_parent(&self, valuation_id: Uuid, organization_id: &str) -> Result<()> {
        match self.valuations.get(&valuation_id) {
            None => Err(ValuationError::ValuationNotFound(valuation_id.to_string())),
            Some(parent) if parent.organization_id != organization_id => {
                Err(ValuationError::CrossTenantViolation(format!(
                    "child row for valuation {valuation_id} carries a different organization"
                )))
            }
            Some(_) => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    fail_commits: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail with `StorageError`
    pub fn set_fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| ValuationError::StorageError("store mutex poisoned".to_string()))
    }

    /// Unscoped row counts, for assertions in tests and diagnostics
    pub fn counts(&self) -> Result<StoreCounts> {
        let tables = self.lock()?;
        Ok(StoreCounts {
            valuations: tables.valuations.len(),
            scenarios: tables.scenarios.len(),
            comparables: tables.comparables.len(),
            precedents: tables.precedents.len(),
            export_logs: tables.export_logs.len(),
            documents: tables.documents.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreCounts {
    pub valuations: usize,
    pub scenarios: usize,
    pub comparables: usize,
    pub precedents: usize,
    pub export_logs: usize,
    pub documents: usize,
}

impl ValuationStore for InMemoryStore {
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>> {
        let guard = self.lock()?;
        let working = guard.clone();
        Ok(Box::new(MemoryTx {
            guard,
            working,
            fail_commit: self.fail_commits.load(Ordering::SeqCst),
        }))
    }
}

struct MemoryTx<'a> {
    guard: MutexGuard<'a, Tables>,
    working: Tables,
    fail_commit: bool,
}

impl StoreTx for MemoryTx<'_> {
    fn insert_valuation(&mut self, valuation: &Valuation) -> Result<()> {
        if self.working.valuations.contains_key(&valuation.id) {
            return Err(ValuationError::StorageError(format!("duplicate valuation {}", valuation.id)));
        }
        self.working.valuations.insert(valuation.id, valuation.clone());
        Ok(())
    }

    fn update_valuation(&mut self, valuation: &Valuation) -> Result<()> {
        match self.working.valuations.get_mut(&valuation.id) {
            Some(row) if row.organization_id == valuation.organization_id => {
                *row = valuation.clone();
                Ok(())
            }
            _ => Err(ValuationError::ValuationNotFound(valuation.id.to_string())),
        }
    }

    fn delete_valuation(&mut self, id: Uuid, organization_id: &str) -> Result<bool> {
        let owned = self
            .working
            .valuations
            .get(&id)
            .is_some_and(|v| v.organization_id == organization_id);
        if !owned {
            return Ok(false);
        }
        let tables = &mut self.working;
        tables.valuations.remove(&id);
        tables.scenarios.retain(|s| s.valuation_id != id);
        tables.comparables.retain(|c| c.valuation_id != id);
        tables.precedents.retain(|p| p.valuation_id != id);
        tables.export_logs.retain(|_, log| log.valuation_id != id);
        Ok(true)
    }

    fn get_valuation(&self, id: Uuid, organization_id: &str) -> Result<Option<Valuation>> {
        Ok(self
            .working
            .valuations
            .get(&id)
            .filter(|v| v.organization_id == organization_id)
            .cloned())
    }

    fn list_valuations_by_deal(&self, deal_id: &str, organization_id: &str) -> Result<Vec<Valuation>> {
        let mut rows: Vec<Valuation> = self
            .working
            .valuations
            .values()
            .filter(|v| v.organization_id == organization_id && v.deal_id == deal_id)
            .cloned()
            .collect();
        rows.sort_by_key(|v| v.created_at);
        Ok(rows)
    }

    fn insert_scenario(&mut self, scenario: &Scenario) -> Result<()> {
        self.working.check_parent(scenario.valuation_id, &scenario.organization_id)?;
        self.working.scenarios.push(scenario.clone());
        Ok(())
    }

    fn get_scenario(&self, id: Uuid, organization_id: &str) -> Result<Option<Scenario>> {
        Ok(self
            .working
            .scenarios
            .iter()
            .find(|s| s.id == id && s.organization_id == organization_id)
            .cloned())
    }

    fn list_scenarios(&self, valuation_id: Uuid, organization_id: &str) -> Result<Vec<Scenario>> {
        Ok(self
            .working
            .scenarios
            .iter()
            .filter(|s| s.valuation_id == valuation_id && s.organization_id == organization_id)
            .cloned()
            .collect())
    }

    fn insert_comparable(&mut self, comparable: &ComparableCompany) -> Result<()> {
        self.working.check_parent(comparable.valuation_id, &comparable.organization_id)?;
        self.working.comparables.push(comparable.clone());
        Ok(())
    }

    fn list_comparables(&self, valuation_id: Uuid, organization_id: &str) -> Result<Vec<ComparableCompany>> {
        Ok(self
            .working
            .comparables
            .iter()
            .filter(|c| c.valuation_id == valuation_id && c.organization_id == organization_id)
            .cloned()
            .collect())
    }

    fn insert_precedent(&mut self, precedent: &PrecedentTransaction) -> Result<()> {
        self.working.check_parent(precedent.valuation_id, &precedent.organization_id)?;
        self.working.precedents.push(precedent.clone());
        Ok(())
    }

    fn list_precedents(&self, valuation_id: Uuid, organization_id: &str) -> Result<Vec<PrecedentTransaction>> {
        Ok(self
            .working
            .precedents
            .iter()
            .filter(|p| p.valuation_id == valuation_id && p.organization_id == organization_id)
            .cloned()
            .collect())
    }

    fn update_precedent_staleness(&mut self, organization_id: &str, flags: &[(Uuid, bool)]) -> Result<()> {
        for (id, stale) in flags {
            let row = self
                .working
                .precedents
                .iter_mut()
                .find(|p| p.id == *id && p.organization_id == organization_id)
                .ok_or_else(|| ValuationError::StorageError(format!("precedent {id} vanished")))?;
            row.is_stale = *stale;
        }
        Ok(())
    }

    fn insert_export_log(&mut self, log: &ExportLog) -> Result<()> {
        self.working.check_parent(log.valuation_id, &log.organization_id)?;
        self.working.export_logs.insert(log.id, log.clone());
        Ok(())
    }

    fn get_export_log(&self, id: Uuid, organization_id: &str) -> Result<Option<ExportLog>> {
        Ok(self
            .working
            .export_logs
            .get(&id)
            .filter(|log| log.organization_id == organization_id)
            .cloned())
    }

    fn lock_export_log(&mut self, id: Uuid, organization_id: &str) -> Result<Option<ExportLog>> {
        // The whole table set is already held exclusively by this transaction
        self.get_export_log(id, organization_id)
    }

    fn update_export_log(&mut self, log: &ExportLog, expected: ExportStatus) -> Result<()> {
        let row = self
            .working
            .export_logs
            .get_mut(&log.id)
            .filter(|row| row.organization_id == log.organization_id)
            .ok_or_else(|| ValuationError::ExportLogNotFound(log.id.to_string()))?;
        if row.status != expected {
            return Err(ValuationError::IllegalTransition {
                from: row.status,
                to: log.status,
            });
        }
        if log.status != expected && !expected.can_transition_to(log.status) {
            return Err(ValuationError::IllegalTransition {
                from: expected,
                to: log.status,
            });
        }
        *row = log.clone();
        Ok(())
    }

    fn list_export_logs(&self, valuation_id: Uuid, organization_id: &str, limit: usize) -> Result<Vec<ExportLog>> {
        let mut rows: Vec<ExportLog> = self
            .working
            .export_logs
            .values()
            .filter(|log| log.valuation_id == valuation_id && log.organization_id == organization_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.exported_at.cmp(&a.exported_at));
        rows.truncate(limit);
        Ok(rows)
    }

    fn find_export_log_by_task(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        task_id: &str,
    ) -> Result<Option<ExportLog>> {
        Ok(self
            .working
            .export_logs
            .values()
            .find(|log| {
                log.valuation_id == valuation_id
                    && log.organization_id == organization_id
                    && log.task_id.as_deref() == Some(task_id)
            })
            .cloned())
    }

    fn insert_document(&mut self, document: &Document) -> Result<()> {
        if self.working.documents.contains_key(&document.id) {
            return Err(ValuationError::StorageError(format!("duplicate document {}", document.id)));
        }
        self.working.documents.insert(document.id, document.clone());
        Ok(())
    }

    fn get_document(&self, id: Uuid, organization_id: &str) -> Result<Option<Document>> {
        Ok(self
            .working
            .documents
            .get(&id)
            .filter(|d| d.organization_id == organization_id)
            .cloned())
    }

    fn commit(self: Box<Self>) -> Result<()> {
        if self.fail_commit {
            return Err(ValuationError::StorageError("commit rejected".to_string()));
        }
        let MemoryTx { mut guard, working, .. } = *self;
        *guard = working;
        Ok(())
    }
}
