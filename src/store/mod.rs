//! Persistence adapter contracts
//!
//! Every read takes the tenant (`organization_id`) as a query predicate;
//! a row owned by another tenant is indistinguishable from a missing row.
//! All writes of one engine call go through a single [`StoreTx`], which
//! rolls back when dropped without `commit`.

mod memory;
mod object;

pub use memory::{InMemoryStore, StoreCounts};
pub use object::{InMemoryObjectStore, ObjectStore};

use uuid::Uuid;

use crate::error::Result;
use crate::model::{
    ComparableCompany, Document, ExportLog, ExportStatus, PrecedentTransaction, Scenario, Valuation,
};

/// Transactional entry point of the persistence adapter
pub trait ValuationStore: Send + Sync {
    /// Start a transaction. Transactions are serialised per store.
    fn begin(&self) -> Result<Box<dyn StoreTx + '_>>;
}

/// One open transaction. Dropping it without [`StoreTx::commit`] discards
/// every write made through it.
pub trait StoreTx {
    fn insert_valuation(&mut self, valuation: &Valuation) -> Result<()>;
    fn update_valuation(&mut self, valuation: &Valuation) -> Result<()>;
    /// Delete a valuation and cascade to its scenarios, comparables,
    /// precedents and export logs. Documents are left alone.
    fn delete_valuation(&mut self, id: Uuid, organization_id: &str) -> Result<bool>;
    fn get_valuation(&self, id: Uuid, organization_id: &str) -> Result<Option<Valuation>>;
    fn list_valuations_by_deal(&self, deal_id: &str, organization_id: &str) -> Result<Vec<Valuation>>;

    fn insert_scenario(&mut self, scenario: &Scenario) -> Result<()>;
    fn get_scenario(&self, id: Uuid, organization_id: &str) -> Result<Option<Scenario>>;
    fn list_scenarios(&self, valuation_id: Uuid, organization_id: &str) -> Result<Vec<Scenario>>;

    fn insert_comparable(&mut self, comparable: &ComparableCompany) -> Result<()>;
    fn list_comparables(&self, valuation_id: Uuid, organization_id: &str) -> Result<Vec<ComparableCompany>>;

    fn insert_precedent(&mut self, precedent: &PrecedentTransaction) -> Result<()>;
    fn list_precedents(&self, valuation_id: Uuid, organization_id: &str) -> Result<Vec<PrecedentTransaction>>;
    /// Persist recomputed staleness flags as (precedent id, is_stale)
    fn update_precedent_staleness(&mut self, organization_id: &str, flags: &[(Uuid, bool)]) -> Result<()>;

    fn insert_export_log(&mut self, log: &ExportLog) -> Result<()>;
    fn get_export_log(&self, id: Uuid, organization_id: &str) -> Result<Option<ExportLog>>;
    /// Acquire the row for update (SELECT ... FOR UPDATE)
    fn lock_export_log(&mut self, id: Uuid, organization_id: &str) -> Result<Option<ExportLog>>;
    /// Optimistic write: fails with `IllegalTransition` unless the stored
    /// status equals `expected` and `expected -> log.status` is legal (or
    /// unchanged).
    fn update_export_log(&mut self, log: &ExportLog, expected: ExportStatus) -> Result<()>;
    /// Most recent first
    fn list_export_logs(&self, valuation_id: Uuid, organization_id: &str, limit: usize) -> Result<Vec<ExportLog>>;
    fn find_export_log_by_task(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        task_id: &str,
    ) -> Result<Option<ExportLog>>;

    fn insert_document(&mut self, document: &Document) -> Result<()>;
    fn get_document(&self, id: Uuid, organization_id: &str) -> Result<Option<Document>>;

    fn commit(self: Box<Self>) -> Result<()>;
}

/// Run `f` inside one transaction, committing only when it succeeds
pub fn in_transaction<T, F>(store: &dyn ValuationStore, f: F) -> Result<T>
where
    F: FnOnce(&mut dyn StoreTx) -> Result<T>,
{
    let mut tx = store.begin()?;
    let value = f(&mut *tx)?;
    tx.commit()?;
    Ok(value)
}
