//! Tenant-scoped entities of the valuation engine

mod valuation;
mod children;
mod export;
pub mod loader;

pub use valuation::{
    DerivedMetrics, NewValuation, TerminalMethod, Valuation, ValuationInputs, ValuationUpdate,
};
pub use children::{
    ComparableCompany, NewComparable, NewPrecedent, NewScenario, PrecedentTransaction, Scenario,
};
pub use export::{Document, ExportLog, ExportStatus, ExportType, EXCEL_MIME, PDF_MIME};
pub use loader::{load_comparables, load_comparables_from_reader, load_precedents, load_precedents_from_reader};

/// Tenant (organization) identifier supplied by the identity service
pub type OrgId = String;

/// User identifier supplied by the identity service
pub type UserId = String;

/// Deal identifier owned by the deal-management glue
pub type DealId = String;

/// The caller identity attached to every engine call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub organization_id: OrgId,
    pub user_id: UserId,
}

impl Actor {
    pub fn new(organization_id: impl Into<OrgId>, user_id: impl Into<UserId>) -> Self {
        Self {
            organization_id: organization_id.into(),
            user_id: user_id.into(),
        }
    }
}
