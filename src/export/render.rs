//! Renderer and user-directory contracts, and the snapshot handed to them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ValuationError};
use crate::model::{ComparableCompany, ExportType, PrecedentTransaction, Scenario, Valuation};

/// Everything a report renders: inputs and derived metrics of the valuation
/// plus its children. Also served to the audit/narrative feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub valuation: Valuation,
    pub comparables: Vec<ComparableCompany>,
    pub precedents: Vec<PrecedentTransaction>,
    /// Only the requested scenario when the export names one
    pub scenarios: Vec<Scenario>,
    pub generated_at: DateTime<Utc>,
}

/// Bytes produced by a renderer
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedReport {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// External PDF/Excel renderer. Errors surface as `ExportRenderError`.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, export_type: ExportType, snapshot: &ValuationSnapshot) -> Result<RenderedReport>;
}

/// Identity-service lookup used by the inactive-exporter policy
pub trait UserDirectory: Send + Sync {
    fn is_active(&self, organization_id: &str, user_id: &str) -> bool;
}

/// Serializes the snapshot as pretty JSON, tagged with the requested type's
/// MIME. Useful for the narrative feed and for local runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportRenderer;

impl ReportRenderer for JsonReportRenderer {
    fn render(&self, export_type: ExportType, snapshot: &ValuationSnapshot) -> Result<RenderedReport> {
        let bytes = serde_json::to_vec_pretty(snapshot)
            .map_err(|e| ValuationError::ExportRenderError(e.to_string()))?;
        Ok(RenderedReport {
            bytes,
            mime_type: export_type.mime_type().to_string(),
        })
    }
}
