//! Export log entries, their state machine, and the document rows they produce

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{DealId, OrgId, UserId};

pub const PDF_MIME: &str = "application/pdf";
pub const EXCEL_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportType {
    Pdf,
    Excel,
}

impl ExportType {
    pub fn extension(self) -> &'static str {
        match self {
            ExportType::Pdf => "pdf",
            ExportType::Excel => "xlsx",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ExportType::Pdf => PDF_MIME,
            ExportType::Excel => EXCEL_MIME,
        }
    }
}

/// Export lifecycle state
///
/// ```text
/// queued --> processing --> completed
///   |             '------> failed
///   '--> failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Legal (from, to) pairs. Anything else is rejected.
const TRANSITIONS: &[(ExportStatus, ExportStatus)] = &[
    (ExportStatus::Queued, ExportStatus::Processing),
    (ExportStatus::Queued, ExportStatus::Failed),
    (ExportStatus::Processing, ExportStatus::Completed),
    (ExportStatus::Processing, ExportStatus::Failed),
];

impl ExportStatus {
    pub fn can_transition_to(self, next: ExportStatus) -> bool {
        TRANSITIONS.contains(&(self, next))
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExportStatus::Completed | ExportStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExportStatus::Queued => "queued",
            ExportStatus::Processing => "processing",
            ExportStatus::Completed => "completed",
            ExportStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit row recording one export request and its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportLog {
    pub id: Uuid,
    pub valuation_id: Uuid,
    pub organization_id: OrgId,
    pub export_type: ExportType,
    /// Free-form renderer tag, e.g. "board-pack"
    pub export_format: String,
    pub exported_by: UserId,
    pub status: ExportStatus,
    pub task_id: Option<String>,
    pub download_url: Option<String>,
    pub file_size_bytes: Option<u64>,
    /// Document produced on completion; same tenant and deal as the valuation
    pub document_id: Option<Uuid>,
    /// Restricts the snapshot to one scenario of the same valuation
    pub scenario_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub exported_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Document Room row. The engine appends these and never updates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub file_key: String,
    pub file_size: u64,
    pub file_type: String,
    pub deal_id: DealId,
    pub organization_id: OrgId,
    pub uploaded_by: UserId,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}
