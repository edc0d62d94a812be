//! Work items and an in-process async runner backed by tokio

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::ExportLedger;
use crate::error::{Result, ValuationError};
use crate::model::{ExportLog, ExportStatus, OrgId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    Export,
}

/// Unit of work handed to the async runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub kind: WorkKind,
    pub export_log_id: Uuid,
    pub organization_id: OrgId,
}

/// Returned by `trigger_export_task`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub task_id: String,
    pub status: ExportStatus,
    pub kind: WorkKind,
    pub export_log_id: Uuid,
    pub organization_id: OrgId,
}

impl TaskDescriptor {
    pub fn work_item(&self) -> WorkItem {
        WorkItem {
            kind: self.kind,
            export_log_id: self.export_log_id,
            organization_id: self.organization_id.clone(),
        }
    }
}

/// Runs each work item on tokio's blocking pool. No ordering across jobs.
#[derive(Clone)]
pub struct TokioTaskRunner {
    ledger: Arc<ExportLedger>,
    handle: Handle,
}

impl TokioTaskRunner {
    pub fn new(ledger: Arc<ExportLedger>, handle: Handle) -> Self {
        Self { ledger, handle }
    }

    /// Bind to the runtime the caller is running on
    pub fn from_current(ledger: Arc<ExportLedger>) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| ValuationError::InvalidConfig(format!("no tokio runtime: {e}")))?;
        Ok(Self::new(ledger, handle))
    }

    pub fn enqueue(&self, item: WorkItem) -> JoinHandle<Result<ExportLog>> {
        let ledger = Arc::clone(&self.ledger);
        log::debug!("enqueue {:?} for log {}", item.kind, item.export_log_id);
        self.handle
            .spawn_blocking(move || ledger.process_work_item(&item))
    }
}
