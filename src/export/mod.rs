//! Export ledger: audit rows for PDF/Excel exports and the worker that
//! renders them into Document Room entries
//!
//! Lifecycle per log: `queued -> processing -> completed | failed`, or
//! `queued -> failed` when pre-flight checks fail. Every status write goes
//! through the store's optimistic check against the status read under lock.
//! Failures while processing are recorded on the log rather than returned.

mod render;
mod runner;

pub use render::{JsonReportRenderer, RenderedReport, ReportRenderer, UserDirectory, ValuationSnapshot};
pub use runner::{TaskDescriptor, TokioTaskRunner, WorkItem, WorkKind};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::require_valuation;
use crate::config::{EngineConfig, InactiveExporterPolicy};
use crate::error::{Result, ValuationError};
use crate::model::{Actor, Document, ExportLog, ExportStatus, ExportType, UserId};
use crate::store::{in_transaction, ObjectStore, StoreTx, ValuationStore};

/// Request to record a new export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub valuation_id: Uuid,
    pub export_type: ExportType,
    #[serde(default)]
    pub export_format: String,
    #[serde(default)]
    pub scenario_id: Option<Uuid>,
    /// Existing document the export belongs to; must be on the same deal
    #[serde(default)]
    pub document_id: Option<Uuid>,
}

/// Output of a successful render, before it is registered
struct StoredArtifact {
    file_key: String,
    file_size: u64,
    mime_type: String,
    download_url: String,
    document_name: String,
    deal_id: String,
    uploaded_by: UserId,
}

pub struct ExportLedger {
    store: Arc<dyn ValuationStore>,
    objects: Arc<dyn ObjectStore>,
    renderer: Arc<dyn ReportRenderer>,
    users: Option<Arc<dyn UserDirectory>>,
    config: EngineConfig,
}

/// Load the snapshot inside an open transaction
fn load_snapshot(
    tx: &dyn StoreTx,
    valuation_id: Uuid,
    organization_id: &str,
    scenario_id: Option<Uuid>,
) -> Result<ValuationSnapshot> {
    let valuation = require_valuation(tx, valuation_id, organization_id)?;
    let mut scenarios = tx.list_scenarios(valuation_id, organization_id)?;
    if let Some(scenario_id) = scenario_id {
        scenarios.retain(|s| s.id == scenario_id);
        if scenarios.is_empty() {
            return Err(ValuationError::ScenarioNotFound(scenario_id.to_string()));
        }
    }
    Ok(ValuationSnapshot {
        comparables: tx.list_comparables(valuation_id, organization_id)?,
        precedents: tx.list_precedents(valuation_id, organization_id)?,
        scenarios,
        valuation,
        generated_at: Utc::now(),
    })
}

fn lock_log(tx: &mut dyn StoreTx, log_id: Uuid, organization_id: &str) -> Result<ExportLog> {
    tx.lock_export_log(log_id, organization_id)?
        .ok_or_else(|| ValuationError::ExportLogNotFound(log_id.to_string()))
}

impl ExportLedger {
    pub fn new(
        store: Arc<dyn ValuationStore>,
        objects: Arc<dyn ObjectStore>,
        renderer: Arc<dyn ReportRenderer>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            objects,
            renderer,
            users: None,
            config,
        }
    }

    /// Consult `users` when applying the inactive-exporter policy
    pub fn with_user_directory(mut self, users: Arc<dyn UserDirectory>) -> Self {
        self.users = Some(users);
        self
    }

    /// Validate references and persist a `queued` log
    pub fn log_export(&self, actor: &Actor, request: ExportRequest) -> Result<ExportLog> {
        let org = actor.organization_id.as_str();
        let log = in_transaction(self.store.as_ref(), |tx| {
            let valuation = require_valuation(tx, request.valuation_id, org)?;

            if let Some(scenario_id) = request.scenario_id {
                let scenario = tx
                    .get_scenario(scenario_id, org)?
                    .ok_or_else(|| ValuationError::ScenarioNotFound(scenario_id.to_string()))?;
                if scenario.valuation_id != valuation.id {
                    return Err(ValuationError::InvariantViolation(format!(
                        "scenario {scenario_id} does not belong to valuation {}",
                        valuation.id
                    )));
                }
            }
            if let Some(document_id) = request.document_id {
                let document = tx
                    .get_document(document_id, org)?
                    .ok_or_else(|| ValuationError::DocumentNotFound(document_id.to_string()))?;
                if document.deal_id != valuation.deal_id {
                    return Err(ValuationError::CrossTenantViolation(format!(
                        "document {document_id} belongs to deal {}, not {}",
                        document.deal_id, valuation.deal_id
                    )));
                }
            }

            let log = ExportLog {
                id: Uuid::new_v4(),
                valuation_id: valuation.id,
                organization_id: valuation.organization_id.clone(),
                export_type: request.export_type,
                export_format: request.export_format.clone(),
                exported_by: actor.user_id.clone(),
                status: ExportStatus::Queued,
                task_id: None,
                download_url: None,
                file_size_bytes: None,
                document_id: request.document_id,
                scenario_id: request.scenario_id,
                error_message: None,
                exported_at: Utc::now(),
                completed_at: None,
            };
            tx.insert_export_log(&log)?;
            Ok(log)
        })?;
        log::info!(
            "queued {:?} export {} for valuation {} (org {})",
            log.export_type,
            log.id,
            log.valuation_id,
            log.organization_id
        );
        Ok(log)
    }

    /// Hand out a runner task id and attach it to the log. Finished logs
    /// keep the task id they completed under.
    pub fn trigger_export_task(&self, log_id: Uuid, organization_id: &str) -> Result<TaskDescriptor> {
        let task_id = Uuid::new_v4().to_string();
        let status = in_transaction(self.store.as_ref(), |tx| {
            let mut log = lock_log(tx, log_id, organization_id)?;
            let current = log.status;
            if current.is_terminal() {
                return Err(ValuationError::IllegalTransition {
                    from: current,
                    to: ExportStatus::Processing,
                });
            }
            log.task_id = Some(task_id.clone());
            tx.update_export_log(&log, current)?;
            Ok(current)
        })?;
        log::debug!("export {log_id} assigned task {task_id}");
        Ok(TaskDescriptor {
            task_id,
            status,
            kind: WorkKind::Export,
            export_log_id: log_id,
            organization_id: organization_id.to_string(),
        })
    }

    /// Worker entry point for a runner work item
    pub fn process_work_item(&self, item: &WorkItem) -> Result<ExportLog> {
        match item.kind {
            WorkKind::Export => self.process_export_task(item.export_log_id, &item.organization_id),
        }
    }

    /// Render, store and register the export. Returns the log in its final
    /// state; failures are recorded on it as `failed`.
    pub fn process_export_task(&self, log_id: Uuid, organization_id: &str) -> Result<ExportLog> {
        let started = in_transaction(self.store.as_ref(), |tx| {
            let log = lock_log(tx, log_id, organization_id)?;
            match log.status {
                ExportStatus::Completed | ExportStatus::Failed => return Ok(Err(log)),
                ExportStatus::Processing => {
                    return Err(ValuationError::IllegalTransition {
                        from: ExportStatus::Processing,
                        to: ExportStatus::Processing,
                    })
                }
                ExportStatus::Queued => {}
            }

            match load_snapshot(tx, log.valuation_id, organization_id, log.scenario_id) {
                Ok(snapshot) => {
                    let processing = ExportLog {
                        status: ExportStatus::Processing,
                        ..log
                    };
                    tx.update_export_log(&processing, ExportStatus::Queued)?;
                    Ok(Ok((processing, snapshot)))
                }
                Err(err) => {
                    log::warn!("export {log_id} failed pre-flight: {err}");
                    let failed = ExportLog {
                        status: ExportStatus::Failed,
                        error_message: Some(err.to_string()),
                        completed_at: Some(Utc::now()),
                        ..log
                    };
                    tx.update_export_log(&failed, ExportStatus::Queued)?;
                    Ok(Err(failed))
                }
            }
        })?;

        let (log, snapshot) = match started {
            Ok(started) => started,
            Err(finished) => {
                log::debug!("export {log_id} already {}; nothing to do", finished.status);
                return Ok(finished);
            }
        };
        log::info!("export {log_id} processing");

        let outcome = self
            .render_and_store(&log, &snapshot)
            .and_then(|artifact| self.complete(&log, artifact));
        match outcome {
            Ok(completed) => {
                log::info!(
                    "export {log_id} completed: document {:?}, {} bytes",
                    completed.document_id,
                    completed.file_size_bytes.unwrap_or(0)
                );
                Ok(completed)
            }
            Err(err) => {
                log::warn!("export {log_id} failed: {err}");
                self.record_failure(log_id, organization_id, Some(ExportStatus::Processing), &err.to_string())
            }
        }
    }

    /// Mark a queued or processing log as failed (runner-side cancellation)
    pub fn fail_export(&self, log_id: Uuid, organization_id: &str, message: &str) -> Result<ExportLog> {
        let failed = self.record_failure(log_id, organization_id, None, message)?;
        log::info!("export {log_id} cancelled: {message}");
        Ok(failed)
    }

    /// Most recent first; `limit` defaults to the configured list size
    pub fn list_export_logs(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<ExportLog>> {
        let tx = self.store.begin()?;
        tx.list_export_logs(
            valuation_id,
            organization_id,
            limit.unwrap_or(self.config.export_list_limit),
        )
    }

    pub fn get_export_log(&self, log_id: Uuid, organization_id: &str) -> Result<ExportLog> {
        let tx = self.store.begin()?;
        tx.get_export_log(log_id, organization_id)?
            .ok_or_else(|| ValuationError::ExportLogNotFound(log_id.to_string()))
    }

    pub fn get_export_log_by_task(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        task_id: &str,
    ) -> Result<ExportLog> {
        let tx = self.store.begin()?;
        tx.find_export_log_by_task(valuation_id, organization_id, task_id)?
            .ok_or_else(|| ValuationError::ExportLogNotFound(format!("task {task_id}")))
    }

    /// Renderer input for a valuation, optionally narrowed to one scenario
    pub fn snapshot(
        &self,
        valuation_id: Uuid,
        organization_id: &str,
        scenario_id: Option<Uuid>,
    ) -> Result<ValuationSnapshot> {
        let tx = self.store.begin()?;
        load_snapshot(&*tx, valuation_id, organization_id, scenario_id)
    }

    /// The user a new document is attributed to, per the configured policy
    fn resolve_uploader(&self, log: &ExportLog) -> Result<UserId> {
        let active = self
            .users
            .as_ref()
            .map_or(true, |users| users.is_active(&log.organization_id, &log.exported_by));
        if active {
            return Ok(log.exported_by.clone());
        }
        match &self.config.inactive_exporter_policy {
            InactiveExporterPolicy::KeepExporter => {
                log::warn!("exporter {} is inactive; keeping attribution", log.exported_by);
                Ok(log.exported_by.clone())
            }
            InactiveExporterPolicy::AttributeTo(user_id) => {
                log::info!("exporter {} is inactive; attributing to {user_id}", log.exported_by);
                Ok(user_id.clone())
            }
            InactiveExporterPolicy::FailExport => Err(ValuationError::InvariantViolation(format!(
                "exporter {} is no longer active",
                log.exported_by
            ))),
        }
    }

    fn render_and_store(&self, log: &ExportLog, snapshot: &ValuationSnapshot) -> Result<StoredArtifact> {
        let uploaded_by = self.resolve_uploader(log)?;
        let report = self
            .renderer
            .render(log.export_type, snapshot)
            .map_err(|e| match e {
                ValuationError::ExportRenderError(_) => e,
                other => ValuationError::ExportRenderError(other.to_string()),
            })?;

        let deal_id = snapshot.valuation.deal_id.clone();
        let document_name = format!(
            "Valuation Export - {}-{}.{}",
            log.valuation_id,
            Utc::now().format("%Y%m%d-%H%M%S"),
            log.export_type.extension()
        );
        let file_key =
            self.objects
                .generate_file_key(&log.organization_id, &deal_id, &document_name, &uploaded_by);
        self.objects.save(&file_key, &report.bytes, &log.organization_id)?;
        let download_url = self.objects.presigned_url(
            &file_key,
            &log.organization_id,
            self.config.presigned_url_ttl_seconds,
        )?;

        let mime_type = if report.mime_type.is_empty() {
            log.export_type.mime_type().to_string()
        } else {
            report.mime_type
        };
        Ok(StoredArtifact {
            file_key,
            file_size: report.bytes.len() as u64,
            mime_type,
            download_url,
            document_name,
            deal_id,
            uploaded_by,
        })
    }

    /// Register the document (unless the log already references one) and
    /// mark the log completed, in one transaction
    fn complete(&self, log: &ExportLog, artifact: StoredArtifact) -> Result<ExportLog> {
        in_transaction(self.store.as_ref(), |tx| {
            let current = lock_log(tx, log.id, &log.organization_id)?;
            let document_id = match current.document_id {
                Some(existing) => existing,
                None => {
                    let document = Document {
                        id: Uuid::new_v4(),
                        name: artifact.document_name.clone(),
                        file_key: artifact.file_key.clone(),
                        file_size: artifact.file_size,
                        file_type: artifact.mime_type.clone(),
                        deal_id: artifact.deal_id.clone(),
                        organization_id: current.organization_id.clone(),
                        uploaded_by: artifact.uploaded_by.clone(),
                        version: 1,
                        created_at: Utc::now(),
                    };
                    tx.insert_document(&document)?;
                    document.id
                }
            };
            let completed = ExportLog {
                status: ExportStatus::Completed,
                download_url: Some(artifact.download_url.clone()),
                file_size_bytes: Some(artifact.file_size),
                document_id: Some(document_id),
                completed_at: Some(Utc::now()),
                ..current
            };
            tx.update_export_log(&completed, ExportStatus::Processing)?;
            Ok(completed)
        })
    }

    /// Move the log to `failed`. With `expected`, the locked status must
    /// match it.
    fn record_failure(
        &self,
        log_id: Uuid,
        organization_id: &str,
        expected: Option<ExportStatus>,
        message: &str,
    ) -> Result<ExportLog> {
        in_transaction(self.store.as_ref(), |tx| {
            let current = lock_log(tx, log_id, organization_id)?;
            let from = current.status;
            if expected.is_some_and(|e| e != from) || !from.can_transition_to(ExportStatus::Failed) {
                return Err(ValuationError::IllegalTransition {
                    from,
                    to: ExportStatus::Failed,
                });
            }
            let failed = ExportLog {
                status: ExportStatus::Failed,
                error_message: Some(message.to_string()),
                completed_at: Some(Utc::now()),
                ..current
            };
            tx.update_export_log(&failed, from)?;
            Ok(failed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ValuationService;
    use crate::model::{NewScenario, NewValuation, TerminalMethod};
    use crate::store::{InMemoryObjectStore, InMemoryStore};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    struct FailingRenderer;

    impl ReportRenderer for FailingRenderer {
        fn render(&self, _: ExportType, _: &ValuationSnapshot) -> Result<RenderedReport> {
            Err(ValuationError::ExportRenderError("template missing".to_string()))
        }
    }

    struct NobodyActive;

    impl UserDirectory for NobodyActive {
        fn is_active(&self, _: &str, _: &str) -> bool {
            false
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        objects: Arc<InMemoryObjectStore>,
        service: ValuationService,
        valuation_id: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let service = ValuationService::new(store.clone(), EngineConfig::default());
        let valuation = service
            .create(
                &actor(),
                NewValuation {
                    deal_id: "deal-1".to_string(),
                    forecast_years: Some(3),
                    discount_rate: dec!(0.1),
                    terminal_method: TerminalMethod::GordonGrowth,
                    terminal_growth_rate: Some(dec!(0.02)),
                    terminal_ebitda_multiple: None,
                    cash_flows: vec![dec!(100), dec!(110), dec!(120)],
                    terminal_cash_flow: dec!(125),
                    net_debt: Decimal::ZERO,
                    shares_outstanding: None,
                },
            )
            .expect("create");
        Fixture {
            store,
            objects: Arc::new(InMemoryObjectStore::new("https://files.local")),
            service,
            valuation_id: valuation.id,
        }
    }

    fn actor() -> Actor {
        Actor::new("org-a", "user-1")
    }

    fn ledger(f: &Fixture, renderer: Arc<dyn ReportRenderer>, config: EngineConfig) -> ExportLedger {
        ExportLedger::new(f.store.clone(), f.objects.clone(), renderer, config)
    }

    fn request(valuation_id: Uuid) -> ExportRequest {
        ExportRequest {
            valuation_id,
            export_type: ExportType::Pdf,
            export_format: "board-pack".to_string(),
            scenario_id: None,
            document_id: None,
        }
    }

    #[test]
    fn test_lifecycle_and_idempotency() {
        let f = fixture();
        let ledger = ledger(&f, Arc::new(JsonReportRenderer), EngineConfig::default());

        let log = ledger.log_export(&actor(), request(f.valuation_id)).unwrap();
        assert_eq!(log.status, ExportStatus::Queued);

        let task = ledger.trigger_export_task(log.id, "org-a").unwrap();
        assert_eq!(task.status, ExportStatus::Queued);
        let by_task = ledger
            .get_export_log_by_task(f.valuation_id, "org-a", &task.task_id)
            .unwrap();
        assert_eq!(by_task.id, log.id);

        let done = ledger.process_work_item(&task.work_item()).unwrap();
        assert_eq!(done.status, ExportStatus::Completed);
        assert!(done.download_url.is_some());
        assert!(done.completed_at.is_some());
        let document_id = done.document_id.expect("document");

        let tx = f.store.begin().unwrap();
        let document = tx.get_document(document_id, "org-a").unwrap().expect("row");
        drop(tx);
        assert_eq!(document.deal_id, "deal-1");
        assert_eq!(document.file_type, crate::model::PDF_MIME);
        assert_eq!(document.version, 1);
        assert_eq!(document.uploaded_by, "user-1");
        assert!(document
            .name
            .starts_with(&format!("Valuation Export - {}-", f.valuation_id)));
        assert!(document.name.ends_with(".pdf"));
        assert_eq!(Some(document.file_size), done.file_size_bytes);
        assert_eq!(f.objects.len(), 1);

        // Second run is a no-op
        let again = ledger.process_export_task(log.id, "org-a").unwrap();
        assert_eq!(again, done);
        assert_eq!(f.store.counts().unwrap().documents, 1);
        assert_eq!(f.objects.len(), 1);

        // Re-triggering a finished export keeps its original task id
        assert!(matches!(
            ledger.trigger_export_task(log.id, "org-a"),
            Err(ValuationError::IllegalTransition { from: ExportStatus::Completed, .. })
        ));
        let by_task = ledger
            .get_export_log_by_task(f.valuation_id, "org-a", &task.task_id)
            .unwrap();
        assert_eq!(by_task, done);
    }

    #[test]
    fn test_render_failure_is_recorded() {
        let f = fixture();
        let ledger = ledger(&f, Arc::new(FailingRenderer), EngineConfig::default());
        let log = ledger.log_export(&actor(), request(f.valuation_id)).unwrap();

        let failed = ledger.process_export_task(log.id, "org-a").unwrap();
        assert_eq!(failed.status, ExportStatus::Failed);
        assert!(failed.error_message.unwrap().contains("template missing"));
        assert_eq!(failed.document_id, None);
        assert_eq!(f.store.counts().unwrap().documents, 0);

        let listed = ledger.list_export_logs(f.valuation_id, "org-a", None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, ExportStatus::Failed);
    }

    #[test]
    fn test_preflight_failure_skips_processing() {
        let f = fixture();
        let ledger = ledger(&f, Arc::new(JsonReportRenderer), EngineConfig::default());
        let scenario = f
            .service
            .add_scenario(
                f.valuation_id,
                "org-a",
                NewScenario {
                    organization_id: "org-a".to_string(),
                    name: "Base".to_string(),
                    description: None,
                    assumptions: Default::default(),
                    enterprise_value: None,
                    equity_value: None,
                },
            )
            .unwrap();
        let log = ledger
            .log_export(
                &actor(),
                ExportRequest {
                    scenario_id: Some(scenario.id),
                    ..request(f.valuation_id)
                },
            )
            .unwrap();

        // Snapshot narrows to the requested scenario
        let snapshot = ledger.snapshot(f.valuation_id, "org-a", Some(scenario.id)).unwrap();
        assert_eq!(snapshot.scenarios.len(), 1);

        // Point the log at a scenario that no longer resolves
        let mut tx = f.store.begin().unwrap();
        let mut row = tx.lock_export_log(log.id, "org-a").unwrap().unwrap();
        row.scenario_id = Some(Uuid::new_v4());
        tx.update_export_log(&row, ExportStatus::Queued).unwrap();
        tx.commit().unwrap();

        let failed = ledger.process_export_task(log.id, "org-a").unwrap();
        assert_eq!(failed.status, ExportStatus::Failed);
        assert!(failed.error_message.unwrap().contains("Scenario not found"));
    }

    #[test]
    fn test_log_export_validation() {
        let f = fixture();
        let ledger = ledger(&f, Arc::new(JsonReportRenderer), EngineConfig::default());

        assert!(matches!(
            ledger.log_export(&Actor::new("org-b", "u"), request(f.valuation_id)),
            Err(ValuationError::ValuationNotFound(_))
        ));
        assert!(matches!(
            ledger.log_export(
                &actor(),
                ExportRequest {
                    scenario_id: Some(Uuid::new_v4()),
                    ..request(f.valuation_id)
                }
            ),
            Err(ValuationError::ScenarioNotFound(_))
        ));
        assert!(matches!(
            ledger.log_export(
                &actor(),
                ExportRequest {
                    document_id: Some(Uuid::new_v4()),
                    ..request(f.valuation_id)
                }
            ),
            Err(ValuationError::DocumentNotFound(_))
        ));
        assert_eq!(f.store.counts().unwrap().export_logs, 0);
    }

    #[test]
    fn test_document_on_other_deal_rejected() {
        let f = fixture();
        let ledger = ledger(&f, Arc::new(JsonReportRenderer), EngineConfig::default());
        let other_deal = Document {
            id: Uuid::new_v4(),
            name: "Teaser.pdf".to_string(),
            file_key: "k".to_string(),
            file_size: 1,
            file_type: crate::model::PDF_MIME.to_string(),
            deal_id: "deal-2".to_string(),
            organization_id: "org-a".to_string(),
            uploaded_by: "user-1".to_string(),
            version: 1,
            created_at: Utc::now(),
        };
        in_transaction(&*f.store, |tx| tx.insert_document(&other_deal)).unwrap();

        let result = ledger.log_export(
            &actor(),
            ExportRequest {
                document_id: Some(other_deal.id),
                ..request(f.valuation_id)
            },
        );
        assert!(matches!(result, Err(ValuationError::CrossTenantViolation(_))));
    }

    #[test]
    fn test_inactive_exporter_policies() {
        let f = fixture();

        let config = EngineConfig {
            inactive_exporter_policy: InactiveExporterPolicy::AttributeTo("admin".to_string()),
            ..EngineConfig::default()
        };
        let attributing = ledger(&f, Arc::new(JsonReportRenderer), config).with_user_directory(Arc::new(NobodyActive));
        let log = attributing.log_export(&actor(), request(f.valuation_id)).unwrap();
        let done = attributing.process_export_task(log.id, "org-a").unwrap();
        let tx = f.store.begin().unwrap();
        let document = tx.get_document(done.document_id.unwrap(), "org-a").unwrap().unwrap();
        assert_eq!(document.uploaded_by, "admin");
        drop(tx);

        let config = EngineConfig {
            inactive_exporter_policy: InactiveExporterPolicy::FailExport,
            ..EngineConfig::default()
        };
        let strict = ledger(&f, Arc::new(JsonReportRenderer), config).with_user_directory(Arc::new(NobodyActive));
        let log = strict.log_export(&actor(), request(f.valuation_id)).unwrap();
        let failed = strict.process_export_task(log.id, "org-a").unwrap();
        assert_eq!(failed.status, ExportStatus::Failed);
        assert!(failed.error_message.unwrap().contains("no longer active"));
    }

    #[test]
    fn test_fail_export_and_terminal_guard() {
        let f = fixture();
        let ledger = ledger(&f, Arc::new(JsonReportRenderer), EngineConfig::default());
        let log = ledger.log_export(&actor(), request(f.valuation_id)).unwrap();

        let cancelled = ledger.fail_export(log.id, "org-a", "cancelled by runner").unwrap();
        assert_eq!(cancelled.status, ExportStatus::Failed);
        assert!(matches!(
            ledger.fail_export(log.id, "org-a", "again"),
            Err(ValuationError::IllegalTransition { .. })
        ));
        // Processing a failed log is a no-op
        assert_eq!(ledger.process_export_task(log.id, "org-a").unwrap(), cancelled);
        assert!(matches!(
            ledger.trigger_export_task(log.id, "org-a"),
            Err(ValuationError::IllegalTransition { from: ExportStatus::Failed, .. })
        ));
        assert!(matches!(
            ledger.process_export_task(log.id, "org-b"),
            Err(ValuationError::ExportLogNotFound(_))
        ));
    }

    #[test]
    fn test_list_is_newest_first_and_limited() {
        let f = fixture();
        let ledger = ledger(&f, Arc::new(JsonReportRenderer), EngineConfig::default());
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(ledger.log_export(&actor(), request(f.valuation_id)).unwrap().id);
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let listed = ledger.list_export_logs(f.valuation_id, "org-a", Some(2)).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, ids[2]);
        assert_eq!(listed[1].id, ids[1]);
    }
}
