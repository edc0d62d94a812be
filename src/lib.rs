//! Deterministic valuation and financial analysis engine for M&A deals
//!
//! - `kernel`: DCF, terminal values, sensitivity grid, Monte Carlo, GTM KPIs
//! - `aggregate`: valuation create/update/delete with derived metrics
//! - `multiples`: comparables and precedent-transaction summaries
//! - `scenario`: scenario ranges, tornado, simulation entry points
//! - `export`: export ledger, renderer contract and async runner
//! - `store`: tenant-scoped persistence and object-store contracts

pub mod aggregate;
pub mod config;
pub mod error;
pub mod export;
pub mod kernel;
pub mod model;
pub mod multiples;
pub mod scenario;
pub mod store;

pub use aggregate::ValuationService;
pub use config::{EngineConfig, InactiveExporterPolicy};
pub use error::{Result, ValuationError};
pub use export::{ExportLedger, ExportRequest, ReportRenderer, TokioTaskRunner, ValuationSnapshot};
pub use multiples::{MultiplesAnalyzer, SubjectMetrics};
pub use scenario::ScenarioCoordinator;
pub use store::{InMemoryObjectStore, InMemoryStore, ObjectStore, ValuationStore};
