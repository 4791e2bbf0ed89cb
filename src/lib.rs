pub mod catalog;
pub mod config;
pub mod error;
pub mod identity;
pub mod ids;
pub mod ledger;
pub mod money;
pub mod period;
pub mod query;
pub mod report;
pub mod service;
pub mod sheet;
pub mod store;
pub mod witness;
pub mod workflow;

pub use catalog::{Catalog, MemoryCatalog};
pub use config::Settings;
pub use error::{CollaboratorError, ParseMoneyError, StoreError, ValidationRule, WorkflowError};
pub use identity::{Directory, IdentityResolver, Operation, Principal, Role};
pub use ids::{DoctorId, EntityId, EntityKind, ExpenseTypeId, ProductId, RegionId, UserId};
pub use money::Money;
pub use period::{CalendarDay, Period, TimeStamp};
pub use query::{ReviewQueueEntry, SubmissionState};
pub use report::{Impact, ReasonCode, ReportState, VisitReport, VisitReportDraft};
pub use service::ActivityService;
pub use sheet::{ExpenseSheet, ExpenseSheetDraft, SheetState};
pub use store::{Repository, SledStore};

use tracing_subscriber::EnvFilter;

/// Installs a formatting subscriber filtered by `settings.log_filter`.
/// Later calls are no-ops, so tests and binaries may both call it.
pub fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_new(&settings.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
