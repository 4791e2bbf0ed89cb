//! Read-only projections over stored submissions for review queues and reporting.
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

use super::error::WorkflowError;
use super::identity::{Operation, Principal, Role, authorize};
use super::ids::{EntityId, EntityKind, ProductId, RegionId, UserId};
use super::ledger::{self, PeriodSummary};
use super::money::Money;
use super::period::{Period, TimeStamp};
use super::report::{ReportState, VisitReport};
use super::service::ActivityService;
use super::sheet::{ExpenseSheet, SheetState};
use super::store::{Record, Repository};
use super::workflow::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Report(ReportState),
    Sheet(SheetState),
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionState::Report(state) => write!(f, "{state}"),
            SubmissionState::Sheet(state) => write!(f, "{state}"),
        }
    }
}

/// A line of a review queue. Built on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewQueueEntry {
    pub kind: EntityKind,
    pub id: EntityId,
    pub owner: UserId,
    pub period: Period,
    pub state: SubmissionState,
    /// The transition the entry is waiting for; `None` once it is settled.
    pub due: Option<Action>,
    /// Computed default for sheets awaiting validation, validated amount afterwards.
    pub suggested_amount: Option<Money>,
    pub submitted_at: Option<TimeStamp<Utc>>,
}

/// Who a listing may show.
enum Scope {
    Own(UserId),
    Region(Option<RegionId>),
    Everyone,
}

impl Scope {
    fn of(actor: &Principal) -> Self {
        match actor.role {
            Role::RegionalManager => Scope::Region(actor.region.clone()),
            Role::Accountant => Scope::Everyone,
            Role::Representative | Role::Administrator => Scope::Own(actor.id.clone()),
        }
    }
}

fn due_action(state: SubmissionState) -> Option<Action> {
    match state {
        SubmissionState::Report(ReportState::Created)
        | SubmissionState::Sheet(SheetState::Created) => Some(Action::Validate),
        SubmissionState::Report(ReportState::Validated)
        | SubmissionState::Sheet(SheetState::Validated) => Some(Action::Reimburse),
        _ => None,
    }
}

impl<S> ActivityService<S>
where
    S: Repository<VisitReport> + Repository<ExpenseSheet>,
{
    /// Submissions of `period` awaiting validation or reimbursement that the actor
    /// may see. Representatives only get their own.
    pub fn list_pending(
        &self,
        actor: &Principal,
        period: Period,
    ) -> Result<Vec<ReviewQueueEntry>, WorkflowError> {
        authorize(actor, Operation::ReviewQueue, None)?;
        let scope = Scope::of(actor);

        let mut entries = vec![];
        for report in self.in_scope::<VisitReport>(&scope, period)? {
            let state = SubmissionState::Report(report.state());
            if let Some(due) = due_action(state) {
                entries.push(entry(&report, state, Some(due), None));
            }
        }
        for sheet in self.in_scope::<ExpenseSheet>(&scope, period)? {
            let state = SubmissionState::Sheet(sheet.state());
            if let Some(due) = due_action(state) {
                let suggested = self.suggested_amount(&sheet)?;
                entries.push(entry(&sheet, state, Some(due), suggested));
            }
        }
        entries.sort_by_key(submission_order);

        debug!(actor = %actor.id, period = %period, count = entries.len(), "review queue listed");
        Ok(entries)
    }

    /// Everything the actor owns in `period`, whatever its state.
    pub fn list_owned(
        &self,
        actor: &Principal,
        period: Period,
    ) -> Result<Vec<ReviewQueueEntry>, WorkflowError> {
        authorize(actor, Operation::ListOwned, None)?;
        let scope = Scope::Own(actor.id.clone());

        let mut entries = vec![];
        for report in self.in_scope::<VisitReport>(&scope, period)? {
            let state = SubmissionState::Report(report.state());
            entries.push(entry(&report, state, due_action(state), None));
        }
        for sheet in self.in_scope::<ExpenseSheet>(&scope, period)? {
            let state = SubmissionState::Sheet(sheet.state());
            entries.push(entry(&sheet, state, due_action(state), sheet.validated_amount()));
        }
        entries.sort_by_key(submission_order);
        Ok(entries)
    }

    pub fn period_summary(
        &self,
        actor: &Principal,
        period: Period,
    ) -> Result<PeriodSummary, WorkflowError> {
        authorize(actor, Operation::Reporting, None)?;
        let sheets = self.in_scope::<ExpenseSheet>(&Scope::of(actor), period)?;
        Ok(ledger::summarize(&sheets))
    }

    /// Samples handed out per product during `period`.
    pub fn sample_report(
        &self,
        actor: &Principal,
        period: Period,
    ) -> Result<BTreeMap<ProductId, u64>, WorkflowError> {
        authorize(actor, Operation::Reporting, None)?;
        let reports = self.in_scope::<VisitReport>(&Scope::of(actor), period)?;
        Ok(ledger::sample_traceability(&reports))
    }

    fn in_scope<R: Record>(&self, scope: &Scope, period: Period) -> Result<Vec<R>, WorkflowError>
    where
        S: Repository<R>,
    {
        let records = Repository::<R>::scan(self.store.as_ref())?;
        let mut regions: HashMap<UserId, Option<RegionId>> = HashMap::new();

        let mut kept = vec![];
        for record in records {
            if record.period() != period {
                continue;
            }
            let visible = match scope {
                Scope::Everyone => true,
                Scope::Own(owner) => record.owner() == owner,
                // a manager without a region oversees nobody
                Scope::Region(None) => false,
                Scope::Region(Some(region)) => {
                    let owner_region = match regions.get(record.owner()) {
                        Some(cached) => cached.clone(),
                        None => {
                            let resolved = self
                                .directory
                                .resolve(record.owner())?
                                .and_then(|principal| principal.region);
                            regions.insert(record.owner().clone(), resolved.clone());
                            resolved
                        }
                    };
                    owner_region.as_ref() == Some(region)
                }
            };
            if visible {
                kept.push(record);
            }
        }
        Ok(kept)
    }

    fn suggested_amount(&self, sheet: &ExpenseSheet) -> Result<Option<Money>, WorkflowError> {
        if sheet.state() != SheetState::Created {
            return Ok(sheet.validated_amount());
        }
        match ledger::compute_default_total(sheet, self.catalog.as_ref()) {
            Ok(total) => Ok(Some(total)),
            // a tariff withdrawn from the catalog leaves the reviewer to enter the figure
            Err(WorkflowError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn submission_order(entry: &ReviewQueueEntry) -> Option<DateTime<Utc>> {
    entry.submitted_at.as_ref().map(TimeStamp::to_datetime_utc)
}

fn entry<R: Record>(
    record: &R,
    state: SubmissionState,
    due: Option<Action>,
    suggested_amount: Option<Money>,
) -> ReviewQueueEntry {
    ReviewQueueEntry {
        kind: R::KIND,
        id: record.id().clone(),
        owner: record.owner().clone(),
        period: record.period(),
        state,
        due,
        suggested_amount,
        submitted_at: record.submitted_at().cloned(),
    }
}
