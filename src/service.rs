//! Service layer API for submission and approval operations
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use super::catalog::Catalog;
use super::error::{StoreError, ValidationRule, WorkflowError};
use super::identity::{IdentityResolver, Operation, Principal, Role, authorize, authorize_owner};
use super::ids::{EntityId, EntityKind};
use super::ledger;
use super::money::Money;
use super::period::TimeStamp;
use super::report::{VisitReport, VisitReportDraft};
use super::sheet::{self, ExpenseSheet, ExpenseSheetDraft};
use super::store::{Record, Repository, SledStore, Swap};
use super::witness::WitnessType;
use super::workflow::{self, Action, Lifecycle};

pub struct ActivityService<S = SledStore> {
    pub(crate) store: Arc<S>,
    pub(crate) catalog: Arc<dyn Catalog>,
    pub(crate) directory: Arc<dyn IdentityResolver>,
}

impl<S> ActivityService<S>
where
    S: Repository<VisitReport> + Repository<ExpenseSheet>,
{
    pub fn new(
        store: Arc<S>,
        catalog: Arc<dyn Catalog>,
        directory: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            store,
            catalog,
            directory,
        }
    }

    pub(crate) fn load<R: Record>(
        &self,
        id: &EntityId,
        actor: &Principal,
    ) -> Result<R, WorkflowError>
    where
        S: Repository<R>,
    {
        Repository::<R>::get(self.store.as_ref(), id)?
            .ok_or_else(|| WorkflowError::not_found(R::KIND.label(), id).by(actor.role))
    }

    /// Writes `next` over `current`; losing a race is reported against the state
    /// the winner left behind. An edit that lost to a transition is refused the
    /// same way as one attempted after it.
    fn commit<R: Record>(
        &self,
        current: &R,
        next: &R,
        actor: &Principal,
        operation: Operation,
    ) -> Result<(), WorkflowError>
    where
        S: Repository<R>,
    {
        let swap = Repository::<R>::compare_and_swap_state(
            self.store.as_ref(),
            current.id(),
            current.state(),
            current.version(),
            next,
        )?;
        match swap {
            Swap::Applied => Ok(()),
            Swap::Stale(Some(winner)) => {
                if operation.is_edit() {
                    workflow::ensure_editable(&winner, actor, operation)?;
                }
                Err(WorkflowError::InvalidStateTransition {
                    entity: current.id().clone(),
                    role: actor.role,
                    operation,
                    state: winner.state().to_string(),
                })
            }
            Swap::Stale(None) => {
                Err(WorkflowError::not_found(R::KIND.label(), current.id()).by(actor.role))
            }
        }
    }

    fn advance<R: Record>(
        &self,
        id: &EntityId,
        actor: &Principal,
        action: Action,
        witness_type: WitnessType,
    ) -> Result<R, WorkflowError>
    where
        S: Repository<R>,
    {
        let current: R = self.load(id, actor)?;
        let next = workflow::transition(&current, actor, action, TimeStamp::new(), witness_type)?;
        self.commit(&current, &next, actor, action.operation())?;

        info!(
            kind = %R::KIND,
            id = %id,
            actor = %actor.id,
            role = %actor.role,
            state = %next.state(),
            "transition committed"
        );
        Ok(next)
    }

    /// Create a new visit report in state `Created`
    pub fn create_visit_report(
        &self,
        draft: &VisitReportDraft,
        actor: &Principal,
    ) -> Result<VisitReport, WorkflowError> {
        ensure_representative(actor)?;
        let details = draft
            .validate_and_finalise(self.catalog.as_ref(), None)
            .map_err(|e| e.by(actor.role))?;

        let id = EntityId::generate(EntityKind::VisitReport)?;
        let report = VisitReport::new(id, actor, details, TimeStamp::new())?;
        Repository::<VisitReport>::create(self.store.as_ref(), &report).map_err(|e| match e {
            StoreError::Duplicate(key) => {
                WorkflowError::Internal(format!("generated id {key} already exists"))
            }
            other => other.into(),
        })?;

        info!(id = %report.id(), actor = %actor.id, "visit report created");
        Ok(report)
    }

    pub fn update_visit_report(
        &self,
        id: &EntityId,
        draft: &VisitReportDraft,
        actor: &Principal,
    ) -> Result<VisitReport, WorkflowError> {
        let current: VisitReport = self.load(id, actor)?;
        authorize_owner(actor, current.owner(), Operation::EditVisitReport, id)?;
        workflow::ensure_editable(&current, actor, Operation::EditVisitReport)?;

        let details = draft
            .validate_and_finalise(self.catalog.as_ref(), Some(id))
            .map_err(|e| e.by(actor.role))?;
        let next = current.revised(details, actor, TimeStamp::new())?;
        self.commit(&current, &next, actor, Operation::EditVisitReport)?;

        info!(id = %id, actor = %actor.id, "visit report updated");
        Ok(next)
    }

    /// Owners may withdraw a report until it has been validated. A report that
    /// has already moved on is no longer in a state deletion is defined for.
    pub fn delete_visit_report(&self, id: &EntityId, actor: &Principal) -> Result<(), WorkflowError> {
        let current: VisitReport = self.load(id, actor)?;
        authorize_owner(actor, current.owner(), Operation::DeleteVisitReport, id)?;
        if !current.state().is_editable() {
            return Err(WorkflowError::InvalidStateTransition {
                entity: id.clone(),
                role: actor.role,
                operation: Operation::DeleteVisitReport,
                state: current.state().to_string(),
            });
        }

        let swap = Repository::<VisitReport>::delete_if(
            self.store.as_ref(),
            id,
            current.state(),
            current.version(),
        )?;
        match swap {
            Swap::Applied => {
                info!(id = %id, actor = %actor.id, "visit report deleted");
                Ok(())
            }
            Swap::Stale(Some(winner)) => Err(WorkflowError::InvalidStateTransition {
                entity: id.clone(),
                role: actor.role,
                operation: Operation::DeleteVisitReport,
                state: winner.state().to_string(),
            }),
            Swap::Stale(None) => {
                Err(WorkflowError::not_found(EntityKind::VisitReport.label(), id).by(actor.role))
            }
        }
    }

    pub fn validate_visit_report(
        &self,
        id: &EntityId,
        actor: &Principal,
    ) -> Result<VisitReport, WorkflowError> {
        let witness_type = WitnessType::Validated {
            justification_count: None,
            validated_amount: None,
        };
        self.advance(id, actor, Action::Validate, witness_type)
            .inspect_err(|e| warn!(id = %id, actor = %actor.id, error = %e, "validate rejected"))
    }

    pub fn reimburse_visit_report(
        &self,
        id: &EntityId,
        actor: &Principal,
    ) -> Result<VisitReport, WorkflowError> {
        self.advance(id, actor, Action::Reimburse, WitnessType::Reimbursed)
            .inspect_err(|e| warn!(id = %id, actor = %actor.id, error = %e, "reimburse rejected"))
    }

    /// Create the actor's expense sheet for a month; one per month.
    pub fn create_expense_sheet(
        &self,
        draft: &ExpenseSheetDraft,
        actor: &Principal,
    ) -> Result<ExpenseSheet, WorkflowError> {
        ensure_representative(actor)?;
        let (period, content) = draft
            .validate_and_finalise(self.catalog.as_ref(), None)
            .map_err(|e| e.by(actor.role))?;

        let id = EntityId::generate(EntityKind::ExpenseSheet)?;
        let sheet = ExpenseSheet::new(id, actor, period, content, TimeStamp::new())?;
        Repository::<ExpenseSheet>::create(self.store.as_ref(), &sheet).map_err(|e| match e {
            StoreError::Duplicate(_) => WorkflowError::validation(
                None,
                ValidationRule::DuplicateSheet {
                    owner: actor.id.clone(),
                    period,
                },
            )
            .by(actor.role),
            other => other.into(),
        })?;

        info!(id = %sheet.id(), actor = %actor.id, period = %period, "expense sheet created");
        Ok(sheet)
    }

    pub fn update_expense_sheet(
        &self,
        id: &EntityId,
        draft: &ExpenseSheetDraft,
        actor: &Principal,
    ) -> Result<ExpenseSheet, WorkflowError> {
        let current: ExpenseSheet = self.load(id, actor)?;
        authorize_owner(actor, current.owner(), Operation::EditExpenseSheet, id)?;
        workflow::ensure_editable(&current, actor, Operation::EditExpenseSheet)?;

        // the month is the sheet's identity for its owner
        let draft = match draft.period() {
            None => draft.clone().set_period(current.period()),
            Some(period) if period == current.period() => draft.clone(),
            Some(period) => {
                return Err(WorkflowError::validation(
                    Some(id),
                    ValidationRule::PeriodChange {
                        from: current.period(),
                        to: period,
                    },
                )
                .by(actor.role));
            }
        };
        let (_, content) = draft
            .validate_and_finalise(self.catalog.as_ref(), Some(id))
            .map_err(|e| e.by(actor.role))?;
        let next = current.revised(content, actor, TimeStamp::new())?;
        self.commit(&current, &next, actor, Operation::EditExpenseSheet)?;

        info!(id = %id, actor = %actor.id, "expense sheet updated");
        Ok(next)
    }

    /// Default figure offered to the reviewer before validating.
    pub fn suggested_total(&self, id: &EntityId, actor: &Principal) -> Result<Money, WorkflowError> {
        authorize(actor, Operation::SuggestTotal, Some(id))?;
        let sheet: ExpenseSheet = self.load(id, actor)?;
        ledger::compute_default_total(&sheet, self.catalog.as_ref()).map_err(|e| e.by(actor.role))
    }

    /// Validates a sheet with the reviewer's figures. Without an explicit amount
    /// the computed default is what gets recorded.
    pub fn validate_expense_sheet(
        &self,
        id: &EntityId,
        actor: &Principal,
        justification_count: u32,
        validated_amount: Option<Decimal>,
    ) -> Result<ExpenseSheet, WorkflowError> {
        self.validate_sheet_inner(id, actor, justification_count, validated_amount)
            .inspect_err(|e| warn!(id = %id, actor = %actor.id, error = %e, "validate rejected"))
    }

    fn validate_sheet_inner(
        &self,
        id: &EntityId,
        actor: &Principal,
        justification_count: u32,
        validated_amount: Option<Decimal>,
    ) -> Result<ExpenseSheet, WorkflowError> {
        let current: ExpenseSheet = self.load(id, actor)?;
        workflow::plan(actor, id, current.state(), Action::Validate)?;

        let amount = match validated_amount {
            Some(amount) => sheet::checked_amount(Some(id), "validated amount", amount),
            None => ledger::compute_default_total(&current, self.catalog.as_ref()),
        }
        .map_err(|e| e.by(actor.role))?;

        let mut next = workflow::transition(
            &current,
            actor,
            Action::Validate,
            TimeStamp::<Utc>::new(),
            WitnessType::Validated {
                justification_count: Some(justification_count),
                validated_amount: Some(amount),
            },
        )?;
        next.record_validation(justification_count, amount);
        self.commit(&current, &next, actor, Operation::Validate)?;

        info!(
            id = %id,
            actor = %actor.id,
            role = %actor.role,
            justification_count,
            validated_amount = %amount,
            "expense sheet validated"
        );
        Ok(next)
    }

    pub fn reimburse_expense_sheet(
        &self,
        id: &EntityId,
        actor: &Principal,
    ) -> Result<ExpenseSheet, WorkflowError> {
        self.advance(id, actor, Action::Reimburse, WitnessType::Reimbursed)
            .inspect_err(|e| warn!(id = %id, actor = %actor.id, error = %e, "reimburse rejected"))
    }

    /// Administrative closure, from `Created` or `Validated`.
    pub fn close_expense_sheet(
        &self,
        id: &EntityId,
        actor: &Principal,
    ) -> Result<ExpenseSheet, WorkflowError> {
        self.advance(id, actor, Action::Close, WitnessType::Closed)
            .inspect_err(|e| warn!(id = %id, actor = %actor.id, error = %e, "close rejected"))
    }
}

fn ensure_representative(actor: &Principal) -> Result<(), WorkflowError> {
    if actor.role == Role::Representative {
        return Ok(());
    }
    Err(WorkflowError::validation(None, ValidationRule::RepresentativeOnly).by(actor.role))
}
