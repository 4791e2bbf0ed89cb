mod common;

use std::sync::Arc;

use activity_approval::{
    ActivityService, Catalog, CollaboratorError, Directory, DoctorId, EntityId, EntityKind,
    ExpenseTypeId, IdentityResolver, Money, Operation, Period, Principal, ProductId, ReportState,
    Role, SheetState, SledStore, SubmissionState, UserId, ValidationRule, WorkflowError,
    store::Record, witness, workflow::Action,
};
use anyhow::Context;
use common::{fixture, march, sheet_draft, visit_draft};
use rust_decimal::Decimal;
use tempfile::tempdir;

fn rule_of<T: std::fmt::Debug>(result: Result<T, WorkflowError>) -> ValidationRule {
    match result {
        Err(WorkflowError::Validation { rule, .. }) => rule,
        other => panic!("expected a validation error, got {other:?}"),
    }
}

#[test]
fn visit_report_is_validated_by_accountant_only() -> anyhow::Result<()> {
    let f = fixture()?;

    let report = f
        .service
        .create_visit_report(&visit_draft(), &f.rep)
        .context("report failed on create: ")?;
    assert_eq!(report.state(), ReportState::Created);
    assert_eq!(report.details().presented_products.len(), 2);

    let report = f.service.validate_visit_report(report.id(), &f.accountant)?;
    assert_eq!(report.state(), ReportState::Validated);

    assert!(matches!(
        f.service.validate_visit_report(report.id(), &f.rep),
        Err(WorkflowError::Forbidden { .. })
    ));
    Ok(())
}

#[test]
fn default_total_is_suggested_and_persisted_when_not_overridden() -> anyhow::Result<()> {
    let f = fixture()?;
    let sheet = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;

    let suggested = f.service.suggested_total(sheet.id(), &f.accountant)?;
    assert_eq!(suggested, Money::from_cents(1730));

    let sheet = f
        .service
        .validate_expense_sheet(sheet.id(), &f.accountant, 2, None)?;
    assert_eq!(sheet.state(), SheetState::Validated);
    assert_eq!(sheet.validated_amount(), Some(Money::from_cents(1730)));
    assert_eq!(sheet.justification_count(), 2);
    Ok(())
}

#[test]
fn reviewer_amount_overrides_the_computed_total() -> anyhow::Result<()> {
    let f = fixture()?;
    let sheet = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;

    let sheet = f.service.validate_expense_sheet(
        sheet.id(),
        &f.manager,
        1,
        Some(Decimal::new(1500, 2)),
    )?;
    assert_eq!(sheet.validated_amount(), Some(Money::from_cents(1500)));

    let figures = witness::validated_figures(sheet.history());
    assert_eq!(figures, Some((Some(1), Some(Money::from_cents(1500)))));
    assert!(witness::chain_is_intact(sheet.history()));
    Ok(())
}

#[test]
fn validated_amount_must_be_non_negative_with_two_decimals() -> anyhow::Result<()> {
    let f = fixture()?;
    let sheet = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;

    assert!(matches!(
        rule_of(f.service.validate_expense_sheet(
            sheet.id(),
            &f.accountant,
            0,
            Some(Decimal::new(-100, 2))
        )),
        ValidationRule::NegativeAmount { .. }
    ));
    assert!(matches!(
        rule_of(f.service.validate_expense_sheet(
            sheet.id(),
            &f.accountant,
            0,
            Some(Decimal::new(10005, 3))
        )),
        ValidationRule::ExcessPrecision { .. }
    ));

    // rejected figures leave the sheet untouched
    let listed = f.service.list_owned(&f.rep, march())?;
    assert_eq!(listed[0].state, SubmissionState::Sheet(SheetState::Created));
    Ok(())
}

#[test]
fn reimburse_requires_validation_first() -> anyhow::Result<()> {
    let f = fixture()?;
    let sheet = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;

    assert!(matches!(
        f.service.reimburse_expense_sheet(sheet.id(), &f.accountant),
        Err(WorkflowError::InvalidStateTransition { .. })
    ));

    f.service
        .validate_expense_sheet(sheet.id(), &f.accountant, 1, None)?;
    let sheet = f.service.reimburse_expense_sheet(sheet.id(), &f.accountant)?;
    assert_eq!(sheet.state(), SheetState::Reimbursed);
    Ok(())
}

#[test]
fn closed_sheet_accepts_no_further_transitions() -> anyhow::Result<()> {
    let f = fixture()?;
    let sheet = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;
    f.service
        .validate_expense_sheet(sheet.id(), &f.accountant, 1, None)?;

    let sheet = f.service.close_expense_sheet(sheet.id(), &f.admin)?;
    assert_eq!(sheet.state(), SheetState::Closed);

    assert!(matches!(
        f.service
            .validate_expense_sheet(sheet.id(), &f.accountant, 1, None),
        Err(WorkflowError::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        f.service.reimburse_expense_sheet(sheet.id(), &f.accountant),
        Err(WorkflowError::InvalidStateTransition { .. })
    ));
    Ok(())
}

#[test]
fn validating_twice_is_rejected_deterministically() -> anyhow::Result<()> {
    let f = fixture()?;
    let report = f.service.create_visit_report(&visit_draft(), &f.rep)?;

    f.service.validate_visit_report(report.id(), &f.accountant)?;
    match f.service.validate_visit_report(report.id(), &f.manager) {
        Err(WorkflowError::InvalidStateTransition { state, .. }) => {
            assert_eq!(state, "validated")
        }
        other => panic!("expected an invalid transition, got {other:?}"),
    }
    Ok(())
}

#[test]
fn representatives_are_forbidden_every_review_action() -> anyhow::Result<()> {
    let f = fixture()?;
    let sheet = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;

    assert!(matches!(
        f.service.validate_expense_sheet(sheet.id(), &f.rep, 0, None),
        Err(WorkflowError::Forbidden { .. })
    ));
    assert!(matches!(
        f.service.reimburse_expense_sheet(sheet.id(), &f.rep),
        Err(WorkflowError::Forbidden { .. })
    ));
    assert!(matches!(
        f.service.close_expense_sheet(sheet.id(), &f.rep),
        Err(WorkflowError::Forbidden { .. })
    ));
    // reviewers do not close
    assert!(matches!(
        f.service.close_expense_sheet(sheet.id(), &f.accountant),
        Err(WorkflowError::Forbidden { .. })
    ));
    Ok(())
}

#[test]
fn only_representatives_submit() -> anyhow::Result<()> {
    let f = fixture()?;
    assert_eq!(
        rule_of(f.service.create_visit_report(&visit_draft(), &f.accountant)),
        ValidationRule::RepresentativeOnly
    );
    assert_eq!(
        rule_of(f.service.create_expense_sheet(&sheet_draft(), &f.admin)),
        ValidationRule::RepresentativeOnly
    );
    Ok(())
}

#[test]
fn one_sheet_per_owner_and_month() -> anyhow::Result<()> {
    let f = fixture()?;
    f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;

    assert!(matches!(
        rule_of(f.service.create_expense_sheet(&sheet_draft(), &f.rep)),
        ValidationRule::DuplicateSheet { .. }
    ));

    // another owner, or another month, is fine
    f.service.create_expense_sheet(&sheet_draft(), &f.rep_south)?;
    let april = sheet_draft().set_period(Period::new(2024, 4)?);
    f.service.create_expense_sheet(&april, &f.rep)?;
    Ok(())
}

#[test]
fn report_product_count_is_enforced() -> anyhow::Result<()> {
    let f = fixture()?;

    let three = visit_draft().present_product("prod_c");
    assert_eq!(
        rule_of(f.service.create_visit_report(&three, &f.rep)),
        ValidationRule::ProductCount(3)
    );
    Ok(())
}

#[test]
fn owner_edits_report_until_validated() -> anyhow::Result<()> {
    let f = fixture()?;
    let report = f.service.create_visit_report(&visit_draft(), &f.rep)?;

    let edited = visit_draft().set_doctor("doc_2");
    let report = f.service.update_visit_report(report.id(), &edited, &f.rep)?;
    assert_eq!(report.details().doctor, DoctorId::new("doc_2"));
    assert_eq!(report.version(), 2);

    assert!(matches!(
        f.service
            .update_visit_report(report.id(), &edited, &f.rep_south),
        Err(WorkflowError::Forbidden { .. })
    ));

    f.service.validate_visit_report(report.id(), &f.accountant)?;
    match f.service.update_visit_report(report.id(), &edited, &f.rep) {
        Err(WorkflowError::Forbidden {
            actor, operation, ..
        }) => {
            assert_eq!(actor, f.rep.id);
            assert_eq!(operation, Operation::EditVisitReport);
        }
        other => panic!("expected the edit to be forbidden, got {other:?}"),
    }
    Ok(())
}

#[test]
fn sheet_edits_keep_the_month() -> anyhow::Result<()> {
    let f = fixture()?;
    let sheet = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;

    let more_km = sheet_draft().set_flat_rate("km", 40);
    let sheet = f.service.update_expense_sheet(sheet.id(), &more_km, &f.rep)?;
    assert_eq!(
        sheet.content().flat_rate_lines.get(&ExpenseTypeId::new("km")),
        Some(&40)
    );

    // administrators may correct someone else's sheet
    let nights = sheet_draft().set_flat_rate("nui", 1);
    let sheet = f.service.update_expense_sheet(sheet.id(), &nights, &f.admin)?;
    assert_eq!(sheet.owner(), &f.rep.id);

    let moved = sheet_draft().set_period(Period::new(2024, 4)?);
    assert!(matches!(
        rule_of(f.service.update_expense_sheet(sheet.id(), &moved, &f.rep)),
        ValidationRule::PeriodChange { .. }
    ));
    Ok(())
}

#[test]
fn validated_sheet_is_no_longer_editable() -> anyhow::Result<()> {
    let f = fixture()?;
    let sheet = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;
    f.service
        .validate_expense_sheet(sheet.id(), &f.accountant, 2, None)?;

    let more_km = sheet_draft().set_flat_rate("km", 40);
    for editor in [&f.rep, &f.admin] {
        match f.service.update_expense_sheet(sheet.id(), &more_km, editor) {
            Err(WorkflowError::Forbidden {
                role, operation, ..
            }) => {
                assert_eq!(role, editor.role);
                assert_eq!(operation, Operation::EditExpenseSheet);
            }
            other => panic!("expected the edit to be forbidden, got {other:?}"),
        }
    }

    let stored = f.service.list_owned(&f.rep, march())?;
    assert_eq!(stored[0].suggested_amount, Some(Money::from_cents(1730)));
    Ok(())
}

#[test]
fn rejections_carry_the_acting_role() -> anyhow::Result<()> {
    let f = fixture()?;
    let sheet = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;

    match f.service.validate_expense_sheet(
        sheet.id(),
        &f.accountant,
        1,
        Some(Decimal::new(-100, 2)),
    ) {
        Err(WorkflowError::Validation { entity, role, rule }) => {
            assert_eq!(entity.as_ref(), Some(sheet.id()));
            assert_eq!(role, Some(Role::Accountant));
            assert!(matches!(rule, ValidationRule::NegativeAmount { .. }));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }

    let duplicate = f.service.create_expense_sheet(&sheet_draft(), &f.rep);
    assert_eq!(duplicate.err().and_then(|e| e.role()), Some(Role::Representative));

    let unknown = EntityId::new("sheet_1missing");
    match f.service.reimburse_expense_sheet(&unknown, &f.manager) {
        Err(WorkflowError::NotFound { role, .. }) => {
            assert_eq!(role, Some(Role::RegionalManager))
        }
        other => panic!("expected not found, got {other:?}"),
    }
    Ok(())
}

#[test]
fn owner_deletes_report_while_created() -> anyhow::Result<()> {
    let f = fixture()?;
    let report = f.service.create_visit_report(&visit_draft(), &f.rep)?;

    assert!(matches!(
        f.service.delete_visit_report(report.id(), &f.rep_south),
        Err(WorkflowError::Forbidden { .. })
    ));
    f.service.delete_visit_report(report.id(), &f.rep)?;

    assert!(matches!(
        f.service.validate_visit_report(report.id(), &f.accountant),
        Err(WorkflowError::NotFound { .. })
    ));

    let validated = f.service.create_visit_report(&visit_draft(), &f.rep)?;
    f.service
        .validate_visit_report(validated.id(), &f.accountant)?;
    assert!(matches!(
        f.service.delete_visit_report(validated.id(), &f.rep),
        Err(WorkflowError::InvalidStateTransition { .. })
    ));
    Ok(())
}

#[test]
fn review_queue_is_scoped_by_role() -> anyhow::Result<()> {
    let f = fixture()?;
    let north = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;
    let south = f.service.create_expense_sheet(&sheet_draft(), &f.rep_south)?;
    let report = f.service.create_visit_report(&visit_draft(), &f.rep)?;
    f.service.validate_visit_report(report.id(), &f.accountant)?;

    let all = f.service.list_pending(&f.accountant, march())?;
    assert_eq!(all.len(), 3);

    let managed = f.service.list_pending(&f.manager, march())?;
    assert_eq!(managed.len(), 2);
    assert!(managed.iter().all(|entry| entry.owner == f.rep.id));
    let sheet_entry = managed
        .iter()
        .find(|entry| entry.id == *north.id())
        .context("north sheet missing from the manager's queue")?;
    assert_eq!(sheet_entry.due, Some(Action::Validate));
    assert_eq!(sheet_entry.suggested_amount, Some(Money::from_cents(1730)));
    let report_entry = managed
        .iter()
        .find(|entry| entry.kind == EntityKind::VisitReport)
        .context("report missing from the manager's queue")?;
    assert_eq!(report_entry.due, Some(Action::Reimburse));

    let own = f.service.list_pending(&f.rep_south, march())?;
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].id, *south.id());

    assert!(matches!(
        f.service.list_pending(&f.admin, march()),
        Err(WorkflowError::Forbidden { .. })
    ));
    assert!(f.service.list_pending(&f.accountant, Period::new(2023, 12)?)?.is_empty());
    Ok(())
}

#[test]
fn settled_submissions_leave_the_queue() -> anyhow::Result<()> {
    let f = fixture()?;
    let sheet = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;
    f.service
        .validate_expense_sheet(sheet.id(), &f.accountant, 1, None)?;
    f.service.reimburse_expense_sheet(sheet.id(), &f.accountant)?;

    assert!(f.service.list_pending(&f.accountant, march())?.is_empty());

    let owned = f.service.list_owned(&f.rep, march())?;
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].due, None);
    assert_eq!(owned[0].suggested_amount, Some(Money::from_cents(1730)));
    Ok(())
}

#[test]
fn period_reporting_for_reviewers() -> anyhow::Result<()> {
    let f = fixture()?;
    let sheet = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;
    f.service
        .validate_expense_sheet(sheet.id(), &f.accountant, 3, None)?;
    f.service.create_expense_sheet(&sheet_draft(), &f.rep_south)?;
    f.service.create_visit_report(&visit_draft(), &f.rep)?;
    f.service.create_visit_report(&visit_draft(), &f.rep_south)?;

    let summary = f.service.period_summary(&f.accountant, march())?;
    assert_eq!(summary.sheets, 2);
    assert_eq!(summary.awaiting_validation, 1);
    assert_eq!(summary.awaiting_reimbursement, 1);
    assert_eq!(summary.validated_total, Money::from_cents(1730));
    assert_eq!(summary.justifications, 3);

    let samples = f.service.sample_report(&f.accountant, march())?;
    assert_eq!(samples.get(&ProductId::new("prod_a")), Some(&8));

    let regional = f.service.sample_report(&f.manager, march())?;
    assert_eq!(regional.get(&ProductId::new("prod_a")), Some(&4));

    assert!(matches!(
        f.service.period_summary(&f.rep, march()),
        Err(WorkflowError::Forbidden { .. })
    ));
    Ok(())
}

#[test]
fn tariff_changes_move_the_suggestion_not_the_validated_amount() -> anyhow::Result<()> {
    let f = fixture()?;
    let sheet = f.service.create_expense_sheet(&sheet_draft(), &f.rep)?;
    let sheet = f
        .service
        .validate_expense_sheet(sheet.id(), &f.accountant, 1, None)?;

    f.catalog
        .set_tariff(ExpenseTypeId::new("km"), Money::from_cents(62))?;

    assert_eq!(
        f.service.suggested_total(sheet.id(), &f.accountant)?,
        Money::from_cents(1850)
    );
    let owned = f.service.list_owned(&f.rep, march())?;
    assert_eq!(owned[0].suggested_amount, Some(Money::from_cents(1730)));
    Ok(())
}

struct UnreachableCatalog;

impl Catalog for UnreachableCatalog {
    fn doctor_exists(&self, _: &DoctorId) -> Result<bool, CollaboratorError> {
        Err(CollaboratorError::new("catalog", "connection refused"))
    }
    fn product_exists(&self, _: &ProductId) -> Result<bool, CollaboratorError> {
        Err(CollaboratorError::new("catalog", "connection refused"))
    }
    fn tariff_for(&self, _: &ExpenseTypeId) -> Result<Option<Money>, CollaboratorError> {
        Err(CollaboratorError::new("catalog", "connection refused"))
    }
}

#[test]
fn unreachable_catalog_is_retryable() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let store = SledStore::open(temp_dir.path().join("unreachable.db"))?;
    let service = ActivityService::new(
        Arc::new(store),
        Arc::new(UnreachableCatalog) as Arc<dyn Catalog>,
        Arc::new(Directory::new()) as Arc<dyn IdentityResolver>,
    );
    let rep = Principal::new(UserId::new("rep_north"), Role::Representative);

    match service.create_visit_report(&visit_draft(), &rep) {
        Err(e @ WorkflowError::CollaboratorUnavailable { .. }) => assert!(e.is_retryable()),
        other => panic!("expected the catalog to be unavailable, got {other:?}"),
    }
    Ok(())
}
