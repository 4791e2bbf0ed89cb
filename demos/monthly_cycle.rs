//! One month of field activity, from submission to reimbursement.
//!
//! Run with `ACTIVITY_APPROVAL_DB=/tmp/cycle.db` to choose where sled writes.

use std::sync::Arc;

use activity_approval::{
    ActivityService, CalendarDay, Catalog, Directory, ExpenseSheetDraft, IdentityResolver, Impact,
    MemoryCatalog, Money, Period, Principal, ReasonCode, RegionId, Role, Settings, SledStore,
    UserId, VisitReportDraft, init_tracing, store::Record,
};
use anyhow::Context;
use rust_decimal::Decimal;
use tracing::info;

fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env();
    init_tracing(&settings);

    let store = SledStore::open(&settings.db_path)
        .with_context(|| format!("opening {}", settings.db_path.display()))?;

    let catalog = MemoryCatalog::new()
        .with_doctor("dr_martin")
        .with_product("cardiolex")
        .with_product("respirol")
        .with_tariff("ETP", Money::from_cents(11000))
        .with_tariff("KM", Money::from_cents(62))
        .with_tariff("NUI", Money::from_cents(8000))
        .with_tariff("REP", Money::from_cents(2500));

    let rep = Principal::new(UserId::generate()?, Role::Representative)
        .in_region(RegionId::new("north"));
    let manager = Principal::new(UserId::generate()?, Role::RegionalManager)
        .in_region(RegionId::new("north"));
    let accountant = Principal::new(UserId::generate()?, Role::Accountant);

    let directory = Directory::new();
    directory.register(rep.clone())?;
    directory.register(manager.clone())?;
    directory.register(accountant.clone())?;

    let service = ActivityService::new(
        Arc::new(store),
        Arc::new(catalog) as Arc<dyn Catalog>,
        Arc::new(directory) as Arc<dyn IdentityResolver>,
    );

    let period = Period::of(CalendarDay::from(chrono::Utc::now().date_naive()));
    let day = |d: u32| {
        CalendarDay::from_ymd(period.year(), period.month(), d).context("invalid day of month")
    };

    let visit = VisitReportDraft::new()
        .set_visit_date(day(3)?)
        .set_reason(ReasonCode::Relaunch)
        .set_narrative("Presented the new dosage guidelines and left samples")
        .set_doctor("dr_martin")
        .set_impact(Impact::High)
        .present_product("cardiolex")
        .present_product("respirol")
        .offer_sample("cardiolex", 6);
    let report = service.create_visit_report(&visit, &rep)?;

    let sheet = ExpenseSheetDraft::new()
        .set_period(period)
        .set_flat_rate("KM", 240)
        .set_flat_rate("REP", 3)
        .set_flat_rate("NUI", 1)
        .add_itemized("Parking", day(3)?, Decimal::new(1230, 2));
    // fails on a second run against the same database: one sheet per month
    let sheet = service
        .create_expense_sheet(&sheet, &rep)
        .context("filing this month's expense sheet")?;

    for entry in service.list_pending(&manager, period)? {
        info!(
            kind = %entry.kind,
            id = %entry.id,
            state = %entry.state,
            suggested = ?entry.suggested_amount.map(|m| m.to_string()),
            "awaiting review"
        );
    }

    service.validate_visit_report(report.id(), &manager)?;
    let suggested = service.suggested_total(sheet.id(), &accountant)?;
    let sheet = service.validate_expense_sheet(sheet.id(), &accountant, 4, None)?;
    let sheet = service.reimburse_expense_sheet(sheet.id(), &accountant)?;

    let summary = service.period_summary(&accountant, period)?;
    let samples = service.sample_report(&accountant, period)?;
    info!(
        %period,
        %suggested,
        reimbursed = %summary.reimbursed_total,
        state = %sheet.state(),
        samples = ?samples,
        "month settled"
    );
    Ok(())
}
