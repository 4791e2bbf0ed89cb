#![allow(dead_code)]

use std::sync::Arc;

use activity_approval::{
    ActivityService, CalendarDay, Catalog, Directory, ExpenseSheetDraft, IdentityResolver,
    MemoryCatalog, Money, Period, Principal, ReasonCode, RegionId, Role, SledStore, UserId,
    VisitReportDraft,
};
use rust_decimal::Decimal;
use tempfile::{TempDir, tempdir};

/// A service over a throwaway sled database plus the cast of principals the
/// scenarios play with.
pub struct Fixture {
    // Sled locks its directory; every test gets its own and it is removed on drop.
    _dir: TempDir,
    pub service: ActivityService,
    pub catalog: Arc<MemoryCatalog>,
    pub rep: Principal,
    pub rep_south: Principal,
    pub manager: Principal,
    pub accountant: Principal,
    pub admin: Principal,
}

pub fn fixture() -> anyhow::Result<Fixture> {
    let dir = tempdir()?;
    let store = SledStore::open(dir.path().join("activity.db"))?;

    let catalog = Arc::new(
        MemoryCatalog::new()
            .with_doctor("doc_1")
            .with_doctor("doc_2")
            .with_product("prod_a")
            .with_product("prod_b")
            .with_product("prod_c")
            .with_tariff("km", Money::from_cents(50))
            .with_tariff("nui", Money::from_cents(8000)),
    );

    let rep = Principal::new(UserId::new("rep_north"), Role::Representative)
        .in_region(RegionId::new("north"));
    let rep_south = Principal::new(UserId::new("rep_south"), Role::Representative)
        .in_region(RegionId::new("south"));
    let manager = Principal::new(UserId::new("manager_north"), Role::RegionalManager)
        .in_region(RegionId::new("north"));
    let accountant = Principal::new(UserId::new("accountant"), Role::Accountant);
    let admin = Principal::new(UserId::new("admin"), Role::Administrator);

    let directory = Directory::new();
    for principal in [&rep, &rep_south, &manager, &accountant, &admin] {
        directory.register(principal.clone())?;
    }

    let service = ActivityService::new(
        Arc::new(store),
        catalog.clone() as Arc<dyn Catalog>,
        Arc::new(directory) as Arc<dyn IdentityResolver>,
    );

    Ok(Fixture {
        _dir: dir,
        service,
        catalog,
        rep,
        rep_south,
        manager,
        accountant,
        admin,
    })
}

pub fn march() -> Period {
    Period::new(2024, 3).expect("valid period")
}

pub fn march_day(day: u32) -> CalendarDay {
    CalendarDay::from_ymd(2024, 3, day).expect("valid day")
}

pub fn visit_draft() -> VisitReportDraft {
    VisitReportDraft::new()
        .set_visit_date(march_day(12))
        .set_reason(ReasonCode::Periodic)
        .set_narrative("Discussed new dosage guidelines with doctor")
        .set_doctor("doc_1")
        .present_product("prod_a")
        .present_product("prod_b")
        .offer_sample("prod_a", 4)
}

/// 10 km at 0.50 plus 12.30 of parking.
pub fn sheet_draft() -> ExpenseSheetDraft {
    ExpenseSheetDraft::new()
        .set_period(march())
        .set_flat_rate("km", 10)
        .add_itemized("Parking", march_day(5), Decimal::new(1230, 2))
}
