//! Monthly expense sheets.
use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use rust_decimal::Decimal;

use super::catalog::Catalog;
use super::error::{ValidationRule, WorkflowError};
use super::identity::Principal;
use super::ids::{EntityId, EntityKind, ExpenseTypeId, UserId};
use super::money::Money;
use super::period::{CalendarDay, Period, TimeStamp};
use super::store::Record;
use super::witness::{Witness, WitnessType};
use super::workflow::{Action, Lifecycle};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SheetState {
    #[n(0)]
    Created,
    #[n(1)]
    Validated,
    #[n(2)]
    Reimbursed,
    /// Administrative closure, terminal.
    #[n(3)]
    Closed,
}

impl Lifecycle for SheetState {
    const INITIAL: Self = SheetState::Created;

    fn next(self, action: Action) -> Option<Self> {
        match (self, action) {
            (SheetState::Created, Action::Validate) => Some(SheetState::Validated),
            (SheetState::Validated, Action::Reimburse) => Some(SheetState::Reimbursed),
            (SheetState::Created | SheetState::Validated, Action::Close) => {
                Some(SheetState::Closed)
            }
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for SheetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SheetState::Created => "created",
            SheetState::Validated => "validated",
            SheetState::Reimbursed => "reimbursed",
            SheetState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Free-form expense with an explicit amount.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ItemizedLine {
    #[n(0)]
    pub label: String,
    #[n(1)]
    pub date: CalendarDay,
    #[n(2)]
    pub amount: Money,
}

/// The lines of a sheet, already checked. Tariffs are never stored here.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetContent {
    #[n(0)]
    pub flat_rate_lines: BTreeMap<ExpenseTypeId, u32>,
    #[n(1)]
    pub itemized_lines: Vec<ItemizedLine>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ExpenseSheet {
    #[n(0)]
    id: EntityId,
    #[n(1)]
    owner: UserId,
    #[n(2)]
    period: Period,
    #[n(3)]
    content: SheetContent,
    #[n(4)]
    state: SheetState,
    #[n(5)]
    justification_count: u32,
    #[n(6)]
    validated_amount: Option<Money>,
    #[n(7)]
    version: u64,
    #[n(8)]
    history: Vec<Witness>,
}

impl ExpenseSheet {
    pub fn new(
        id: EntityId,
        owner: &Principal,
        period: Period,
        content: SheetContent,
        at: TimeStamp<Utc>,
    ) -> Result<Self, WorkflowError> {
        let mut sheet = Self {
            id,
            owner: owner.id.clone(),
            period,
            content,
            state: SheetState::INITIAL,
            justification_count: 0,
            validated_amount: None,
            version: 0,
            history: vec![],
        };
        sheet.witness(owner, at, WitnessType::Created)?;
        Ok(sheet)
    }
    pub fn content(&self) -> &SheetContent {
        &self.content
    }
    pub fn justification_count(&self) -> u32 {
        self.justification_count
    }
    /// The accountant-entered amount; `None` until validated.
    pub fn validated_amount(&self) -> Option<Money> {
        self.validated_amount
    }
    pub fn revised(
        &self,
        content: SheetContent,
        actor: &Principal,
        at: TimeStamp<Utc>,
    ) -> Result<Self, WorkflowError> {
        let mut next = self.clone();
        next.content = content;
        next.witness(actor, at, WitnessType::Updated)?;
        Ok(next)
    }
    pub(crate) fn record_validation(&mut self, justification_count: u32, validated_amount: Money) {
        self.justification_count = justification_count;
        self.validated_amount = Some(validated_amount);
    }
}

impl Record for ExpenseSheet {
    type State = SheetState;
    const KIND: EntityKind = EntityKind::ExpenseSheet;

    fn id(&self) -> &EntityId {
        &self.id
    }
    fn owner(&self) -> &UserId {
        &self.owner
    }
    fn period(&self) -> Period {
        self.period
    }
    fn state(&self) -> SheetState {
        self.state
    }
    fn set_state(&mut self, state: SheetState) {
        self.state = state;
    }
    fn version(&self) -> u64 {
        self.version
    }
    fn history(&self) -> &[Witness] {
        &self.history
    }
    fn history_mut(&mut self) -> &mut Vec<Witness> {
        &mut self.history
    }
    fn bump_version(&mut self) {
        self.version += 1;
    }
    // one sheet per owner and month
    fn unique_key(&self) -> Option<String> {
        Some(sheet_key(&self.owner, self.period))
    }
}

pub fn sheet_key(owner: &UserId, period: Period) -> String {
    format!("sheet/{owner}/{period}")
}

/// Draft of a monthly sheet. Quantities and amounts are kept as entered so that
/// negative input can be reported rather than silently wrapped.
#[derive(Debug, Default, Clone)]
pub struct ExpenseSheetDraft {
    period: Option<Period>,
    flat_rate_lines: BTreeMap<ExpenseTypeId, i64>,
    itemized_lines: Vec<(String, CalendarDay, Decimal)>,
}

impl ExpenseSheetDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }
    pub fn set_flat_rate(mut self, expense_type: &str, quantity: i64) -> Self {
        self.flat_rate_lines
            .insert(ExpenseTypeId::new(expense_type), quantity);
        self
    }
    pub fn add_itemized(mut self, label: &str, date: CalendarDay, amount: Decimal) -> Self {
        self.itemized_lines.push((label.to_owned(), date, amount));
        self
    }
    pub fn period(&self) -> Option<Period> {
        self.period
    }

    pub fn validate_and_finalise(
        &self,
        catalog: &dyn Catalog,
        entity: Option<&EntityId>,
    ) -> Result<(Period, SheetContent), WorkflowError> {
        let fail = |rule| WorkflowError::validation(entity, rule);

        let period = self
            .period
            .ok_or_else(|| fail(ValidationRule::MissingField("period")))?;

        let mut flat_rate_lines = BTreeMap::new();
        for (expense_type, quantity) in &self.flat_rate_lines {
            let checked = u32::try_from(*quantity).map_err(|_| {
                fail(ValidationRule::FlatRateQuantity {
                    expense_type: expense_type.clone(),
                    quantity: *quantity,
                })
            })?;
            if catalog.tariff_for(expense_type)?.is_none() {
                return Err(fail(ValidationRule::UnknownExpenseType(
                    expense_type.clone(),
                )));
            }
            flat_rate_lines.insert(expense_type.clone(), checked);
        }

        let mut itemized_lines = Vec::with_capacity(self.itemized_lines.len());
        for (label, date, amount) in &self.itemized_lines {
            let label = label.trim();
            if label.is_empty() {
                return Err(fail(ValidationRule::MissingField("itemized label")));
            }
            let amount = checked_amount(entity, "itemized amount", *amount)?;
            itemized_lines.push(ItemizedLine {
                label: label.to_owned(),
                date: *date,
                amount,
            });
        }

        Ok((
            period,
            SheetContent {
                flat_rate_lines,
                itemized_lines,
            },
        ))
    }
}

/// Non-negative, at most two decimals.
pub fn checked_amount(
    entity: Option<&EntityId>,
    field: &'static str,
    amount: Decimal,
) -> Result<Money, WorkflowError> {
    let money = Money::exact(amount).ok_or_else(|| {
        WorkflowError::validation(entity, ValidationRule::ExcessPrecision { field, amount })
    })?;
    if money.is_negative() {
        return Err(WorkflowError::validation(
            entity,
            ValidationRule::NegativeAmount {
                field,
                amount: money,
            },
        ));
    }
    Ok(money)
}
