//! Financial aggregation over expense sheets and sample traceability over visits.
use std::collections::BTreeMap;

use rust_decimal::Decimal;

use super::catalog::Catalog;
use super::error::WorkflowError;
use super::ids::ProductId;
use super::money::Money;
use super::report::VisitReport;
use super::sheet::{ExpenseSheet, SheetState};
use super::store::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetTotals {
    pub flat_rate: Money,
    pub itemized: Money,
    pub total: Money,
}

/// Splits the default total of a sheet into its flat-rate and itemized parts.
///
/// Tariffs are looked up now, so the same sheet yields a different figure after
/// a tariff change. The total is rounded once, after summing.
pub fn breakdown(sheet: &ExpenseSheet, catalog: &dyn Catalog) -> Result<SheetTotals, WorkflowError> {
    let mut flat_rate = Decimal::ZERO;
    for (expense_type, quantity) in &sheet.content().flat_rate_lines {
        let tariff = catalog
            .tariff_for(expense_type)?
            .ok_or_else(|| WorkflowError::not_found("expense type", expense_type))?;
        flat_rate += tariff.times(*quantity);
    }

    let itemized: Decimal = sheet
        .content()
        .itemized_lines
        .iter()
        .map(|line| line.amount.amount())
        .sum();

    Ok(SheetTotals {
        flat_rate: Money::round(flat_rate),
        itemized: Money::round(itemized),
        total: Money::round(flat_rate + itemized),
    })
}

/// Pre-filled suggestion for the validation dialog; never persisted by itself.
pub fn compute_default_total(
    sheet: &ExpenseSheet,
    catalog: &dyn Catalog,
) -> Result<Money, WorkflowError> {
    breakdown(sheet, catalog).map(|totals| totals.total)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeriodSummary {
    pub sheets: usize,
    pub awaiting_validation: usize,
    pub awaiting_reimbursement: usize,
    pub reimbursed: usize,
    pub closed: usize,
    /// Sum of validated amounts of sheets validated or reimbursed.
    pub validated_total: Money,
    pub reimbursed_total: Money,
    pub justifications: u64,
}

pub fn summarize<'a>(sheets: impl IntoIterator<Item = &'a ExpenseSheet>) -> PeriodSummary {
    let mut summary = PeriodSummary::default();

    for sheet in sheets {
        summary.sheets += 1;
        let amount = sheet.validated_amount().unwrap_or(Money::ZERO);
        match sheet.state() {
            SheetState::Created => summary.awaiting_validation += 1,
            SheetState::Validated => {
                summary.awaiting_reimbursement += 1;
                summary.validated_total = summary.validated_total + amount;
                summary.justifications += u64::from(sheet.justification_count());
            }
            SheetState::Reimbursed => {
                summary.reimbursed += 1;
                summary.validated_total = summary.validated_total + amount;
                summary.reimbursed_total = summary.reimbursed_total + amount;
                summary.justifications += u64::from(sheet.justification_count());
            }
            SheetState::Closed => summary.closed += 1,
        }
    }
    summary
}

/// Total quantity of samples handed out per product.
pub fn sample_traceability<'a>(
    reports: impl IntoIterator<Item = &'a VisitReport>,
) -> BTreeMap<ProductId, u64> {
    let mut totals = BTreeMap::new();
    for report in reports {
        for (product, quantity) in &report.details().offered_samples {
            *totals.entry(product.clone()).or_insert(0) += u64::from(*quantity);
        }
    }
    totals
}
