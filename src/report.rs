//! Visit reports and the rules a representative's draft must satisfy.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::Utc;

use super::catalog::Catalog;
use super::config::{
    CONFIDENCE, DEFAULT_CONFIDENCE, MAX_PRESENTED_PRODUCTS, MIN_NARRATIVE_CHARS, SAMPLE_QUANTITY,
};
use super::error::{ValidationRule, WorkflowError};
use super::identity::Principal;
use super::ids::{DoctorId, EntityId, EntityKind, ProductId, UserId};
use super::period::{CalendarDay, Period, TimeStamp};
use super::store::Record;
use super::witness::{Witness, WitnessType};
use super::workflow::{Action, Lifecycle};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    #[n(0)]
    Periodic,
    #[n(1)]
    Update,
    #[n(2)]
    Relaunch,
    #[n(3)]
    Solicitation,
    /// Needs a free-text elaboration.
    #[n(4)]
    Other,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Impact {
    #[n(0)]
    Low,
    #[n(1)]
    Medium,
    #[n(2)]
    High,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportState {
    #[n(0)]
    Created,
    #[n(1)]
    Validated,
    #[n(2)]
    Reimbursed,
}

impl Lifecycle for ReportState {
    const INITIAL: Self = ReportState::Created;

    fn next(self, action: Action) -> Option<Self> {
        match (self, action) {
            (ReportState::Created, Action::Validate) => Some(ReportState::Validated),
            (ReportState::Validated, Action::Reimburse) => Some(ReportState::Reimbursed),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ReportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReportState::Created => "created",
            ReportState::Validated => "validated",
            ReportState::Reimbursed => "reimbursed",
        };
        f.write_str(name)
    }
}

/// Everything the representative entered about the visit, already checked.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct VisitDetails {
    #[n(0)]
    pub visit_date: CalendarDay,
    #[n(1)]
    pub reason: ReasonCode,
    #[n(2)]
    pub elaboration: Option<String>,
    #[n(3)]
    pub narrative: String,
    #[n(4)]
    pub doctor: DoctorId,
    #[n(5)]
    pub confidence: u8,
    #[n(6)]
    pub impact: Option<Impact>,
    #[n(7)]
    pub presented_products: Vec<ProductId>,
    // regulatory traceability of distributed samples
    #[n(8)]
    pub offered_samples: BTreeMap<ProductId, u32>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct VisitReport {
    #[n(0)]
    id: EntityId,
    #[n(1)]
    author: UserId,
    #[n(2)]
    details: VisitDetails,
    #[n(3)]
    state: ReportState,
    #[n(4)]
    version: u64,
    #[n(5)]
    history: Vec<Witness>,
}

impl VisitReport {
    pub fn new(
        id: EntityId,
        author: &Principal,
        details: VisitDetails,
        at: TimeStamp<Utc>,
    ) -> Result<Self, WorkflowError> {
        let mut report = Self {
            id,
            author: author.id.clone(),
            details,
            state: ReportState::INITIAL,
            version: 0,
            history: vec![],
        };
        report.witness(author, at, WitnessType::Created)?;
        Ok(report)
    }
    pub fn author(&self) -> &UserId {
        &self.author
    }
    pub fn details(&self) -> &VisitDetails {
        &self.details
    }
    /// Replaces the entered details, recording the edit.
    pub fn revised(
        &self,
        details: VisitDetails,
        actor: &Principal,
        at: TimeStamp<Utc>,
    ) -> Result<Self, WorkflowError> {
        let mut next = self.clone();
        next.details = details;
        next.witness(actor, at, WitnessType::Updated)?;
        Ok(next)
    }
}

impl Record for VisitReport {
    type State = ReportState;
    const KIND: EntityKind = EntityKind::VisitReport;

    fn id(&self) -> &EntityId {
        &self.id
    }
    fn owner(&self) -> &UserId {
        &self.author
    }
    fn period(&self) -> Period {
        self.details.visit_date.period()
    }
    fn state(&self) -> ReportState {
        self.state
    }
    fn set_state(&mut self, state: ReportState) {
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
}

/// Draft of a visit report as entered by the representative.
#[derive(Debug, Default, Clone)]
pub struct VisitReportDraft {
    visit_date: Option<CalendarDay>,
    reason: Option<ReasonCode>,
    elaboration: Option<String>,
    narrative: String,
    doctor: Option<DoctorId>,
    confidence: Option<u8>,
    impact: Option<Impact>,
    presented_products: Vec<ProductId>,
    offered_samples: BTreeMap<ProductId, u32>,
}

impl VisitReportDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_visit_date(mut self, date: CalendarDay) -> Self {
        self.visit_date = Some(date);
        self
    }
    pub fn set_reason(mut self, reason: ReasonCode) -> Self {
        self.reason = Some(reason);
        self
    }
    pub fn set_elaboration(mut self, elaboration: &str) -> Self {
        self.elaboration = Some(elaboration.to_owned());
        self
    }
    pub fn set_narrative(mut self, narrative: &str) -> Self {
        self.narrative = narrative.to_owned();
        self
    }
    pub fn set_doctor(mut self, doctor: &str) -> Self {
        self.doctor = Some(DoctorId::new(doctor));
        self
    }
    pub fn set_confidence(mut self, confidence: u8) -> Self {
        self.confidence = Some(confidence);
        self
    }
    pub fn set_impact(mut self, impact: Impact) -> Self {
        self.impact = Some(impact);
        self
    }
    pub fn present_product(mut self, product: &str) -> Self {
        self.presented_products.push(ProductId::new(product));
        self
    }
    /// Offering the same product twice keeps the last quantity.
    pub fn offer_sample(mut self, product: &str, quantity: u32) -> Self {
        self.offered_samples.insert(ProductId::new(product), quantity);
        self
    }

    /// Checks the field rules, then the catalog references.
    pub fn validate_and_finalise(
        &self,
        catalog: &dyn Catalog,
        entity: Option<&EntityId>,
    ) -> Result<VisitDetails, WorkflowError> {
        let fail = |rule| WorkflowError::validation(entity, rule);

        let visit_date = self
            .visit_date
            .ok_or_else(|| fail(ValidationRule::MissingField("visit date")))?;
        let reason = self
            .reason
            .ok_or_else(|| fail(ValidationRule::MissingField("reason")))?;
        let doctor = self
            .doctor
            .clone()
            .ok_or_else(|| fail(ValidationRule::MissingField("doctor")))?;

        let narrative = self.narrative.trim();
        let narrative_chars = narrative.chars().count();
        if narrative_chars < MIN_NARRATIVE_CHARS {
            return Err(fail(ValidationRule::NarrativeTooShort {
                min: MIN_NARRATIVE_CHARS,
                actual: narrative_chars,
            }));
        }

        let elaboration = self
            .elaboration
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());
        if reason == ReasonCode::Other && elaboration.is_none() {
            return Err(fail(ValidationRule::MissingElaboration));
        }

        let count = self.presented_products.len();
        if count == 0 || count > MAX_PRESENTED_PRODUCTS {
            return Err(fail(ValidationRule::ProductCount(count)));
        }
        let mut seen = BTreeSet::new();
        for product in &self.presented_products {
            if !seen.insert(product) {
                return Err(fail(ValidationRule::DuplicateProduct(product.clone())));
            }
        }

        for (product, quantity) in &self.offered_samples {
            if !SAMPLE_QUANTITY.contains(quantity) {
                return Err(fail(ValidationRule::SampleQuantity {
                    product: product.clone(),
                    quantity: *quantity,
                }));
            }
        }

        let confidence = self.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        if !CONFIDENCE.contains(&confidence) {
            return Err(fail(ValidationRule::Confidence(confidence)));
        }

        if !catalog.doctor_exists(&doctor)? {
            return Err(fail(ValidationRule::UnknownDoctor(doctor)));
        }
        for product in self
            .presented_products
            .iter()
            .chain(self.offered_samples.keys())
        {
            if !catalog.product_exists(product)? {
                return Err(fail(ValidationRule::UnknownProduct(product.clone())));
            }
        }

        Ok(VisitDetails {
            visit_date,
            reason,
            elaboration: elaboration.map(str::to_owned),
            narrative: narrative.to_owned(),
            doctor,
            confidence,
            impact: self.impact,
            presented_products: self.presented_products.clone(),
            offered_samples: self.offered_samples.clone(),
        })
    }
}
