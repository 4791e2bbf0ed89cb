use rust_decimal::Decimal;

use super::identity::{Operation, Role};
use super::ids::{DoctorId, EntityId, ExpenseTypeId, ProductId, UserId};
use super::money::Money;
use super::period::Period;

/// Every failure an operation of the approval workflow can report.
///
/// `Forbidden` means the role may never perform the operation, while
/// `InvalidStateTransition` means it may, but not from the entity's current state.
/// Every variant raised on behalf of an actor carries the acting role.
#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    #[error("validation failed for {}: {rule}", describe(.entity))]
    Validation {
        entity: Option<EntityId>,
        role: Option<Role>,
        rule: ValidationRule,
    },
    #[error("{role} {actor} may not {operation} {}", describe(.entity))]
    Forbidden {
        actor: UserId,
        role: Role,
        operation: Operation,
        entity: Option<EntityId>,
    },
    #[error("{role} cannot {operation} {entity} while it is {state}")]
    InvalidStateTransition {
        entity: EntityId,
        role: Role,
        operation: Operation,
        state: String,
    },
    #[error("{kind} {id} not found")]
    NotFound {
        kind: &'static str,
        id: String,
        role: Option<Role>,
    },
    #[error("{collaborator} unavailable")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("internal error: {0}")]
    Internal(String),
}

impl WorkflowError {
    /// Only collaborator I/O failures are worth retrying; a transition either
    /// committed or was rejected deterministically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::CollaboratorUnavailable { .. })
    }

    pub(crate) fn validation(entity: Option<&EntityId>, rule: ValidationRule) -> Self {
        WorkflowError::Validation {
            entity: entity.cloned(),
            role: None,
            rule,
        }
    }

    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        WorkflowError::NotFound {
            kind,
            id: id.to_string(),
            role: None,
        }
    }

    /// Attributes a rejection raised below the service to the acting role.
    pub(crate) fn by(mut self, actor_role: Role) -> Self {
        match &mut self {
            WorkflowError::Validation { role, .. } | WorkflowError::NotFound { role, .. } => {
                role.get_or_insert(actor_role);
            }
            _ => {}
        }
        self
    }

    /// The role the failed operation was attempted under, when one was involved.
    pub fn role(&self) -> Option<Role> {
        match self {
            WorkflowError::Validation { role, .. } | WorkflowError::NotFound { role, .. } => *role,
            WorkflowError::Forbidden { role, .. }
            | WorkflowError::InvalidStateTransition { role, .. } => Some(*role),
            WorkflowError::CollaboratorUnavailable { .. } | WorkflowError::Internal(_) => None,
        }
    }
}

fn describe(entity: &Option<EntityId>) -> String {
    match entity {
        Some(id) => id.to_string(),
        None => "new submission".to_owned(),
    }
}

/// The specific rule a rejected submission or validation violated.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationRule {
    #[error("only representatives submit visit reports and expense sheets")]
    RepresentativeOnly,
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("narrative must be at least {min} characters, got {actual}")]
    NarrativeTooShort { min: usize, actual: usize },
    #[error("a visit presents one or two products, got {0}")]
    ProductCount(usize),
    #[error("product {0} presented more than once")]
    DuplicateProduct(ProductId),
    #[error("reason `other` needs an elaboration")]
    MissingElaboration,
    #[error("sample quantity for {product} must be within 1..=100, got {quantity}")]
    SampleQuantity { product: ProductId, quantity: u32 },
    #[error("confidence must be within 1..=5, got {0}")]
    Confidence(u8),
    #[error("doctor {0} is not in the catalog")]
    UnknownDoctor(DoctorId),
    #[error("product {0} is not in the catalog")]
    UnknownProduct(ProductId),
    #[error("expense type {0} has no tariff")]
    UnknownExpenseType(ExpenseTypeId),
    #[error("{owner} already has an expense sheet for {period}")]
    DuplicateSheet { owner: UserId, period: Period },
    #[error("quantity for {expense_type} must be a non-negative integer, got {quantity}")]
    FlatRateQuantity {
        expense_type: ExpenseTypeId,
        quantity: i64,
    },
    #[error("{field} must not be negative, got {amount}")]
    NegativeAmount { field: &'static str, amount: Money },
    #[error("{field} carries more than two decimals: {amount}")]
    ExcessPrecision {
        field: &'static str,
        amount: Decimal,
    },
    #[error("an expense sheet cannot move from {from} to {to}")]
    PeriodChange { from: Period, to: Period },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParsePeriodError {
    #[error("expected a YYYY-MM period, got {0:?}")]
    Format(String),
    #[error("month must be within 1..=12, got {0}")]
    Month(u32),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseMoneyError {
    #[error("not a decimal amount: {0}")]
    Decimal(#[from] rust_decimal::Error),
    #[error("amount carries more than two decimals: {0}")]
    ExcessPrecision(Decimal),
}

#[derive(thiserror::Error, Debug)]
pub enum IdentifierError {
    #[error("invalid human readable prefix {0:?}: {1}")]
    Prefix(String, String),
    #[error("failed to encode identifier: {0}")]
    Encode(String),
}

impl From<IdentifierError> for WorkflowError {
    fn from(value: IdentifierError) -> Self {
        WorkflowError::Internal(value.to_string())
    }
}

/// Failure reported by a catalog or identity collaborator.
#[derive(thiserror::Error, Debug)]
#[error("{collaborator}: {reason}")]
pub struct CollaboratorError {
    pub collaborator: &'static str,
    pub reason: String,
}

impl CollaboratorError {
    pub fn new(collaborator: &'static str, reason: impl Into<String>) -> Self {
        Self {
            collaborator,
            reason: reason.into(),
        }
    }
}

impl From<CollaboratorError> for WorkflowError {
    fn from(value: CollaboratorError) -> Self {
        WorkflowError::CollaboratorUnavailable {
            collaborator: value.collaborator,
            source: Box::new(value),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("key {0} is already taken")]
    Duplicate(String),
}

impl From<StoreError> for WorkflowError {
    fn from(value: StoreError) -> Self {
        WorkflowError::CollaboratorUnavailable {
            collaborator: "store",
            source: Box::new(value),
        }
    }
}
