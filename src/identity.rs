//! Roles, principals and the single capability check every operation consults.
use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use super::error::{CollaboratorError, WorkflowError};
use super::ids::{EntityId, RegionId, UserId};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, minicbor::Encode, minicbor::Decode,
)]
pub enum Role {
    #[n(0)]
    Representative,
    #[n(1)]
    RegionalManager,
    #[n(2)]
    Accountant,
    #[n(3)]
    Administrator,
}

impl Role {
    /// Capability table shared by every screen and transition.
    pub fn permits(self, operation: Operation) -> bool {
        use Operation::*;

        match self {
            Role::Representative => matches!(
                operation,
                SubmitVisitReport
                    | SubmitExpenseSheet
                    | EditVisitReport
                    | EditExpenseSheet
                    | DeleteVisitReport
                    | ReviewQueue
                    | ListOwned
            ),
            Role::RegionalManager | Role::Accountant => matches!(
                operation,
                Validate | Reimburse | ReviewQueue | ListOwned | Reporting | SuggestTotal
            ),
            Role::Administrator => matches!(operation, Close | EditExpenseSheet | ListOwned),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Representative => "representative",
            Role::RegionalManager => "regional manager",
            Role::Accountant => "accountant",
            Role::Administrator => "administrator",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SubmitVisitReport,
    SubmitExpenseSheet,
    EditVisitReport,
    EditExpenseSheet,
    DeleteVisitReport,
    Validate,
    Reimburse,
    Close,
    SuggestTotal,
    ReviewQueue,
    ListOwned,
    Reporting,
}

impl Operation {
    /// Owner edits, as opposed to transitions and reads.
    pub fn is_edit(self) -> bool {
        matches!(self, Operation::EditVisitReport | Operation::EditExpenseSheet)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::SubmitVisitReport => "submit visit report",
            Operation::SubmitExpenseSheet => "submit expense sheet",
            Operation::EditVisitReport => "edit visit report",
            Operation::EditExpenseSheet => "edit expense sheet",
            Operation::DeleteVisitReport => "delete visit report",
            Operation::Validate => "validate",
            Operation::Reimburse => "reimburse",
            Operation::Close => "close",
            Operation::SuggestTotal => "compute suggested total for",
            Operation::ReviewQueue => "list review queue",
            Operation::ListOwned => "list own submissions",
            Operation::Reporting => "report on",
        };
        f.write_str(name)
    }
}

/// The authenticated caller. Its role never changes during a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
    pub region: Option<RegionId>,
}

impl Principal {
    pub fn new(id: UserId, role: Role) -> Self {
        Self {
            id,
            role,
            region: None,
        }
    }
    pub fn in_region(mut self, region: RegionId) -> Self {
        self.region = Some(region);
        self
    }
}

pub fn authorize(
    actor: &Principal,
    operation: Operation,
    entity: Option<&EntityId>,
) -> Result<(), WorkflowError> {
    if actor.role.permits(operation) {
        return Ok(());
    }
    Err(forbidden(actor, operation, entity))
}

/// Edits are reserved to the owner, except that administrators may correct any
/// expense sheet.
pub fn authorize_owner(
    actor: &Principal,
    owner: &UserId,
    operation: Operation,
    entity: &EntityId,
) -> Result<(), WorkflowError> {
    authorize(actor, operation, Some(entity))?;

    let administrator_override =
        actor.role == Role::Administrator && operation == Operation::EditExpenseSheet;
    if actor.id == *owner || administrator_override {
        return Ok(());
    }
    Err(forbidden(actor, operation, Some(entity)))
}

pub(crate) fn forbidden(
    actor: &Principal,
    operation: Operation,
    entity: Option<&EntityId>,
) -> WorkflowError {
    WorkflowError::Forbidden {
        actor: actor.id.clone(),
        role: actor.role,
        operation,
        entity: entity.cloned(),
    }
}

/// Looks up principals by id, e.g. to find the region of a submission's owner.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, id: &UserId) -> Result<Option<Principal>, CollaboratorError>;
}

/// In-process identity directory.
#[derive(Debug, Default)]
pub struct Directory {
    principals: RwLock<HashMap<UserId, Principal>>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, principal: Principal) -> Result<(), CollaboratorError> {
        self.principals
            .write()
            .map_err(|_| CollaboratorError::new("directory", "lock poisoned"))?
            .insert(principal.id.clone(), principal);
        Ok(())
    }
}

impl IdentityResolver for Directory {
    fn resolve(&self, id: &UserId) -> Result<Option<Principal>, CollaboratorError> {
        let principals = self
            .principals
            .read()
            .map_err(|_| CollaboratorError::new("directory", "lock poisoned"))?;
        Ok(principals.get(id).cloned())
    }
}
