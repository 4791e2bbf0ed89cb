//! The approval state machine.
//!
//! Both submission kinds move forward only:
//!
//! ```text
//! visit report   Created --validate--> Validated --reimburse--> Reimbursed
//! expense sheet  Created --validate--> Validated --reimburse--> Reimbursed
//!                Created|Validated --close--> Closed
//! ```
//!
//! Everything here is pure: a transition takes the current record and returns the
//! next one. Committing it is the store's compare-and-swap.
use std::fmt;

use chrono::Utc;

use super::error::WorkflowError;
use super::identity::{Operation, Principal, authorize, forbidden};
use super::ids::EntityId;
use super::period::TimeStamp;
use super::store::Record;
use super::witness::WitnessType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Validate,
    Reimburse,
    Close,
}

impl Action {
    pub fn operation(self) -> Operation {
        match self {
            Action::Validate => Operation::Validate,
            Action::Reimburse => Operation::Reimburse,
            Action::Close => Operation::Close,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation())
    }
}

pub trait Lifecycle: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    const INITIAL: Self;

    /// Target state of `action`, or `None` when the action is not defined here.
    fn next(self, action: Action) -> Option<Self>;

    /// Position along the lifecycle; never decreases across transitions.
    fn rank(self) -> u8;

    /// Whether owners may still edit the submission.
    fn is_editable(self) -> bool {
        self == Self::INITIAL
    }
}

/// Role gate first, state gate second: a role that may never perform the action
/// is told so regardless of where the entity currently is.
pub fn plan<S: Lifecycle>(
    actor: &Principal,
    entity: &EntityId,
    current: S,
    action: Action,
) -> Result<S, WorkflowError> {
    authorize(actor, action.operation(), Some(entity))?;

    current
        .next(action)
        .ok_or_else(|| WorkflowError::InvalidStateTransition {
            entity: entity.clone(),
            role: actor.role,
            operation: action.operation(),
            state: current.to_string(),
        })
}

/// Produces the record as it will look once `action` is committed.
pub fn transition<R: Record>(
    record: &R,
    actor: &Principal,
    action: Action,
    at: TimeStamp<Utc>,
    witness_type: WitnessType,
) -> Result<R, WorkflowError> {
    let target = plan(actor, record.id(), record.state(), action)?;

    let mut next = record.clone();
    next.set_state(target);
    next.witness(actor, at, witness_type)?;
    Ok(next)
}

/// Owners edit only while the submission is still in its initial state. Past it
/// the edit is refused outright, like any other operation the actor may not
/// perform.
pub fn ensure_editable<R: Record>(
    record: &R,
    actor: &Principal,
    operation: Operation,
) -> Result<(), WorkflowError> {
    if record.state().is_editable() {
        return Ok(());
    }
    Err(forbidden(actor, operation, Some(record.id())))
}
