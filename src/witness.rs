//! Hash-chained record of who moved a submission and with which figures.
use chrono::Utc;

use super::error::WorkflowError;
use super::identity::{Principal, Role};
use super::ids::{EntityId, UserId};
use super::money::Money;
use super::period::TimeStamp;

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub struct Witness {
    #[n(0)]
    pub entity_id: EntityId,
    #[n(1)]
    pub actor: UserId,
    #[n(2)]
    pub role: Role,
    #[n(3)]
    pub timestamp: TimeStamp<Utc>,
    #[n(4)]
    pub witness_type: WitnessType,
    #[n(5)]
    pub previous: Option<String>, // digest of the preceding witness
}

#[derive(Debug, PartialEq, Eq, minicbor::Encode, minicbor::Decode, Clone)]
pub enum WitnessType {
    #[n(0)]
    Created,
    #[n(1)]
    Updated,
    #[n(2)]
    Validated {
        #[n(0)]
        justification_count: Option<u32>,
        #[n(1)]
        validated_amount: Option<Money>,
    },
    #[n(3)]
    Reimbursed,
    #[n(4)]
    Closed,
}

impl Witness {
    pub fn new(
        entity_id: EntityId,
        actor: &Principal,
        timestamp: TimeStamp<Utc>,
        witness_type: WitnessType,
        previous: Option<String>,
    ) -> Self {
        Self {
            entity_id,
            actor: actor.id.clone(),
            role: actor.role,
            timestamp,
            witness_type,
            previous,
        }
    }
    /// Returns the sha256 digest of the witness together with its CBOR encoding.
    pub fn build(&self) -> Result<(String, Vec<u8>), WorkflowError> {
        let cbor = minicbor::to_vec(self).map_err(|e| WorkflowError::Internal(e.to_string()))?;
        let hash = sha256::digest(&cbor);

        Ok((hash, cbor))
    }
    pub fn digest(&self) -> Result<String, WorkflowError> {
        self.build().map(|(hash, _)| hash)
    }
}

/// Appends a witness linked to the last one in `history`.
pub fn append(
    history: &mut Vec<Witness>,
    entity_id: &EntityId,
    actor: &Principal,
    timestamp: TimeStamp<Utc>,
    witness_type: WitnessType,
) -> Result<(), WorkflowError> {
    let previous = history.last().map(Witness::digest).transpose()?;
    history.push(Witness::new(
        entity_id.clone(),
        actor,
        timestamp,
        witness_type,
        previous,
    ));
    Ok(())
}

/// True when every witness points at the digest of its predecessor and all
/// witnesses belong to the same entity.
pub fn chain_is_intact(history: &[Witness]) -> bool {
    let Some(first) = history.first() else {
        return true;
    };
    if first.previous.is_some() {
        return false;
    }
    history.windows(2).all(|pair| {
        pair[1].entity_id == pair[0].entity_id
            && pair[0].digest().ok().as_ref() == pair[1].previous.as_ref()
    })
}

/// The last validation figures recorded in the chain, if any.
pub fn validated_figures(history: &[Witness]) -> Option<(Option<u32>, Option<Money>)> {
    history.iter().rev().find_map(|witness| match &witness.witness_type {
        WitnessType::Validated {
            justification_count,
            validated_amount,
        } => Some((*justification_count, *validated_amount)),
        _ => None,
    })
}
