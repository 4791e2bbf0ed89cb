//! Persistence of submissions in sled.
//!
//! Records are CBOR encoded and keyed by their id. State transitions are committed
//! with sled's compare-and-swap against the exact bytes that were read, so of two
//! reviewers racing on the same record only one write lands.
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use tracing::debug;

use super::error::{StoreError, WorkflowError};
use super::identity::Principal;
use super::ids::{EntityId, EntityKind, UserId};
use super::period::{Period, TimeStamp};
use super::witness::{self, Witness, WitnessType};
use super::workflow::Lifecycle;

/// A submission the workflow can persist and move between states.
pub trait Record:
    Clone + Send + Sync + minicbor::Encode<()> + for<'b> minicbor::Decode<'b, ()>
{
    type State: Lifecycle;
    const KIND: EntityKind;

    fn id(&self) -> &EntityId;
    fn owner(&self) -> &UserId;
    fn period(&self) -> Period;
    fn state(&self) -> Self::State;
    fn set_state(&mut self, state: Self::State);
    /// Bumped on every committed write; part of the compare-and-swap check.
    fn version(&self) -> u64;
    fn history(&self) -> &[Witness];
    fn history_mut(&mut self) -> &mut Vec<Witness>;
    fn bump_version(&mut self);

    /// Secondary key that must stay unique across records of this kind.
    fn unique_key(&self) -> Option<String> {
        None
    }

    /// Links a new witness into the history and bumps the version.
    fn witness(
        &mut self,
        actor: &Principal,
        at: TimeStamp<Utc>,
        witness_type: WitnessType,
    ) -> Result<(), WorkflowError> {
        let id = self.id().clone();
        witness::append(self.history_mut(), &id, actor, at, witness_type)?;
        self.bump_version();
        Ok(())
    }

    /// When the record was first submitted.
    fn submitted_at(&self) -> Option<&TimeStamp<Utc>> {
        self.history().first().map(|witness| &witness.timestamp)
    }
}

/// Outcome of a conditional write.
#[derive(Debug)]
pub enum Swap<R> {
    Applied,
    /// The record no longer matched the expectation; carries what is stored now.
    Stale(Option<R>),
}

pub trait Repository<R: Record>: Send + Sync {
    fn get(&self, id: &EntityId) -> Result<Option<R>, StoreError>;

    /// Fails with `StoreError::Duplicate` if the id or unique key is taken.
    fn create(&self, record: &R) -> Result<(), StoreError>;

    /// Atomically replaces the record with `next` if it is still in
    /// `expected_state` at `expected_version`.
    fn compare_and_swap_state(
        &self,
        id: &EntityId,
        expected_state: R::State,
        expected_version: u64,
        next: &R,
    ) -> Result<Swap<R>, StoreError>;

    fn delete_if(
        &self,
        id: &EntityId,
        expected_state: R::State,
        expected_version: u64,
    ) -> Result<Swap<R>, StoreError>;

    fn scan(&self) -> Result<Vec<R>, StoreError>;
}

pub struct SledStore {
    instance: Arc<sled::Db>,
    reports: sled::Tree,
    sheets: sled::Tree,
    unique_keys: sled::Tree,
}

impl SledStore {
    pub fn new(instance: Arc<sled::Db>) -> Result<Self, StoreError> {
        let reports = instance.open_tree("visit_reports")?;
        let sheets = instance.open_tree("expense_sheets")?;
        let unique_keys = instance.open_tree("unique_keys")?;

        Ok(Self {
            instance,
            reports,
            sheets,
            unique_keys,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::new(Arc::new(sled::open(path)?))
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.instance.flush()?;
        Ok(())
    }

    fn tree<R: Record>(&self) -> &sled::Tree {
        match R::KIND {
            EntityKind::VisitReport => &self.reports,
            EntityKind::ExpenseSheet => &self.sheets,
        }
    }
}

fn encode<R: Record>(record: &R) -> Result<Vec<u8>, StoreError> {
    minicbor::to_vec(record).map_err(|e| StoreError::Encode(e.to_string()))
}

fn decode<R: Record>(bytes: &[u8]) -> Result<R, StoreError> {
    Ok(minicbor::decode(bytes)?)
}

impl<R: Record> Repository<R> for SledStore {
    fn get(&self, id: &EntityId) -> Result<Option<R>, StoreError> {
        self.tree::<R>()
            .get(id.as_str())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn create(&self, record: &R) -> Result<(), StoreError> {
        let key = record.id().as_str();
        let bytes = encode(record)?;
        let unique_key = record.unique_key();

        // record and unique key land together or not at all
        let result = (self.tree::<R>(), &self.unique_keys).transaction(|(records, unique)| {
            if records.get(key)?.is_some() {
                return Err(ConflictableTransactionError::Abort(StoreError::Duplicate(
                    key.to_owned(),
                )));
            }
            if let Some(unique_key) = &unique_key {
                if unique.get(unique_key.as_str())?.is_some() {
                    return Err(ConflictableTransactionError::Abort(StoreError::Duplicate(
                        unique_key.clone(),
                    )));
                }
                unique.insert(unique_key.as_str(), key)?;
            }
            records.insert(key, bytes.as_slice())?;
            Ok(())
        });

        match result {
            Ok(()) => {
                debug!(kind = %R::KIND, id = key, "record created");
                Ok(())
            }
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    fn compare_and_swap_state(
        &self,
        id: &EntityId,
        expected_state: R::State,
        expected_version: u64,
        next: &R,
    ) -> Result<Swap<R>, StoreError> {
        let tree = self.tree::<R>();
        let Some(current_bytes) = tree.get(id.as_str())? else {
            return Ok(Swap::Stale(None));
        };
        let current: R = decode(&current_bytes)?;
        if current.state() != expected_state || current.version() != expected_version {
            return Ok(Swap::Stale(Some(current)));
        }

        let next_bytes = encode(next)?;
        match tree.compare_and_swap(id.as_str(), Some(&current_bytes), Some(next_bytes))? {
            Ok(()) => {
                debug!(
                    kind = %R::KIND,
                    id = %id,
                    from = %expected_state,
                    to = %next.state(),
                    version = next.version(),
                    "record swapped"
                );
                Ok(Swap::Applied)
            }
            Err(conflict) => {
                let winner = conflict.current.map(|bytes| decode(&bytes)).transpose()?;
                Ok(Swap::Stale(winner))
            }
        }
    }

    fn delete_if(
        &self,
        id: &EntityId,
        expected_state: R::State,
        expected_version: u64,
    ) -> Result<Swap<R>, StoreError> {
        let tree = self.tree::<R>();
        let Some(current_bytes) = tree.get(id.as_str())? else {
            return Ok(Swap::Stale(None));
        };
        let current: R = decode(&current_bytes)?;
        if current.state() != expected_state || current.version() != expected_version {
            return Ok(Swap::Stale(Some(current)));
        }

        match tree.compare_and_swap(id.as_str(), Some(&current_bytes), None::<sled::IVec>)? {
            Ok(()) => {
                if let Some(unique_key) = current.unique_key() {
                    self.unique_keys.remove(unique_key.as_str())?;
                }
                debug!(kind = %R::KIND, id = %id, "record deleted");
                Ok(Swap::Applied)
            }
            Err(conflict) => {
                let winner = conflict.current.map(|bytes| decode(&bytes)).transpose()?;
                Ok(Swap::Stale(winner))
            }
        }
    }

    fn scan(&self) -> Result<Vec<R>, StoreError> {
        self.tree::<R>()
            .iter()
            .values()
            .map(|bytes| decode(&bytes?))
            .collect()
    }
}
