//! Durable snapshots of the accumulator, and recovery from them.
//!
//! A checkpoint records the value `A` after some number of batches together
//! with the ordered list of members (and their nonces). Recovery replays
//! the list from `A0` and insists on reproducing `A` bit for bit.
use rug::Integer;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::accumulator::AccumulatorState;
use crate::element::{ElementId, Nonce};
use crate::error::{Error, Result};
use crate::hash_to_prime::NoncePolicy;
use crate::parallel::Executor;
use crate::primitives::Parameters;

pub mod json;
pub mod memory;
pub mod sqlite;

pub use json::JsonDirStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub batch_index: u64,
    #[serde(with = "crate::util::hex_integer")]
    pub accumulator: Integer,
    pub elements: Vec<ElementId>,
    /// Parallel to `elements`. Empty means every nonce search started at zero.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nonces: Vec<Nonce>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Checkpoint {
    /// Snapshot `state` as it stands after `batch_index` batches.
    pub fn capture(batch_index: u64, state: &AccumulatorState) -> Self {
        let members = state.members();
        Self {
            batch_index,
            accumulator: state.value().clone(),
            elements: members.elements().to_vec(),
            nonces: members.nonces(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// `(element, nonce)` pairs to replay.
    fn replay_entries(&self) -> Result<Vec<(ElementId, Nonce)>> {
        if self.nonces.is_empty() {
            return Ok(self.elements.iter().map(|x| (x.clone(), 0)).collect());
        }
        if self.nonces.len() != self.elements.len() {
            return Err(Error::CheckpointIntegrity {
                batch_index: self.batch_index,
            });
        }
        Ok(self
            .elements
            .iter()
            .cloned()
            .zip(self.nonces.iter().copied())
            .collect())
    }
}

/// Append-only persistence for checkpoints and the setup parameters.
pub trait CheckpointStore {
    /// Parameters are written once. Saving the same parameters again is a
    /// no-op; saving different ones fails with [`Error::ParametersMismatch`].
    fn save_parameters(&mut self, params: &Parameters) -> Result<()>;

    /// Fails with [`Error::MissingParameters`] if none were saved.
    fn load_parameters(&self) -> Result<Parameters>;

    /// Fails with [`Error::CheckpointExists`] if the index is already taken.
    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()>;

    fn load(&self, batch_index: u64) -> Result<Checkpoint>;

    /// All stored batch indices, ascending.
    fn indices(&self) -> Result<Vec<u64>>;

    fn latest(&self) -> Result<Option<u64>> {
        Ok(self.indices()?.last().copied())
    }
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for Box<S> {
    fn save_parameters(&mut self, params: &Parameters) -> Result<()> {
        (**self).save_parameters(params)
    }

    fn load_parameters(&self) -> Result<Parameters> {
        (**self).load_parameters()
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        (**self).save(checkpoint)
    }

    fn load(&self, batch_index: u64) -> Result<Checkpoint> {
        (**self).load(batch_index)
    }

    fn indices(&self) -> Result<Vec<u64>> {
        (**self).indices()
    }

    fn latest(&self) -> Result<Option<u64>> {
        (**self).latest()
    }
}

/// Fires once every `interval` batches.
#[derive(Debug, Clone)]
pub struct Cadence {
    interval: u64,
    counter: u64,
}

impl Cadence {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            counter: 0,
        }
    }

    /// Continue counting from `counter` batches already processed.
    pub fn resume(interval: u64, counter: u64) -> Self {
        Self {
            counter,
            ..Self::new(interval)
        }
    }

    /// Count one batch; true if a checkpoint is due.
    pub fn should_checkpoint(&mut self) -> bool {
        self.counter += 1;
        self.counter % self.interval == 0
    }

    /// The index the next batch will checkpoint at, if one is due then.
    pub fn next_due(&self) -> Option<u64> {
        let next = self.counter + 1;
        (next % self.interval == 0).then(|| next)
    }

    /// Batches counted so far.
    pub fn counter(&self) -> u64 {
        self.counter
    }
}

/// Rebuild the accumulator a checkpoint describes.
///
/// Replays the checkpoint's members from a fresh table against `A0`. A
/// mismatch with the stored value is [`Error::CheckpointIntegrity`]: it means
/// nonces were lost or the parameters are not the ones the checkpoint was
/// taken under.
pub fn recover(
    params: &Parameters,
    checkpoint: &Checkpoint,
    policy: NoncePolicy,
    executor: &Executor,
) -> Result<AccumulatorState> {
    let mut state = AccumulatorState::new(params.clone(), policy);
    state.batch_add_with_nonces(&checkpoint.replay_entries()?, executor)?;
    if state.value() != &checkpoint.accumulator {
        return Err(Error::CheckpointIntegrity {
            batch_index: checkpoint.batch_index,
        });
    }
    log::debug!(
        "recovered checkpoint {} with {} elements",
        checkpoint.batch_index,
        state.members().len()
    );
    Ok(state)
}
