//! Drives an accumulator through a stream of batches with periodic checkpoints.
use crate::accumulator::{
    verify_all, verify_batch_chain, AccumulatorState, BatchRecord, BatchUpdate, MembershipProof,
    WitnessTable,
};
use crate::checkpoint::{recover, Cadence, Checkpoint, CheckpointStore};
use crate::config::Config;
use crate::element::ElementId;
use crate::error::{Error, Result};
use crate::parallel::Executor;
use crate::primitives::Parameters;

pub struct Session<S> {
    state: AccumulatorState,
    store: S,
    cadence: Cadence,
    executor: Executor,
    batch_size: usize,
    /// Valid until the next mutation.
    witnesses: Option<WitnessTable>,
    /// Insertions since the session started or since the last deletion.
    history: Vec<BatchRecord>,
    last_checkpoint: Option<u64>,
}

impl<S: CheckpointStore> Session<S> {
    /// Run setup and start an empty accumulator backed by `store`.
    pub fn setup(config: &Config, store: S) -> Result<Self> {
        config.validate()?;
        let params = Parameters::generate(config.modulus_bits, config.setup_candidate_budget)?;
        Self::new(params, config, store)
    }

    /// Start an empty accumulator over existing parameters.
    ///
    /// Fails with [`Error::ParametersMismatch`] if `store` already belongs to
    /// a different accumulator.
    pub fn new(params: Parameters, config: &Config, mut store: S) -> Result<Self> {
        store.save_parameters(&params)?;
        Ok(Self {
            state: AccumulatorState::new(params, config.nonce_policy),
            store,
            cadence: Cadence::new(config.checkpoint_interval),
            executor: config.executor()?,
            batch_size: config.batch_size,
            witnesses: None,
            history: Vec::new(),
            last_checkpoint: None,
        })
    }

    /// Reopen from a stored checkpoint (the latest if `batch_index` is `None`).
    ///
    /// Batch numbering continues after the latest stored checkpoint, so
    /// resuming from an earlier one never collides with what is already there.
    pub fn resume(config: &Config, store: S, batch_index: Option<u64>) -> Result<Self> {
        let params = store.load_parameters()?;
        let latest = store.latest()?.ok_or(Error::CheckpointNotFound(0))?;
        let checkpoint = store.load(batch_index.unwrap_or(latest))?;
        let executor = config.executor()?;
        let state = recover(&params, &checkpoint, config.nonce_policy, &executor)?;
        Ok(Self {
            state,
            store,
            cadence: Cadence::resume(config.checkpoint_interval, latest),
            executor,
            batch_size: config.batch_size,
            witnesses: None,
            history: Vec::new(),
            last_checkpoint: Some(latest),
        })
    }

    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    pub fn history(&self) -> &[BatchRecord] {
        &self.history
    }

    /// Batches processed so far, counting deletions.
    pub fn batches(&self) -> u64 {
        self.cadence.counter()
    }

    pub fn process_batch(&mut self, batch: &[ElementId]) -> Result<BatchUpdate> {
        self.ensure_checkpoint_slot()?;
        let update = self.state.batch_add(batch, &self.executor)?;
        if !update.inserted.is_empty() {
            self.witnesses = None;
        }
        self.history.push(update.record());
        self.tick()?;
        Ok(update)
    }

    /// Feed `elements` through in batches of the configured size.
    ///
    /// Returns the number of newly inserted elements.
    pub fn process_all(&mut self, elements: &[ElementId]) -> Result<usize> {
        let mut inserted = 0;
        for batch in elements.chunks(self.batch_size) {
            inserted += self.process_batch(batch)?.inserted.len();
        }
        Ok(inserted)
    }

    /// Remove elements; counts as one batch.
    pub fn delete(&mut self, elements: &[ElementId]) -> Result<Vec<ElementId>> {
        self.ensure_checkpoint_slot()?;
        let removed = self.state.batch_delete(elements, &self.executor)?;
        if !removed.is_empty() {
            self.witnesses = None;
            self.history.clear();
        }
        self.tick()?;
        Ok(removed)
    }

    /// Fails if the checkpoint the next batch is due to write already exists.
    /// Runs before the batch touches the state.
    fn ensure_checkpoint_slot(&self) -> Result<()> {
        match self.cadence.next_due() {
            Some(next) if self.store.indices()?.binary_search(&next).is_ok() => {
                Err(Error::CheckpointExists(next))
            }
            _ => Ok(()),
        }
    }

    fn tick(&mut self) -> Result<()> {
        if self.cadence.should_checkpoint() {
            self.checkpoint()?;
        }
        Ok(())
    }

    /// Persist the current state under the current batch count, unless that
    /// index was already written by this session.
    pub fn checkpoint(&mut self) -> Result<u64> {
        let batch_index = self.cadence.counter();
        if self.last_checkpoint != Some(batch_index) {
            self.store
                .save(&Checkpoint::capture(batch_index, &self.state))?;
            self.last_checkpoint = Some(batch_index);
            log::debug!("checkpoint {batch_index} written");
        }
        Ok(batch_index)
    }

    /// Write a final checkpoint regardless of cadence.
    pub fn finish(&mut self) -> Result<u64> {
        self.checkpoint()
    }

    pub fn witnesses(&mut self) -> Result<&WitnessTable> {
        let table = match self.witnesses.take() {
            Some(table) => table,
            None => self.state.witnesses(&self.executor)?,
        };
        Ok(self.witnesses.insert(table))
    }

    /// Members whose witness does not verify against the current value.
    pub fn verify_witnesses(&mut self) -> Result<Vec<ElementId>> {
        let table = match self.witnesses.take() {
            Some(table) => table,
            None => self.state.witnesses(&self.executor)?,
        };
        let failed = verify_all(&self.state, &table, &self.executor);
        self.witnesses = Some(table);
        failed
    }

    pub fn prove(&mut self, x: &ElementId) -> Result<MembershipProof> {
        let nonce = self.state.members().nonce(x)?;
        let witness = self.witnesses()?.get(x)?.clone();
        Ok(MembershipProof {
            element: x.clone(),
            nonce,
            witness,
        })
    }

    pub fn verify_history(&self) -> Result<bool> {
        verify_batch_chain(self.state.modulus(), &self.history, self.state.members())
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::state::tests::{elements, PARAMS};
    use crate::checkpoint::MemoryStore;

    fn config(interval: u64) -> Config {
        Config {
            batch_size: 3,
            checkpoint_interval: interval,
            ..Config::default()
        }
    }

    #[test]
    fn test_cadence_and_finish() {
        let mut session = Session::new(PARAMS.clone(), &config(2), MemoryStore::new()).unwrap();
        let inserted = session.process_all(&elements(10)).unwrap();
        assert_eq!(inserted, 10);
        assert_eq!(session.batches(), 4);
        assert_eq!(session.store().indices().unwrap(), vec![2, 4]);

        assert_eq!(session.finish().unwrap(), 4);
        assert_eq!(session.store().indices().unwrap(), vec![2, 4]);
        assert!(session.verify_history().unwrap());
        assert_eq!(session.history().len(), 4);
    }

    #[test]
    fn test_finish_off_cadence() {
        let mut session = Session::new(PARAMS.clone(), &config(5), MemoryStore::new()).unwrap();
        session.process_all(&elements(4)).unwrap();
        assert!(session.store().indices().unwrap().is_empty());
        session.finish().unwrap();
        assert_eq!(session.store().indices().unwrap(), vec![2]);
    }

    #[test]
    fn test_witness_cache_invalidated() {
        let xs = elements(6);
        let mut session = Session::new(PARAMS.clone(), &config(10), MemoryStore::new()).unwrap();
        session.process_all(&xs[..3]).unwrap();
        assert_eq!(session.witnesses().unwrap().len(), 3);

        session.process_batch(&xs[3..]).unwrap();
        assert_eq!(session.witnesses().unwrap().len(), 6);

        session.delete(&xs[..2]).unwrap();
        assert_eq!(session.witnesses().unwrap().len(), 4);
        assert!(session.history().is_empty());

        assert!(session.verify_witnesses().unwrap().is_empty());
        let proof = session.prove(&xs[4]).unwrap();
        let state = session.state();
        assert!(proof.verify(state.value(), state.modulus()).unwrap());
        assert!(matches!(session.prove(&xs[0]), Err(Error::UnknownElement(_))));
    }

    #[test]
    fn test_resume() {
        let xs = elements(9);
        let mut session = Session::new(PARAMS.clone(), &config(1), MemoryStore::new()).unwrap();
        session.process_all(&xs[..6]).unwrap();
        let value = session.state().value().clone();
        let store = session.into_store();

        let mut resumed = Session::resume(&config(1), store, None).unwrap();
        assert_eq!(resumed.state().value(), &value);
        assert_eq!(resumed.batches(), 2);

        resumed.process_all(&xs[6..]).unwrap();
        assert_eq!(resumed.store().latest().unwrap(), Some(3));

        let earlier = Session::resume(&config(1), resumed.into_store(), Some(1)).unwrap();
        assert_eq!(earlier.state().members().len(), 3);
    }

    #[test]
    fn test_resume_from_earlier_checkpoint() {
        let xs = elements(12);
        let mut session = Session::new(PARAMS.clone(), &config(1), MemoryStore::new()).unwrap();
        session.process_all(&xs[..9]).unwrap();
        let store = session.into_store();
        assert_eq!(store.indices().unwrap(), vec![1, 2, 3]);

        let mut forked = Session::resume(&config(1), store, Some(1)).unwrap();
        assert_eq!(forked.batches(), 3);
        forked.process_batch(&xs[9..]).unwrap();
        assert_eq!(forked.store().indices().unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(forked.store().load(4).unwrap().elements.len(), 6);
        assert_eq!(forked.store().load(3).unwrap().elements.len(), 9);
        assert_eq!(forked.finish().unwrap(), 4);
    }

    #[test]
    fn test_taken_checkpoint_rejected_before_mutation() {
        let xs = elements(6);
        let mut session = Session::new(PARAMS.clone(), &config(2), MemoryStore::new()).unwrap();
        session.process_all(&xs).unwrap();
        let store = session.into_store();
        assert_eq!(store.indices().unwrap(), vec![2]);

        let mut fresh = Session::new(PARAMS.clone(), &config(2), store).unwrap();
        fresh.process_batch(&xs[..3]).unwrap();
        let value = fresh.state().value().clone();
        assert!(matches!(fresh.process_batch(&xs[3..]), Err(Error::CheckpointExists(2))));
        assert!(matches!(fresh.delete(&xs[..1]), Err(Error::CheckpointExists(2))));
        assert_eq!(fresh.state().value(), &value);
        assert_eq!(fresh.state().members().len(), 3);
        assert_eq!(fresh.batches(), 1);
        assert_eq!(fresh.history().len(), 1);
    }

    #[test]
    fn test_store_bound_to_parameters() {
        let mut session = Session::new(PARAMS.clone(), &config(1), MemoryStore::new()).unwrap();
        session.process_all(&elements(3)).unwrap();
        let store = session.into_store();

        let other = Parameters::new(3233.into(), 2.into()).unwrap();
        assert!(matches!(
            Session::new(other, &config(1), store.clone()),
            Err(Error::ParametersMismatch)
        ));
        assert_eq!(store.load_parameters().unwrap(), *PARAMS);
        let resumed = Session::resume(&config(1), store, None).unwrap();
        assert_eq!(resumed.state().members().len(), 3);
    }

    #[test]
    fn test_resume_empty_store() {
        let mut store = MemoryStore::new();
        assert!(matches!(
            Session::resume(&config(1), store.clone(), None),
            Err(Error::MissingParameters)
        ));
        store.save_parameters(&PARAMS).unwrap();
        assert!(matches!(
            Session::resume(&config(1), store, None),
            Err(Error::CheckpointNotFound(_))
        ));
    }
}
