use std::collections::BTreeMap;

use super::{Checkpoint, CheckpointStore};
use crate::error::{Error, Result};
use crate::primitives::Parameters;

/// Keeps everything in process memory; gone when dropped.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    params: Option<Parameters>,
    checkpoints: BTreeMap<u64, Checkpoint>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryStore {
    fn save_parameters(&mut self, params: &Parameters) -> Result<()> {
        match &self.params {
            Some(existing) if existing != params => Err(Error::ParametersMismatch),
            Some(_) => Ok(()),
            None => {
                self.params = Some(params.clone());
                Ok(())
            }
        }
    }

    fn load_parameters(&self) -> Result<Parameters> {
        self.params.clone().ok_or(Error::MissingParameters)
    }

    fn save(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        if self.checkpoints.contains_key(&checkpoint.batch_index) {
            return Err(Error::CheckpointExists(checkpoint.batch_index));
        }
        self.checkpoints
            .insert(checkpoint.batch_index, checkpoint.clone());
        Ok(())
    }

    fn load(&self, batch_index: u64) -> Result<Checkpoint> {
        self.checkpoints
            .get(&batch_index)
            .cloned()
            .ok_or(Error::CheckpointNotFound(batch_index))
    }

    fn indices(&self) -> Result<Vec<u64>> {
        Ok(self.checkpoints.keys().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulator::state::tests::PARAMS;
    use crate::checkpoint::tests::sample;

    #[test]
    fn test_append_only() {
        let mut store = MemoryStore::new();
        assert!(matches!(store.load_parameters(), Err(Error::MissingParameters)));
        store.save_parameters(&PARAMS).unwrap();
        store.save_parameters(&PARAMS).unwrap();
        assert_eq!(store.load_parameters().unwrap(), *PARAMS);
        let other = Parameters::new(3233.into(), 2.into()).unwrap();
        assert!(matches!(store.save_parameters(&other), Err(Error::ParametersMismatch)));
        assert_eq!(store.load_parameters().unwrap(), *PARAMS);

        assert_eq!(store.latest().unwrap(), None);
        store.save(&sample(2, 2)).unwrap();
        store.save(&sample(1, 1)).unwrap();
        assert!(matches!(store.save(&sample(2, 3)), Err(Error::CheckpointExists(2))));
        assert_eq!(store.indices().unwrap(), vec![1, 2]);
        assert_eq!(store.latest().unwrap(), Some(2));
        assert_eq!(store.load(2).unwrap().elements.len(), 2);
        assert!(matches!(store.load(3), Err(Error::CheckpointNotFound(3))));
    }
}
