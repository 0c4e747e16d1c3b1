//! Fan-out of independent work units.
//!
//! Workers never touch the accumulator state: they get read-only inputs and
//! return results, and the caller merges those results on its own thread.
use std::sync::Arc;

use rayon::prelude::*;
use rug::Integer;

use crate::error::Result;
use crate::primitives::arith;

pub const DEFAULT_PARALLEL_THRESHOLD: usize = 4;

#[derive(Debug, Clone)]
pub struct Executor {
    pool: Option<Arc<rayon::ThreadPool>>,
    threshold: usize,
}

impl Default for Executor {
    fn default() -> Self {
        Self {
            pool: None,
            threshold: DEFAULT_PARALLEL_THRESHOLD,
        }
    }
}

impl Executor {
    /// `threads = 0` uses rayon's global pool.
    pub fn new(threads: usize, threshold: usize) -> Result<Self> {
        let pool = match threads {
            0 => None,
            n => Some(Arc::new(
                rayon::ThreadPoolBuilder::new().num_threads(n).build()?,
            )),
        };
        Ok(Self {
            pool,
            threshold: threshold.max(1),
        })
    }

    /// Runs everything on the calling thread.
    pub fn sequential() -> Self {
        Self {
            pool: None,
            threshold: usize::MAX,
        }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn is_parallel(&self, units: usize) -> bool {
        units >= self.threshold
    }

    /// Run `op` inside this executor's pool.
    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    /// Apply `f` to every item, stopping at the first error.
    ///
    /// Output order matches input order.
    pub fn try_map<T, R, F>(&self, items: &[T], f: F) -> Result<Vec<R>>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> Result<R> + Sync + Send,
    {
        if !self.is_parallel(items.len()) {
            return items.iter().map(f).collect();
        }
        self.install(|| items.par_iter().map(f).collect())
    }

    /// Product of `values`, split across workers when there are enough of them.
    ///
    /// Integer multiplication commutes, so the reduction order is irrelevant.
    pub fn product(&self, values: &[&Integer]) -> Integer {
        if !self.is_parallel(values.len()) {
            return arith::product(values.iter().copied());
        }
        self.install(|| {
            values
                .par_iter()
                .fold(|| Integer::from(1u8), |acc, value| acc * *value)
                .reduce(|| Integer::from(1u8), |a, b| a * b)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use proptest::prelude::*;

    #[test]
    fn test_dedicated_pool() {
        let executor = Executor::new(2, 1).unwrap();
        let threads = executor.install(rayon::current_num_threads);
        assert_eq!(threads, 2);
    }

    #[test]
    fn test_try_map_error() {
        let executor = Executor::new(0, 1).unwrap();
        let items: Vec<u32> = (0..100).collect();
        let result = executor.try_map(&items, |&i| {
            if i == 42 {
                Err(Error::CheckpointNotFound(42))
            } else {
                Ok(i)
            }
        });
        assert!(matches!(result, Err(Error::CheckpointNotFound(42))));
    }

    #[test]
    fn test_product_matches_sequential() {
        let values: Vec<Integer> = (1..=20u32).map(Integer::from).collect();
        let refs: Vec<&Integer> = values.iter().collect();
        let expected = arith::product(values.iter());
        assert_eq!(Executor::new(0, 2).unwrap().product(&refs), expected);
        assert_eq!(Executor::sequential().product(&refs), expected);
        assert_eq!(Executor::default().product(&[]), 1u8);
    }

    proptest! {
        #[test]
        fn test_map_preserves_order(items: Vec<u32>, threshold in 1usize..8) {
            let executor = Executor::new(0, threshold).unwrap();
            let expected: Vec<u64> = items.iter().map(|&i| u64::from(i) * 3).collect();
            let triple = |&i: &u32| -> Result<u64> { Ok(u64::from(i) * 3) };
            prop_assert_eq!(executor.try_map(&items, triple)?, expected.clone());
            prop_assert_eq!(Executor::sequential().try_map(&items, triple)?, expected);
        }
    }
}
