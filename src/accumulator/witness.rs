//! Batch witness generation.
//!
//! The witness for member `i` is `g` raised to the product of every prime
//! except `p_i`. Computing each one separately costs `O(n^2)` exponent
//! bits; splitting the set in halves and pushing each half's product into
//! the other half's root brings that down to `O(n log n)`.
use std::borrow::Borrow;
use std::collections::HashMap;

use itertools::Itertools;
use rug::Integer;

use crate::element::ElementId;
use crate::error::{Error, Result};
use crate::parallel::Executor;
use crate::primitives::arith::{pow_mod, product};

/// A contiguous range of primes that all share the same partial witness.
#[derive(Debug, Clone)]
struct Task {
    start: usize,
    len: usize,
    root: Integer,
}

impl Task {
    /// Children of a range: each half inherits the root raised to the other
    /// half's product.
    fn split<P>(&self, primes: &[P], modulus: &Integer, executor: &Executor) -> Result<[Task; 2]>
    where
        P: Borrow<Integer> + Sync,
    {
        let mid = self.len / 2;
        let left = &primes[self.start..self.start + mid];
        let right = &primes[self.start + mid..self.start + self.len];
        let raise = |half: &[P]| -> Result<Integer> {
            let exponent = product(half.iter().map(Borrow::<Integer>::borrow));
            pow_mod(&self.root, &exponent, modulus)
        };
        let (left_root, right_root) = if executor.is_parallel(self.len) {
            rayon::join(|| raise(right), || raise(left))
        } else {
            (raise(right), raise(left))
        };
        Ok([
            Task {
                start: self.start,
                len: mid,
                root: left_root?,
            },
            Task {
                start: self.start + mid,
                len: self.len - mid,
                root: right_root?,
            },
        ])
    }
}

/// Witnesses for every prime in `primes`, in the same order.
///
/// Output `i` is `g ^ (product of primes[j] for j != i) mod modulus`.
/// The recursion is flattened into one task list per tree level, so the
/// depth of the call stack does not grow with the input.
pub fn root_factor<P>(
    g: &Integer,
    primes: &[P],
    modulus: &Integer,
    executor: &Executor,
) -> Result<Vec<Integer>>
where
    P: Borrow<Integer> + Sync,
{
    if primes.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = vec![Integer::new(); primes.len()];
    let mut level = vec![Task {
        start: 0,
        len: primes.len(),
        root: g.clone(),
    }];
    let mut depth = 0;
    executor.install(|| -> Result<()> {
        while !level.is_empty() {
            log::trace!("root_factor level {depth}: {} ranges", level.len());
            let (leaves, inner): (Vec<Task>, Vec<Task>) =
                level.drain(..).partition(|task| task.len == 1);
            for leaf in leaves {
                out[leaf.start] = leaf.root;
            }
            let children = executor.try_map(&inner, |task| task.split(primes, modulus, executor))?;
            level = children.into_iter().flatten().collect();
            depth += 1;
        }
        Ok(())
    })?;
    Ok(out)
}

/// Element -> witness, in membership-table order.
#[derive(Debug, Clone, Default)]
pub struct WitnessTable {
    entries: Vec<(ElementId, Integer)>,
    index: HashMap<ElementId, usize>,
}

impl WitnessTable {
    /// Panics if the two lists differ in length.
    pub fn new(elements: Vec<ElementId>, witnesses: Vec<Integer>) -> Self {
        let index = elements
            .iter()
            .enumerate()
            .map(|(i, x)| (x.clone(), i))
            .collect();
        let entries = elements.into_iter().zip_eq(witnesses).collect();
        Self { entries, index }
    }

    pub fn get(&self, x: &ElementId) -> Result<&Integer> {
        self.index
            .get(x)
            .map(|&i| &self.entries[i].1)
            .ok_or_else(|| Error::UnknownElement(x.clone()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ElementId, &Integer)> {
        self.entries.iter().map(|(x, w)| (x, w))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
