use std::collections::{HashMap, HashSet};

use rug::Integer;

use super::history::BatchRecord;
use super::witness::{root_factor, WitnessTable};
use crate::element::{ElementId, Nonce};
use crate::error::{Error, Result};
use crate::hash_to_prime::{derive_new, hash_to_prime, NoncePolicy};
use crate::parallel::Executor;
use crate::primitives::arith::pow_mod;
use crate::primitives::{Parameters, Prime};

/// What the accumulator knows about one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub nonce: Nonce,
    /// Cached; always equal to `hash_to_prime(element, nonce)`.
    pub prime: Prime,
}

/// Element -> nonce, in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MembershipTable {
    order: Vec<ElementId>,
    entries: HashMap<ElementId, Membership>,
}

impl MembershipTable {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, x: &ElementId) -> bool {
        self.entries.contains_key(x)
    }

    pub fn get(&self, x: &ElementId) -> Option<&Membership> {
        self.entries.get(x)
    }

    pub fn nonce(&self, x: &ElementId) -> Result<Nonce> {
        self.get(x)
            .map(|m| m.nonce)
            .ok_or_else(|| Error::UnknownElement(x.clone()))
    }

    /// Returns false (and changes nothing) if `x` is already present.
    fn insert(&mut self, x: ElementId, membership: Membership) -> bool {
        if self.entries.contains_key(&x) {
            return false;
        }
        self.order.push(x.clone());
        self.entries.insert(x, membership);
        true
    }

    /// Remove every listed element that is present; returns the removed ones.
    fn remove_all(&mut self, xs: &[ElementId]) -> Vec<ElementId> {
        let mut removed = Vec::new();
        for x in xs {
            if self.entries.remove(x).is_some() {
                removed.push(x.clone());
            }
        }
        if !removed.is_empty() {
            let entries = &self.entries;
            self.order.retain(|x| entries.contains_key(x));
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ElementId, &Membership)> {
        self.order.iter().map(move |x| (x, &self.entries[x]))
    }

    pub fn elements(&self) -> &[ElementId] {
        &self.order
    }

    pub fn nonces(&self) -> Vec<Nonce> {
        self.iter().map(|(_, m)| m.nonce).collect()
    }

    pub fn primes(&self) -> Vec<&Integer> {
        self.iter().map(|(_, m)| m.prime.inner()).collect()
    }
}

/// The result of one batched insertion.
#[derive(Debug, Clone)]
pub struct BatchUpdate {
    pub before: Integer,
    pub after: Integer,
    /// Newly inserted elements, in batch order, with their primes.
    pub inserted: Vec<(ElementId, Prime)>,
}

impl BatchUpdate {
    pub fn record(&self) -> BatchRecord {
        BatchRecord {
            before: self.before.clone(),
            after: self.after.clone(),
            elements: self.inserted.iter().map(|(x, _)| x.clone()).collect(),
        }
    }
}

/// A session's accumulator: `(n, A, S)` plus the setup value `A0`.
///
/// Invariant: `value == A0 ^ (product of the primes of every member) mod n`.
#[derive(Debug, Clone)]
pub struct AccumulatorState {
    params: Parameters,
    value: Integer,
    members: MembershipTable,
    policy: NoncePolicy,
}

impl AccumulatorState {
    pub fn new(params: Parameters, policy: NoncePolicy) -> Self {
        let value = params.initial_value().clone();
        Self {
            params,
            value,
            members: MembershipTable::default(),
            policy,
        }
    }

    pub fn params(&self) -> &Parameters {
        &self.params
    }

    pub fn modulus(&self) -> &Integer {
        self.params.modulus()
    }

    pub fn value(&self) -> &Integer {
        &self.value
    }

    pub fn members(&self) -> &MembershipTable {
        &self.members
    }

    pub fn policy(&self) -> NoncePolicy {
        self.policy
    }

    /// Insert one element. Returns its prime, or `None` if it was already a member.
    pub fn add(&mut self, x: &ElementId) -> Result<Option<Prime>> {
        if self.members.contains(x) {
            return Ok(None);
        }
        let (prime, nonce) = derive_new(x, self.policy)?;
        self.value = pow_mod(&self.value, prime.inner(), self.params.modulus())?;
        self.members.insert(
            x.clone(),
            Membership {
                nonce,
                prime: prime.clone(),
            },
        );
        Ok(Some(prime))
    }

    /// Insert every element of `xs` that is not yet a member, with a single
    /// modular exponentiation by the product of the new primes.
    pub fn batch_add(&mut self, xs: &[ElementId], executor: &Executor) -> Result<BatchUpdate> {
        let mut seen = HashSet::new();
        let fresh: Vec<&ElementId> = xs
            .iter()
            .filter(|x| !self.members.contains(x) && seen.insert(*x))
            .collect();
        let policy = self.policy;
        let derived = executor.try_map(&fresh, |x| derive_new(x, policy))?;
        let entries = fresh.into_iter().cloned().zip(derived).collect();
        self.commit(entries, executor)
    }

    /// Insert elements with known nonces (replaying a checkpoint).
    ///
    /// The primes are re-derived from the given nonces rather than the policy.
    pub fn batch_add_with_nonces(
        &mut self,
        entries: &[(ElementId, Nonce)],
        executor: &Executor,
    ) -> Result<BatchUpdate> {
        let mut seen = HashSet::new();
        let fresh: Vec<&(ElementId, Nonce)> = entries
            .iter()
            .filter(|&entry| !self.members.contains(&entry.0) && seen.insert(&entry.0))
            .collect();
        let derived = executor.try_map(&fresh, |(x, nonce)| hash_to_prime(x, *nonce))?;
        let entries = fresh
            .into_iter()
            .map(|(x, _)| x.clone())
            .zip(derived)
            .collect();
        self.commit(entries, executor)
    }

    /// Single-owner merge step: all primes are known, apply them at once.
    fn commit(
        &mut self,
        entries: Vec<(ElementId, (Prime, Nonce))>,
        executor: &Executor,
    ) -> Result<BatchUpdate> {
        let before = self.value.clone();
        let primes: Vec<&Integer> = entries.iter().map(|(_, (p, _))| p.inner()).collect();
        let exponent = executor.product(&primes);
        let after = pow_mod(&self.value, &exponent, self.params.modulus())?;

        let mut inserted = Vec::with_capacity(entries.len());
        for (x, (prime, nonce)) in entries {
            let membership = Membership {
                nonce,
                prime: prime.clone(),
            };
            if self.members.insert(x.clone(), membership) {
                inserted.push((x, prime));
            }
        }
        self.value = after.clone();
        log::debug!("committed batch of {} new elements", inserted.len());
        Ok(BatchUpdate {
            before,
            after,
            inserted,
        })
    }

    /// Remove the listed members and recompute `A` from `A0` over the survivors.
    ///
    /// Without the factorization of `n` an exponent cannot be divided out of
    /// `A`, so this is a full recomputation. Absent elements are ignored.
    pub fn batch_delete(
        &mut self,
        xs: &[ElementId],
        executor: &Executor,
    ) -> Result<Vec<ElementId>> {
        let removed = self.members.remove_all(xs);
        if removed.is_empty() {
            return Ok(removed);
        }
        let exponent = executor.product(&self.members.primes());
        self.value = pow_mod(self.params.initial_value(), &exponent, self.params.modulus())?;
        log::debug!(
            "deleted {} elements, {} remain",
            removed.len(),
            self.members.len()
        );
        Ok(removed)
    }

    /// The accumulator over every member except `exclude`, without touching
    /// the live state.
    pub fn prove_excluding(&self, exclude: &[ElementId]) -> Result<Integer> {
        let exclude: HashSet<&ElementId> = exclude.iter().collect();
        let primes: Vec<&Integer> = self
            .members
            .iter()
            .filter(|(x, _)| !exclude.contains(x))
            .map(|(_, m)| m.prime.inner())
            .collect();
        let exponent = crate::primitives::arith::product(primes);
        pow_mod(self.params.initial_value(), &exponent, self.params.modulus())
    }

    /// A membership witness for every member, in membership-table order.
    pub fn witnesses(&self, executor: &Executor) -> Result<WitnessTable> {
        let primes = self.members.primes();
        let witnesses = root_factor(
            self.params.initial_value(),
            &primes,
            self.params.modulus(),
            executor,
        )?;
        Ok(WitnessTable::new(self.members.elements().to_vec(), witnesses))
    }

    /// Element -> prime, for audit output.
    pub fn prime_table(&self) -> Vec<(ElementId, Prime)> {
        self.members
            .iter()
            .map(|(x, m)| (x.clone(), m.prime.clone()))
            .collect()
    }
}
