//! Membership checks. Everything here needs only public values.
use rug::Integer;
use serde::{Deserialize, Serialize};

use super::state::AccumulatorState;
use super::witness::WitnessTable;
use crate::element::{ElementId, Nonce};
use crate::error::{Error, Result};
use crate::hash_to_prime::hash_to_prime;
use crate::parallel::Executor;
use crate::primitives::arith::{pow_mod, shamir_trick};

/// `witness ^ hash_to_prime(x, nonce) == value (mod modulus)`.
///
/// `nonce` is where the prime search starts, so any nonce from that start
/// up to the recorded one yields the same prime.
pub fn verify_membership(
    value: &Integer,
    x: &ElementId,
    nonce: Nonce,
    witness: &Integer,
    modulus: &Integer,
) -> Result<bool> {
    let (prime, _) = hash_to_prime(x, nonce)?;
    Ok(&pow_mod(witness, prime.inner(), modulus)? == value)
}

/// [`verify_membership`], turning a failed check into an error.
pub fn check_membership(
    value: &Integer,
    x: &ElementId,
    nonce: Nonce,
    witness: &Integer,
    modulus: &Integer,
) -> Result<()> {
    if verify_membership(value, x, nonce, witness, modulus)? {
        Ok(())
    } else {
        Err(Error::VerificationMismatch { element: x.clone() })
    }
}

/// A self-contained proof that one element is in the set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipProof {
    pub element: ElementId,
    pub nonce: Nonce,
    #[serde(with = "crate::util::hex_integer")]
    pub witness: Integer,
}

impl MembershipProof {
    pub fn verify(&self, value: &Integer, modulus: &Integer) -> Result<bool> {
        verify_membership(value, &self.element, self.nonce, &self.witness, modulus)
    }
}

/// Fold several membership proofs against the same accumulator value into
/// one witness for the product of their primes.
pub fn aggregate_witnesses(proofs: &[MembershipProof], modulus: &Integer) -> Result<Integer> {
    let (first, rest) = proofs
        .split_first()
        .ok_or_else(|| Error::InvalidParameter("nothing to aggregate".to_string()))?;
    let (prime, _) = hash_to_prime(&first.element, first.nonce)?;
    let mut witness = first.witness.clone();
    let mut exponent = prime.into_inner();
    for proof in rest {
        let (prime, _) = hash_to_prime(&proof.element, proof.nonce)?;
        witness = shamir_trick(&witness, &proof.witness, &exponent, prime.inner(), modulus)?;
        exponent *= prime.inner();
    }
    Ok(witness)
}

/// Check an aggregated witness for all of `members` at once.
pub fn verify_aggregated(
    value: &Integer,
    members: &[(ElementId, Nonce)],
    witness: &Integer,
    modulus: &Integer,
) -> Result<bool> {
    let mut exponent = Integer::from(1u8);
    for (x, nonce) in members {
        let (prime, _) = hash_to_prime(x, *nonce)?;
        exponent *= prime.inner();
    }
    Ok(&pow_mod(witness, &exponent, modulus)? == value)
}

/// Check every member's witness against the current value.
///
/// Returns the members whose witness is missing or does not verify, in
/// membership-table order.
pub fn verify_all(
    state: &AccumulatorState,
    witnesses: &WitnessTable,
    executor: &Executor,
) -> Result<Vec<ElementId>> {
    let members: Vec<_> = state.members().iter().collect();
    let verdicts = executor.try_map(&members, |(x, membership)| {
        let ok = match witnesses.get(x) {
            Ok(witness) => {
                let power = pow_mod(witness, membership.prime.inner(), state.modulus())?;
                &power == state.value()
            }
            Err(_) => false,
        };
        Ok(ok)
    })?;
    Ok(members
        .into_iter()
        .zip(verdicts)
        .filter(|(_, ok)| !ok)
        .map(|((x, _), _)| x.clone())
        .collect())
}
