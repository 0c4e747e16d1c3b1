//! Deterministic derivation of accumulator exponents from element identifiers.
use digest::Digest;
use rand::Rng;
use rug::integer::Order;
use rug::Integer;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::element::{ElementId, Nonce};
use crate::error::{Error, Result};
use crate::primitives::{is_prime, Prime};

/// Width of the hash prefix the primes are derived from.
pub const HASH_BYTES: usize = 16;

/// Where the nonce search starts when an element is inserted for the first time.
///
/// Either way the successful nonce is recorded in the membership table; it is
/// the only thing needed to re-derive the prime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoncePolicy {
    #[default]
    Zero,
    Random,
}

impl NoncePolicy {
    pub fn initial_nonce(&self) -> Nonce {
        match self {
            NoncePolicy::Zero => 0,
            NoncePolicy::Random => Nonce::from(rand::thread_rng().gen::<u32>()),
        }
    }
}

/// SHA-256 of the identifier's bytes, truncated to 128 bits, big-endian.
pub fn hash_to_128_bits(x: &ElementId) -> Integer {
    let digest = Sha256::digest(x.to_bytes());
    Integer::from_digits(&digest[..HASH_BYTES], Order::Msf)
}

/// Find the first `nonce' >= nonce` such that `hash(x) + nonce'` is prime.
///
/// Deterministic in `(x, nonce)`: re-deriving with the returned nonce
/// returns the same prime on the first try.
pub fn hash_to_prime(x: &ElementId, nonce: Nonce) -> Result<(Prime, Nonce)> {
    let base = hash_to_128_bits(x);
    let mut nonce = nonce;
    loop {
        let candidate = Integer::from(&base + nonce);
        if is_prime(&candidate) {
            return Ok((Prime::new_unchecked(candidate), nonce));
        }
        nonce = nonce
            .checked_add(1)
            .ok_or_else(|| Error::NonceOverflow(x.clone()))?;
    }
}

/// Derive a prime for an element that is not yet in the membership table.
pub fn derive_new(x: &ElementId, policy: NoncePolicy) -> Result<(Prime, Nonce)> {
    hash_to_prime(x, policy.initial_nonce())
}
