use once_cell::sync::Lazy;
use rand::RngCore;
use rug::Integer;
use thiserror::Error;

use super::random::random_range;

// How sure do we want to be that our primes are actually prime?
// Each round lets a composite through with probability at most 1/4.
pub const MILLER_RABIN_ROUNDS: u32 = 25;

const SMALL_PRIME_LIMIT: usize = 1000;

/// Every prime below 1000 (there are 168), for cheap trial division.
static SMALL_PRIMES: Lazy<Vec<u32>> = Lazy::new(|| {
    let mut sieve = vec![true; SMALL_PRIME_LIMIT];
    sieve[0] = false;
    sieve[1] = false;
    let mut i = 2;
    while i * i < SMALL_PRIME_LIMIT {
        if sieve[i] {
            for multiple in (i * i..SMALL_PRIME_LIMIT).step_by(i) {
                sieve[multiple] = false;
            }
        }
        i += 1;
    }
    sieve
        .iter()
        .enumerate()
        .filter(|&(_, &prime)| prime)
        .map(|(value, _)| value as u32)
        .collect()
});

/// Probabilistic primality test.
///
/// Trial division by the small primes first, then Miller-Rabin with
/// [`MILLER_RABIN_ROUNDS`] random bases. A composite passes with probability
/// at most `4^-rounds`; we accept that gap.
pub fn is_prime(num: &Integer) -> bool {
    is_prime_with_rounds(num, MILLER_RABIN_ROUNDS, &mut rand::thread_rng())
}

pub fn is_prime_with_rounds<R: RngCore + ?Sized>(num: &Integer, rounds: u32, rng: &mut R) -> bool {
    if *num < 2u8 {
        return false;
    }
    for &small in SMALL_PRIMES.iter() {
        if *num == small {
            return true;
        }
        if num.mod_u(small) == 0 {
            return false;
        }
    }
    miller_rabin(num, rounds, rng)
}

/// Requires `num` odd and greater than 3.
fn miller_rabin<R: RngCore + ?Sized>(num: &Integer, rounds: u32, rng: &mut R) -> bool {
    let num_minus_one = Integer::from(num - 1u8);
    // num - 1 = 2^t * s with s odd
    let t = num_minus_one.find_one(0).expect("num > 1");
    let s = Integer::from(&num_minus_one >> t);
    let low = Integer::from(2u8);

    'rounds: for _ in 0..rounds {
        let base = random_range(&low, &num_minus_one, rng);
        let mut v = base.pow_mod(&s, num).expect("positive exponent");
        if v == 1u8 || v == num_minus_one {
            continue;
        }
        for _ in 1..t {
            v.square_mut();
            v %= num;
            if v == num_minus_one {
                continue 'rounds;
            }
        }
        return false;
    }
    true
}

#[derive(Error, Debug)]
#[error("{value} is composite")]
pub struct CompositeError {
    value: Integer,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Prime(Integer);

impl Prime {
    /// For values already known to be prime (e.g. re-derived from a stored nonce).
    pub fn new_unchecked(value: Integer) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &Integer {
        &self.0
    }

    pub fn into_inner(self) -> Integer {
        self.0
    }
}

impl TryFrom<Integer> for Prime {
    type Error = CompositeError;

    fn try_from(value: Integer) -> Result<Self, Self::Error> {
        if !is_prime(&value) {
            return Err(CompositeError { value });
        }
        Ok(Prime(value))
    }
}

impl From<Prime> for Integer {
    fn from(prime: Prime) -> Self {
        prime.0
    }
}

#[cfg(test)]
use proptest::prelude::*;

#[cfg(test)]
impl Arbitrary for Prime {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop::sample::select(vec![2u32, 3, 5, 7, 11, 13, 1009, 7919, 104729])
            .prop_map(Integer::from)
            .prop_map(Prime::try_from)
            .prop_map(Result::unwrap)
            .boxed()
    }
}
