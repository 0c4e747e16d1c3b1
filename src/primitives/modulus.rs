//! Trusted setup: the RSA modulus and the initial accumulator value.
use rand::rngs::OsRng;
use rand::RngCore;
use rug::Integer;
use serde::{Deserialize, Serialize};

use super::prime::is_prime;
use super::random::{random_below, random_bits};
use crate::error::{Error, Result};

/// The public outcome of setup.
///
/// The factors of `modulus` are dropped as soon as it is computed; nothing
/// in this crate can recover them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(with = "crate::util::hex_integer")]
    modulus: Integer,
    /// `A0`, drawn uniformly from `[0, modulus)`.
    #[serde(with = "crate::util::hex_integer")]
    initial_value: Integer,
}

impl Parameters {
    /// Generate a fresh `2 * prime_bits`-bit modulus.
    ///
    /// With `budget = None` the prime search never gives up.
    pub fn generate(modulus_bits: u32, budget: Option<u64>) -> Result<Self> {
        if modulus_bits < 16 || modulus_bits % 2 != 0 {
            return Err(Error::InvalidParameter(format!(
                "modulus size must be even and at least 16 bits, got {modulus_bits}"
            )));
        }
        let (p, q) = generate_two_large_distinct_primes(modulus_bits / 2, budget)?;
        let modulus = p * q;
        let initial_value = random_below(&modulus, &mut OsRng);
        log::debug!("generated {}-bit modulus", modulus.significant_bits());
        Ok(Self {
            modulus,
            initial_value,
        })
    }

    /// Rebuild from previously persisted values.
    pub fn new(modulus: Integer, initial_value: Integer) -> Result<Self> {
        if modulus < 3u8 {
            return Err(Error::InvalidParameter(format!("modulus {modulus} too small")));
        }
        if initial_value < 0u8 || initial_value >= modulus {
            return Err(Error::InvalidParameter(
                "initial value must lie in [0, modulus)".to_string(),
            ));
        }
        Ok(Self {
            modulus,
            initial_value,
        })
    }

    pub fn modulus(&self) -> &Integer {
        &self.modulus
    }

    pub fn initial_value(&self) -> &Integer {
        &self.initial_value
    }

    /// Width of a group element in bytes.
    pub fn element_bytes(&self) -> usize {
        self.modulus.significant_digits::<u8>()
    }
}

/// Sample odd `bits`-bit candidates until one is prime.
///
/// The top two bits are forced so the product of two such primes has
/// exactly `2 * bits` bits.
fn generate_prime<R: RngCore + ?Sized>(
    bits: u32,
    budget: Option<u64>,
    rng: &mut R,
) -> Result<Integer> {
    let mut attempts = 0u64;
    loop {
        if let Some(budget) = budget {
            if attempts >= budget {
                return Err(Error::SetupFailure { bits, attempts });
            }
        }
        attempts += 1;
        let mut candidate = random_bits(bits, rng);
        candidate.set_bit(bits - 1, true);
        candidate.set_bit(bits - 2, true);
        candidate.set_bit(0, true);
        if is_prime(&candidate) {
            return Ok(candidate);
        }
    }
}

/// Two independent prime searches, run in parallel.
pub fn generate_two_large_distinct_primes(
    bits: u32,
    budget: Option<u64>,
) -> Result<(Integer, Integer)> {
    let (p, q) = rayon::join(
        || generate_prime(bits, budget, &mut OsRng),
        || generate_prime(bits, budget, &mut OsRng),
    );
    let p = p?;
    let mut q = q?;
    while q == p {
        q = generate_prime(bits, budget, &mut OsRng)?;
    }
    Ok((p, q))
}
