//! Per-batch audit records.
use rug::Integer;
use serde::{Deserialize, Serialize};

use super::state::MembershipTable;
use crate::element::ElementId;
use crate::error::{Error, Result};
use crate::primitives::arith::{pow_mod, product};

/// The accumulator value on either side of one batch insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    #[serde(with = "crate::util::hex_integer")]
    pub before: Integer,
    #[serde(with = "crate::util::hex_integer")]
    pub after: Integer,
    /// Elements this batch actually inserted.
    pub elements: Vec<ElementId>,
}

/// Check that consecutive records link up and that each `after` is
/// `before` raised to the batch's primes.
///
/// Primes come from `members`, so every recorded element must still be a
/// member.
pub fn verify_batch_chain(
    modulus: &Integer,
    records: &[BatchRecord],
    members: &MembershipTable,
) -> Result<bool> {
    for (i, record) in records.iter().enumerate() {
        if i > 0 && records[i - 1].after != record.before {
            log::debug!("batch {i} does not start where batch {} ended", i - 1);
            return Ok(false);
        }
        let primes = record
            .elements
            .iter()
            .map(|x| {
                members
                    .get(x)
                    .map(|m| m.prime.inner())
                    .ok_or_else(|| Error::UnknownElement(x.clone()))
            })
            .collect::<Result<Vec<_>>>()?;
        if pow_mod(&record.before, &product(primes), modulus)? != record.after {
            log::debug!("batch {i} exponent mismatch");
            return Ok(false);
        }
    }
    Ok(true)
}
