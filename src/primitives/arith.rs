//! Modular arithmetic over the accumulator modulus.
use rug::Integer;

use crate::error::{Error, Result};

/// `base^exponent mod modulus`.
///
/// A negative exponent requires `base` to be invertible; when it isn't we
/// have hit a malformed modulus or exponent.
pub fn pow_mod(base: &Integer, exponent: &Integer, modulus: &Integer) -> Result<Integer> {
    base.clone()
        .pow_mod(exponent, modulus)
        .map_err(|_| Error::InverseNotFound {
            value: base.clone(),
        })
}

/// Product of all `values`; the empty product is 1.
pub fn product<'a, I>(values: I) -> Integer
where
    I: IntoIterator<Item = &'a Integer>,
{
    values
        .into_iter()
        .fold(Integer::from(1u8), |acc, value| acc * value)
}

/// Bezout coefficients `(s, t)` with `s * a + t * b = gcd(a, b)`, plus the gcd.
pub fn bezout(a: &Integer, b: &Integer) -> (Integer, Integer, Integer) {
    let (gcd, s, t): (Integer, Integer, Integer) = a.gcd_cofactors_ref(b).into();
    (gcd, s, t)
}

/// The inverse of `value` modulo `modulus`.
pub fn mod_inverse(value: &Integer, modulus: &Integer) -> Result<Integer> {
    value
        .clone()
        .invert(modulus)
        .map_err(|value| Error::InverseNotFound { value })
}

/// Shamir's trick: given `w1^x1 = w2^x2 = A` with `gcd(x1, x2) = 1`, find `w`
/// with `w^(x1 * x2) = A`.
pub fn shamir_trick(
    w1: &Integer,
    w2: &Integer,
    x1: &Integer,
    x2: &Integer,
    modulus: &Integer,
) -> Result<Integer> {
    let (gcd, s, t) = bezout(x1, x2);
    if gcd != 1u8 {
        return Err(Error::InvalidParameter(format!(
            "exponents share the factor {gcd}"
        )));
    }
    // s * x1 + t * x2 = 1  =>  (w1^t * w2^s)^(x1 * x2) = A^(t * x2 + s * x1) = A
    let left = pow_signed(w1, &t, modulus)?;
    let right = pow_signed(w2, &s, modulus)?;
    Ok((left * right) % modulus)
}

/// One of the two Bezout coefficients is negative; invert the base for it.
fn pow_signed(base: &Integer, exponent: &Integer, modulus: &Integer) -> Result<Integer> {
    if *exponent >= 0u8 {
        return pow_mod(base, exponent, modulus);
    }
    let inverse = mod_inverse(base, modulus)?;
    pow_mod(&inverse, &Integer::from(-exponent), modulus)
}
