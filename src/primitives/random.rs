//! Uniform sampling of big integers from a byte-oriented RNG.
use rand::RngCore;
use rug::integer::Order;
use rug::Integer;

const BITS_PER_BYTE: u32 = 8;

/// A uniformly random integer in `[0, 2^bits)`.
pub fn random_bits<R: RngCore + ?Sized>(bits: u32, rng: &mut R) -> Integer {
    let bytes = (bits + BITS_PER_BYTE - 1) / BITS_PER_BYTE;
    let mut buf = vec![0u8; bytes as usize];
    rng.fill_bytes(&mut buf);
    Integer::from_digits(&buf, Order::Msf).keep_bits(bits)
}

/// A uniformly random integer in `[0, bound)`, by rejection sampling.
///
/// Each draw succeeds with probability above 1/2.
pub fn random_below<R: RngCore + ?Sized>(bound: &Integer, rng: &mut R) -> Integer {
    assert!(*bound > 0u8, "empty range");
    let bits = bound.significant_bits();
    loop {
        let candidate = random_bits(bits, rng);
        if &candidate < bound {
            return candidate;
        }
    }
}

/// A uniformly random integer in `[low, high)`.
pub fn random_range<R: RngCore + ?Sized>(low: &Integer, high: &Integer, rng: &mut R) -> Integer {
    let width = Integer::from(high - low);
    random_below(&width, rng) + low
}
