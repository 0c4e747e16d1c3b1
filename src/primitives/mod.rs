pub mod arith;
pub mod modulus;
pub mod prime;
pub mod random;

pub use modulus::{generate_two_large_distinct_primes, Parameters};
pub use prime::{is_prime, Prime};
