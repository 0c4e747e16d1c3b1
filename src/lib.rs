#![cfg_attr(feature = "strict", deny(warnings))]
pub mod accumulator;
pub mod checkpoint;
pub mod config;
pub mod element;
pub mod error;
pub mod hash_to_prime;
pub mod parallel;
pub mod primitives;
pub mod session;
pub mod util;

pub use accumulator::{AccumulatorState, MembershipProof, WitnessTable};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use config::Config;
pub use element::{ElementId, Nonce};
pub use error::{Error, Result};
pub use session::Session;
