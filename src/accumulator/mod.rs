//! The accumulator engine: state, witnesses, verification.
pub mod history;
pub mod state;
pub mod verify;
pub mod witness;

pub use history::{verify_batch_chain, BatchRecord};
pub use state::{AccumulatorState, BatchUpdate, Membership, MembershipTable};
pub use verify::{
    aggregate_witnesses, check_membership, verify_aggregated, verify_all, verify_membership,
    MembershipProof,
};
pub use witness::{root_factor, WitnessTable};
