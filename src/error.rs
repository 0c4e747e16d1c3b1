use rug::Integer;
use thiserror::Error;

use crate::element::ElementId;

#[derive(Error, Debug)]
pub enum Error {
    /// Only raised when a candidate budget is configured; the default search is unbounded.
    #[error("no two distinct {bits}-bit primes found within {attempts} candidates")]
    SetupFailure { bits: u32, attempts: u64 },
    #[error("{value} has no inverse modulo the accumulator modulus")]
    InverseNotFound { value: Integer },
    #[error("witness does not verify membership of {element}")]
    VerificationMismatch { element: ElementId },
    #[error("checkpoint {batch_index} does not reproduce its stored accumulator value")]
    CheckpointIntegrity { batch_index: u64 },
    #[error("unknown element {0}")]
    UnknownElement(ElementId),
    #[error("invalid element identifier {value:?}: {reason}")]
    InvalidElement { value: String, reason: &'static str },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("nonce overflow while hashing {0} to a prime")]
    NonceOverflow(ElementId),
    #[error("checkpoint {0} not found")]
    CheckpointNotFound(u64),
    #[error("checkpoint {0} already written")]
    CheckpointExists(u64),
    #[error("accumulator parameters have not been stored")]
    MissingParameters,
    #[error("store already holds different accumulator parameters")]
    ParametersMismatch,
    #[error("bad checkpoint timestamp: {0}")]
    Timestamp(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Bincode(#[from] bincode::Error),
    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Whether the error means the accumulator state can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::InverseNotFound { .. }
                | Error::CheckpointIntegrity { .. }
                | Error::ParametersMismatch
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
